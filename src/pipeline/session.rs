//! Session-wide pipeline state: current stage, active project, upload and
//! reset locks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::info;

use super::stage::PipelineStage;

/// Gate on the reset capability.
///
/// Locked by default and after every reset. Released once a pipeline reaches
/// a stable end state or fails.
#[derive(Debug, Clone)]
pub struct ResetLock {
    locked: Arc<AtomicBool>,
}

impl Default for ResetLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ResetLock {
    pub fn new() -> Self {
        Self {
            locked: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

/// Counts resets.
///
/// Work captures the current epoch before it awaits the backend and only
/// writes its result if no reset happened in between.
#[derive(Debug, Clone, Default)]
pub struct ResetEpoch {
    value: Arc<AtomicU64>,
}

impl ResetEpoch {
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Whether no reset happened since `epoch` was captured.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }

    fn advance(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Snapshot of the session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Project the session is working on. Empty means none.
    pub active_project_id: String,
    /// Whether a new source upload is allowed.
    pub upload_enabled: bool,
    /// Current stage of the pipeline.
    pub stage: PipelineStage,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            active_project_id: String::new(),
            upload_enabled: true,
            stage: PipelineStage::UploadSource,
        }
    }
}

/// Tracks the current pipeline stage for the single active project.
#[derive(Debug, Clone, Default)]
pub struct PipelineStateMachine {
    state: Arc<RwLock<SessionState>>,
    reset_lock: ResetLock,
    epoch: ResetEpoch,
}

impl PipelineStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn current_stage(&self) -> PipelineStage {
        self.snapshot().stage
    }

    /// Move the current stage forward to `stage`, unless a reset happened
    /// since `epoch`.
    ///
    /// Returns `true` if the stage changed. Moving backwards is ignored; only
    /// `reset` goes back to the upload stage.
    pub fn advance_to(&self, epoch: u64, stage: PipelineStage) -> bool {
        let Ok(mut state) = self.state.write() else {
            return false;
        };
        if !self.epoch.is_current(epoch) || stage <= state.stage {
            return false;
        }
        info!(from = %state.stage, to = %stage, "Advancing pipeline stage");
        state.stage = stage;
        true
    }

    pub fn active_project_id(&self) -> String {
        self.snapshot().active_project_id
    }

    /// Make `project_id` the active project and close uploads, unless a
    /// reset happened since `epoch`.
    pub fn activate(&self, epoch: u64, project_id: impl Into<String>) -> bool {
        let Ok(mut state) = self.state.write() else {
            return false;
        };
        if !self.epoch.is_current(epoch) {
            return false;
        }
        state.active_project_id = project_id.into();
        state.upload_enabled = false;
        true
    }

    pub fn clear_active_project(&self) {
        if let Ok(mut state) = self.state.write() {
            state.active_project_id.clear();
        }
    }

    pub fn upload_enabled(&self) -> bool {
        self.snapshot().upload_enabled
    }

    pub fn reset_lock(&self) -> &ResetLock {
        &self.reset_lock
    }

    pub fn epoch(&self) -> &ResetEpoch {
        &self.epoch
    }

    /// Back to the initial session and lock reset. Returns the new epoch.
    ///
    /// The epoch moves first, so work that started earlier can no longer
    /// commit once the session has been cleared.
    pub fn reset(&self) -> u64 {
        let epoch = self.epoch.advance();
        if let Ok(mut state) = self.state.write() {
            *state = SessionState::default();
        }
        self.reset_lock.lock();
        epoch
    }
}

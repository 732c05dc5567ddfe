//! Error Reporter: the single sink for failures raised while the pipeline runs.

use tokio::sync::broadcast;
use tracing::{error, warn};

use super::events::PipelineEvent;
use super::log::{ErrorLog, ErrorRecord};
use crate::error::PipelineError;
use crate::pipeline::session::ResetLock;
use crate::pipeline::stage::JobStage;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Routes failures to the error log and the event channel.
///
/// Expected errors (a project the registry does not know yet) are dropped
/// here so that callers can hand over every error without filtering.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    log: ErrorLog,
    events: broadcast::Sender<PipelineEvent>,
    reset_lock: ResetLock,
}

impl ErrorReporter {
    pub fn new(reset_lock: ResetLock) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            log: ErrorLog::new(),
            events,
            reset_lock,
        }
    }

    /// Capture an unexpected failure.
    ///
    /// Appends it to the error log, publishes a `Fault` event and releases the
    /// reset lock so the user can start over. Returns `false` when the error
    /// was expected and nothing was recorded.
    pub fn report(&self, err: &PipelineError, project_id: Option<&str>) -> bool {
        if err.is_expected() {
            return false;
        }

        error!(project_id = project_id.unwrap_or_default(), kind = err.label(), "{}", err);
        self.log.push(ErrorRecord::new(err, project_id));
        self.reset_lock.release();
        self.emit(PipelineEvent::Fault {
            kind: err.label().to_string(),
            message: err.to_string(),
        });
        true
    }

    /// Publish a user-visible warning. Nothing is logged.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.emit(PipelineEvent::Warning { message });
    }

    /// A stage report carries the failure marker.
    pub fn stage_failed(&self, project_id: &str, stage: JobStage, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(project_id, %stage, "Verification stage failed");
        self.reset_lock.release();
        self.emit(PipelineEvent::StageFailed {
            project_id: project_id.to_string(),
            stage,
            reason,
        });
    }

    /// Publish an event to every current subscriber.
    pub fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn log(&self) -> &ErrorLog {
        &self.log
    }
}

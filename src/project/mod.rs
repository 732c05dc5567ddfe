//! Per-project verification state.

pub mod canonical;
pub mod registry;
pub mod snapshot;

use serde::{Deserialize, Serialize};

use crate::pipeline::stage::JobStage;

pub use registry::ProjectRegistry;
pub use snapshot::{ProgressSnapshot, RawStatus, ReportSnapshot};

/// State of one remote stage for a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    /// The stage job was accepted by the backend and has not finished yet.
    pub started: bool,
    /// Last polled progress resource.
    pub progress: ProgressSnapshot,
    /// Last polled report resource.
    pub report: ReportSnapshot,
    /// The progress resource reported completion.
    pub done: bool,
}

impl StageState {
    /// Whether the stage was started at some point since the last reset.
    ///
    /// `started` is cleared once the progress resource completes, `done` is
    /// set at the same time, so either flag means there is something to poll.
    pub fn has_begun(&self) -> bool {
        self.started || self.done
    }
}

/// A program submitted to the backend and its pipeline state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Base64 encoded program source, as uploaded.
    pub source: String,
    pub bitcode_generation: StageState,
    pub symbolic_execution: StageState,
}

impl Project {
    /// Fresh project, as created by a successful upload.
    pub fn new(id: impl Into<String>, name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn stage(&self, stage: JobStage) -> &StageState {
        match stage {
            JobStage::BitcodeGeneration => &self.bitcode_generation,
            JobStage::SymbolicExecution => &self.symbolic_execution,
        }
    }

    pub fn stage_mut(&mut self, stage: JobStage) -> &mut StageState {
        match stage {
            JobStage::BitcodeGeneration => &mut self.bitcode_generation,
            JobStage::SymbolicExecution => &mut self.symbolic_execution,
        }
    }

    /// Both stages back to their initial values. Identity and source are kept.
    pub fn reset_stages(&mut self) {
        self.bitcode_generation = StageState::default();
        self.symbolic_execution = StageState::default();
    }
}

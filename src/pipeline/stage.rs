//! Pipeline stages and polling targets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// The three fixed phases of the verification pipeline.
///
/// Exactly one stage is current for the whole session. It only moves forward,
/// except on reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    UploadSource,
    BitcodeGeneration,
    SymbolicExecution,
}

impl PipelineStage {
    /// All stages in pipeline order.
    pub const ALL: [PipelineStage; 3] = [
        PipelineStage::UploadSource,
        PipelineStage::BitcodeGeneration,
        PipelineStage::SymbolicExecution,
    ];

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::UploadSource => Some(PipelineStage::BitcodeGeneration),
            PipelineStage::BitcodeGeneration => Some(PipelineStage::SymbolicExecution),
            PipelineStage::SymbolicExecution => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineStage::UploadSource => "source upload",
            PipelineStage::BitcodeGeneration => "LLVM bitcode generation",
            PipelineStage::SymbolicExecution => "symbolic execution",
        };
        f.write_str(label)
    }
}

/// A stage backed by a long-running remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    BitcodeGeneration,
    SymbolicExecution,
}

impl JobStage {
    pub const ALL: [JobStage; 2] = [JobStage::BitcodeGeneration, JobStage::SymbolicExecution];

    /// Both polling targets of this stage, progress first.
    pub fn targets(self) -> [PollingTarget; 2] {
        [
            PollingTarget::new(self, Resource::Progress),
            PollingTarget::new(self, Resource::Report),
        ]
    }

    /// The pipeline stage that follows this one, if any.
    pub fn next(self) -> Option<PipelineStage> {
        PipelineStage::from(self).next()
    }
}

impl From<JobStage> for PipelineStage {
    fn from(stage: JobStage) -> Self {
        match stage {
            JobStage::BitcodeGeneration => PipelineStage::BitcodeGeneration,
            JobStage::SymbolicExecution => PipelineStage::SymbolicExecution,
        }
    }
}

impl TryFrom<PipelineStage> for JobStage {
    type Error = PipelineError;

    fn try_from(stage: PipelineStage) -> Result<Self, Self::Error> {
        match stage {
            PipelineStage::BitcodeGeneration => Ok(JobStage::BitcodeGeneration),
            PipelineStage::SymbolicExecution => Ok(JobStage::SymbolicExecution),
            PipelineStage::UploadSource => Err(PipelineError::InvalidStage(stage)),
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        PipelineStage::from(*self).fmt(f)
    }
}

/// Remote resource polled for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Progress,
    Report,
}

/// Identifies one polling loop and the resource it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollingTarget {
    BitcodeGenerationProgress,
    BitcodeGenerationReport,
    SymbolicExecutionProgress,
    SymbolicExecutionReport,
}

impl PollingTarget {
    pub fn new(stage: JobStage, resource: Resource) -> Self {
        match (stage, resource) {
            (JobStage::BitcodeGeneration, Resource::Progress) => {
                PollingTarget::BitcodeGenerationProgress
            }
            (JobStage::BitcodeGeneration, Resource::Report) => PollingTarget::BitcodeGenerationReport,
            (JobStage::SymbolicExecution, Resource::Progress) => {
                PollingTarget::SymbolicExecutionProgress
            }
            (JobStage::SymbolicExecution, Resource::Report) => PollingTarget::SymbolicExecutionReport,
        }
    }

    pub fn stage(self) -> JobStage {
        match self {
            PollingTarget::BitcodeGenerationProgress | PollingTarget::BitcodeGenerationReport => {
                JobStage::BitcodeGeneration
            }
            PollingTarget::SymbolicExecutionProgress | PollingTarget::SymbolicExecutionReport => {
                JobStage::SymbolicExecution
            }
        }
    }

    pub fn resource(self) -> Resource {
        match self {
            PollingTarget::BitcodeGenerationProgress | PollingTarget::SymbolicExecutionProgress => {
                Resource::Progress
            }
            PollingTarget::BitcodeGenerationReport | PollingTarget::SymbolicExecutionReport => {
                Resource::Report
            }
        }
    }
}

impl fmt::Display for PollingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resource = match self.resource() {
            Resource::Progress => "progress",
            Resource::Report => "report",
        };
        write!(f, "{} {}", self.stage(), resource)
    }
}

//! Stage eligibility predicates.
//!
//! Gates have no side effects. A missing or invalid project makes every
//! project-bound stage ineligible; it is never an error.

use super::stage::PipelineStage;
use crate::project::Project;

/// Everything a gate looks at.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    /// Uploads are enabled until one succeeds, and again after a reset.
    pub upload_enabled: bool,
    /// The active project, if the session has one and the registry knows it.
    pub project: Option<&'a Project>,
    /// Whether the reset capability is still locked.
    pub reset_locked: bool,
}

impl<'a> GateContext<'a> {
    fn valid_project(&self) -> Option<&'a Project> {
        self.project.filter(|p| p.is_valid())
    }
}

/// Whether `stage` may be started now.
pub fn can_run(stage: PipelineStage, ctx: &GateContext<'_>) -> bool {
    match stage {
        PipelineStage::UploadSource => ctx.upload_enabled,
        PipelineStage::BitcodeGeneration => ctx.valid_project().is_some_and(|p| {
            !p.bitcode_generation.started && !p.bitcode_generation.done
        }),
        PipelineStage::SymbolicExecution => ctx.valid_project().is_some_and(|p| {
            p.bitcode_generation.done
                && !p.symbolic_execution.started
                && !p.symbolic_execution.done
        }),
    }
}

/// Whether the pipeline may be reset now.
///
/// Only when no stage is runnable, and then either both stages finished or an
/// error released the reset lock.
pub fn can_reset(ctx: &GateContext<'_>) -> bool {
    let nothing_runnable = PipelineStage::ALL
        .iter()
        .all(|stage| !can_run(*stage, ctx));
    if !nothing_runnable {
        return false;
    }

    let Some(project) = ctx.valid_project() else {
        return false;
    };

    let completed = project.bitcode_generation.done && project.symbolic_execution.done;
    completed || !ctx.reset_locked
}

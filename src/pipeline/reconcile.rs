//! Merging polled snapshots into stored projects.
//!
//! A write only happens when the candidate project differs from the stored
//! one under canonical serialization, so repeated polls of an unchanged
//! resource do not churn the registry or its observers.

use tracing::debug;

use super::session::ResetEpoch;
use super::stage::JobStage;
use crate::error::PipelineResult;
use crate::project::{Project, ProgressSnapshot, ProjectRegistry, ReportSnapshot};

/// The field of a stage a reconciliation replaces.
#[derive(Debug, Clone, PartialEq)]
pub enum StageField {
    Progress(ProgressSnapshot),
    Report(ReportSnapshot),
    /// The backend accepted the job: `started` set, `done` cleared.
    Started,
    /// The progress resource completed: `done` set, `started` cleared.
    Done,
}

impl StageField {
    fn apply(self, project: &mut Project, stage: JobStage) {
        let state = project.stage_mut(stage);
        match self {
            StageField::Progress(progress) => state.progress = progress,
            StageField::Report(report) => state.report = report,
            StageField::Started => {
                state.started = true;
                state.done = false;
            }
            StageField::Done => {
                state.done = true;
                state.started = false;
            }
        }
    }
}

/// Outcome of a reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// The project as stored after the reconciliation.
    pub project: Project,
    /// Whether a write was committed.
    pub committed: bool,
}

/// Writes polled snapshots and stage flags into the registry.
#[derive(Debug, Clone)]
pub struct Reconciler {
    registry: ProjectRegistry,
}

impl Reconciler {
    pub fn new(registry: ProjectRegistry) -> Self {
        Self { registry }
    }

    /// Replace one field of a project's stage, committing only on change.
    pub fn reconcile(
        &self,
        project_id: &str,
        stage: JobStage,
        field: StageField,
    ) -> PipelineResult<Reconciliation> {
        self.reconcile_at(project_id, stage, field, None)
    }

    /// Like [`Reconciler::reconcile`], dropping the write with
    /// [`PipelineError::Interrupted`](crate::error::PipelineError::Interrupted)
    /// if `epoch` is given and a reset happened since it was captured.
    pub fn reconcile_at(
        &self,
        project_id: &str,
        stage: JobStage,
        field: StageField,
        epoch: Option<(&ResetEpoch, u64)>,
    ) -> PipelineResult<Reconciliation> {
        let current = || epoch.map_or(true, |(resets, epoch)| resets.is_current(epoch));
        match self.registry.commit_if_changed_when(project_id, current, |project| {
            field.apply(project, stage)
        })? {
            Some(project) => Ok(Reconciliation {
                project,
                committed: true,
            }),
            None => {
                debug!(project_id, %stage, "Snapshot unchanged");
                Ok(Reconciliation {
                    project: self.registry.get(project_id)?,
                    committed: false,
                })
            }
        }
    }
}

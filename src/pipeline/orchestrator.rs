//! Stage command execution, polling ticks and the reset coordinator.
//!
//! [`VerificationPipeline`] owns every component and is the only place that
//! mutates projects or session state. It is cheap to clone; clones share
//! state, and polling ticks run on clones.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::command::{command_preview, SymbolicExecutionFlags};
use super::completion::{report_outcome, MarkerConfig, ReportOutcome};
use super::gate::{self, GateContext};
use super::reconcile::{Reconciliation, Reconciler, StageField};
use super::session::{PipelineStateMachine, SessionState};
use super::stage::{JobStage, PipelineStage, PollingTarget, Resource};
use crate::client::{PollResponse, RemoteJobClient};
use crate::config::RuntimeConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::polling::{LoopKey, PollingConfig, PollingLoopManager, Tick};
use crate::project::{ProgressSnapshot, Project, ProjectRegistry, ReportSnapshot};
use crate::reporting::{ErrorLog, ErrorReporter, PipelineEvent};

/// How a stage ended, as seen by [`VerificationPipeline::wait_for_stage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Progress completed and the report carries the success marker.
    Succeeded,
    /// The report carries the failure marker.
    Failed { report: String },
    /// An unexpected error was reported while the stage ran.
    Faulted { message: String },
    /// The pipeline was reset before the stage ended.
    Interrupted,
}

impl StageOutcome {
    /// Whether the stage ended with the success marker.
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Succeeded)
    }
}

/// Drives projects through the verification stages.
///
/// Holds the backend client, the project registry, the session state machine,
/// the error reporter and the polling loops. Every mutation goes through the
/// registry's commit-if-changed path or the state machine, both guarded by the
/// reset epoch captured when the operation began.
#[derive(Clone)]
pub struct VerificationPipeline {
    client: Arc<dyn RemoteJobClient>,
    registry: ProjectRegistry,
    machine: PipelineStateMachine,
    reporter: ErrorReporter,
    reconciler: Reconciler,
    polls: PollingLoopManager,
    markers: Arc<MarkerConfig>,
}

impl VerificationPipeline {
    /// Pipeline with default polling period and markers.
    pub fn new(client: Arc<dyn RemoteJobClient>) -> Self {
        Self::with_settings(client, PollingConfig::default(), MarkerConfig::default())
    }

    /// Pipeline using the polling period and markers from `config`.
    pub fn from_config(client: Arc<dyn RemoteJobClient>, config: &RuntimeConfig) -> Self {
        Self::with_settings(client, config.polling.clone(), config.markers.clone())
    }

    pub fn with_settings(
        client: Arc<dyn RemoteJobClient>,
        polling: PollingConfig,
        markers: MarkerConfig,
    ) -> Self {
        let registry = ProjectRegistry::new();
        let machine = PipelineStateMachine::new();
        let reporter = ErrorReporter::new(machine.reset_lock().clone());
        Self {
            client,
            reconciler: Reconciler::new(registry.clone()),
            polls: PollingLoopManager::new(polling, reporter.clone()),
            registry,
            machine,
            reporter,
            markers: Arc::new(markers),
        }
    }

    /// Every project uploaded in this session.
    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    /// The polling loops currently owned by the pipeline.
    pub fn polls(&self) -> &PollingLoopManager {
        &self.polls
    }

    pub fn error_log(&self) -> &ErrorLog {
        self.reporter.log()
    }

    pub fn markers(&self) -> &MarkerConfig {
        &self.markers
    }

    pub fn session(&self) -> SessionState {
        self.machine.snapshot()
    }

    pub fn current_stage(&self) -> PipelineStage {
        self.machine.current_stage()
    }

    /// The project the session is working on.
    pub fn active_project(&self) -> PipelineResult<Project> {
        self.registry.get(&self.machine.active_project_id())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.reporter.subscribe()
    }

    pub fn can_run(&self, stage: PipelineStage) -> bool {
        let project = self.active_project().ok();
        gate::can_run(stage, &self.gate_context(project.as_ref()))
    }

    pub fn can_reset(&self) -> bool {
        let project = self.active_project().ok();
        gate::can_reset(&self.gate_context(project.as_ref()))
    }

    fn gate_context<'a>(&self, project: Option<&'a Project>) -> GateContext<'a> {
        GateContext {
            upload_enabled: self.machine.upload_enabled(),
            project,
            reset_locked: self.machine.reset_lock().is_locked(),
        }
    }

    /// Title of the report relevant to the current stage.
    pub fn report_title(&self) -> &'static str {
        let project = self.active_project().ok();
        super::report::report_title(self.current_stage(), project.as_ref())
    }

    /// Text of the report relevant to the current stage.
    pub fn stage_report(&self) -> String {
        let project = self.active_project().ok();
        super::report::stage_report(self.current_stage(), project.as_ref()).to_string()
    }

    /// Backend command for symbolic execution of the active project.
    pub fn command_preview(&self, flags: &SymbolicExecutionFlags) -> String {
        command_preview(&self.machine.active_project_id(), flags)
    }

    /// Upload a program source and make it the active project.
    ///
    /// `source` is the raw program text; it is base64 encoded on the wire and
    /// in the stored project.
    pub async fn upload_source(&self, name: &str, source: &str) -> PipelineResult<Project> {
        let epoch = self.machine.epoch().current();
        if !self.machine.upload_enabled() {
            return Err(PipelineError::NotRunnable(PipelineStage::UploadSource));
        }

        self.machine.clear_active_project();
        let encoded = BASE64.encode(source);

        let response = match self.client.upload_source(&encoded).await {
            Ok(response) => response,
            Err(err) => {
                return Err(self.fail("Sorry, the source upload has failed.", err.into(), None))
            }
        };

        let project_id = match (response.rejection(), response.project_id()) {
            (None, Some(id)) => id.to_string(),
            (reason, _) => {
                let reason = reason.unwrap_or_default();
                self.reporter
                    .warn(format!("Sorry, the source upload has failed: {}", reason));
                return Err(PipelineError::Rejected {
                    operation: "source upload",
                    reason,
                });
            }
        };

        let project = Project::new(project_id.clone(), name, encoded);
        self.registry.upsert(project.clone());
        if !self.machine.activate(epoch, project_id.clone()) {
            debug!(project_id = %project_id, "Reset during upload, project left inactive");
            return Err(PipelineError::Interrupted(project_id));
        }
        info!(project_id = %project_id, "Source uploaded");

        self.reporter.emit(PipelineEvent::ProjectIdentified {
            project_id: project_id.clone(),
        });
        self.advance_to(epoch, PipelineStage::BitcodeGeneration);

        Ok(project)
    }

    /// Start a remote stage job for the active project and poll it.
    ///
    /// `flags` is only sent for symbolic execution. A reset while the backend
    /// call is in flight drops the result with [`PipelineError::Interrupted`].
    pub async fn start_stage(
        &self,
        stage: PipelineStage,
        flags: Option<&SymbolicExecutionFlags>,
    ) -> PipelineResult<Project> {
        let job = JobStage::try_from(stage)?;
        let epoch = self.machine.epoch().current();
        if !self.can_run(stage) {
            return Err(PipelineError::NotRunnable(stage));
        }

        let project_id = self.machine.active_project_id();
        let flags = match job {
            JobStage::BitcodeGeneration => None,
            JobStage::SymbolicExecution => Some(flags.map(|f| f.as_str()).unwrap_or_default()),
        };

        let response = match self.client.start(job, &project_id, flags).await {
            Ok(response) => response,
            Err(err) => {
                let warning = format!("Sorry, {} could not be started.", job);
                return Err(self.fail(&warning, err.into(), Some(&project_id)));
            }
        };

        if let Some(reason) = response.rejection() {
            self.reporter
                .warn(format!("Sorry, {} could not be started: {}", job, reason));
            return Err(PipelineError::Rejected {
                operation: "stage start",
                reason,
            });
        }

        let reconciliation = self.reconcile_at(epoch, &project_id, job, StageField::Started)?;
        self.start_polling(&project_id, job, epoch);

        // A reset that began after the commit may have missed the new loops.
        if !self.machine.epoch().is_current(epoch) {
            self.polls.cancel_project(&project_id);
            return Err(PipelineError::Interrupted(project_id));
        }

        info!(project_id = %project_id, stage = %job, "Stage started");
        self.reporter.emit(PipelineEvent::StageStarted {
            project_id: project_id.clone(),
            stage: job,
            message: response.message().to_string(),
        });

        Ok(reconciliation.project)
    }

    /// Return to the initial state: no project, uploads enabled, no loops.
    ///
    /// Projects stay registered; their stages go back to initial values in one
    /// commit per project. Operations that began before the reset can no
    /// longer write once it returns.
    pub fn reset(&self) {
        let epoch = self.machine.reset();
        self.polls.cancel_all();

        let reset = self.registry.update_all(Project::reset_stages);
        info!(projects = reset, epoch, "Pipeline reset");
        self.reporter.emit(PipelineEvent::Reset);
    }

    /// Cancel every loop and wait for in-flight ticks to finish.
    pub async fn shutdown(&self) {
        self.polls.shutdown().await;
    }

    /// Subscribe to the end of a stage of the active project.
    ///
    /// Take the watch before starting the stage so that a fault raised while
    /// the start call returns is not missed.
    pub fn watch_stage(&self, job: JobStage) -> StageWatch {
        StageWatch {
            pipeline: self.clone(),
            job,
            revisions: self.registry.subscribe(),
            events: self.subscribe(),
        }
    }

    /// Wait until a stage of the active project ends.
    pub async fn wait_for_stage(&self, job: JobStage) -> StageOutcome {
        self.watch_stage(job).outcome().await
    }

    fn fail(&self, warning: &str, err: PipelineError, project_id: Option<&str>) -> PipelineError {
        self.reporter.report(&err, project_id);
        self.reporter.warn(warning);
        err
    }

    fn advance_to(&self, epoch: u64, stage: PipelineStage) {
        if self.machine.advance_to(epoch, stage) {
            self.reporter.emit(PipelineEvent::StageAdvanced { stage });
        }
    }

    fn reconcile_at(
        &self,
        epoch: u64,
        project_id: &str,
        job: JobStage,
        field: StageField,
    ) -> PipelineResult<Reconciliation> {
        self.reconciler
            .reconcile_at(project_id, job, field, Some((self.machine.epoch(), epoch)))
    }

    fn start_polling(&self, project_id: &str, job: JobStage, epoch: u64) {
        for target in job.targets() {
            let pipeline = self.clone();
            let id = project_id.to_string();
            self.polls
                .start(LoopKey::new(project_id, target), move |token| {
                    let pipeline = pipeline.clone();
                    let id = id.clone();
                    async move { pipeline.tick(&id, target, epoch, token).await }
                });
        }
    }

    /// One polling tick for `target` of `project_id`, on behalf of a loop
    /// started in `epoch`.
    async fn tick(
        &self,
        project_id: &str,
        target: PollingTarget,
        epoch: u64,
        token: CancellationToken,
    ) -> PipelineResult<Tick> {
        if !self.machine.epoch().is_current(epoch) {
            return Ok(Tick::Stop);
        }

        let job = target.stage();
        let project = self.registry.get(project_id)?;
        let state = project.stage(job);

        if !state.has_begun() {
            debug!(project_id, %target, "Stage not started, skipping tick");
            return Ok(Tick::Continue);
        }

        let terminal = match target.resource() {
            Resource::Progress => state.progress.is_completed(),
            Resource::Report => {
                report_outcome(job, &state.report, &self.markers).is_conclusive()
            }
        };
        if terminal {
            return Ok(Tick::Stop);
        }

        let response = self.client.poll(project_id, target).await?;
        if token.is_cancelled() {
            debug!(project_id, %target, "Loop cancelled during poll, discarding response");
            return Ok(Tick::Stop);
        }

        let applied = match (target.resource(), response) {
            (_, PollResponse::Rejected(reason)) => {
                self.reporter
                    .warn(format!("Polling {} failed: {}", target, reason));
                Ok(Tick::Continue)
            }
            (Resource::Progress, PollResponse::Progress(progress)) => {
                self.apply_progress(project_id, job, progress, epoch)
            }
            (Resource::Report, PollResponse::Report(report)) => {
                self.apply_report(project_id, job, report, epoch)
            }
            _ => Err(PipelineError::UnexpectedTarget(target)),
        };

        match applied {
            Err(PipelineError::Interrupted(_)) => {
                debug!(project_id, %target, "Reset during poll, discarding response");
                Ok(Tick::Stop)
            }
            other => other,
        }
    }

    fn apply_progress(
        &self,
        project_id: &str,
        job: JobStage,
        progress: ProgressSnapshot,
        epoch: u64,
    ) -> PipelineResult<Tick> {
        let completed = progress.is_completed();
        self.reconcile_at(epoch, project_id, job, StageField::Progress(progress))?;
        if !completed {
            return Ok(Tick::Continue);
        }

        let done = self.reconcile_at(epoch, project_id, job, StageField::Done)?;
        if done.committed {
            self.complete_stage(project_id, job, epoch);
        }
        Ok(Tick::Stop)
    }

    fn complete_stage(&self, project_id: &str, job: JobStage, epoch: u64) {
        info!(project_id, stage = %job, "Stage completed");
        self.reporter.emit(PipelineEvent::StageCompleted {
            project_id: project_id.to_string(),
            stage: job,
        });

        if self.machine.active_project_id() != project_id {
            return;
        }
        match job.next() {
            Some(next) => self.advance_to(epoch, next),
            None if self.machine.epoch().is_current(epoch) => {
                self.machine.reset_lock().release()
            }
            None => {}
        }
    }

    fn apply_report(
        &self,
        project_id: &str,
        job: JobStage,
        report: ReportSnapshot,
        epoch: u64,
    ) -> PipelineResult<Tick> {
        let outcome = report_outcome(job, &report, &self.markers);
        let reconciliation = self.reconcile_at(epoch, project_id, job, StageField::Report(report))?;

        if reconciliation.committed && outcome == ReportOutcome::Failed {
            let messages = reconciliation.project.stage(job).report.messages();
            let reason = messages
                .lines()
                .find(|line| line.contains(&self.markers.failure))
                .unwrap_or(messages)
                .trim()
                .to_string();
            self.reporter.stage_failed(project_id, job, reason);
        }
        Ok(Tick::Continue)
    }
}

/// Pending end of one stage, created by [`VerificationPipeline::watch_stage`].
///
/// Registry commits and pipeline events are buffered from the moment the
/// watch is taken.
pub struct StageWatch {
    pipeline: VerificationPipeline,
    job: JobStage,
    revisions: watch::Receiver<u64>,
    events: broadcast::Receiver<PipelineEvent>,
}

impl StageWatch {
    /// Wait for the stage to succeed, fail, fault or be interrupted by a reset.
    pub async fn outcome(mut self) -> StageOutcome {
        let job = self.job;
        loop {
            drop(self.revisions.borrow_and_update());
            if let Ok(project) = self.pipeline.active_project() {
                let state = project.stage(job);
                match report_outcome(job, &state.report, &self.pipeline.markers) {
                    ReportOutcome::Failed => {
                        return StageOutcome::Failed {
                            report: state.report.messages().to_string(),
                        }
                    }
                    ReportOutcome::Succeeded if state.done => return StageOutcome::Succeeded,
                    _ => {}
                }
            }

            tokio::select! {
                changed = self.revisions.changed() => {
                    if changed.is_err() {
                        return StageOutcome::Interrupted;
                    }
                }
                event = self.events.recv() => match event {
                    Ok(PipelineEvent::Fault { message, .. }) => {
                        return StageOutcome::Faulted { message };
                    }
                    Ok(PipelineEvent::Reset) | Err(RecvError::Closed) => {
                        return StageOutcome::Interrupted;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                },
            }
        }
    }
}

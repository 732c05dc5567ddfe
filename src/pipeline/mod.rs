//! Verification pipeline orchestration.
//!
//! A project moves through three stages: source upload, LLVM bitcode
//! generation and symbolic execution. The two remote stages are started on the
//! backend and then observed by polling loops until their progress completes.
//!
//! - [`gate`] decides which stage may run.
//! - [`reconcile`] merges polled snapshots into stored projects.
//! - [`completion`] interprets progress and report snapshots.
//! - [`orchestrator`] runs stages and resets the pipeline.

pub mod command;
pub mod completion;
pub mod gate;
pub mod orchestrator;
pub mod reconcile;
pub mod report;
pub mod session;
pub mod stage;

pub use command::{command_preview, SymbolicExecutionFlags};
pub use completion::{MarkerConfig, ReportOutcome};
pub use orchestrator::{StageOutcome, StageWatch, VerificationPipeline};
pub use reconcile::{Reconciler, StageField};
pub use session::{PipelineStateMachine, ResetEpoch, ResetLock, SessionState};
pub use stage::{JobStage, PipelineStage, PollingTarget, Resource};

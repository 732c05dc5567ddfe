//! Orchestration runtime for a remote program verification backend.
//!
//! Uploads a program source, then drives LLVM bitcode generation and symbolic
//! execution on the backend, polling each stage until it completes.

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod polling;
pub mod project;
pub mod reporting;

pub use client::{HttpJobClient, RemoteJobClient};
pub use config::{ApiConfig, RuntimeConfig};
pub use error::{ClientError, ClientResult, PipelineError, PipelineResult};
pub use pipeline::{JobStage, PipelineStage, StageOutcome, VerificationPipeline};
pub use polling::PollingConfig;
pub use project::{Project, ProjectRegistry};
pub use reporting::{ErrorLog, PipelineEvent};

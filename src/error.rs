//! Error types shared across the verification runtime.

use thiserror::Error;

use crate::pipeline::stage::{PipelineStage, PollingTarget};

/// Errors raised while talking to the verification backend.
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not the JSON we expected.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success status code.
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Backend could not be reached at all.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// A route could not be resolved against the base URL.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),
}

/// Result type for remote job client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by the pipeline orchestration layer.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The project id does not (yet) resolve in the registry.
    #[error("project not found: {0:?}")]
    ProjectNotFound(String),

    /// A remote call failed to complete or could not be decoded.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The backend answered but reported a failure.
    #[error("{operation} rejected by backend: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    /// The stage gate refused to run the stage.
    #[error("{0} cannot run in the current state")]
    NotRunnable(PipelineStage),

    /// A stage that has no remote job was asked to behave like one.
    #[error("invalid verification stage: {0}")]
    InvalidStage(PipelineStage),

    /// A polling target that does not belong to the expected stage.
    #[error("unexpected polling target: {0}")]
    UnexpectedTarget(PollingTarget),

    /// A reset happened while an operation on the project was in flight; its
    /// result was dropped.
    #[error("pipeline was reset during an operation on project {0:?}")]
    Interrupted(String),

    /// Runtime configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Whether the error is part of normal operation and must not be logged.
    ///
    /// A missing project only means the registry has not caught up with the
    /// session yet. An interrupted operation was superseded by a reset.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            PipelineError::ProjectNotFound(_) | PipelineError::Interrupted(_)
        )
    }

    /// Stable label for the error kind, used in the error log and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::ProjectNotFound(_) => "project_not_found",
            PipelineError::Client(ClientError::Json(_)) => "decoding",
            PipelineError::Client(_) => "transport",
            PipelineError::Rejected { .. } => "rejected",
            PipelineError::NotRunnable(_) => "not_runnable",
            PipelineError::InvalidStage(_) => "invalid_stage",
            PipelineError::UnexpectedTarget(_) => "unexpected_target",
            PipelineError::Interrupted(_) => "interrupted",
            PipelineError::Config(_) => "config",
        }
    }
}

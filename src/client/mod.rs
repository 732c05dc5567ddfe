//! Remote Job Client: the backend that uploads sources and runs stage jobs.
//!
//! The [`RemoteJobClient`] trait is the seam between the pipeline and the
//! network. [`HttpJobClient`] talks to the real backend; tests substitute a
//! scripted implementation.
//!
//! Responses are decoded leniently. A body that parses but lacks the success
//! field, or carries an `error` field, is a backend-reported failure and is
//! returned as data, not as a [`ClientError`](crate::error::ClientError).

pub mod http;
pub mod routes;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientResult;
use crate::pipeline::stage::{JobStage, PollingTarget, Resource};
use crate::project::{ProgressSnapshot, ReportSnapshot};

pub use http::HttpJobClient;
pub use routes::Route;

/// Operations the pipeline needs from the verification backend.
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Upload a base64 encoded source. Sent as `{"source": ...}`.
    async fn upload_source(&self, source: &str) -> ClientResult<UploadResponse>;

    /// Start a stage job. `flags` only applies to symbolic execution.
    async fn start(
        &self,
        stage: JobStage,
        project_id: &str,
        flags: Option<&str>,
    ) -> ClientResult<StartResponse>;

    /// Fetch one progress or report resource.
    async fn poll(&self, project_id: &str, target: PollingTarget) -> ClientResult<PollResponse>;
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Body of `POST /source`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl UploadResponse {
    pub fn accepted(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            error: None,
        }
    }

    /// The new project id, if the upload succeeded.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Why the backend refused the upload, if it did.
    pub fn rejection(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(describe(error));
        }
        match self.project_id() {
            Some(_) => None,
            None => Some("response carries no project_id".to_string()),
        }
    }
}

/// Body of a stage start request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl StartResponse {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn refused(error: impl Into<String>) -> Self {
        Self {
            message: None,
            error: Some(Value::String(error.into())),
        }
    }

    /// Success requires a `message` and no `error`.
    pub fn rejection(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(describe(error));
        }
        match self.message {
            Some(_) => None,
            None => Some("response carries no message".to_string()),
        }
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Decoded body of a progress or report resource.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResponse {
    Progress(ProgressSnapshot),
    Report(ReportSnapshot),
    /// The backend answered with an `error`, or without the resource's field.
    Rejected(String),
}

impl PollResponse {
    /// Interpret a JSON body fetched for `target`.
    pub fn from_body(target: PollingTarget, body: Value) -> ClientResult<Self> {
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Ok(PollResponse::Rejected(describe(error)));
        }

        match target.resource() {
            Resource::Progress => {
                let progress: ProgressSnapshot = serde_json::from_value(body)?;
                if progress.raw_status.is_none() {
                    return Ok(PollResponse::Rejected(
                        "progress carries no raw_status".to_string(),
                    ));
                }
                Ok(PollResponse::Progress(progress))
            }
            Resource::Report => {
                let report: ReportSnapshot = serde_json::from_value(body)?;
                if report.messages.is_none() {
                    return Ok(PollResponse::Rejected(
                        "report carries no messages".to_string(),
                    ));
                }
                Ok(PollResponse::Report(report))
            }
        }
    }
}

//! Process-wide Error Log.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A captured failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Timestamp when the failure was captured.
    pub recorded_at: DateTime<Utc>,
    /// Stable error label (e.g. "transport", "decoding").
    pub kind: String,
    /// Human readable error message.
    pub message: String,
    /// Project the failing operation was working on, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl ErrorRecord {
    pub fn new(error: &PipelineError, project_id: Option<&str>) -> Self {
        Self {
            recorded_at: Utc::now(),
            kind: error.label().to_string(),
            message: error.to_string(),
            project_id: project_id.map(str::to_string),
        }
    }
}

/// Append-only, process-wide log of captured failures.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    inner: Arc<RwLock<Vec<ErrorRecord>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: ErrorRecord) {
        if let Ok(mut records) = self.inner.write() {
            records.push(record);
        }
    }

    /// Most recently captured failure.
    pub fn last(&self) -> Option<ErrorRecord> {
        self.inner.read().ok().and_then(|r| r.last().cloned())
    }

    /// Copy of every record, oldest first.
    pub fn entries(&self) -> Vec<ErrorRecord> {
        self.inner.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

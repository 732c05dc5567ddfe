//! Snapshots of the remote progress and report resources.
//!
//! Both snapshots are opaque: the fields the pipeline reads are typed, and
//! anything else the backend sends is carried along untouched so that the
//! stored snapshot is exactly what was polled.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw status value reported by a progress resource while the job runs.
pub const RAW_STATUS_RUNNING: &str = "running";

/// Raw status value reported by a progress resource once the job exited.
pub const RAW_STATUS_COMPLETED: &str = "exited";

/// Interpreted progress status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStatus {
    Running,
    Completed,
}

impl RawStatus {
    /// Parse a backend status string. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            RAW_STATUS_RUNNING => Some(RawStatus::Running),
            RAW_STATUS_COMPLETED => Some(RawStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RawStatus::Running => RAW_STATUS_RUNNING,
            RawStatus::Completed => RAW_STATUS_COMPLETED,
        }
    }
}

/// Last polled state of a stage's progress resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressSnapshot {
    /// Snapshot carrying only a raw status.
    pub fn with_status(status: RawStatus) -> Self {
        Self {
            raw_status: Some(status.as_str().to_string()),
            extra: Map::new(),
        }
    }

    pub fn status(&self) -> Option<RawStatus> {
        self.raw_status.as_deref().and_then(RawStatus::parse)
    }

    /// The only terminal transition of a progress resource.
    pub fn is_completed(&self) -> bool {
        self.status() == Some(RawStatus::Completed)
    }

    pub fn is_empty(&self) -> bool {
        self.raw_status.is_none() && self.extra.is_empty()
    }
}

/// Last polled state of a stage's report resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReportSnapshot {
    pub fn with_messages(messages: impl Into<String>) -> Self {
        Self {
            messages: Some(messages.into()),
            extra: Map::new(),
        }
    }

    /// Report text, empty until the backend has produced any.
    pub fn messages(&self) -> &str {
        self.messages.as_deref().unwrap_or_default()
    }

    pub fn contains(&self, marker: &str) -> bool {
        !marker.is_empty() && self.messages().contains(marker)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_none() && self.extra.is_empty()
    }
}

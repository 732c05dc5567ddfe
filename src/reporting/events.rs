//! Typed events published on the pipeline's broadcast channel.

use serde::Serialize;

use crate::pipeline::stage::{JobStage, PipelineStage};

/// Events published by the pipeline while it runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// An upload succeeded and the session now tracks this project.
    ProjectIdentified { project_id: String },
    /// The backend accepted a stage job.
    StageStarted {
        project_id: String,
        stage: JobStage,
        message: String,
    },
    /// The stage's progress resource reported completion.
    StageCompleted { project_id: String, stage: JobStage },
    /// The current pipeline stage moved forward.
    StageAdvanced { stage: PipelineStage },
    /// The stage report carries the failure marker.
    StageFailed {
        project_id: String,
        stage: JobStage,
        reason: String,
    },
    /// Recoverable failure the user should know about.
    Warning { message: String },
    /// An unexpected failure was appended to the error log.
    Fault { kind: String, message: String },
    /// The pipeline was returned to its initial state.
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_events_serialize_with_tag() {
        let event = PipelineEvent::StageCompleted {
            project_id: "p1".to_string(),
            stage: JobStage::BitcodeGeneration,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "stage_completed", "project_id": "p1", "stage": "bitcode_generation"})
        );
        assert_eq!(
            serde_json::to_value(PipelineEvent::Reset).unwrap(),
            json!({"event": "reset"})
        );
    }
}

//! Stage completion and success detection.
//!
//! Progress completion comes from the structured `raw_status` field. Report
//! success and failure are found by searching the free-form report text for
//! fixed markers, one success marker per stage and one shared failure marker.

use serde::{Deserialize, Serialize};

use super::stage::JobStage;
use crate::project::ReportSnapshot;

/// Default marker for a successful bitcode generation report.
pub const DEFAULT_BITCODE_SUCCESS_MARKER: &str = "Generated LLVM bitcode";

/// Default marker for a successful symbolic execution report.
pub const DEFAULT_SYMBOLIC_EXECUTION_SUCCESS_MARKER: &str = "KLEE: done: generated tests";

/// Default marker for a failed stage, in any report.
pub const DEFAULT_FAILURE_MARKER: &str = "FAILED:";

/// Marker strings searched for in report messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub bitcode_success: String,
    pub symbolic_execution_success: String,
    pub failure: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            bitcode_success: DEFAULT_BITCODE_SUCCESS_MARKER.to_string(),
            symbolic_execution_success: DEFAULT_SYMBOLIC_EXECUTION_SUCCESS_MARKER.to_string(),
            failure: DEFAULT_FAILURE_MARKER.to_string(),
        }
    }
}

impl MarkerConfig {
    pub fn success_marker(&self, stage: JobStage) -> &str {
        match stage {
            JobStage::BitcodeGeneration => &self.bitcode_success,
            JobStage::SymbolicExecution => &self.symbolic_execution_success,
        }
    }
}

/// What a report says about its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// No marker yet. Not a failure, even after the progress completed.
    Pending,
    Succeeded,
    Failed,
}

impl ReportOutcome {
    /// Whether the marker search is conclusive and polling can stop.
    pub fn is_conclusive(self) -> bool {
        !matches!(self, ReportOutcome::Pending)
    }
}

/// Classify a report. The failure marker wins over the success marker.
pub fn report_outcome(stage: JobStage, report: &ReportSnapshot, markers: &MarkerConfig) -> ReportOutcome {
    if report.contains(&markers.failure) {
        ReportOutcome::Failed
    } else if report.contains(markers.success_marker(stage)) {
        ReportOutcome::Succeeded
    } else {
        ReportOutcome::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_without_markers() {
        let markers = MarkerConfig::default();
        let report = ReportSnapshot::with_messages("Compiling multiplication v0.1.0");
        assert_eq!(
            report_outcome(JobStage::BitcodeGeneration, &report, &markers),
            ReportOutcome::Pending
        );
        assert!(!ReportOutcome::Pending.is_conclusive());
    }

    #[test]
    fn test_success_marker_is_stage_specific() {
        let markers = MarkerConfig::default();
        let report = ReportSnapshot::with_messages("KLEE: done: generated tests = 3");

        assert_eq!(
            report_outcome(JobStage::SymbolicExecution, &report, &markers),
            ReportOutcome::Succeeded
        );
        assert_eq!(
            report_outcome(JobStage::BitcodeGeneration, &report, &markers),
            ReportOutcome::Pending
        );
    }

    #[test]
    fn test_failure_marker_wins() {
        let markers = MarkerConfig::default();
        let report = ReportSnapshot::with_messages("Generated LLVM bitcode\nFAILED: opt pass");
        let outcome = report_outcome(JobStage::BitcodeGeneration, &report, &markers);
        assert_eq!(outcome, ReportOutcome::Failed);
        assert!(outcome.is_conclusive());
    }
}

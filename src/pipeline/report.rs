//! Which stage report the session currently shows.

use super::stage::{JobStage, PipelineStage};
use crate::project::Project;

pub const UPLOAD_TITLE: &str = "Source upload";
pub const BITCODE_GENERATION_TITLE: &str = "LLVM bitcode generation report";
pub const SYMBOLIC_EXECUTION_TITLE: &str = "Symbolic execution report";

/// The stage whose report is relevant for `stage`, if any.
///
/// Once bitcode generation finished the pipeline sits on symbolic execution,
/// but its bitcode report stays relevant until symbolic execution begins.
pub fn report_stage(stage: PipelineStage, project: Option<&Project>) -> Option<JobStage> {
    match stage {
        PipelineStage::UploadSource => None,
        PipelineStage::BitcodeGeneration => Some(JobStage::BitcodeGeneration),
        PipelineStage::SymbolicExecution => match project {
            Some(p) if !p.symbolic_execution.has_begun() => Some(JobStage::BitcodeGeneration),
            _ => Some(JobStage::SymbolicExecution),
        },
    }
}

pub fn report_title(stage: PipelineStage, project: Option<&Project>) -> &'static str {
    match report_stage(stage, project) {
        None => UPLOAD_TITLE,
        Some(JobStage::BitcodeGeneration) => BITCODE_GENERATION_TITLE,
        Some(JobStage::SymbolicExecution) => SYMBOLIC_EXECUTION_TITLE,
    }
}

/// Report text shown under [`report_title`]. Empty during upload.
pub fn stage_report(stage: PipelineStage, project: Option<&Project>) -> &str {
    match (report_stage(stage, project), project) {
        (Some(job), Some(project)) => project.stage(job).report.messages(),
        _ => "",
    }
}

//! Pipeline runs against a mocked HTTP backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use verification_runtime::pipeline::{MarkerConfig, SymbolicExecutionFlags};
use verification_runtime::{
    HttpJobClient, JobStage, PipelineStage, PollingConfig, RemoteJobClient, StageOutcome,
    VerificationPipeline,
};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{self, PROJECT_ID};

fn pipeline_for(server: &MockServer) -> VerificationPipeline {
    let client = HttpJobClient::new(server.uri()).expect("client");
    let client: Arc<dyn RemoteJobClient> = Arc::new(client);
    VerificationPipeline::with_settings(
        client,
        PollingConfig::new().with_interval(Duration::from_millis(20)),
        MarkerConfig::default(),
    )
}

async fn wait(pipeline: &VerificationPipeline, job: JobStage) -> StageOutcome {
    tokio::time::timeout(Duration::from_secs(5), pipeline.wait_for_stage(job))
        .await
        .expect("stage did not finish in time")
}

#[tokio::test]
async fn test_full_pipeline_over_http() {
    let server = support::successful_backend().await;
    let pipeline = pipeline_for(&server);

    pipeline
        .upload_source("multiplication", "int main() { return 0; }")
        .await
        .expect("upload");
    pipeline
        .start_stage(PipelineStage::BitcodeGeneration, None)
        .await
        .expect("start bitcode generation");
    assert_eq!(wait(&pipeline, JobStage::BitcodeGeneration).await, StageOutcome::Succeeded);
    assert_eq!(pipeline.current_stage(), PipelineStage::SymbolicExecution);
    assert_eq!(pipeline.report_title(), "LLVM bitcode generation report");

    pipeline
        .start_stage(PipelineStage::SymbolicExecution, None)
        .await
        .expect("start symbolic execution");
    assert_eq!(wait(&pipeline, JobStage::SymbolicExecution).await, StageOutcome::Succeeded);

    let project = pipeline.active_project().expect("project");
    assert_eq!(project.id, PROJECT_ID);
    assert!(project.bitcode_generation.done);
    assert!(project.symbolic_execution.done);
    assert_eq!(pipeline.stage_report(), support::SYMBOLIC_EXECUTION_REPORT);
    assert!(pipeline.can_reset());
    assert!(pipeline.error_log().is_empty());

    pipeline.reset();
    assert!(pipeline.can_run(PipelineStage::UploadSource));
    assert_eq!(pipeline.polls().active_count(), 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_symbolic_execution_flags_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/symbolic-execution/{}", PROJECT_ID)))
        .and(body_json(json!({ "flags": "--max-time=30" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "started" })))
        .expect(1)
        .mount(&server)
        .await;
    support::mount_starts(&server).await;
    support::mount_progress(&server, "llvm-bitcode-generation", 0).await;
    support::mount_report(&server, "llvm-bitcode-generation", support::BITCODE_REPORT).await;
    support::mount_progress(&server, "symbolic-execution", 0).await;
    support::mount_report(&server, "symbolic-execution", support::SYMBOLIC_EXECUTION_REPORT).await;
    let pipeline = pipeline_for(&server);

    pipeline.upload_source("m", "int main() {}").await.expect("upload");
    pipeline
        .start_stage(PipelineStage::BitcodeGeneration, None)
        .await
        .expect("start bitcode generation");
    assert!(wait(&pipeline, JobStage::BitcodeGeneration).await.is_success());

    let flags = SymbolicExecutionFlags::new("  --max-time=30  ");
    pipeline
        .start_stage(PipelineStage::SymbolicExecution, Some(&flags))
        .await
        .expect("start symbolic execution");
    assert!(wait(&pipeline, JobStage::SymbolicExecution).await.is_success());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_failure_marker_in_report() {
    let server = MockServer::start().await;
    support::mount_starts(&server).await;
    support::mount_progress(&server, "llvm-bitcode-generation", 0).await;
    support::mount_report(
        &server,
        "llvm-bitcode-generation",
        "main.c:3: error: expected ';'\nFAILED: clang -emit-llvm -c main.c",
    )
    .await;
    let pipeline = pipeline_for(&server);

    pipeline.upload_source("m", "int main() {").await.expect("upload");
    pipeline
        .start_stage(PipelineStage::BitcodeGeneration, None)
        .await
        .expect("start");

    let outcome = wait(&pipeline, JobStage::BitcodeGeneration).await;
    assert!(matches!(outcome, StageOutcome::Failed { .. }));
    assert!(pipeline.can_reset());
    assert!(pipeline.error_log().is_empty());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_server_error_while_polling_is_a_fault() {
    let server = MockServer::start().await;
    support::mount_starts(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/llvm-bitcode-generation/{}/progress", PROJECT_ID)))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;
    support::mount_report(&server, "llvm-bitcode-generation", "compiling").await;
    let pipeline = pipeline_for(&server);

    pipeline.upload_source("m", "int main() {}").await.expect("upload");
    let watch = pipeline.watch_stage(JobStage::BitcodeGeneration);
    pipeline
        .start_stage(PipelineStage::BitcodeGeneration, None)
        .await
        .expect("start");

    let outcome = tokio::time::timeout(Duration::from_secs(5), watch.outcome())
        .await
        .expect("stage did not finish in time");
    assert!(matches!(outcome, StageOutcome::Faulted { message } if message.contains("502")));
    let record = pipeline.error_log().last().expect("logged");
    assert_eq!(record.kind, "transport");
    assert!(pipeline.can_reset());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_rejected_start_leaves_project_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/source"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "project_id": PROJECT_ID })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/llvm-bitcode-generation/{}", PROJECT_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "busy" })))
        .mount(&server)
        .await;
    let pipeline = pipeline_for(&server);

    pipeline.upload_source("m", "int main() {}").await.expect("upload");
    let err = pipeline
        .start_stage(PipelineStage::BitcodeGeneration, None)
        .await
        .unwrap_err();

    assert_eq!(err.label(), "rejected");
    let project = pipeline.active_project().expect("project");
    assert!(!project.bitcode_generation.started);
    assert!(pipeline.can_run(PipelineStage::BitcodeGeneration));
    assert_eq!(pipeline.polls().active_count(), 0);
}

#[tokio::test]
async fn test_unreachable_backend_is_logged() {
    let client = HttpJobClient::new("http://127.0.0.1:9").expect("client");
    let pipeline = VerificationPipeline::new(Arc::new(client));

    let err = pipeline.upload_source("m", "int main() {}").await.unwrap_err();

    assert_eq!(err.label(), "transport");
    assert_eq!(pipeline.error_log().len(), 1);
    assert!(pipeline.registry().is_empty());
}

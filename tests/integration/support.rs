//! Shared wiremock backend for integration tests.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PROJECT_ID: &str = "3f2a9c";

pub const BITCODE_REPORT: &str = "clang -emit-llvm -c main.c\nGenerated LLVM bitcode: main.bc";

pub const SYMBOLIC_EXECUTION_REPORT: &str =
    "KLEE: output directory is \"klee-out-0\"\nKLEE: done: generated tests = 4";

fn ok(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

/// Mount the upload and start routes.
pub async fn mount_starts(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/source"))
        .respond_with(ok(json!({ "project_id": PROJECT_ID })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/llvm-bitcode-generation/{}", PROJECT_ID)))
        .respond_with(ok(json!({ "message": "LLVM bitcode generation started" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/symbolic-execution/{}", PROJECT_ID)))
        .respond_with(ok(json!({ "message": "Symbolic execution started" })))
        .mount(server)
        .await;
}

/// Progress answers `running` for the first `running_polls` requests, then `exited`.
pub async fn mount_progress(server: &MockServer, stage: &str, running_polls: u64) {
    let route = format!("/{}/{}/progress", stage, PROJECT_ID);
    if running_polls > 0 {
        Mock::given(method("GET"))
            .and(path(route.clone()))
            .respond_with(ok(json!({ "raw_status": "running" })))
            .up_to_n_times(running_polls)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ok(json!({ "raw_status": "exited" })))
        .mount(server)
        .await;
}

pub async fn mount_report(server: &MockServer, stage: &str, messages: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/{}/report", stage, PROJECT_ID)))
        .respond_with(ok(json!({ "messages": messages })))
        .mount(server)
        .await;
}

/// A backend on which both stages succeed.
pub async fn successful_backend() -> MockServer {
    let server = MockServer::start().await;
    mount_starts(&server).await;
    mount_progress(&server, "llvm-bitcode-generation", 2).await;
    mount_report(&server, "llvm-bitcode-generation", BITCODE_REPORT).await;
    mount_progress(&server, "symbolic-execution", 1).await;
    mount_report(&server, "symbolic-execution", SYMBOLIC_EXECUTION_REPORT).await;
    server
}

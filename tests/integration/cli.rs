//! Tests for the `verify` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;
use wiremock::MockServer;

use crate::support::{self, PROJECT_ID};

/// Get a Command instance for the verify binary, isolated from the caller's environment.
#[allow(deprecated)]
fn verify_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("verify").expect("Failed to find verify binary");
    cmd.current_dir(dir.path())
        .env_remove("API_HOST")
        .env_remove("API_PORT")
        .env_remove("API_SCHEME")
        .env_remove("API_PRODUCTION")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, server: &MockServer) -> std::path::PathBuf {
    let address = server.address();
    let config = format!(
        "[api]\nhost = \"{}\"\nport = {}\n\n[polling]\ninterval_ms = 20\n",
        address.ip(),
        address.port()
    );
    let path = dir.path().join("verification.toml");
    fs::write(&path, config).expect("Failed to write config");
    path
}

#[test]
fn test_preview_with_default_flags() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    verify_cmd(&dir)
        .args(["preview", "p1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "klee --libc=klee --silent-klee-assume --warnings-only-to-file p1.bc",
        ));
}

#[test]
fn test_preview_with_custom_flags() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    verify_cmd(&dir)
        .args(["preview", "p1", "--flags", " --max-time=60 "])
        .assert()
        .success()
        .stdout(predicate::str::contains("klee --libc=klee --max-time=60 p1.bc"));
}

#[test]
fn test_run_missing_source_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    verify_cmd(&dir)
        .args(["run", "missing.c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn test_run_with_missing_config_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("main.c"), "int main() {}").expect("write source");

    verify_cmd(&dir)
        .args(["--config", "absent.toml", "run", "main.c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_completes_both_stages() {
    let server = support::successful_backend().await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("main.c"), "int main() { return 0; }").expect("write source");
    let config = write_config(&dir, &server);

    let mut cmd = verify_cmd(&dir);
    cmd.arg("--config")
        .arg(&config)
        .args(["run", "main.c", "--timeout", "10"]);
    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .expect("verify did not panic");

    assert
        .success()
        .stdout(predicate::str::contains(format!("project {}", PROJECT_ID)))
        .stdout(predicate::str::contains("Symbolic execution report"))
        .stdout(predicate::str::contains("KLEE: done: generated tests = 4"))
        .stdout(predicate::str::contains(format!(
            "klee --libc=klee --silent-klee-assume --warnings-only-to-file {}.bc",
            PROJECT_ID
        )));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_reports_failed_stage() {
    let server = MockServer::start().await;
    support::mount_starts(&server).await;
    support::mount_progress(&server, "llvm-bitcode-generation", 0).await;
    support::mount_report(&server, "llvm-bitcode-generation", "FAILED: clang -emit-llvm").await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("main.c"), "int main() {").expect("write source");
    let config = write_config(&dir, &server);

    let mut cmd = verify_cmd(&dir);
    cmd.arg("--config")
        .arg(&config)
        .args(["run", "main.c", "--timeout", "10"]);
    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .expect("verify did not panic");

    assert
        .failure()
        .stdout(predicate::str::contains("LLVM bitcode generation report"))
        .stdout(predicate::str::contains("FAILED: clang -emit-llvm"));
}

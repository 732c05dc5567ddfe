//! Integration tests for the verification runtime.
//!
//! The pipeline runs against a wiremock backend over real HTTP, and the
//! `verify` binary is exercised end to end.

mod cli;
mod http_pipeline;
mod support;

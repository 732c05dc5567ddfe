//! Backend route table.

use reqwest::{Method, Url};

use crate::error::{ClientError, ClientResult};
use crate::pipeline::stage::{JobStage, PollingTarget, Resource};

/// A resolved backend endpoint: method plus path segments relative to the
/// base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    segments: Vec<String>,
}

impl Route {
    fn get(segments: Vec<String>) -> Self {
        Self {
            method: Method::GET,
            segments,
        }
    }

    fn post(segments: Vec<String>) -> Self {
        Self {
            method: Method::POST,
            segments,
        }
    }

    /// Unencoded path, for logs and tests.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Absolute URL for this route under `base_url`.
    ///
    /// Each segment is percent-encoded, so a project id can never change
    /// which route is hit.
    pub fn url(&self, base_url: &str) -> ClientResult<Url> {
        let mut url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(base_url.to_string()))?
            .pop_if_empty()
            .extend(&self.segments);
        Ok(url)
    }
}

fn stage_segment(stage: JobStage) -> String {
    match stage {
        JobStage::BitcodeGeneration => "llvm-bitcode-generation".to_string(),
        JobStage::SymbolicExecution => "symbolic-execution".to_string(),
    }
}

/// `POST /source`
pub fn upload_source() -> Route {
    Route::post(vec!["source".to_string()])
}

/// `POST /<stage>/{id}`
pub fn start(stage: JobStage, project_id: &str) -> Route {
    Route::post(vec![stage_segment(stage), project_id.to_string()])
}

/// `GET /<stage>/{id}/progress` or `GET /<stage>/{id}/report`
pub fn poll(target: PollingTarget, project_id: &str) -> Route {
    let resource = match target.resource() {
        Resource::Progress => "progress",
        Resource::Report => "report",
    };
    Route::get(vec![
        stage_segment(target.stage()),
        project_id.to_string(),
        resource.to_string(),
    ])
}

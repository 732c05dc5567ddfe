//! HTTP implementation of the Remote Job Client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{redirect, Client};
use serde_json::{json, Value};
use tracing::debug;

use super::routes::{self, Route};
use super::{PollResponse, RemoteJobClient, StartResponse, UploadResponse};
use crate::config::ApiConfig;
use crate::error::{ClientError, ClientResult};
use crate::pipeline::stage::{JobStage, PollingTarget};

/// Talks JSON to the verification backend.
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    base_url: String,
    http_client: Client,
}

impl HttpJobClient {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = Client::builder()
            .default_headers(headers)
            .redirect(redirect::Policy::limited(1))
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            http_client,
        })
    }

    /// Create a client from the resolved API settings.
    pub fn from_config(config: &ApiConfig) -> ClientResult<Self> {
        Self::new(config.base_url())
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, route: Route, body: Option<Value>) -> ClientResult<Value> {
        let url = route.url(&self.base_url)?;
        debug!(method = %route.method, %url, "Sending backend request");

        let mut request = self.http_client.request(route.method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl RemoteJobClient for HttpJobClient {
    async fn upload_source(&self, source: &str) -> ClientResult<UploadResponse> {
        let body = self
            .send(routes::upload_source(), Some(json!({ "source": source })))
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn start(
        &self,
        stage: JobStage,
        project_id: &str,
        flags: Option<&str>,
    ) -> ClientResult<StartResponse> {
        let body = match stage {
            JobStage::BitcodeGeneration => None,
            JobStage::SymbolicExecution => Some(json!({ "flags": flags.unwrap_or_default() })),
        };
        let response = self.send(routes::start(stage, project_id), body).await?;
        Ok(serde_json::from_value(response)?)
    }

    async fn poll(&self, project_id: &str, target: PollingTarget) -> ClientResult<PollResponse> {
        let body = self.send(routes::poll(target, project_id), None).await?;
        PollResponse::from_body(target, body)
    }
}

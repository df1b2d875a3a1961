//! `reqwest`-based client for the multi-agent backend.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{BackendFuture, LogSnapshot, StartRequest, StatusSnapshot, WorkflowBackend};
use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// HTTP implementation of [`WorkflowBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    start_timeout: Duration,
    request_timeout: Duration,
}

impl HttpBackend {
    /// Build a client for `base_url` with explicit timeouts.
    #[must_use]
    pub fn new(base_url: &str, start_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            start_timeout,
            request_timeout,
        }
    }

    /// Build a client from the `[backend]` configuration section.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            &config.backend.base_url,
            config.start_timeout(),
            config.request_timeout(),
        )
    }

    /// Base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn workflow_url(&self, workflow_id: &str, tail: &str) -> String {
        format!("{}/api/workflow/{workflow_id}/{tail}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| AppError::Poll(format!("request to {url} failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Poll(format!("{url} returned {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| AppError::Poll(format!("invalid response from {url}: {err}")))
    }

    async fn post_start(&self, request: &StartRequest) -> Result<String> {
        let url = format!("{}/api/workflow/start", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.start_timeout)
            .json(request)
            .send()
            .await
            .map_err(|err| AppError::RemoteUnavailable(format!("start request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::RemoteUnavailable(format!(
                "start request returned {status}"
            )));
        }

        let body: super::StartResponse = response.json().await.map_err(|err| {
            AppError::RemoteUnavailable(format!("invalid start response: {err}"))
        })?;

        match body.workflow_id {
            Some(id) if body.success && !id.is_empty() => {
                debug!(workflow_id = %id, "remote workflow created");
                Ok(id)
            }
            _ => Err(AppError::RemoteUnavailable(
                body.message
                    .unwrap_or_else(|| "backend rejected the workflow".into()),
            )),
        }
    }

    async fn fetch_report(&self, workflow_id: &str) -> Result<Bytes> {
        let url = self.workflow_url(workflow_id, "report/download");
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| AppError::ReportDownload(err.to_string()))?;

        if response.status() == StatusCode::OK {
            return response
                .bytes()
                .await
                .map_err(|err| AppError::ReportDownload(err.to_string()));
        }

        let body = response
            .text()
            .await
            .map_err(|err| AppError::ReportDownload(err.to_string()))?;
        Err(AppError::ReportDownload(body))
    }
}

impl WorkflowBackend for HttpBackend {
    fn start_workflow<'a>(&'a self, request: &'a StartRequest) -> BackendFuture<'a, String> {
        Box::pin(self.post_start(request))
    }

    fn status<'a>(&'a self, workflow_id: &'a str) -> BackendFuture<'a, StatusSnapshot> {
        Box::pin(self.get_json(self.workflow_url(workflow_id, "status")))
    }

    fn logs<'a>(&'a self, workflow_id: &'a str) -> BackendFuture<'a, LogSnapshot> {
        Box::pin(self.get_json(self.workflow_url(workflow_id, "logs")))
    }

    fn download_report<'a>(&'a self, workflow_id: &'a str) -> BackendFuture<'a, Bytes> {
        Box::pin(self.fetch_report(workflow_id))
    }
}

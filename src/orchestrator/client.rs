use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::dto::{CheckRequest, CheckResponse, ErrorBody, format_instant};
use crate::model::*;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("conflict API unreachable: {0}")]
    Unavailable(String),
    #[error("conflict API timed out after {0:?}")]
    Timeout(Duration),
    #[error("conflict API rejected the query ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed conflict API response: {0}")]
    Decode(String),
}

impl CheckError {
    /// Transport-level failures send the caller into degraded mode;
    /// a rejected query is the caller's own bug and is surfaced.
    pub fn triggers_fallback(&self) -> bool {
        !matches!(self, CheckError::Rejected { .. })
    }
}

/// Anything that can answer a conflict query for the orchestrator.
#[async_trait]
pub trait ConflictChecker: Send + Sync {
    async fn check(&self, query: &ConflictQuery) -> Result<ConflictReport, CheckError>;
}

#[async_trait]
impl<T: ConflictChecker + ?Sized> ConflictChecker for Arc<T> {
    async fn check(&self, query: &ConflictQuery) -> Result<ConflictReport, CheckError> {
        (**self).check(query).await
    }
}

/// HTTP client for the Conflict API with a bounded per-call timeout.
#[derive(Clone)]
pub struct ConflictClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ConflictClient {
    /// # Arguments
    /// * `base_url` - e.g. "http://127.0.0.1:8085"
    /// * `timeout` - bound on the whole call, connect included
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CheckError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| CheckError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> CheckError {
        if e.is_timeout() {
            CheckError::Timeout(self.timeout)
        } else if e.is_decode() {
            CheckError::Decode(e.to_string())
        } else {
            CheckError::Unavailable(e.to_string())
        }
    }

    async fn error_from_response(response: reqwest::Response) -> CheckError {
        let status = response.status();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
        };
        if status.is_server_error() {
            CheckError::Unavailable(format!("{}: {message}", status.as_u16()))
        } else {
            CheckError::Rejected {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl ConflictChecker for ConflictClient {
    async fn check(&self, query: &ConflictQuery) -> Result<ConflictReport, CheckError> {
        let body = CheckRequest {
            resource_ids: query.resource_ids.clone(),
            start_time: format_instant(query.span.start),
            end_time: format_instant(query.span.end),
            exclude_entry_id: query.exclude_entry_id,
        };
        let response = self
            .http
            .post(format!("{}/conflicts/check", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let parsed: CheckResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        let report = ConflictReport {
            conflicts: parsed.conflicts.into_iter().map(ConflictResult::from).collect(),
        };
        if report.has_conflicts() != parsed.has_conflicts {
            return Err(CheckError::Decode("has_conflicts disagrees with conflicts list".into()));
        }
        Ok(report)
    }
}

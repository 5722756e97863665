//! Job-tracking API client.

use std::time::Duration;

use async_trait::async_trait;
use pivot_models::StatusUpdate;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{StatusError, StatusResult};

const API_KEY_HEADER: &str = "x-worker-api-key";

/// Longest response body kept in a rejection error.
const MAX_ERROR_BODY: usize = 512;

// =============================================================================
// Configuration
// =============================================================================

/// Status API configuration.
#[derive(Debug, Clone)]
pub struct StatusConfig {
    /// API base URL, e.g. `http://localhost:4000/api` (no trailing slash)
    pub base_url: String,
    /// Shared secret sent as `x-worker-api-key`
    pub api_key: String,
    /// Request timeout
    pub timeout: Duration,
}

impl StatusConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create config from environment variables.
    pub fn from_env() -> StatusResult<Self> {
        let api_key = std::env::var("WORKER_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(StatusError::config("WORKER_API_KEY not configured"));
        }

        let base_url = std::env::var("API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:4000/api".to_string());
        let timeout_secs: u64 = std::env::var("STATUS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        Ok(Self::new(base_url, api_key).with_timeout(Duration::from_secs(timeout_secs)))
    }
}

// =============================================================================
// Reporter
// =============================================================================

/// Sink for job lifecycle transitions.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, job_id: &str, update: &StatusUpdate) -> StatusResult<()>;
}

/// HTTP status reporter.
#[derive(Debug, Clone)]
pub struct StatusClient {
    http: Client,
    config: StatusConfig,
}

impl StatusClient {
    pub fn new(config: StatusConfig) -> StatusResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(StatusError::config("WORKER_API_KEY not configured"));
        }
        if config.base_url.trim().is_empty() {
            return Err(StatusError::config("API_BASE_URL is empty"));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("pivot-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StatusResult<Self> {
        Self::new(StatusConfig::from_env()?)
    }

    /// Endpoint for one job.
    pub fn status_url(&self, job_id: &str) -> String {
        format!(
            "{}/jobs/internal/{}/status",
            self.config.base_url,
            urlencoding::encode(job_id)
        )
    }
}

#[async_trait]
impl StatusReporter for StatusClient {
    async fn report(&self, job_id: &str, update: &StatusUpdate) -> StatusResult<()> {
        let url = self.status_url(job_id);
        debug!("Reporting {} for job {} to {}", update.status, job_id, url);

        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(update)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Status {} accepted for job {}", update.status, job_id);
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        warn!(
            "Status API rejected {} for job {}: {} {}",
            update.status,
            job_id,
            status.as_u16(),
            body
        );
        Err(StatusError::rejected(status.as_u16(), body))
    }
}

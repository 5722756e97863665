//! Job lifecycle status and the status update body sent to the tracking API.
//!
//! The lifecycle is `QUEUED -> PROCESSING -> {COMPLETED | FAILED}`. QUEUED is
//! implicit (set by the producer) and never reported by the worker.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Job processing status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting in the queue
    #[default]
    Queued,
    /// Picked up by a worker
    Processing,
    /// Output uploaded
    Completed,
    /// Failed with an error message
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    ///
    /// FAILED is reachable straight from QUEUED so that routing failures
    /// can be reported without a PROCESSING report.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Uploaded output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputDescriptor {
    pub key: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl OutputDescriptor {
    pub fn new(key: impl Into<String>, mime_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            key: key.into(),
            mime_type: mime_type.into(),
            size_bytes,
        }
    }
}

/// Body of `POST {base}/jobs/internal/{jobId}/status`.
///
/// Built only through the constructors so that `output` is present iff the
/// status is COMPLETED and `error` only accompanies FAILED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

impl StatusUpdate {
    pub fn processing() -> Self {
        Self {
            status: JobStatus::Processing,
            error: None,
            output: None,
            worker_id: None,
        }
    }

    pub fn completed(output: OutputDescriptor) -> Self {
        Self {
            status: JobStatus::Completed,
            error: None,
            output: Some(output),
            worker_id: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(error.into()),
            output: None,
            worker_id: None,
        }
    }

    /// Attach the reporting worker's id (ignored when blank).
    pub fn with_worker_id(mut self, worker_id: Option<&str>) -> Self {
        self.worker_id = worker_id
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string);
        self
    }
}

/// Result of a successful pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub output_key: String,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn completed(job_id: impl Into<String>, output_key: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Completed,
            output_key: output_key.into(),
            finished_at: Utc::now(),
        }
    }
}

/// A status transition that would break monotonicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Tracks the statuses reported during one pipeline execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusLifecycle {
    current: JobStatus,
}

impl StatusLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> JobStatus {
        self.current
    }

    /// Check that `next` may be reported without recording it.
    pub fn check(&self, next: JobStatus) -> Result<(), InvalidTransition> {
        if self.current.can_transition_to(next) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.current,
                to: next,
            })
        }
    }

    /// Record `next` after it has been reported.
    pub fn advance(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        self.check(next)?;
        self.current = next;
        Ok(())
    }
}

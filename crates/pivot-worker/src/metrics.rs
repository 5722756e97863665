//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use pivot_models::Feature;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    // Pipeline metrics
    pub const JOBS_COMPLETED_TOTAL: &str = "imagepivot_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "imagepivot_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "imagepivot_job_duration_seconds";

    // Listener metrics
    pub const LISTENER_DECODE_FAILURES_TOTAL: &str = "imagepivot_listener_decode_failures_total";
    pub const TASKS_DISPATCHED_TOTAL: &str = "imagepivot_tasks_dispatched_total";
    pub const DISPATCH_FAILURES_TOTAL: &str = "imagepivot_dispatch_failures_total";

    // Executor metrics
    pub const TASKS_FAILED_TOTAL: &str = "imagepivot_tasks_failed_total";
    pub const TASKS_CLAIMED_TOTAL: &str = "imagepivot_tasks_claimed_total";

    /// Feature label for slugs outside the catalogue
    pub const UNKNOWN_FEATURE: &str = "unknown";
}

/// Bounded `feature` label for a producer-supplied slug.
pub fn feature_label(slug: &str) -> &'static str {
    Feature::from_slug(slug.trim())
        .map(|f| f.slug())
        .unwrap_or(names::UNKNOWN_FEATURE)
}

/// Install the Prometheus exporter when `addr` is set (e.g. `0.0.0.0:9100`).
///
/// Without an address the `metrics` macros record into the no-op recorder.
pub fn init_metrics(addr: Option<&str>) -> WorkerResult<()> {
    let Some(addr) = addr.map(str::trim).filter(|a| !a.is_empty()) else {
        return Ok(());
    };

    let socket: SocketAddr = addr
        .parse()
        .map_err(|e| WorkerError::config_error(format!("Invalid METRICS_ADDR {}: {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(socket)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install metrics exporter: {}", e)))?;

    info!("Prometheus metrics exposed on {}", socket);
    Ok(())
}

/// Record a completed job.
pub fn record_job_completed(feature: &str, duration_secs: f64) {
    let labels = [("feature", feature.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a failed job.
pub fn record_job_failed(feature: &str, kind: &str, duration_secs: f64) {
    let labels = [("feature", feature.to_string()), ("kind", kind.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
    let duration_labels = [("feature", feature.to_string())];
    histogram!(names::JOB_DURATION_SECONDS, &duration_labels).record(duration_secs);
}

pub fn record_decode_failure() {
    counter!(names::LISTENER_DECODE_FAILURES_TOTAL).increment(1);
}

pub fn record_dispatch() {
    counter!(names::TASKS_DISPATCHED_TOTAL).increment(1);
}

pub fn record_dispatch_failure() {
    counter!(names::DISPATCH_FAILURES_TOTAL).increment(1);
}

pub fn record_task_failed(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::TASKS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_tasks_claimed(count: usize) {
    counter!(names::TASKS_CLAIMED_TOTAL).increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_without_address_is_noop() {
        assert!(init_metrics(None).is_ok());
        assert!(init_metrics(Some("  ")).is_ok());
    }

    #[test]
    fn test_feature_label_is_bounded() {
        assert_eq!(feature_label("audio.trim"), "audio.trim");
        assert_eq!(feature_label(" image.resize "), "image.resize");
        assert_eq!(feature_label("image.rotate"), names::UNKNOWN_FEATURE);
        assert_eq!(feature_label("x".repeat(64).as_str()), names::UNKNOWN_FEATURE);
    }

    #[test]
    fn test_invalid_address_is_config_error() {
        let err = init_metrics(Some("not-an-address")).unwrap_err();
        assert!(err.to_string().starts_with("Configuration error: Invalid METRICS_ADDR"));
    }
}

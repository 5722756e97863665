//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use pivot_models::JobEnvelope;
use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Job logger for structured logging with consistent formatting.
///
/// Every line carries the job id, feature slug and organization, so one
/// pipeline execution can be followed across concurrently running jobs.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    feature: String,
    org_id: String,
}

impl JobLogger {
    /// Create a logger for one envelope.
    pub fn new(envelope: &JobEnvelope) -> Self {
        Self {
            job_id: envelope.job_id.trim().to_string(),
            feature: envelope.feature_slug.trim().to_string(),
            org_id: envelope.org_id.trim().to_string(),
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            feature = %self.feature,
            org_id = %self.org_id,
            "Job started: {}", message
        );
    }

    /// Log a pipeline step.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            feature = %self.feature,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            feature = %self.feature,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            feature = %self.feature,
            org_id = %self.org_id,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            feature = %self.feature,
            org_id = %self.org_id,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            feature = %self.feature,
            org_id = %self.org_id
        )
    }
}

/// Install the global subscriber: JSON when `LOG_FORMAT=json`, ANSI text otherwise.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,pivot=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pivot_models::InputRef;

    #[test]
    fn test_job_logger_fields() {
        let envelope = JobEnvelope::new(" j1 ", "o1", "AUDIO", "audio.trim", InputRef::new("in/a.mp3"));
        let logger = JobLogger::new(&envelope);

        assert_eq!(logger.job_id(), "j1");
        assert_eq!(logger.feature(), "audio.trim");
    }

    #[test]
    fn test_logging_without_subscriber() {
        let logger = JobLogger::new(&JobEnvelope::default());
        let _span = logger.create_span();
        logger.log_start("start");
        logger.log_progress("progress");
        logger.log_warning("warning");
        logger.log_error("error");
        logger.log_completion("done");
    }
}

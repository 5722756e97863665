//! The job pipeline every feature runs through.
//!
//! 1. validate the envelope (no status report on failure)
//! 2. route and decode parameters (FAILED on error, nothing else)
//! 3. report PROCESSING (errors propagate as is)
//! 4. stage the input, plus any auxiliary asset
//! 5. transform
//! 6. upload to `outputs/{org}/{job}/output{ext}`
//! 7. report COMPLETED
//!
//! Errors in steps 4-7 trigger a best-effort FAILED report and are then
//! returned unchanged. Temp files are removed on every path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use pivot_media::{MediaTransform, TransformRequest};
use pivot_models::{
    AudioFormat, FeatureParams, ImageFormat, JobEnvelope, JobOutcome, JobStatus, MediaType,
    SourceMedia, StatusLifecycle, StatusUpdate, DEFAULT_MIME_TYPE,
};
use pivot_status::StatusReporter;
use pivot_storage::BlobStore;
use tracing::{debug, Instrument};

use crate::error::{WorkerError, WorkerResult};
use crate::executor::TaskHandler;
use crate::logging::JobLogger;
use crate::metrics;
use crate::router::{FeatureRouter, RoutedJob};
use crate::stager::{FileRole, FileStager, JobScratch};

/// Composes routing, staging, the transform provider and status reporting.
pub struct JobPipeline {
    stager: FileStager,
    router: FeatureRouter,
    transform: Arc<dyn MediaTransform>,
    status: Arc<dyn StatusReporter>,
    worker_id: Option<String>,
}

impl JobPipeline {
    pub fn new(
        store: Arc<dyn BlobStore>,
        status: Arc<dyn StatusReporter>,
        transform: Arc<dyn MediaTransform>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stager: FileStager::new(store, scratch_dir),
            router: FeatureRouter::default(),
            transform,
            status,
            worker_id: None,
        }
    }

    /// Worker id attached to every status update.
    pub fn with_worker_id(mut self, worker_id: Option<String>) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn stager(&self) -> &FileStager {
        &self.stager
    }

    /// Execute one job end to end.
    pub async fn run(&self, envelope: &JobEnvelope) -> WorkerResult<JobOutcome> {
        envelope.validate()?;

        let logger = JobLogger::new(envelope);
        let span = logger.create_span();
        self.run_validated(envelope, &logger).instrument(span).await
    }

    async fn run_validated(
        &self,
        envelope: &JobEnvelope,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutcome> {
        let job_id = envelope.job_id.trim();
        let started = Instant::now();
        let mut lifecycle = StatusLifecycle::new();

        let routed = match self.router.resolve(envelope) {
            Ok(routed) => routed,
            Err(e) => {
                let err = WorkerError::from(e);
                logger.log_error(&err.to_string());
                self.report_failure(job_id, &mut lifecycle, &err, logger).await;
                metrics::record_job_failed(
                    metrics::feature_label(logger.feature()),
                    err.kind().as_str(),
                    started.elapsed().as_secs_f64(),
                );
                return Err(err);
            }
        };

        logger.log_start(&format!("{} via {}", envelope.input.key, self.transform.name()));
        self.report(job_id, &mut lifecycle, StatusUpdate::processing())
            .await?;

        let mut scratch = self.stager.scratch(job_id);
        let result = self
            .execute(envelope, &routed, &mut scratch, &mut lifecycle, logger)
            .await;

        let elapsed = started.elapsed().as_secs_f64();
        let outcome = match result {
            Ok(outcome) => {
                logger.log_completion(&outcome.output_key);
                metrics::record_job_completed(routed.feature.slug(), elapsed);
                Ok(outcome)
            }
            Err(err) => {
                logger.log_error(&err.to_string());
                self.report_failure(job_id, &mut lifecycle, &err, logger).await;
                metrics::record_job_failed(routed.feature.slug(), err.kind().as_str(), elapsed);
                Err(err)
            }
        };

        self.stager.cleanup(scratch.paths()).await;
        outcome
    }

    async fn execute(
        &self,
        envelope: &JobEnvelope,
        routed: &RoutedJob,
        scratch: &mut JobScratch,
        lifecycle: &mut StatusLifecycle,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutcome> {
        let job_id = envelope.job_id.trim();
        let org_id = envelope.org_id.trim();
        let input_key = envelope.input.key.trim();
        let media = routed.feature.media_type();
        let declared = envelope.input.declared_mime_type().map(str::to_string);
        let extension = envelope.input.extension();

        if let FeatureParams::ImageConvert(_) = &routed.params {
            let reported = match &declared {
                Some(_) => None,
                None => self.stager.store().head(input_key).await?.content_type,
            };
            let source = source_media(media, declared.clone(), reported, extension.clone());
            if routed.params.is_passthrough(&source) {
                logger.log_progress("input already in target format, copying");
                let target = routed.params.output_target(&source);
                let output = self
                    .stager
                    .copy(input_key, org_id, job_id, &target.mime_type, &target.extension)
                    .await?;
                let output_key = output.key.clone();
                self.report(job_id, lifecycle, StatusUpdate::completed(output))
                    .await?;
                return Ok(JobOutcome::completed(job_id, output_key));
            }
        }

        let input = self
            .stager
            .download(scratch, FileRole::Input, input_key)
            .await?;
        let source = source_media(media, declared, input.mime_hint.clone(), extension);
        debug!("Effective input type {}", source.mime_type);

        let auxiliary = match routed.params.auxiliary_key() {
            Some(key) => {
                logger.log_progress(&format!("staging auxiliary asset {}", key));
                Some(self.stager.download(scratch, FileRole::Cover, key).await?.path)
            }
            None => None,
        };

        let target = routed.params.output_target(&source);
        let output_path = scratch.path(FileRole::Output, Some(target.extension.as_str()));

        self.transform
            .apply(&TransformRequest {
                feature: routed.feature,
                params: routed.params.clone(),
                input: input.path,
                output: output_path.clone(),
                auxiliary,
            })
            .await?;
        logger.log_progress("transform finished, uploading");

        let output = self
            .stager
            .upload(&output_path, org_id, job_id, &target.mime_type, &target.extension)
            .await?;
        let output_key = output.key.clone();

        self.report(job_id, lifecycle, StatusUpdate::completed(output))
            .await?;
        Ok(JobOutcome::completed(job_id, output_key))
    }

    /// Report a transition; the lifecycle only advances once the API accepted it.
    async fn report(
        &self,
        job_id: &str,
        lifecycle: &mut StatusLifecycle,
        update: StatusUpdate,
    ) -> WorkerResult<()> {
        let next = update.status;
        lifecycle.check(next)?;
        let update = update.with_worker_id(self.worker_id.as_deref());
        self.status.report(job_id, &update).await?;
        lifecycle.advance(next)?;
        Ok(())
    }

    /// Best-effort FAILED report; problems are logged, never returned.
    async fn report_failure(
        &self,
        job_id: &str,
        lifecycle: &mut StatusLifecycle,
        err: &WorkerError,
        logger: &JobLogger,
    ) {
        let update = StatusUpdate::failed(err.to_string());
        if let Err(report_err) = self.report(job_id, lifecycle, update).await {
            logger.log_warning(&format!(
                "could not report {}: {}",
                JobStatus::Failed,
                report_err
            ));
        }
    }
}

/// Effective input type: declared, else store-reported, else by extension.
fn source_media(
    media: MediaType,
    declared: Option<String>,
    reported: Option<String>,
    extension: Option<String>,
) -> SourceMedia {
    let mime_type = declared
        .or(reported)
        .or_else(|| {
            let ext = extension.as_deref()?;
            match media {
                MediaType::Image => ImageFormat::from_extension(ext).map(|f| f.mime_type()),
                MediaType::Audio => AudioFormat::from_extension(ext).map(|f| f.mime_type()),
                MediaType::Video => None,
            }
        })
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
    SourceMedia::new(mime_type, extension)
}

#[async_trait]
impl TaskHandler for JobPipeline {
    async fn handle(&self, envelope: &JobEnvelope) -> WorkerResult<()> {
        self.run(envelope).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_media_precedence() {
        let source = source_media(
            MediaType::Image,
            Some("image/webp".into()),
            Some("image/png".into()),
            Some(".jpg".into()),
        );
        assert_eq!(source.mime_type, "image/webp");

        let source = source_media(MediaType::Image, None, Some("image/png".into()), Some(".jpg".into()));
        assert_eq!(source.mime_type, "image/png");

        let source = source_media(MediaType::Image, None, None, Some(".jpg".into()));
        assert_eq!(source.mime_type, "image/jpeg");

        let source = source_media(MediaType::Audio, None, None, None);
        assert_eq!(source.mime_type, DEFAULT_MIME_TYPE);
    }
}

//! In-memory collaborators for pipeline, executor and listener tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pivot_media::{MediaError, MediaResult, MediaTransform, TransformRequest};
use pivot_models::{InputRef, JobEnvelope, JobStatus, StatusUpdate};
use pivot_queue::{DeliveredTask, JobSource, QueueError, QueueResult, QueuedTask, TaskDispatcher, TaskQueue};
use pivot_status::{StatusError, StatusReporter, StatusResult};
use pivot_storage::{BlobStore, ObjectHead, StorageError, StorageResult};
use pivot_worker::{JobPipeline, TaskHandler, WorkerConfig, WorkerError, WorkerResult};

pub fn envelope(job_id: &str, media: &str, slug: &str, key: &str) -> JobEnvelope {
    JobEnvelope::new(job_id, "o1", media, slug, InputRef::new(key))
}

/// Files left in a scratch directory.
pub fn scratch_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// Blob store
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
    pub downloads: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<String>>,
    pub copies: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn with_object(self, key: &str, body: &[u8], content_type: Option<&str>) -> Self {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            (body.to_vec(), content_type.map(str::to_string)),
        );
        self
    }

    pub fn object(&self, key: &str) -> Option<(Vec<u8>, Option<String>)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn head(&self, key: &str) -> StorageResult<ObjectHead> {
        let (body, content_type) = self.object(key).ok_or_else(|| StorageError::not_found(key))?;
        Ok(ObjectHead {
            size_bytes: body.len() as u64,
            content_type,
        })
    }

    async fn download(&self, key: &str, path: &Path) -> StorageResult<()> {
        self.downloads.lock().unwrap().push(key.to_string());
        let (body, _) = self.object(key).ok_or_else(|| StorageError::not_found(key))?;
        tokio::fs::write(path, body).await?;
        Ok(())
    }

    async fn upload(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        let body = tokio::fs::read(path).await?;
        self.uploads.lock().unwrap().push(key.to_string());
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, Some(content_type.to_string())));
        Ok(())
    }

    async fn copy(&self, src_key: &str, dest_key: &str, content_type: &str) -> StorageResult<u64> {
        let (body, _) = self
            .object(src_key)
            .ok_or_else(|| StorageError::not_found(src_key))?;
        let size = body.len() as u64;
        self.copies
            .lock()
            .unwrap()
            .push((src_key.to_string(), dest_key.to_string()));
        self.objects
            .lock()
            .unwrap()
            .insert(dest_key.to_string(), (body, Some(content_type.to_string())));
        Ok(size)
    }
}

// =============================================================================
// Status reporter
// =============================================================================

#[derive(Default)]
pub struct RecordingReporter {
    pub updates: Mutex<Vec<(String, StatusUpdate)>>,
    /// Reject every update with this status
    reject: Option<JobStatus>,
}

impl RecordingReporter {
    pub fn rejecting(status: JobStatus) -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            reject: Some(status),
        }
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .map(|(_, u)| u.status)
            .collect()
    }

    pub fn last(&self) -> Option<StatusUpdate> {
        self.updates.lock().unwrap().last().map(|(_, u)| u.clone())
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report(&self, job_id: &str, update: &StatusUpdate) -> StatusResult<()> {
        if self.reject == Some(update.status) {
            return Err(StatusError::rejected(503, "status API unavailable"));
        }
        self.updates
            .lock()
            .unwrap()
            .push((job_id.to_string(), update.clone()));
        Ok(())
    }
}

// =============================================================================
// Media transform
// =============================================================================

#[derive(Default)]
pub struct FakeTransform {
    pub requests: Mutex<Vec<TransformRequest>>,
    failure: Option<String>,
}

impl FakeTransform {
    pub fn failing(message: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failure: Some(message.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaTransform for FakeTransform {
    fn name(&self) -> &str {
        "fake"
    }

    async fn apply(&self, request: &TransformRequest) -> MediaResult<()> {
        self.requests.lock().unwrap().push(request.clone());
        if !request.input.exists() {
            return Err(MediaError::FileNotFound(request.input.clone()));
        }
        if let Some(message) = &self.failure {
            return Err(MediaError::ffmpeg_failed(message.clone(), None, Some(1)));
        }
        tokio::fs::write(&request.output, b"transformed").await?;
        Ok(())
    }
}

pub struct Harness {
    pub pipeline: JobPipeline,
    pub store: Arc<MemoryStore>,
    pub reporter: Arc<RecordingReporter>,
    pub transform: Arc<FakeTransform>,
    pub scratch: tempfile::TempDir,
}

impl Harness {
    pub fn new(store: MemoryStore) -> Self {
        Self::with(store, RecordingReporter::default(), FakeTransform::default())
    }

    pub fn with(store: MemoryStore, reporter: RecordingReporter, transform: FakeTransform) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let store = Arc::new(store);
        let reporter = Arc::new(reporter);
        let transform = Arc::new(transform);
        let pipeline = JobPipeline::new(
            store.clone(),
            reporter.clone(),
            transform.clone(),
            scratch.path(),
        )
        .with_worker_id(Some("w-test".to_string()));

        Self {
            pipeline,
            store,
            reporter,
            transform,
            scratch,
        }
    }

    pub fn scratch_is_empty(&self) -> bool {
        scratch_files(self.scratch.path()).is_empty()
    }
}

// =============================================================================
// Queue side
// =============================================================================

pub fn delivered(message_id: &str, envelope: JobEnvelope) -> DeliveredTask {
    DeliveredTask {
        message_id: message_id.to_string(),
        task: QueuedTask::new(envelope),
    }
}

#[derive(Default)]
pub struct FakeTaskQueue {
    pub pending: Mutex<VecDeque<DeliveredTask>>,
    pub claimable: Mutex<Vec<DeliveredTask>>,
    pub acked: Mutex<Vec<String>>,
    pub failed: Mutex<Vec<(String, String)>>,
    pub largest_request: AtomicUsize,
}

impl FakeTaskQueue {
    pub fn with_tasks(tasks: Vec<DeliveredTask>) -> Self {
        let queue = Self::default();
        queue.pending.lock().unwrap().extend(tasks);
        queue
    }

    pub fn settled(&self) -> usize {
        self.acked.lock().unwrap().len() + self.failed.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskQueue for FakeTaskQueue {
    async fn consume(
        &self,
        _consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<DeliveredTask>> {
        self.largest_request.fetch_max(count, Ordering::SeqCst);
        let batch: Vec<DeliveredTask> = {
            let mut pending = self.pending.lock().unwrap();
            let n = count.min(pending.len());
            pending.drain(..n).collect()
        };
        if batch.is_empty() {
            tokio::time::sleep(block).await;
        }
        Ok(batch)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        self.acked.lock().unwrap().push(message_id.to_string());
        Ok(())
    }

    async fn fail(&self, delivered: &DeliveredTask, error: &str) -> QueueResult<()> {
        self.failed
            .lock()
            .unwrap()
            .push((delivered.message_id.clone(), error.to_string()));
        Ok(())
    }

    async fn claim_pending(
        &self,
        _consumer: &str,
        _min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<DeliveredTask>> {
        let mut claimable = self.claimable.lock().unwrap();
        let n = count.min(claimable.len());
        Ok(claimable.drain(..n).collect())
    }
}

/// Fails jobs named `bad`; tracks how many run at once.
#[derive(Default)]
pub struct FakeHandler {
    pub delay: Duration,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub started: AtomicUsize,
}

impl FakeHandler {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl TaskHandler for FakeHandler {
    async fn handle(&self, envelope: &JobEnvelope) -> WorkerResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if envelope.job_id == "bad" {
            Err(WorkerError::from(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status: Invalid data found when processing input",
                None,
                Some(1),
            )))
        } else {
            Ok(())
        }
    }
}

pub fn pool_config(concurrency: usize) -> WorkerConfig {
    WorkerConfig {
        concurrency,
        pop_timeout: Duration::from_millis(20),
        backoff: Duration::from_millis(10),
        consume_block: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(5),
        claim_interval: Duration::from_secs(3600),
        ..WorkerConfig::default()
    }
}

/// Scripted job list: `None` entries are empty waits.
#[derive(Default)]
pub struct ScriptedSource {
    pub items: Mutex<VecDeque<Option<String>>>,
    pub pops: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(items: Vec<Option<&str>>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().map(|i| i.map(str::to_string)).collect()),
            pops: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobSource for ScriptedSource {
    async fn pop(&self, wait: Duration) -> QueueResult<Option<String>> {
        self.pops.fetch_add(1, Ordering::SeqCst);
        let next = self.items.lock().unwrap().pop_front().flatten();
        if next.is_none() {
            tokio::time::sleep(wait).await;
        }
        Ok(next)
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub dispatched: Mutex<Vec<JobEnvelope>>,
    pub unavailable: bool,
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn dispatch(&self, envelope: &JobEnvelope) -> QueueResult<String> {
        if self.unavailable {
            return Err(QueueError::dispatch_failed("broker unavailable"));
        }
        let mut dispatched = self.dispatched.lock().unwrap();
        dispatched.push(envelope.clone());
        Ok(format!("{}-0", dispatched.len()))
    }
}

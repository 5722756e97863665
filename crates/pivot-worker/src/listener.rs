//! Queue listener: blocking pop from the job list, hand-off to the task broker.

use std::sync::Arc;
use std::time::Duration;

use pivot_models::JobEnvelope;
use pivot_queue::{JobSource, TaskDispatcher};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::metrics;
use crate::shutdown;

/// What one listener iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerStep {
    /// The wait elapsed without an item
    Idle,
    /// The item was not a decodable envelope and was discarded
    Dropped,
    /// The envelope was handed off under this broker message id
    Dispatched(String),
}

/// Moves envelopes from the durable job list onto the task broker.
pub struct QueueListener {
    source: Arc<dyn JobSource>,
    dispatcher: Arc<dyn TaskDispatcher>,
    pop_timeout: Duration,
    backoff: Duration,
}

impl QueueListener {
    pub fn new(
        config: &WorkerConfig,
        source: Arc<dyn JobSource>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        Self {
            source,
            dispatcher,
            pop_timeout: config.pop_timeout,
            backoff: config.backoff,
        }
    }

    /// Loop until shutdown is requested; the signal is checked between waits.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> WorkerResult<()> {
        info!("Queue listener started (pop timeout {:?})", self.pop_timeout);

        while !shutdown::is_requested(&shutdown_rx) {
            if let Err(e) = self.poll_once().await {
                error!("Queue listener error: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(self.backoff) => {}
                    _ = shutdown::requested(&mut shutdown_rx) => break,
                }
            }
        }

        info!("Queue listener stopped");
        Ok(())
    }

    /// One bounded wait on the job list.
    ///
    /// A dispatch failure is returned after the item has already left the
    /// job list; that item is not re-enqueued.
    pub async fn poll_once(&self) -> WorkerResult<ListenerStep> {
        let Some(raw) = self.source.pop(self.pop_timeout).await? else {
            return Ok(ListenerStep::Idle);
        };

        let envelope = match JobEnvelope::from_json(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping undecodable queue item: {} ({} bytes)", e, raw.len());
                metrics::record_decode_failure();
                return Ok(ListenerStep::Dropped);
            }
        };

        let job_id = envelope.known_job_id().unwrap_or("unknown").to_string();
        match self.dispatcher.dispatch(&envelope).await {
            Ok(message_id) => {
                debug!("Dispatched job {} as {}", job_id, message_id);
                metrics::record_dispatch();
                Ok(ListenerStep::Dispatched(message_id))
            }
            Err(e) => {
                error!(job_id = %job_id, "Hand-off failed, job not dispatched");
                metrics::record_dispatch_failure();
                Err(e.into())
            }
        }
    }
}

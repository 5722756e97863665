//! Task broker using Redis Streams.
//!
//! The listener dispatches with `XADD`; executor pools read through a
//! consumer group and acknowledge only after the handler returns. Entries a
//! dead consumer left pending are reclaimed once idle long enough.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pivot_models::JobEnvelope;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::task::{DeliveredTask, QueuedTask};

const TASK_FIELD: &str = "task";

/// Hands decoded envelopes to the executor pool.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Returns the broker message id.
    async fn dispatch(&self, envelope: &JobEnvelope) -> QueueResult<String>;
}

/// Executor-side view of the broker.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Read up to `count` new tasks, blocking for at most `block`.
    async fn consume(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<DeliveredTask>>;

    /// Acknowledge a handled task.
    async fn ack(&self, message_id: &str) -> QueueResult<()>;

    /// Record a task whose handler failed, then acknowledge it.
    async fn fail(&self, delivered: &DeliveredTask, error: &str) -> QueueResult<()>;

    /// Take over tasks another consumer left pending for at least `min_idle`.
    ///
    /// Entries already owned by `consumer` are never returned.
    async fn claim_pending(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<DeliveredTask>>;
}

/// Redis Streams implementation of both broker sides.
pub struct RedisTaskBroker {
    /// Connection for `XREADGROUP ... BLOCK`; kept apart so acks are not
    /// queued behind a blocking read.
    reader: MultiplexedConnection,
    conn: MultiplexedConnection,
    config: QueueConfig,
}

impl RedisTaskBroker {
    /// Connect to Redis.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let reader = client.get_multiplexed_async_connection().await?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            reader,
            conn,
            config,
        })
    }

    /// Initialize the stream (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.task_stream)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Get task stream length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("XLEN")
            .arg(&self.config.task_stream)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    /// Get failed-task stream length.
    pub async fn failed_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("XLEN")
            .arg(&self.config.failed_stream)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    /// Decode stream entries; malformed ones are acked and dropped.
    async fn decode_entries(&self, entries: Vec<StreamId>) -> Vec<DeliveredTask> {
        let mut tasks = Vec::with_capacity(entries.len());

        for entry in entries {
            let message_id = entry.id.clone();
            match decode_entry(&entry) {
                Ok(task) => {
                    debug!("Received task {} for job {}", task.task_id, task.job_id());
                    tasks.push(DeliveredTask { message_id, task });
                }
                Err(e) => {
                    warn!("Dropping malformed task {}: {}", message_id, e);
                    if let Err(ack_err) = self.ack(&message_id).await {
                        warn!("Failed to ack malformed task {}: {}", message_id, ack_err);
                    }
                }
            }
        }

        tasks
    }
}

fn decode_entry(entry: &StreamId) -> QueueResult<QueuedTask> {
    match entry.map.get(TASK_FIELD) {
        Some(redis::Value::BulkString(payload)) => {
            Ok(serde_json::from_slice::<QueuedTask>(payload)?)
        }
        Some(redis::Value::SimpleString(payload)) => {
            Ok(serde_json::from_str::<QueuedTask>(payload)?)
        }
        _ => Err(QueueError::dequeue_failed("missing task field")),
    }
}

#[async_trait]
impl TaskDispatcher for RedisTaskBroker {
    async fn dispatch(&self, envelope: &JobEnvelope) -> QueueResult<String> {
        let mut conn = self.conn.clone();
        let task = QueuedTask::new(envelope.clone());
        let payload = serde_json::to_string(&task)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.task_stream)
            .arg("*")
            .arg(TASK_FIELD)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::dispatch_failed(e.to_string()))?;

        debug!(
            "Dispatched task {} for job {} as {}",
            task.task_id,
            task.job_id(),
            message_id
        );
        Ok(message_id)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskBroker {
    async fn consume(
        &self,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<DeliveredTask>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.reader.clone();

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.task_stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();

        Ok(self.decode_entries(entries).await)
    }

    async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();

        redis::cmd("XACK")
            .arg(&self.config.task_stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.task_stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged task: {}", message_id);
        Ok(())
    }

    async fn fail(&self, delivered: &DeliveredTask, error: &str) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&delivered.task)?;

        redis::cmd("XADD")
            .arg(&self.config.failed_stream)
            .arg("*")
            .arg(TASK_FIELD)
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivered.message_id)
            .arg("failed_at")
            .arg(Utc::now().to_rfc3339())
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(&delivered.message_id).await?;

        warn!(
            "Recorded failed task {} for job {}: {}",
            delivered.task.task_id,
            delivered.task.job_id(),
            error
        );
        Ok(())
    }

    async fn claim_pending(
        &self,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<DeliveredTask>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.task_stream)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        // Entries this consumer owns are still running here.
        let ids: Vec<&str> = pending
            .ids
            .iter()
            .filter(|p| p.consumer != consumer)
            .map(|p| p.id.as_str())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.task_stream)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg(&ids)
            .query_async(&mut conn)
            .await?;

        let tasks = self.decode_entries(claimed.ids).await;
        for delivered in &tasks {
            info!(
                "Claimed stale task {} for job {}",
                delivered.task.task_id,
                delivered.task.job_id()
            );
        }
        Ok(tasks)
    }
}

//! Durable job list the producer pushes envelopes onto.
//!
//! Items are raw UTF-8 JSON strings. Popping removes the item from Redis, so
//! whatever the caller does next is the only copy.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::error::QueueResult;

/// Source of raw job payloads.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Block for up to `wait` for the next payload. `Ok(None)` on timeout.
    async fn pop(&self, wait: Duration) -> QueueResult<Option<String>>;
}

/// Redis list consumed with `BLPOP`.
pub struct JobQueue {
    conn: MultiplexedConnection,
    key: String,
}

impl JobQueue {
    /// Connect and verify the connection with a `PING`.
    pub async fn connect(config: &QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        info!("Connected to job list: {}", config.job_queue_key);

        Ok(Self {
            conn,
            key: config.job_queue_key.clone(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append a raw payload (producer side; FIFO with [`JobSource::pop`]).
    pub async fn push(&self, payload: &str) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("RPUSH")
            .arg(&self.key)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        debug!("Pushed payload onto {} (len={})", self.key, len);
        Ok(len)
    }

    /// Get list length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}

#[async_trait]
impl JobSource for JobQueue {
    async fn pop(&self, wait: Duration) -> QueueResult<Option<String>> {
        let mut conn = self.conn.clone();

        // BLPOP takes fractional seconds; 0 would block forever.
        let timeout = wait.as_secs_f64().max(0.1);
        let item: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(&self.key)
            .arg(timeout)
            .query_async(&mut conn)
            .await?;

        Ok(item.map(|(_key, raw)| raw))
    }
}

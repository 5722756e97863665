//! Task executor pool.
//!
//! Tasks are read from the broker only when a worker slot is free, so each
//! slot holds at most one in-flight task. A task is acknowledged after its
//! handler returns; a failed handler is recorded on the failed-task stream
//! and not retried here. Tasks a dead consumer left pending are reclaimed
//! periodically and run again from the start.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pivot_models::JobEnvelope;
use pivot_queue::{DeliveredTask, TaskQueue};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::shutdown;

/// Work performed for one task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, envelope: &JobEnvelope) -> WorkerResult<()>;
}

/// Bounded-concurrency consumer of the task broker.
pub struct TaskExecutorPool {
    queue: Arc<dyn TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    slots: Arc<Semaphore>,
    /// Message ids currently being handled
    in_flight: Arc<Mutex<HashSet<String>>>,
    concurrency: usize,
    consumer_name: String,
    consume_block: Duration,
    backoff: Duration,
    claim_interval: Duration,
    claim_min_idle: Duration,
    shutdown_timeout: Duration,
}

impl TaskExecutorPool {
    pub fn new(
        config: &WorkerConfig,
        queue: Arc<dyn TaskQueue>,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        let consumer_name = config
            .worker_id
            .clone()
            .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));

        Self {
            queue,
            handler,
            slots: Arc::new(Semaphore::new(concurrency)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            concurrency,
            consumer_name,
            consume_block: config.consume_block,
            backoff: config.backoff,
            claim_interval: config.claim_interval,
            claim_min_idle: config.claim_min_idle,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Free worker slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Consume until shutdown, then wait (bounded) for in-flight tasks.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> WorkerResult<()> {
        info!(
            "Starting task executor '{}' with {} slots",
            self.consumer_name, self.concurrency
        );

        let mut claim_tick = tokio::time::interval(self.claim_interval);
        claim_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown::requested(&mut shutdown_rx) => {
                    info!("Shutdown signal received, stopping executor");
                    break;
                }
                _ = claim_tick.tick() => {
                    self.claim_once().await;
                }
                permits = self.reserve_slots() => {
                    let permits = permits?;
                    if shutdown::is_requested(&shutdown_rx) {
                        break;
                    }
                    if let Err(e) = self.consume_batch(permits).await {
                        error!("Error consuming tasks: {}", e);
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        info!("Waiting for in-flight tasks to complete...");
        if tokio::time::timeout(self.shutdown_timeout, self.wait_for_tasks())
            .await
            .is_err()
        {
            warn!(
                "{} tasks still running after {:?}; they stay pending for reclaim",
                self.concurrency - self.slots.available_permits(),
                self.shutdown_timeout
            );
        }

        info!("Task executor stopped");
        Ok(())
    }

    /// Read and start as many tasks as there are free slots.
    ///
    /// Returns the number of tasks started.
    pub async fn poll_once(&self) -> WorkerResult<usize> {
        let permits = self.reserve_slots().await?;
        self.consume_batch(permits).await
    }

    /// Wait for one free slot, then take every other free slot too.
    async fn reserve_slots(&self) -> WorkerResult<Vec<OwnedSemaphorePermit>> {
        let first = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::config_error("Executor slots closed"))?;
        let mut permits = vec![first];
        permits.extend(self.try_reserve_slots());
        Ok(permits)
    }

    fn try_reserve_slots(&self) -> Vec<OwnedSemaphorePermit> {
        std::iter::from_fn(|| Arc::clone(&self.slots).try_acquire_owned().ok()).collect()
    }

    async fn consume_batch(&self, permits: Vec<OwnedSemaphorePermit>) -> WorkerResult<usize> {
        let tasks = self
            .queue
            .consume(&self.consumer_name, self.consume_block, permits.len())
            .await?;

        if !tasks.is_empty() {
            debug!("Consumed {} tasks", tasks.len());
        }
        Ok(self.spawn_tasks(tasks, permits))
    }

    /// Reclaim tasks that sat pending on another consumer for too long.
    async fn claim_once(&self) -> usize {
        let permits = self.try_reserve_slots();
        if permits.is_empty() {
            return 0;
        }

        match self
            .queue
            .claim_pending(&self.consumer_name, self.claim_min_idle, permits.len())
            .await
        {
            Ok(tasks) if !tasks.is_empty() => {
                info!("Claimed {} pending tasks", tasks.len());
                metrics::record_tasks_claimed(tasks.len());
                self.spawn_tasks(tasks, permits)
            }
            Ok(_) => 0,
            Err(e) => {
                warn!("Failed to claim pending tasks: {}", e);
                0
            }
        }
    }

    /// Number of tasks currently being handled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Start each task on its own slot. A message that is already running
    /// here is skipped; unused permits are released on drop.
    fn spawn_tasks(&self, tasks: Vec<DeliveredTask>, permits: Vec<OwnedSemaphorePermit>) -> usize {
        let mut permits = permits.into_iter();
        let mut started = 0;
        for delivered in tasks {
            if !self.mark_in_flight(&delivered.message_id) {
                warn!(
                    "Task {} for job {} is already running, skipping",
                    delivered.message_id,
                    delivered.task.job_id()
                );
                continue;
            }
            let Some(permit) = permits.next() else {
                unmark_in_flight(&self.in_flight, &delivered.message_id);
                break;
            };
            let queue = Arc::clone(&self.queue);
            let handler = Arc::clone(&self.handler);
            let in_flight = Arc::clone(&self.in_flight);
            tokio::spawn(async move {
                let _permit = permit;
                let message_id = delivered.message_id.clone();
                Self::execute_task(queue, handler, delivered).await;
                unmark_in_flight(&in_flight, &message_id);
            });
            started += 1;
        }
        started
    }

    fn mark_in_flight(&self, message_id: &str) -> bool {
        match self.in_flight.lock() {
            Ok(mut set) => set.insert(message_id.to_string()),
            Err(_) => false,
        }
    }

    async fn execute_task(
        queue: Arc<dyn TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        delivered: DeliveredTask,
    ) {
        let job_id = delivered.task.job_id().to_string();
        debug!("Executing task {} for job {}", delivered.message_id, job_id);

        match handler.handle(&delivered.task.envelope).await {
            Ok(()) => {
                if let Err(e) = queue.ack(&delivered.message_id).await {
                    error!("Failed to ack task for job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                error!(
                    job_id = %job_id,
                    kind = e.kind().as_str(),
                    "Task failed: {}", e
                );
                metrics::record_task_failed(e.kind().as_str());
                if let Err(qe) = queue.fail(&delivered, &e.to_string()).await {
                    error!("Failed to record failed task for job {}: {}", job_id, qe);
                }
            }
        }
    }

    /// Resolves once every slot is free again.
    pub async fn wait_for_tasks(&self) {
        let _ = self.slots.acquire_many(self.concurrency as u32).await;
    }
}

fn unmark_in_flight(in_flight: &Mutex<HashSet<String>>, message_id: &str) {
    if let Ok(mut set) = in_flight.lock() {
        set.remove(message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_name() {
        struct Never;

        #[async_trait]
        impl TaskHandler for Never {
            async fn handle(&self, _envelope: &JobEnvelope) -> WorkerResult<()> {
                Ok(())
            }
        }

        #[async_trait]
        impl TaskQueue for Never {
            async fn consume(
                &self,
                _consumer: &str,
                _block: Duration,
                _count: usize,
            ) -> pivot_queue::QueueResult<Vec<DeliveredTask>> {
                Ok(Vec::new())
            }
            async fn ack(&self, _message_id: &str) -> pivot_queue::QueueResult<()> {
                Ok(())
            }
            async fn fail(&self, _delivered: &DeliveredTask, _error: &str) -> pivot_queue::QueueResult<()> {
                Ok(())
            }
            async fn claim_pending(
                &self,
                _consumer: &str,
                _min_idle: Duration,
                _count: usize,
            ) -> pivot_queue::QueueResult<Vec<DeliveredTask>> {
                Ok(Vec::new())
            }
        }

        let named = WorkerConfig {
            worker_id: Some("w-1".to_string()),
            concurrency: 0,
            ..WorkerConfig::default()
        };
        let pool = TaskExecutorPool::new(&named, Arc::new(Never), Arc::new(Never));
        assert_eq!(pool.consumer_name(), "w-1");
        assert_eq!(pool.available_slots(), 1);

        let anonymous = TaskExecutorPool::new(&WorkerConfig::default(), Arc::new(Never), Arc::new(Never));
        assert!(anonymous.consumer_name().starts_with("worker-"));
        assert_eq!(anonymous.available_slots(), 2);
    }
}

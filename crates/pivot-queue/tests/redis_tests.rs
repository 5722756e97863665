//! Redis integration tests.

use std::time::Duration;

use pivot_models::{InputRef, JobEnvelope};
use pivot_queue::{JobQueue, JobSource, QueueConfig, RedisTaskBroker, TaskDispatcher, TaskQueue};

fn test_config() -> QueueConfig {
    dotenvy::dotenv().ok();
    QueueConfig::from_env().with_prefix(&format!("test-{}", run_suffix()))
}

fn run_suffix() -> String {
    format!(
        "{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    )
}

fn envelope(job_id: &str) -> JobEnvelope {
    JobEnvelope::new(job_id, "o1", "IMAGE", "image.resize", InputRef::new("in/a.png"))
        .with_param("width", 100)
}

/// Test list push and blocking pop ordering.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_list_fifo() {
    let config = test_config();
    let queue = JobQueue::connect(&config).await.expect("Failed to connect");

    queue.push("first").await.expect("Failed to push");
    queue.push("second").await.expect("Failed to push");

    let wait = Duration::from_secs(1);
    assert_eq!(queue.pop(wait).await.unwrap().as_deref(), Some("first"));
    assert_eq!(queue.pop(wait).await.unwrap().as_deref(), Some("second"));
    assert_eq!(queue.pop(wait).await.unwrap(), None);
}

/// Test dispatch, consume and late ack.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dispatch_consume_ack() {
    let broker = RedisTaskBroker::connect(test_config())
        .await
        .expect("Failed to connect");
    broker.init().await.expect("Failed to initialize broker");
    broker.init().await.expect("Init must be idempotent");

    broker.dispatch(&envelope("j1")).await.expect("Failed to dispatch");

    let tasks = broker
        .consume("test-consumer", Duration::from_millis(500), 1)
        .await
        .expect("Failed to consume");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].task.job_id(), "j1");

    broker.ack(&tasks[0].message_id).await.expect("Failed to ack");
    assert_eq!(broker.len().await.unwrap(), 0);
}

/// Test failed-task recording.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_fail_records_task() {
    let broker = RedisTaskBroker::connect(test_config())
        .await
        .expect("Failed to connect");
    broker.init().await.expect("Failed to initialize broker");

    broker.dispatch(&envelope("j2")).await.expect("Failed to dispatch");
    let tasks = broker
        .consume("test-consumer", Duration::from_millis(500), 1)
        .await
        .expect("Failed to consume");

    broker.fail(&tasks[0], "Test error").await.expect("Failed to record");
    assert_eq!(broker.failed_len().await.unwrap(), 1);
    assert_eq!(broker.len().await.unwrap(), 0);
}

/// Test that a pending task left by one consumer is claimed by another.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_claim_pending() {
    let broker = RedisTaskBroker::connect(test_config())
        .await
        .expect("Failed to connect");
    broker.init().await.expect("Failed to initialize broker");

    broker.dispatch(&envelope("j3")).await.expect("Failed to dispatch");
    let first = broker
        .consume("dead-consumer", Duration::from_millis(500), 1)
        .await
        .expect("Failed to consume");
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let claimed = broker
        .claim_pending("live-consumer", Duration::from_millis(10), 10)
        .await
        .expect("Failed to claim");
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].task.task_id, first[0].task.task_id);
}

/// Test that a consumer never claims tasks it is still running itself.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_claim_pending_skips_own_tasks() {
    let broker = RedisTaskBroker::connect(test_config())
        .await
        .expect("Failed to connect");
    broker.init().await.expect("Failed to initialize broker");

    broker.dispatch(&envelope("j4")).await.expect("Failed to dispatch");
    let running = broker
        .consume("busy-consumer", Duration::from_millis(500), 1)
        .await
        .expect("Failed to consume");
    assert_eq!(running.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let claimed = broker
        .claim_pending("busy-consumer", Duration::from_millis(10), 10)
        .await
        .expect("Failed to claim");
    assert!(claimed.is_empty());

    broker.ack(&running[0].message_id).await.expect("Failed to ack");
}

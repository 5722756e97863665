//! Media transformation worker binary.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use pivot_media::{FfmpegTransformer, MediaConfig};
use pivot_queue::{JobQueue, QueueConfig, RedisTaskBroker};
use pivot_status::StatusClient;
use pivot_storage::R2Client;
use pivot_worker::logging::init_tracing;
use pivot_worker::{
    metrics, shutdown, JobPipeline, QueueListener, TaskExecutorPool, WorkerConfig, WorkerResult,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting pivot-worker");

    if let Err(e) = run().await {
        error!("Worker failed: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> WorkerResult<()> {
    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    metrics::init_metrics(std::env::var("METRICS_ADDR").ok().as_deref())?;

    let queue_config = QueueConfig::from_env();
    let broker = Arc::new(RedisTaskBroker::connect(queue_config.clone()).await?);
    broker.init().await?;

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let mut handles: Vec<JoinHandle<WorkerResult<()>>> = Vec::new();

    if config.role.runs_executor() {
        let store = Arc::new(R2Client::from_env().await?);
        store.check_connectivity().await?;
        let status = Arc::new(StatusClient::from_env()?);
        let media_config = MediaConfig::from_env();
        config.check_claim_idle(Duration::from_secs(media_config.timeout_secs))?;
        let transform = Arc::new(FfmpegTransformer::new(&media_config)?);

        let pipeline = JobPipeline::new(store, status, transform, config.temp_dir.clone())
            .with_worker_id(config.worker_id.clone());
        pipeline.stager().ensure_scratch_dir().await?;

        let pool = TaskExecutorPool::new(&config, broker.clone(), Arc::new(pipeline));
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { pool.run(rx).await }));
    }

    if config.role.runs_listener() {
        let source = Arc::new(JobQueue::connect(&queue_config).await?);
        let listener = QueueListener::new(&config, source, broker.clone());
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { listener.run(rx).await }));
    }

    info!("Running as {}", config.role.as_str());

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let mut result = Ok(());
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Component stopped with error: {}", e);
                result = Err(e);
            }
            Err(e) => error!("Component task panicked: {}", e),
        }
    }
    result
}

//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Which halves of the worker this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerRole {
    /// Queue listener and executor pool in one process
    #[default]
    All,
    /// Queue listener only
    Listener,
    /// Task executor pool only
    Executor,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::All => "all",
            WorkerRole::Listener => "listener",
            WorkerRole::Executor => "executor",
        }
    }

    pub fn runs_listener(&self) -> bool {
        matches!(self, WorkerRole::All | WorkerRole::Listener)
    }

    pub fn runs_executor(&self) -> bool {
        matches!(self, WorkerRole::All | WorkerRole::Executor)
    }
}

impl FromStr for WorkerRole {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Ok(WorkerRole::All),
            "listener" => Ok(WorkerRole::Listener),
            "executor" => Ok(WorkerRole::Executor),
            other => Err(WorkerError::config_error(format!(
                "WORKER_ROLE must be all, listener or executor (got {})",
                other
            ))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifier reported with status updates and used as consumer name
    pub worker_id: Option<String>,
    /// Maximum concurrent jobs (one in-flight task per slot)
    pub concurrency: usize,
    /// Scratch directory shared by all jobs
    pub temp_dir: PathBuf,
    /// Bounded wait of one blocking pop
    pub pop_timeout: Duration,
    /// Sleep after a failed pop or hand-off
    pub backoff: Duration,
    /// How long a single broker read may block
    pub consume_block: Duration,
    /// Graceful shutdown timeout for in-flight jobs
    pub shutdown_timeout: Duration,
    /// How often the pool scans for tasks a dead consumer left pending
    pub claim_interval: Duration,
    /// Minimum idle time before a pending task can be claimed
    pub claim_min_idle: Duration,
    /// Which components this process runs
    pub role: WorkerRole,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            concurrency: 2,
            temp_dir: std::env::temp_dir().join("imagepivot"),
            pop_timeout: Duration::from_secs(5),
            backoff: Duration::from_secs(1),
            consume_block: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(900),
            role: WorkerRole::All,
        }
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        Ok(Self {
            worker_id: std::env::var("WORKER_ID")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            concurrency: env_parse("WORKER_CONCURRENCY", defaults.concurrency).max(1),
            temp_dir: std::env::var("TEMP_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            pop_timeout: Duration::from_secs(env_parse("QUEUE_POP_TIMEOUT_SECS", 5)),
            backoff: Duration::from_secs(env_parse("QUEUE_BACKOFF_SECS", 1)),
            consume_block: defaults.consume_block,
            shutdown_timeout: Duration::from_secs(env_parse("WORKER_SHUTDOWN_TIMEOUT", 60)),
            claim_interval: Duration::from_secs(env_parse("TASK_CLAIM_INTERVAL_SECS", 30).max(1)),
            claim_min_idle: Duration::from_secs(env_parse("TASK_CLAIM_MIN_IDLE_SECS", 900)),
            role: std::env::var("WORKER_ROLE")
                .unwrap_or_default()
                .parse()?,
        })
    }

    /// A running task goes idle on the broker for the whole transform, so
    /// the claim threshold must exceed the transform timeout.
    pub fn check_claim_idle(&self, transform_timeout: Duration) -> WorkerResult<()> {
        if self.claim_min_idle <= transform_timeout {
            return Err(WorkerError::config_error(format!(
                "TASK_CLAIM_MIN_IDLE_SECS ({}) must be greater than the transform timeout ({})",
                self.claim_min_idle.as_secs(),
                transform_timeout.as_secs()
            )));
        }
        Ok(())
    }
}

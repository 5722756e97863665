//! Queue configuration.

/// Redis keys and connection settings shared by the listener and the pool.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// List the producer pushes job envelopes onto
    pub job_queue_key: String,
    /// Stream carrying dispatched tasks
    pub task_stream: String,
    /// Consumer group of the executor pool
    pub consumer_group: String,
    /// Stream recording tasks whose handler failed
    pub failed_stream: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            job_queue_key: "imagepivot:jobs:v1".to_string(),
            task_stream: "imagepivot:tasks".to_string(),
            consumer_group: "imagepivot:workers".to_string(),
            failed_stream: "imagepivot:tasks:failed".to_string(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            job_queue_key: std::env::var("JOB_QUEUE_KEY").unwrap_or(defaults.job_queue_key),
            task_stream: std::env::var("TASK_STREAM").unwrap_or(defaults.task_stream),
            consumer_group: std::env::var("TASK_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            failed_stream: std::env::var("TASK_FAILED_STREAM").unwrap_or(defaults.failed_stream),
        }
    }

    /// Copy of this config with every key under `prefix`; used to isolate test runs.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            redis_url: self.redis_url.clone(),
            job_queue_key: format!("{}:{}", prefix, self.job_queue_key),
            task_stream: format!("{}:{}", prefix, self.task_stream),
            consumer_group: format!("{}:{}", prefix, self.consumer_group),
            failed_stream: format!("{}:{}", prefix, self.failed_stream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys() {
        let config = QueueConfig::default();
        assert_eq!(config.job_queue_key, "imagepivot:jobs:v1");
        assert_eq!(config.task_stream, "imagepivot:tasks");
        assert_eq!(config.failed_stream, "imagepivot:tasks:failed");
    }

    #[test]
    fn test_prefixed_keys() {
        let config = QueueConfig::default().with_prefix("test-1");
        assert_eq!(config.job_queue_key, "test-1:imagepivot:jobs:v1");
        assert_eq!(config.consumer_group, "test-1:imagepivot:workers");
        assert_eq!(config.redis_url, "redis://localhost:6379");
    }
}

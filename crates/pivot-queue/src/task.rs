//! Task messages carried on the broker stream.

use chrono::{DateTime, Utc};
use pivot_models::JobEnvelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One dispatched job envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    /// Unique task id; a redelivered task keeps its id
    pub task_id: String,
    /// The envelope as decoded by the listener
    pub envelope: JobEnvelope,
    /// When the listener handed the envelope off
    pub dispatched_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(envelope: JobEnvelope) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            envelope,
            dispatched_at: Utc::now(),
        }
    }

    /// Job id for log lines; `"unknown"` when the envelope has none.
    pub fn job_id(&self) -> &str {
        self.envelope.known_job_id().unwrap_or("unknown")
    }
}

/// A task as delivered to one consumer, with the stream id needed to ack it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredTask {
    pub message_id: String,
    pub task: QueuedTask,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pivot_models::InputRef;

    #[test]
    fn test_task_carries_envelope() {
        let envelope = JobEnvelope::new("j1", "o1", "IMAGE", "image.resize", InputRef::new("in/a.png"))
            .with_param("width", 100);
        let task = QueuedTask::new(envelope.clone());

        assert_eq!(task.job_id(), "j1");
        assert_eq!(task.envelope, envelope);

        let json = serde_json::to_string(&task).unwrap();
        let decoded: QueuedTask = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.task_id, task.task_id);
        assert_eq!(decoded.envelope.params.get("width"), Some(&serde_json::Value::from(100)));
    }

    #[test]
    fn test_unknown_job_id() {
        let task = QueuedTask::new(JobEnvelope::default());
        assert_eq!(task.job_id(), "unknown");
    }
}

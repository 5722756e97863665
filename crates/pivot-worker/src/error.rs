//! Worker error types.
//!
//! Wrapped errors are transparent: the `Display` output is the message the
//! job-tracking API receives with a FAILED status.

use pivot_media::MediaError;
use pivot_models::{InvalidTransition, ValidationError};
use pivot_queue::QueueError;
use pivot_status::StatusError;
use pivot_storage::StorageError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error class used for logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request cannot be executed as submitted
    Validation,
    /// The media capability could not process the input
    Transform,
    /// Queue, blob store or status API failure
    Transport,
    /// Anything else (configuration, local I/O, lifecycle misuse)
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transform => "transform",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal",
        }
    }
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Validation(_) => ErrorKind::Validation,
            WorkerError::Media(MediaError::FfmpegNotFound(_)) => ErrorKind::Internal,
            WorkerError::Media(_) => ErrorKind::Transform,
            WorkerError::Storage(StorageError::ConfigError(_)) => ErrorKind::Internal,
            WorkerError::Storage(_) | WorkerError::Status(_) | WorkerError::Queue(_) => {
                ErrorKind::Transport
            }
            WorkerError::Transition(_) | WorkerError::ConfigError(_) | WorkerError::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_transparent() {
        let err = WorkerError::from(ValidationError::invalid_params(
            "At least one of width or height must be specified",
        ));
        assert_eq!(
            err.to_string(),
            "At least one of width or height must be specified"
        );
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = WorkerError::from(StorageError::not_found("in/a.png"));
        assert_eq!(err.to_string(), "Object not found: in/a.png");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_kind_classification() {
        let err = WorkerError::from(MediaError::ffmpeg_failed("bad input", None, Some(1)));
        assert_eq!(err.kind(), ErrorKind::Transform);

        let err = WorkerError::from(StatusError::rejected(500, "oops"));
        assert_eq!(err.kind(), ErrorKind::Transport);

        assert_eq!(WorkerError::config_error("x").kind(), ErrorKind::Internal);
        assert_eq!(ErrorKind::Transport.as_str(), "transport");
    }
}

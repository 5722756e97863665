//! Status reporting error types.

use thiserror::Error;

/// Result type for status reporting.
pub type StatusResult<T> = Result<T, StatusError>;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Status API configuration error: {0}")]
    Config(String),

    #[error("Status API rejected update ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Status API request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl StatusError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            body: body.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout())
    }
}

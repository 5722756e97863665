//! Validation error type shared by envelope checks, routing and parameter decoding.

use thiserror::Error;

/// Result type for validation steps.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A request that cannot be executed as submitted.
///
/// Raised before any I/O takes place. The `Display` output is the
/// human-readable message reported to the job-tracking API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid payload: missing {0}")]
    MissingFields(String),

    #[error("Unknown media type: {0}")]
    UnknownMediaType(String),

    #[error("Unknown {media} feature: {slug}")]
    UnknownFeature { media: &'static str, slug: String },

    #[error("{0}")]
    InvalidParams(String),
}

impl ValidationError {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn unknown_feature(media: &'static str, slug: impl Into<String>) -> Self {
        Self::UnknownFeature {
            media,
            slug: slug.into(),
        }
    }
}

//! Shared data models for the ImagePivot media worker.
//!
//! This crate provides Serde-serializable types for:
//! - Job envelopes consumed from the durable queue
//! - Job status transitions and output descriptors
//! - The feature catalogue (media type + feature slug)
//! - Strongly-typed, validated feature parameters
//! - Image/audio format tables (extension and MIME mapping)

pub mod envelope;
pub mod error;
pub mod feature;
pub mod format;
pub mod job_status;
pub mod params;

// Re-export common types
pub use envelope::{InputRef, JobEnvelope};
pub use error::{ValidationError, ValidationResult};
pub use feature::{Feature, MediaType};
pub use format::{AudioFormat, ImageFormat, DEFAULT_MIME_TYPE};
pub use job_status::{
    InvalidTransition, JobOutcome, JobStatus, OutputDescriptor, StatusLifecycle, StatusUpdate,
};
pub use params::{
    AudioCompressParams, AudioConvertParams, AudioQuality, ConversionType, FeatureParams,
    ImageCompressParams, ImageConvertParams, ImageQualityParams, MetadataParams, NormalizeParams,
    OutputTarget, ResizeParams, SourceMedia, TrimParams,
};

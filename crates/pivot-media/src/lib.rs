//! Media transform provider for the worker.
//!
//! This crate provides:
//! - The [`MediaTransform`] interface the job pipeline invokes
//! - Type-safe FFmpeg command building and a runner with timeout
//! - Filter and encoder argument builders per feature
//! - [`FfmpegTransformer`], which fails at construction when FFmpeg is missing

pub mod command;
pub mod error;
pub mod filters;
pub mod transform;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use transform::{
    build_command, FfmpegTransformer, MediaConfig, MediaTransform, TransformRequest,
};

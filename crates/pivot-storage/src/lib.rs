//! Blob storage for the media worker.
//!
//! This crate provides:
//! - The [`BlobStore`] trait the pipeline stages files through
//! - A Cloudflare R2 (S3 API) implementation of it

pub mod client;
pub mod error;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use store::{BlobStore, ObjectHead};

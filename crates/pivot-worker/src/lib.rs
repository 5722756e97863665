//! Media transformation worker.
//!
//! This crate provides:
//! - The queue listener (blocking pop, decode, hand-off to the task broker)
//! - The task executor pool (bounded concurrency, late ack)
//! - Two-level feature routing with validated parameters
//! - The job pipeline shared by every feature, with job-scoped temp files
//! - Structured job logging and Prometheus metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod listener;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod router;
pub mod shutdown;
pub mod stager;

pub use config::{WorkerConfig, WorkerRole};
pub use error::{ErrorKind, WorkerError, WorkerResult};
pub use executor::{TaskExecutorPool, TaskHandler};
pub use listener::{ListenerStep, QueueListener};
pub use logging::JobLogger;
pub use pipeline::JobPipeline;
pub use router::{FeatureRouter, RoutedJob};
pub use stager::{FileRole, FileStager, JobScratch};

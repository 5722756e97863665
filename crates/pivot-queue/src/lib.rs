//! Queue transport for the media worker.
//!
//! This crate provides:
//! - The durable job list that producers push envelopes onto (`BLPOP` source)
//! - The Redis Streams task broker between the listener and the executor pool
//! - Late acknowledgement, failed-task recording and stale-task reclaim

pub mod broker;
pub mod config;
pub mod error;
pub mod job_list;
pub mod task;

pub use broker::{RedisTaskBroker, TaskDispatcher, TaskQueue};
pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use job_list::{JobQueue, JobSource};
pub use task::{DeliveredTask, QueuedTask};

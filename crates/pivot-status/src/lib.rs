//! Status reporting for the media worker.
//!
//! Every lifecycle transition is a single synchronous
//! `POST {base}/jobs/internal/{jobId}/status`. Non-2xx responses and
//! transport failures are errors; there is no built-in retry.

pub mod client;
pub mod error;

pub use client::{StatusClient, StatusConfig, StatusReporter};
pub use error::{StatusError, StatusResult};

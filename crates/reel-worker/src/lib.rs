//! Composition worker.
//!
//! This crate provides:
//! - Plan and render job handlers on top of [`reel_media::Engine`]
//! - A task state store for progress and outputs
//! - The job executor with bounded concurrency and graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod plan_job;
pub mod processor;
pub mod render_job;
pub mod retry;
pub mod state;

pub use config::{QueueBackend, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::{process_job, ProcessingContext};
pub use state::{InMemoryTaskStore, TaskStateStore};

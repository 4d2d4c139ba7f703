//! Job admission for the composition worker.
//!
//! This crate provides:
//! - Plan and render job payloads
//! - The [`TaskQueue`] trait with Redis Streams and in-memory implementations

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{PlanJob, QueueJob, RenderJob};
pub use memory::InMemoryTaskQueue;
pub use queue::{QueueConfig, RedisTaskQueue, TaskQueue};

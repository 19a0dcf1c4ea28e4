//! Configuration models for queues, timeouts, and retention.

pub mod queue;

pub use queue::{QueueConfig, SchedulerConfig};

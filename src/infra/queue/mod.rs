//! Pending-set backends.

pub mod memory;

pub use memory::InMemoryPendingQueue;

//! Infrastructure backends for pending sets and result storage.

/// Pending-set backends.
pub mod queue;
/// Result-store backends.
pub mod store;

//! # Extension Dispatch
//!
//! A bounded-concurrency execution scheduler for extension/plugin workloads.
//!
//! This library is the coordination layer between callers that want a named
//! extension run and the worker capacity that runs it. Requests are admitted
//! into named queues under explicit depth limits, dispatched in priority
//! order onto bounded worker slots, executed under wall-clock timeouts with
//! cooperative cancellation, and reported through an observable result
//! store.
//!
//! ## Core Problem Solved
//!
//! Extension hosts cannot let arbitrary plugin code dictate resource use:
//!
//! - **Unbounded fan-in**: callers submit faster than extensions run;
//!   admission must reject, not queue forever
//! - **Noisy neighbors**: one slow or broken extension must not starve the
//!   rest or crash the host
//! - **Stuck invocations**: extension code that never returns must be timed
//!   out and its capacity reclaimed
//! - **Observability**: callers poll or stream progress after submitting,
//!   long after their original request returned
//!
//! ## Key Features
//!
//! - **Admission control**: per-queue pending ceilings with explicit
//!   queue-full rejection as backpressure
//! - **Priority dispatch**: four tiers, strict FIFO within a tier
//! - **Bounded concurrency**: per-queue worker ceilings enforced at every
//!   observable instant
//! - **Timeouts and cancellation**: wall-clock timeouts from worker start;
//!   cancellation tokens threaded into every invocation
//! - **Result retention**: terminal outcomes retained most-recent-N and
//!   evicted oldest-first
//! - **Lifecycle hooks**: typed observers for start/complete/fail/timeout/
//!   cancel with panic isolation
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use extension_dispatch::builders::build_scheduler;
//! use extension_dispatch::config::SchedulerConfig;
//! use extension_dispatch::core::ExecutionRequest;
//! use extension_dispatch::runtime::TokioSpawner;
//!
//! let scheduler = build_scheduler(
//!     &SchedulerConfig::default(),
//!     my_registry,             // implements ExtensionRegistry
//!     TokioSpawner::current(),
//! )?;
//! scheduler.start();
//!
//! let id = scheduler.submit(
//!     "default",
//!     ExecutionRequest::new("ext.echo", serde_json::json!({"msg": "hi"}))
//!         .with_timeout(Duration::from_secs(10)),
//! )?;
//!
//! // Poll the result store, or register an observer instead.
//! let result = scheduler.get_result(&id);
//! ```
//!
//! For complete examples, see `tests/scheduler_test.rs`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: records, queues, dispatch, hooks.
pub mod core;
/// Configuration models for queues, timeouts, and retention.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Infrastructure backends for pending sets and result storage.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! The retrying network task engine.
//!
//! Turns "ask some peer for X" into a robust asynchronous operation: a
//! [`RetryingTask`](task::RetryingTask) selects a peer, sends the request,
//! waits a bounded time for the answer, merges partial responses and retries
//! with rotated peers until the result is complete or the retry budget runs
//! out. Callers observe a single resolution through a
//! [`TaskHandle`](task::TaskHandle).

/// The consecutive-failure budget of a task.
pub mod budget;

/// Task configuration.
pub mod config;

/// Merge policies for concrete request shapes.
pub mod merge;

/// Peer-selection policies.
pub mod selector;

/// Scheduler abstraction the task drivers run on.
pub mod spawn;

/// The retrying task orchestrator.
pub mod task;

mod metrics;

pub use budget::RetryBudget;
pub use config::RetryConfig;
pub use selector::{PeerSelector, RandomSelector, RoundRobin};
pub use spawn::{TaskSpawner, TokioTaskExecutor};
pub use task::{RetryingTask, TaskHandle};

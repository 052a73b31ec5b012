//! Queue executor: drains ready task queues through the three pipeline
//! stages on a fixed pool of worker threads.
//!
//! Split into focused submodules:
//! - `core`: QueueExecutor struct, settings, and metric accessors
//! - `execution`: ready-queue selection and the worker claim loop
//! - `pipeline`: per-entry stage execution, timeouts, and energy gathering

mod core;
mod execution;
mod pipeline;

pub use self::core::{ExecutionReport, ExecutorSettings, QueueExecutor};

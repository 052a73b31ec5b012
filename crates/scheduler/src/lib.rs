//! Carbon-aware batch scheduling.
//!
//! A scheduling cycle discovers files in the pending bucket, estimates how
//! long they take from recent throughput, and places one task queue so its
//! run is centred on the forecast renewable peak. The executor later drains
//! ready queues through the transfer, unpack and decode stages while
//! accounting the energy each stage used.

pub mod builder;
pub mod energy;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod reconcile;
pub mod reset;
pub mod speed;

pub use builder::ScheduleBuilder;
pub use energy::{sample_kwh, samples_to_kwh, EnergyError};
pub use error::SchedulerError;
pub use executor::{ExecutionReport, ExecutorSettings, QueueExecutor};
pub use metrics::{ExecutorMetrics, Progress};
pub use reconcile::{PodReconciler, ReconcileReport};
pub use reset::{full_reset, run_guarded, ResetReport};
pub use speed::ProcessingSpeedEstimator;

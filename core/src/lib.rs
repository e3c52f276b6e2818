//! tokenbench-core: load generation and aggregation for LLM token benchmarks
//!
//! This crate provides the engine shared by all tokenbench components:
//!
//! - Request specs and the per-request metric records they produce
//! - Core traits (CompletionClient, TokenCounter)
//! - The client pool and the scheduler / drain loop
//! - Metric normalization, summary statistics and report assembly
//! - Configuration and error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod report;
pub mod request;
pub mod scheduler;
pub mod stats;
pub mod summary;
pub mod traits;
pub mod workload;

pub use config::{parse_user_metadata, ConfigError, LoadTestConfig, DEFAULT_SEED};
pub use error::*;
pub use metrics::*;
pub use pool::{ClientPool, PoolError, PoolStats, RequestHandle};
pub use report::{BenchmarkReport, TestMetadata};
pub use request::*;
pub use scheduler::{RunOutcome, Scheduler, SchedulerBuilder, SchedulerState, StopReason};
pub use stats::{FieldSummary, Quantiles};
pub use summary::{summarize, SummaryReport};
pub use traits::*;
pub use workload::Workload;

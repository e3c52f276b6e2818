//! Scheduler / drain loop driving a load test
//!
//! The scheduler is the single control task of a run. It moves through
//! `Idle -> Dispatching <-> Draining -> Finished`:
//!
//! - Each iteration pops one prompt and output target from the pre-built
//!   workload, stamps a request and submits it to the client pool
//! - Every `concurrency` iterations it drains finished requests, normalizes
//!   them and appends them to the record list
//! - It stops once the record count reaches the limit or the timeout passes
//! - It then waits a bounded grace period and drains exactly once more
//!
//! A timeout is not an error: the outcome is flagged and still summarized.
//!
//! # Example
//!
//! ```ignore
//! use tokenbench_core::SchedulerBuilder;
//!
//! let scheduler = SchedulerBuilder::new()
//!     .pool(pool)
//!     .normalizer(normalizer)
//!     .workload(workload)
//!     .template(config.request_template())
//!     .limits(&config)
//!     .build()?;
//!
//! let outcome = scheduler.run_with_signal_handling().await?;
//! ```

mod builder;
mod executor;

pub use builder::SchedulerBuilder;
pub use executor::{RunOutcome, Scheduler, SchedulerState, StopReason};

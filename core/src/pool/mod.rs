//! Fixed-size pool of completion clients
//!
//! Every slot is a long-lived tokio task that owns one [`CompletionClient`]
//! and runs at most one request at a time. The pool hands jobs to idle slots
//! and buffers finished completions until the caller drains them:
//!
//! 1. `submit` waits for an idle slot (`try_submit` refuses instead)
//! 2. The slot executes the request and measures its latency
//! 3. Client failures are turned into completions carrying an error code
//! 4. The completion is queued, then the slot reports itself idle again
//! 5. `drain_ready` returns whatever has finished, without waiting
//!
//! # Example
//!
//! ```ignore
//! use tokenbench_core::pool::ClientPool;
//!
//! let mut pool = ClientPool::new(clients)?;
//! pool.submit(spec).await?;
//! let finished = pool.drain_ready();
//! let stats = pool.shutdown().await;
//! ```
//!
//! [`CompletionClient`]: crate::traits::CompletionClient

mod executor;
mod stats;
mod worker;

pub use executor::{ClientPool, PoolError, RequestHandle};
pub use stats::PoolStats;

//! Error types for tokenbench-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::pool::PoolError;
use crate::request::RequestError;

/// Core error type
///
/// Request-level failures never show up here: they are recorded on the
/// [`MetricRecord`](crate::metrics::MetricRecord) of the call that failed.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid load test configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid request spec
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    /// Client pool failure (closed pool, dead workers)
    #[error("client pool error: {0}")]
    Pool(#[from] PoolError),

    /// The test window passed to the aggregator has no positive duration
    #[error("invalid test window: end time must be after start time (duration {duration_s}s)")]
    InvalidWindow {
        /// Signed window length in seconds
        duration_s: f64,
    },

    /// Workload generation failure
    #[error("workload error: {0}")]
    Workload(String),

    /// A required builder field was not set
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Create a workload error
    pub fn workload(message: impl Into<String>) -> Self {
        BenchError::Workload(message.into())
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;

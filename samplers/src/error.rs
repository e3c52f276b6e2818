//! Sampler errors

/// Errors raised while building a workload
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// Normal distribution parameters rejected
    #[error("Invalid distribution (mean {mean}, stddev {stddev})")]
    InvalidDistribution {
        /// Requested mean
        mean: f64,
        /// Requested standard deviation
        stddev: f64,
    },

    /// Custom prompt is empty
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    /// Tokenizer could not be loaded
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// IO error (e.g., reading a tokenizer file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

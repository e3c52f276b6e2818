//! Core traits for completion clients and token counters
//!
//! These traits are defined in core to avoid circular dependencies.
//! Implementations live in their respective crates (vendors/, samplers/).

use crate::metrics::{ErrorCode, RawMetrics};
use crate::request::{ApiKind, RequestSpec};
use async_trait::async_trait;
use std::time::Duration;

// ============================================================================
// Completion Client Trait
// ============================================================================

/// Client for one completion API
///
/// Implementations handle the wire protocol of a backend (OpenAI, LiteLLM)
/// and measure latency while streaming. Each pool slot owns one client.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// API this client speaks
    fn api(&self) -> ApiKind;

    /// Execute a request and return its raw metrics and generated text
    async fn execute(&self, request: &RequestSpec) -> Result<Completion, VendorError>;
}

/// Result of one completion call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Measurements taken during the call
    pub metrics: RawMetrics,
    /// Text produced by the model
    pub generated_text: String,
}

impl Completion {
    /// Create a completion
    pub fn new(metrics: RawMetrics, generated_text: impl Into<String>) -> Self {
        Self {
            metrics,
            generated_text: generated_text.into(),
        }
    }

    /// Completion recording a failed call
    pub fn failed(input_tokens: usize, e2e_latency_s: f64, error: &VendorError) -> Self {
        Self {
            metrics: RawMetrics::failure(
                input_tokens,
                e2e_latency_s,
                error.to_error_code(),
                error.to_string(),
            ),
            generated_text: String::new(),
        }
    }
}

/// Client-side errors
#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    /// HTTP/network error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status returned by the API
    #[error("API returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VendorError {
    /// Convert to the error category recorded on metric records
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            VendorError::Http(e) if e.is_timeout() => ErrorCode::Timeout,
            VendorError::Http(e) if e.is_connect() => ErrorCode::Connection,
            VendorError::Http(e) => match e.status() {
                Some(status) => ErrorCode::Http(status.as_u16()),
                None if e.is_body() || e.is_decode() => ErrorCode::Stream,
                None => ErrorCode::Connection,
            },
            VendorError::Status { status, .. } => ErrorCode::Http(*status),
            VendorError::Timeout(_) => ErrorCode::Timeout,
            VendorError::Stream(_) => ErrorCode::Stream,
            VendorError::InvalidResponse(_) => ErrorCode::InvalidResponse,
            VendorError::Config(_) => ErrorCode::Client,
        }
    }
}

// ============================================================================
// Token Counter Trait
// ============================================================================

/// Counts tokens in a piece of text
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`
    fn count(&self, text: &str) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        self(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_error_to_error_code() {
        assert_eq!(
            VendorError::Status {
                status: 429,
                body: "slow down".into()
            }
            .to_error_code(),
            ErrorCode::Http(429)
        );
        assert_eq!(
            VendorError::Timeout(Duration::from_secs(30)).to_error_code(),
            ErrorCode::Timeout
        );
        assert_eq!(
            VendorError::Stream("eof".into()).to_error_code(),
            ErrorCode::Stream
        );
        assert_eq!(
            VendorError::InvalidResponse("not json".into()).to_error_code(),
            ErrorCode::InvalidResponse
        );
        assert_eq!(
            VendorError::Config("no url".into()).to_error_code(),
            ErrorCode::Client
        );
    }

    #[test]
    fn test_failed_completion() {
        let error = VendorError::Status {
            status: 500,
            body: "internal".into(),
        };
        let completion = Completion::failed(42, 0.25, &error);

        assert_eq!(completion.metrics.input_tokens, 42);
        assert_eq!(completion.metrics.error_code, Some(ErrorCode::Http(500)));
        assert_eq!(completion.metrics.e2e_latency_s, 0.25);
        assert!(completion.metrics.error_msg.unwrap().contains("internal"));
        assert!(completion.generated_text.is_empty());
    }

    #[test]
    fn test_closure_token_counter() {
        let counter = |text: &str| text.len();
        assert_eq!(TokenCounter::count(&counter, "abcd"), 4);
    }
}

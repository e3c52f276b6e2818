//! Per-request metric records and their normalization
//!
//! A client call yields [`RawMetrics`]. Draining turns it into a [`MetricRecord`]
//! by counting output tokens and filling in the derived fields. `normalize`
//! consumes the raw value, so a record can only be normalized once.

use crate::traits::TokenCounter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// API-level error category recorded on a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ErrorCode {
    /// Non-2xx HTTP status
    Http(u16),
    /// Request timed out
    Timeout,
    /// Could not connect to the endpoint
    Connection,
    /// Response stream broke off mid-way
    Stream,
    /// Response could not be parsed
    InvalidResponse,
    /// Client-side failure (bad configuration, request build errors)
    Client,
}

impl ErrorCode {
    fn label(&self) -> String {
        match self {
            ErrorCode::Http(status) => status.to_string(),
            ErrorCode::Timeout => "timeout".to_string(),
            ErrorCode::Connection => "connection".to_string(),
            ErrorCode::Stream => "stream".to_string(),
            ErrorCode::InvalidResponse => "invalid_response".to_string(),
            ErrorCode::Client => "client".to_string(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(ErrorCode::Timeout),
            "connection" => Ok(ErrorCode::Connection),
            "stream" => Ok(ErrorCode::Stream),
            "invalid_response" => Ok(ErrorCode::InvalidResponse),
            "client" => Ok(ErrorCode::Client),
            other => other
                .parse::<u16>()
                .map(ErrorCode::Http)
                .map_err(|_| format!("unknown error code `{other}`")),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.label()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Measurements taken by a client during one call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    /// Time to first token in seconds (absent when no token arrived)
    pub ttft_s: Option<f64>,
    /// Sum of gaps between successive streamed chunks in seconds
    pub inter_token_latency_sum_s: f64,
    /// Wall-clock duration of the call in seconds
    pub e2e_latency_s: f64,
    /// Prompt token count, known before the call
    pub input_tokens: usize,
    /// Error category, `None` on success
    pub error_code: Option<ErrorCode>,
    /// Error message, `None` on success
    pub error_msg: Option<String>,
}

impl RawMetrics {
    /// Raw metrics of a successful call
    pub fn success(input_tokens: usize, ttft_s: f64, itl_sum_s: f64, e2e_latency_s: f64) -> Self {
        Self {
            ttft_s: Some(ttft_s),
            inter_token_latency_sum_s: itl_sum_s,
            e2e_latency_s,
            input_tokens,
            error_code: None,
            error_msg: None,
        }
    }

    /// Raw metrics of a failed call
    pub fn failure(
        input_tokens: usize,
        e2e_latency_s: f64,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ttft_s: None,
            inter_token_latency_sum_s: 0.0,
            e2e_latency_s,
            input_tokens,
            error_code: Some(code),
            error_msg: Some(message.into()),
        }
    }

    /// Fill in the derived fields given the output token count
    pub fn normalize(self, output_tokens: usize) -> MetricRecord {
        let inter_token_latency_s = if output_tokens == 0 {
            0.0
        } else {
            self.inter_token_latency_sum_s / output_tokens as f64
        };

        let output_throughput = if self.e2e_latency_s > 0.0 {
            Some(output_tokens as f64 / self.e2e_latency_s)
        } else {
            None
        };

        MetricRecord {
            ttft_s: self.ttft_s,
            inter_token_latency_s,
            e2e_latency_s: self.e2e_latency_s,
            input_tokens: self.input_tokens,
            output_tokens,
            total_tokens: self.input_tokens + output_tokens,
            output_throughput,
            error_code: self.error_code,
            error_msg: self.error_msg,
        }
    }
}

/// Normalized measurements for one completed call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    ttft_s: Option<f64>,
    inter_token_latency_s: f64,
    #[serde(rename = "end_to_end_latency_s")]
    e2e_latency_s: f64,
    #[serde(rename = "number_input_tokens")]
    input_tokens: usize,
    #[serde(rename = "number_output_tokens")]
    output_tokens: usize,
    #[serde(rename = "number_total_tokens")]
    total_tokens: usize,
    #[serde(rename = "request_output_throughput_token_per_s")]
    output_throughput: Option<f64>,
    error_code: Option<ErrorCode>,
    error_msg: Option<String>,
}

impl MetricRecord {
    /// Time to first token in seconds
    pub fn ttft_s(&self) -> Option<f64> {
        self.ttft_s
    }

    /// Average seconds per generated token
    pub fn inter_token_latency_s(&self) -> f64 {
        self.inter_token_latency_s
    }

    /// End-to-end latency in seconds
    pub fn e2e_latency_s(&self) -> f64 {
        self.e2e_latency_s
    }

    /// Prompt token count
    pub fn input_tokens(&self) -> usize {
        self.input_tokens
    }

    /// Generated token count
    pub fn output_tokens(&self) -> usize {
        self.output_tokens
    }

    /// Input plus output tokens
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Output tokens per second, unset when the call took no measurable time
    pub fn output_throughput(&self) -> Option<f64> {
        self.output_throughput
    }

    /// Error category
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }

    /// Error message
    pub fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }

    /// Whether the call failed
    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Turns raw client metrics into normalized records
#[derive(Clone)]
pub struct Normalizer {
    counter: Arc<dyn TokenCounter>,
}

impl Normalizer {
    /// Create a normalizer backed by `counter`
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self { counter }
    }

    /// Count the generated tokens and normalize
    pub fn normalize(&self, raw: RawMetrics, generated_text: &str) -> MetricRecord {
        let output_tokens = if generated_text.is_empty() {
            0
        } else {
            self.counter.count(generated_text)
        };
        raw.normalize(output_tokens)
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

//! Load test configuration types

use crate::request::{ApiKind, RequestTemplate, SamplingParams, MAX_TOKENS_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Seed used when none is given, so default runs share one load shape
pub const DEFAULT_SEED: u64 = 11111;

/// Load test configuration
///
/// Defines the target endpoint, the workload shape, and the limits that
/// stop a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTestConfig {
    /// Model identifier
    pub model: String,

    /// Target API
    pub api: ApiKind,

    /// Base URL of the endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Authentication credential (never serialized)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Mean prompt length in tokens
    pub mean_input_tokens: usize,
    /// Standard deviation of the prompt length
    pub stddev_input_tokens: f64,
    /// Mean output token target
    pub mean_output_tokens: usize,
    /// Standard deviation of the output token target
    pub stddev_output_tokens: f64,

    /// Number of requests in flight at once
    pub concurrency: usize,
    /// Stop after this many records have been accumulated
    pub max_completed_requests: usize,
    /// Stop once this much wall-clock time has elapsed
    pub timeout: Duration,

    /// Extra sampling parameters merged into every request (JSON object)
    pub additional_sampling_params: Value,

    /// Prompt used instead of a generated one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,

    /// Tokenizer file or directory used to count tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<PathBuf>,

    /// Extra HTTP headers
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// TLS certificate verification
    pub verify_ssl: bool,

    /// Free-form metadata merged into the final report
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub user_metadata: Map<String, Value>,

    /// Seed for workload generation
    pub seed: u64,

    /// How long to wait for in-flight requests after the loop ends
    pub final_drain_grace: Duration,

    /// Sleep between drains once the workload is used up
    pub poll_interval: Duration,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            api: ApiKind::OpenAi,
            endpoint: None,
            api_key: None,
            mean_input_tokens: 550,
            stddev_input_tokens: 150.0,
            mean_output_tokens: 150,
            stddev_output_tokens: 80.0,
            concurrency: 10,
            max_completed_requests: 10,
            timeout: Duration::from_secs(90),
            additional_sampling_params: Value::Object(Map::new()),
            custom_prompt: None,
            tokenizer: None,
            headers: HashMap::new(),
            verify_ssl: true,
            user_metadata: Map::new(),
            seed: DEFAULT_SEED,
            final_drain_grace: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl LoadTestConfig {
    /// Create a config for `model` with default limits
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the concurrency level
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the completed-request limit
    pub fn with_max_completed_requests(mut self, max: usize) -> Self {
        self.max_completed_requests = max;
        self
    }

    /// Set the test timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }

        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(
                "concurrency must be at least 1".into(),
            ));
        }

        if self.max_completed_requests == 0 {
            return Err(ConfigError::InvalidStopCondition(
                "max completed requests must be at least 1".into(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidStopCondition(
                "timeout must be positive".into(),
            ));
        }

        if self.mean_output_tokens == 0 {
            return Err(ConfigError::InvalidTokenDistribution(
                "mean output tokens must be at least 1".into(),
            ));
        }

        for (name, stddev) in [
            ("input", self.stddev_input_tokens),
            ("output", self.stddev_output_tokens),
        ] {
            if !stddev.is_finite() || stddev < 0.0 {
                return Err(ConfigError::InvalidTokenDistribution(format!(
                    "{name} token stddev must be a non-negative number, got {stddev}"
                )));
            }
        }

        let Some(params) = self.additional_sampling_params.as_object() else {
            return Err(ConfigError::InvalidSamplingParams(
                "additional sampling params must be a JSON object".into(),
            ));
        };

        // an override replaces every sampled output length
        if let Some(value) = params.get(MAX_TOKENS_KEY) {
            if !matches!(value.as_u64(), Some(n) if n > 0) {
                return Err(ConfigError::InvalidSamplingParams(format!(
                    "{MAX_TOKENS_KEY} must be a positive integer, got {value}"
                )));
            }
        }

        Ok(())
    }

    /// Additional sampling parameters as a map
    pub fn sampling_params(&self) -> SamplingParams {
        self.additional_sampling_params
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    /// Request template derived from this config
    pub fn request_template(&self) -> RequestTemplate {
        RequestTemplate {
            model: self.model.clone(),
            api: self.api,
            additional_sampling_params: self.sampling_params(),
            metadata: None,
            headers: (!self.headers.is_empty()).then(|| self.headers.clone()),
            verify_ssl: self.verify_ssl,
        }
    }
}

/// Parse `name=foo,team=perf` into a metadata map
///
/// Empty items are skipped; values are kept as strings.
pub fn parse_user_metadata(raw: &str) -> Result<Map<String, Value>, ConfigError> {
    let mut metadata = Map::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidMetadata(item.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidMetadata(item.to_string()));
        }
        metadata.insert(key.to_string(), Value::String(value.trim().to_string()));
    }
    Ok(metadata)
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Model not set
    #[error("model must be set")]
    MissingModel,

    /// Invalid concurrency value
    #[error("Invalid concurrency: {0}")]
    InvalidConcurrency(String),

    /// Invalid stop condition
    #[error("Invalid stop condition: {0}")]
    InvalidStopCondition(String),

    /// Invalid token distribution
    #[error("Invalid token distribution: {0}")]
    InvalidTokenDistribution(String),

    /// Invalid sampling parameters
    #[error("Invalid sampling params: {0}")]
    InvalidSamplingParams(String),

    /// Malformed metadata item
    #[error("Invalid metadata item `{0}`, expected key=value")]
    InvalidMetadata(String),
}

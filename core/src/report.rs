//! Final benchmark report: run metadata, summary and per-request records

use crate::config::LoadTestConfig;
use crate::error::BenchResult;
use crate::metrics::MetricRecord;
use crate::request::{Prompt, SamplingParams};
use crate::summary::SummaryReport;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Description of the load that was applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetadata {
    /// Model identifier
    pub model: String,
    /// Prompt token count (the same prompt is sent with every request)
    pub mean_input_tokens: usize,
    /// Always 0: every request carries the same prompt
    pub stddev_input_tokens: f64,
    /// Mean output token target
    pub mean_output_tokens: usize,
    /// Standard deviation of the output token target
    pub stddev_output_tokens: f64,
    /// Concurrency level
    pub num_concurrent_requests: usize,
    /// Extra sampling parameters sent with each request
    pub additional_sampling_params: SamplingParams,
    /// Prompt text
    pub prompt: String,
}

impl TestMetadata {
    /// Metadata for a run of `config` using `prompt`
    pub fn new(config: &LoadTestConfig, prompt: &Prompt) -> Self {
        Self {
            model: config.model.clone(),
            mean_input_tokens: prompt.input_tokens,
            stddev_input_tokens: 0.0,
            mean_output_tokens: config.mean_output_tokens,
            stddev_output_tokens: config.stddev_output_tokens,
            num_concurrent_requests: config.concurrency,
            additional_sampling_params: config.sampling_params(),
            prompt: prompt.text.clone(),
        }
    }
}

/// Everything a finished run produces
///
/// Serializes as one flat mapping: metadata fields, a `results` entry, then
/// user metadata. Per-request records are kept apart for a separate file.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    /// Load description
    #[serde(flatten)]
    pub metadata: TestMetadata,
    /// Aggregated statistics
    pub results: SummaryReport,
    /// Caller-supplied metadata
    #[serde(flatten)]
    pub user_metadata: Map<String, Value>,
    /// Normalized per-request records
    #[serde(skip)]
    pub individual_responses: Vec<MetricRecord>,
}

impl BenchmarkReport {
    /// Assemble a report
    pub fn new(
        metadata: TestMetadata,
        results: SummaryReport,
        user_metadata: Map<String, Value>,
        individual_responses: Vec<MetricRecord>,
    ) -> Self {
        Self {
            metadata,
            results,
            user_metadata,
            individual_responses,
        }
    }

    /// Report mapping as JSON
    ///
    /// User metadata is applied last and overrides metadata keys of the same
    /// name.
    pub fn summary_json(&self) -> BenchResult<Value> {
        let mut summary = match serde_json::to_value(&self.metadata).map_err(to_io)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        summary.insert(
            "results".to_string(),
            serde_json::to_value(&self.results).map_err(to_io)?,
        );
        for (key, value) in &self.user_metadata {
            summary.insert(key.clone(), value.clone());
        }
        Ok(Value::Object(summary))
    }

    /// Per-request records as a JSON array
    pub fn individual_json(&self) -> BenchResult<Value> {
        Ok(serde_json::to_value(&self.individual_responses).map_err(to_io)?)
    }

    /// File name stem for this report: `<model>_<in>_<out>`
    ///
    /// Characters outside `[A-Za-z0-9_-]` in the model name become `-`.
    pub fn file_stem(&self) -> String {
        let model: String = self
            .metadata
            .model
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        format!(
            "{}_{}_{}",
            model, self.metadata.mean_input_tokens, self.metadata.mean_output_tokens
        )
    }
}

fn to_io(e: serde_json::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}

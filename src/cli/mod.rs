//! CLI argument parsing and run configuration

mod output;
mod run;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Map, Value};

use tokenbench_core::{parse_user_metadata, ApiKind, LoadTestConfig, DEFAULT_SEED};

pub use run::run;

#[derive(Parser, Debug)]
#[command(name = "tokenbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Model to query
    #[arg(long)]
    pub model: String,

    /// API the endpoint speaks (openai, litellm)
    #[arg(long = "llm-api", default_value = "openai")]
    pub llm_api: ApiKind,

    /// Base URL of the endpoint, e.g. http://localhost:8000/v1
    #[arg(long, env = "OPENAI_API_BASE")]
    pub url: Option<String>,

    /// API key sent as a bearer token
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Mean number of tokens in the prompt
    #[arg(long, default_value_t = 550)]
    pub mean_input_tokens: usize,

    /// Standard deviation of the prompt length
    #[arg(long, default_value_t = 150.0)]
    pub stddev_input_tokens: f64,

    /// Mean number of tokens to generate per request
    #[arg(long, default_value_t = 150)]
    pub mean_output_tokens: usize,

    /// Standard deviation of the tokens generated per request
    #[arg(long, default_value_t = 80.0)]
    pub stddev_output_tokens: f64,

    /// Number of requests kept in flight
    #[arg(long = "num-concurrent-requests", default_value_t = 10)]
    pub num_concurrent_requests: usize,

    /// Seconds before the test stops
    #[arg(long, default_value = "90", value_parser = parse_seconds)]
    pub timeout: Duration,

    /// Stop once this many requests have completed
    #[arg(long = "max-num-completed-requests", default_value_t = 10)]
    pub max_num_completed_requests: usize,

    /// JSON object merged into every request's sampling parameters
    #[arg(long, default_value = "{}", value_parser = parse_json_object)]
    pub additional_sampling_params: Map<String, Value>,

    /// JSON object of extra HTTP headers
    #[arg(long, default_value = "{}", value_parser = parse_headers)]
    pub header_params: HashMap<String, String>,

    /// Prompt to send instead of a generated one
    #[arg(long)]
    pub custom_prompt: Option<String>,

    /// tokenizer.json (or a directory containing it) used to count tokens
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub no_verify_ssl: bool,

    /// Metadata added to the report, e.g. name=foo,bar=1
    #[arg(long)]
    pub metadata: Option<String>,

    /// Seed for prompt and output length sampling
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Seconds to wait for in-flight requests once the test stops
    #[arg(long, default_value = "10", value_parser = parse_seconds)]
    pub final_drain_grace: Duration,

    /// Directory to write the summary and individual responses to
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Validated load test configuration for these arguments
    pub fn to_config(&self) -> Result<LoadTestConfig> {
        let user_metadata = match &self.metadata {
            Some(raw) => parse_user_metadata(raw)?,
            None => Map::new(),
        };

        let config = LoadTestConfig {
            model: self.model.clone(),
            api: self.llm_api,
            endpoint: self.url.clone(),
            api_key: self.api_key.clone(),
            mean_input_tokens: self.mean_input_tokens,
            stddev_input_tokens: self.stddev_input_tokens,
            mean_output_tokens: self.mean_output_tokens,
            stddev_output_tokens: self.stddev_output_tokens,
            concurrency: self.num_concurrent_requests,
            max_completed_requests: self.max_num_completed_requests,
            timeout: self.timeout,
            additional_sampling_params: Value::Object(self.additional_sampling_params.clone()),
            custom_prompt: self.custom_prompt.clone(),
            tokenizer: self.tokenizer.clone(),
            headers: self.header_params.clone(),
            verify_ssl: !self.no_verify_ssl,
            user_metadata,
            seed: self.seed,
            final_drain_grace: self.final_drain_grace,
            ..LoadTestConfig::default()
        };

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn parse_seconds(raw: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = raw
        .parse()
        .map_err(|_| format!("`{raw}` is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("`{raw}` is not a valid duration"))
}

fn parse_json_object(raw: &str) -> std::result::Result<Map<String, Value>, String> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn parse_headers(raw: &str) -> std::result::Result<HashMap<String, String>, String> {
    parse_json_object(raw)?
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name, s)),
            Value::Number(n) => Ok((name, n.to_string())),
            Value::Bool(b) => Ok((name, b.to_string())),
            _ => Err(format!("header `{name}` must be a string")),
        })
        .collect()
}

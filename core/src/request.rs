//! Request types for benchmark operations

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Sampling parameters sent with every request (open key/value mapping)
pub type SamplingParams = Map<String, Value>;

/// Key that carries the per-request output token target
pub const MAX_TOKENS_KEY: &str = "max_tokens";

/// Completion API flavours the benchmark can target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    /// OpenAI chat completions API (also vLLM, SGLang, TGI in OpenAI mode)
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// LiteLLM proxy
    #[serde(rename = "litellm")]
    LiteLlm,
}

impl ApiKind {
    /// Identifier used on the command line and in reports
    pub fn id(&self) -> &'static str {
        match self {
            ApiKind::OpenAi => "openai",
            ApiKind::LiteLlm => "litellm",
        }
    }

    /// All supported APIs
    pub fn all() -> &'static [ApiKind] {
        &[ApiKind::OpenAi, ApiKind::LiteLlm]
    }
}

impl std::fmt::Display for ApiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for ApiKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ApiKind::all()
            .iter()
            .copied()
            .find(|api| api.id() == needle)
            .ok_or_else(|| RequestError::UnknownApi(s.to_string()))
    }
}

/// Prompt text together with its token count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Prompt text sent to the model
    pub text: String,
    /// Number of tokens in `text`, counted before the run starts
    pub input_tokens: usize,
}

impl Prompt {
    /// Create a new prompt
    pub fn new(text: impl Into<String>, input_tokens: usize) -> Self {
        Self {
            text: text.into(),
            input_tokens,
        }
    }
}

/// Request validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// Model identifier is empty
    #[error("model must not be empty")]
    EmptyModel,

    /// `max_tokens` missing from the sampling parameters
    #[error("sampling params must include `max_tokens`")]
    MissingMaxTokens,

    /// `max_tokens` present but not a positive integer
    #[error("`max_tokens` must be a positive integer, got {0}")]
    InvalidMaxTokens(Value),

    /// API identifier not recognised
    #[error("unknown llm api `{0}` (supported: openai, litellm)")]
    UnknownApi(String),
}

/// Immutable description of one completion call
///
/// Constructed through [`RequestSpec::builder`], which validates it.
/// One instance is consumed per call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSpec {
    model: String,
    prompt: Prompt,
    sampling_params: SamplingParams,
    api: ApiKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<HashMap<String, String>>,
    verify_ssl: bool,
}

impl RequestSpec {
    /// Start building a request for `model` with `prompt`
    pub fn builder(model: impl Into<String>, prompt: Prompt) -> RequestSpecBuilder {
        RequestSpecBuilder::new(model, prompt)
    }

    /// Check the invariants of a request spec
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.model.trim().is_empty() {
            return Err(RequestError::EmptyModel);
        }
        match self.sampling_params.get(MAX_TOKENS_KEY) {
            None => Err(RequestError::MissingMaxTokens),
            Some(value) => match value.as_u64() {
                Some(n) if n > 0 => Ok(()),
                _ => Err(RequestError::InvalidMaxTokens(value.clone())),
            },
        }
    }

    /// Model identifier
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Prompt text and token count
    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    /// Sampling parameters
    pub fn sampling_params(&self) -> &SamplingParams {
        &self.sampling_params
    }

    /// Requested maximum output tokens
    pub fn max_tokens(&self) -> Option<u64> {
        self.sampling_params
            .get(MAX_TOKENS_KEY)
            .and_then(Value::as_u64)
    }

    /// Target API
    pub fn api(&self) -> ApiKind {
        self.api
    }

    /// Caller-supplied metadata
    pub fn metadata(&self) -> Option<&HashMap<String, Value>> {
        self.metadata.as_ref()
    }

    /// Extra HTTP headers
    pub fn headers(&self) -> Option<&HashMap<String, String>> {
        self.headers.as_ref()
    }

    /// Whether TLS certificates are verified
    pub fn verify_ssl(&self) -> bool {
        self.verify_ssl
    }
}

/// Builder for [`RequestSpec`]
#[derive(Debug, Clone)]
pub struct RequestSpecBuilder {
    model: String,
    prompt: Prompt,
    sampling_params: SamplingParams,
    api: ApiKind,
    metadata: Option<HashMap<String, Value>>,
    headers: Option<HashMap<String, String>>,
    verify_ssl: bool,
}

impl RequestSpecBuilder {
    /// Create a new builder
    pub fn new(model: impl Into<String>, prompt: Prompt) -> Self {
        Self {
            model: model.into(),
            prompt,
            sampling_params: SamplingParams::new(),
            api: ApiKind::default(),
            metadata: None,
            headers: None,
            verify_ssl: true,
        }
    }

    /// Set the sampling parameters
    pub fn sampling_params(mut self, params: SamplingParams) -> Self {
        self.sampling_params = params;
        self
    }

    /// Set the target API
    pub fn api(mut self, api: ApiKind) -> Self {
        self.api = api;
        self
    }

    /// Attach metadata
    pub fn metadata(mut self, metadata: Option<HashMap<String, Value>>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach extra HTTP headers
    pub fn headers(mut self, headers: Option<HashMap<String, String>>) -> Self {
        self.headers = headers;
        self
    }

    /// Toggle TLS verification
    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = verify;
        self
    }

    /// Build and validate the request
    pub fn build(self) -> Result<RequestSpec, RequestError> {
        let spec = RequestSpec {
            model: self.model,
            prompt: self.prompt,
            sampling_params: self.sampling_params,
            api: self.api,
            metadata: self.metadata,
            headers: self.headers,
            verify_ssl: self.verify_ssl,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Merge the sampled output-token target with user sampling parameters
///
/// User-supplied keys override the base `{max_tokens: n}` mapping.
pub fn merge_sampling_params(max_tokens: usize, additional: &SamplingParams) -> SamplingParams {
    let mut params = SamplingParams::new();
    params.insert(MAX_TOKENS_KEY.to_string(), Value::from(max_tokens));
    for (key, value) in additional {
        params.insert(key.clone(), value.clone());
    }
    params
}

/// Everything a request needs besides its prompt and output target
///
/// The scheduler stamps one [`RequestSpec`] per iteration out of this template.
#[derive(Debug, Clone, Default)]
pub struct RequestTemplate {
    /// Model identifier
    pub model: String,
    /// Target API
    pub api: ApiKind,
    /// User sampling parameters merged into each request
    pub additional_sampling_params: SamplingParams,
    /// Optional request metadata
    pub metadata: Option<HashMap<String, Value>>,
    /// Optional extra HTTP headers
    pub headers: Option<HashMap<String, String>>,
    /// TLS verification
    pub verify_ssl: bool,
}

impl RequestTemplate {
    /// Create a template for `model` on `api` with TLS verification on
    pub fn new(model: impl Into<String>, api: ApiKind) -> Self {
        Self {
            model: model.into(),
            api,
            verify_ssl: true,
            ..Default::default()
        }
    }

    /// Build the request spec for one iteration
    pub fn stamp(&self, prompt: Prompt, max_tokens: usize) -> Result<RequestSpec, RequestError> {
        RequestSpec::builder(self.model.clone(), prompt)
            .sampling_params(merge_sampling_params(
                max_tokens,
                &self.additional_sampling_params,
            ))
            .api(self.api)
            .metadata(self.metadata.clone())
            .headers(self.headers.clone())
            .verify_ssl(self.verify_ssl)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prompt() -> Prompt {
        Prompt::new("Tell me a story", 4)
    }

    #[test]
    fn test_api_kind_from_str() {
        assert_eq!("openai".parse::<ApiKind>().unwrap(), ApiKind::OpenAi);
        assert_eq!("LiteLLM".parse::<ApiKind>().unwrap(), ApiKind::LiteLlm);
        assert!(matches!(
            "sagemaker".parse::<ApiKind>(),
            Err(RequestError::UnknownApi(_))
        ));
    }

    #[test]
    fn test_api_kind_serialization() {
        assert_eq!(serde_json::to_string(&ApiKind::OpenAi).unwrap(), "\"openai\"");
        assert_eq!(serde_json::to_string(&ApiKind::LiteLlm).unwrap(), "\"litellm\"");
    }

    #[test]
    fn test_builder_defaults() {
        let spec = RequestSpec::builder("llama-3", prompt())
            .sampling_params(merge_sampling_params(64, &SamplingParams::new()))
            .build()
            .unwrap();

        assert_eq!(spec.model(), "llama-3");
        assert_eq!(spec.api(), ApiKind::OpenAi);
        assert_eq!(spec.max_tokens(), Some(64));
        assert!(spec.verify_ssl());
        assert!(spec.headers().is_none());
    }

    #[test]
    fn test_missing_max_tokens_rejected() {
        let result = RequestSpec::builder("llama-3", prompt()).build();
        assert_eq!(result.unwrap_err(), RequestError::MissingMaxTokens);
    }

    #[test]
    fn test_invalid_max_tokens_rejected() {
        let mut params = SamplingParams::new();
        params.insert(MAX_TOKENS_KEY.into(), json!(0));
        let result = RequestSpec::builder("llama-3", prompt())
            .sampling_params(params)
            .build();
        assert!(matches!(result, Err(RequestError::InvalidMaxTokens(_))));

        let mut params = SamplingParams::new();
        params.insert(MAX_TOKENS_KEY.into(), json!("many"));
        let result = RequestSpec::builder("llama-3", prompt())
            .sampling_params(params)
            .build();
        assert!(matches!(result, Err(RequestError::InvalidMaxTokens(_))));
    }

    #[test]
    fn test_empty_model_rejected() {
        let result = RequestSpec::builder("  ", prompt())
            .sampling_params(merge_sampling_params(10, &SamplingParams::new()))
            .build();
        assert_eq!(result.unwrap_err(), RequestError::EmptyModel);
    }

    #[test]
    fn test_merge_user_params_override_base() {
        let mut additional = SamplingParams::new();
        additional.insert("temperature".into(), json!(0.2));
        additional.insert(MAX_TOKENS_KEY.into(), json!(7));

        let merged = merge_sampling_params(128, &additional);
        assert_eq!(merged.get(MAX_TOKENS_KEY), Some(&json!(7)));
        assert_eq!(merged.get("temperature"), Some(&json!(0.2)));
    }

    #[test]
    fn test_template_stamp() {
        let mut template = RequestTemplate::new("mistral", ApiKind::LiteLlm);
        template.verify_ssl = false;
        template.headers = Some(HashMap::from([("x-team".to_string(), "perf".to_string())]));

        let spec = template.stamp(prompt(), 99).unwrap();
        assert_eq!(spec.api(), ApiKind::LiteLlm);
        assert_eq!(spec.max_tokens(), Some(99));
        assert!(!spec.verify_ssl());
        assert_eq!(spec.headers().unwrap()["x-team"], "perf");
        assert_eq!(spec.prompt().input_tokens, 4);
    }
}

//! OpenAI-compatible streaming chat completions client
//!
//! Also serves LiteLLM proxies, which expose the same protocol.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use tokenbench_core::{
    ApiKind, Completion, CompletionClient, RawMetrics, RequestSpec, VendorError,
};

use crate::streaming::{extract_content, extract_error, SseEvent, SseParser, StreamTimer};

// ============================================================================
// Client Configuration
// ============================================================================

/// Connection settings shared by every client of a run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL, e.g. `http://localhost:8000/v1`
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Per-request timeout (whole streamed response)
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// User agent sent with every request
    pub user_agent: String,
}

impl ClientConfig {
    /// Config for `base_url` with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Chat completions URL derived from the base URL.
    pub fn chat_completions_url(&self) -> Result<String, VendorError> {
        let base = self.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(VendorError::Config(
                "API base URL is required (set OPENAI_API_BASE or --url)".to_string(),
            ));
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(VendorError::Config(format!(
                "API base URL must start with http:// or https://: {base}"
            )));
        }
        Ok(format!("{base}/chat/completions"))
    }

    fn http_client(&self, accept_invalid_certs: bool) -> Result<Client, VendorError> {
        Ok(Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(&self.user_agent)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            request_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 32,
            user_agent: format!("tokenbench/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// Streaming chat completions client.
///
/// Cloning is cheap; clones share connection pools.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api: ApiKind,
    url: String,
    api_key: Option<String>,
    http: Client,
    http_insecure: Client,
}

impl OpenAiClient {
    /// Build a client speaking `api`.
    pub fn new(api: ApiKind, config: &ClientConfig) -> Result<Self, VendorError> {
        Ok(Self {
            api,
            url: config.chat_completions_url()?,
            api_key: config.api_key.clone(),
            http: config.http_client(false)?,
            http_insecure: config.http_client(true)?,
        })
    }

    /// Endpoint requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn stream_completion(
        &self,
        request: &RequestSpec,
        start: Instant,
    ) -> Result<(StreamTimer, String), VendorError> {
        let http = if request.verify_ssl() {
            &self.http
        } else {
            &self.http_insecure
        };

        let mut builder = http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request_body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        for (name, value) in request.headers().into_iter().flatten() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut timer = StreamTimer::new(start);
        let mut text = String::new();
        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();

        'stream: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in parser.feed(&chunk)? {
                let data = match event {
                    SseEvent::Done => break 'stream,
                    SseEvent::Data(data) => data,
                };
                let value: Value = serde_json::from_str(&data).map_err(|e| {
                    VendorError::InvalidResponse(format!("malformed chunk: {e}"))
                })?;
                if let Some(error) = extract_error(&value) {
                    return Err(error);
                }
                if let Some(content) = extract_content(&value) {
                    timer.on_content(Instant::now());
                    text.push_str(content);
                }
            }
        }

        trace!(chunks = timer.chunks(), "Stream finished");
        Ok((timer, text))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn api(&self) -> ApiKind {
        self.api
    }

    async fn execute(&self, request: &RequestSpec) -> Result<Completion, VendorError> {
        let start = Instant::now();
        let (timer, text) = self.stream_completion(request, start).await?;
        let e2e = start.elapsed().as_secs_f64();

        debug!(
            model = request.model(),
            e2e_s = e2e,
            ttft_s = ?timer.ttft_s(),
            chunks = timer.chunks(),
            "Completion finished"
        );

        let metrics = RawMetrics {
            ttft_s: timer.ttft_s(),
            inter_token_latency_sum_s: timer.inter_token_sum_s(),
            e2e_latency_s: e2e,
            input_tokens: request.prompt().input_tokens,
            error_code: None,
            error_msg: None,
        };
        Ok(Completion::new(metrics, text))
    }
}

/// JSON body of a streaming chat completion request.
///
/// Sampling params are merged at the top level; `stream` is always on.
pub fn request_body(request: &RequestSpec) -> Value {
    let mut body = Map::new();
    body.insert("model".into(), json!(request.model()));
    body.insert(
        "messages".into(),
        json!([{"role": "user", "content": request.prompt().text}]),
    );
    for (key, value) in request.sampling_params() {
        body.insert(key.clone(), value.clone());
    }
    body.insert("stream".into(), Value::Bool(true));
    Value::Object(body)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokenbench_core::{ErrorCode, Prompt, RequestTemplate};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    // ========================================================================
    // Mock server
    // ========================================================================

    /// Accept one connection, answer with `status` and `body`, return the raw request.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: String,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });

        (format!("http://{addr}/v1/"), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).into_owned();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn sse(chunks: &[Value]) -> String {
        let mut body: String = chunks.iter().map(|c| format!("data: {c}\n\n")).collect();
        body.push_str("data: [DONE]\n\n");
        body
    }

    fn request() -> RequestSpec {
        let mut template = RequestTemplate::new("test-model", ApiKind::OpenAi);
        template
            .additional_sampling_params
            .insert("temperature".into(), json!(0.2));
        template.headers = Some(HashMap::from([("x-team".to_string(), "bench".to_string())]));
        template.stamp(Prompt::new("Say hello", 3), 16).unwrap()
    }

    fn client(base_url: &str) -> OpenAiClient {
        let config = ClientConfig::new(base_url).with_api_key(Some("sk-test".into()));
        OpenAiClient::new(ApiKind::OpenAi, &config).unwrap()
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    #[test]
    fn test_chat_completions_url() {
        let config = ClientConfig::new("http://localhost:8000/v1/");
        assert_eq!(
            config.chat_completions_url().unwrap(),
            "http://localhost:8000/v1/chat/completions"
        );

        match ClientConfig::new("").chat_completions_url() {
            Err(VendorError::Config(message)) => {
                assert!(message.contains("--url"), "{message}");
                assert!(message.contains("OPENAI_API_BASE"), "{message}");
            }
            other => panic!("expected config error, got {other:?}"),
        }
        assert!(matches!(
            ClientConfig::new("localhost:8000").chat_completions_url(),
            Err(VendorError::Config(_))
        ));
    }

    #[test]
    fn test_empty_api_key_ignored() {
        let config = ClientConfig::new("http://x").with_api_key(Some(String::new()));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_request_body() {
        let body = request_body(&request());

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Say hello");
        assert_eq!(body["max_tokens"], 16);
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["stream"], true);
    }

    // ========================================================================
    // Streaming
    // ========================================================================

    #[tokio::test]
    async fn test_streamed_completion() {
        let body = sse(&[
            json!({"choices": [{"delta": {"role": "assistant"}}]}),
            json!({"choices": [{"delta": {"content": "Hello"}}]}),
            json!({"choices": [{"delta": {"content": " world"}}]}),
        ]);
        let (base_url, server) = serve_once("200 OK", "text/event-stream", body).await;

        let completion = client(&base_url).execute(&request()).await.unwrap();
        let raw_request = server.await.unwrap().to_lowercase();

        assert_eq!(completion.generated_text, "Hello world");
        assert!(completion.metrics.ttft_s.is_some());
        assert!(completion.metrics.error_code.is_none());
        assert_eq!(completion.metrics.input_tokens, 3);
        assert!(completion.metrics.e2e_latency_s >= completion.metrics.ttft_s.unwrap());

        assert!(raw_request.starts_with("post /v1/chat/completions"));
        assert!(raw_request.contains("authorization: bearer sk-test"));
        assert!(raw_request.contains("x-team: bench"));
        assert!(raw_request.contains("\"stream\":true"));
        assert!(raw_request.contains("\"max_tokens\":16"));
    }

    #[tokio::test]
    async fn test_stream_without_content() {
        let body = sse(&[json!({"choices": [{"delta": {"role": "assistant"}}]})]);
        let (base_url, server) = serve_once("200 OK", "text/event-stream", body).await;

        let completion = client(&base_url).execute(&request()).await.unwrap();
        server.await.unwrap();

        assert!(completion.generated_text.is_empty());
        assert!(completion.metrics.ttft_s.is_none());
        assert_eq!(completion.metrics.inter_token_latency_sum_s, 0.0);
    }

    #[tokio::test]
    async fn test_error_status() {
        let (base_url, server) =
            serve_once("429 Too Many Requests", "text/plain", "slow down".into()).await;

        let err = client(&base_url).execute(&request()).await.unwrap_err();
        server.await.unwrap();

        match &err {
            VendorError::Status { status, body } => {
                assert_eq!(*status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert_eq!(err.to_error_code(), ErrorCode::Http(429));
    }

    #[tokio::test]
    async fn test_error_chunk_in_stream() {
        let body = sse(&[
            json!({"choices": [{"delta": {"content": "Hi"}}]}),
            json!({"error": {"message": "overloaded", "code": 503}}),
        ]);
        let (base_url, server) = serve_once("200 OK", "text/event-stream", body).await;

        let err = client(&base_url).execute(&request()).await.unwrap_err();
        server.await.unwrap();

        assert_eq!(err.to_error_code(), ErrorCode::Http(503));
    }

    #[tokio::test]
    async fn test_malformed_chunk() {
        let (base_url, server) =
            serve_once("200 OK", "text/event-stream", "data: {not json\n\n".into()).await;

        let err = client(&base_url).execute(&request()).await.unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, VendorError::InvalidResponse(_)));
        assert_eq!(err.to_error_code(), ErrorCode::InvalidResponse);
    }
}

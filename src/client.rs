use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::UsagePolicy;
use crate::metrics::ErrorType;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP {status} client error: {message}")]
    Http4xx { status: u16, message: String },

    #[error("HTTP {status} server error: {message}")]
    Http5xx { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Response is missing usage metadata: {0}")]
    MissingUsage(&'static str),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Other error: {0}")]
    Other(String),
}

impl ClientError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            ClientError::Connection(_) => ErrorType::Connection,
            ClientError::Http4xx { status, .. } => ErrorType::Http4xx(*status),
            ClientError::Http5xx { status, .. } => ErrorType::Http5xx(*status),
            ClientError::Parse(_) | ClientError::MissingUsage(_) => ErrorType::Parse,
            ClientError::Timeout(_) => ErrorType::Timeout,
            ClientError::Other(_) => ErrorType::Other,
        }
    }

    /// Classifies a transport error from reqwest.
    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            ClientError::Timeout(timeout)
        } else if e.is_connect() {
            ClientError::Connection(e.to_string())
        } else if e.is_decode() || e.is_body() {
            ClientError::Parse(e.to_string())
        } else if e.is_request() {
            let err_msg = e.to_string();
            if err_msg.contains("connection closed")
                || err_msg.contains("connection reset")
                || err_msg.contains("broken pipe")
                || err_msg.contains("connection refused")
            {
                ClientError::Connection(format!("Request error: {}", e))
            } else {
                ClientError::Other(format!("Request error: {}", e))
            }
        } else {
            ClientError::Other(e.to_string())
        }
    }

    /// Builds the error for a non-success status from the response body text.
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        if (400..500).contains(&status) {
            ClientError::Http4xx { status, message }
        } else if (500..600).contains(&status) {
            ClientError::Http5xx { status, message }
        } else {
            ClientError::Other(format!("HTTP {}: {}", status, message))
        }
    }
}

// Request types for OpenAI Chat Completions API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    // Reasoning models may return null content when the budget is spent thinking
    #[serde(default)]
    pub content: Option<String>,
}

// Response types
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Usage metadata as sent on the wire. Servers are not consistent about
/// which counters they include, so every field is optional here and the
/// usage policy decides what a gap means.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// Token counters after the usage policy has been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prompt={} completion={} total={}",
            self.prompt_tokens, self.completion_tokens, self.total_tokens
        )
    }
}

impl ChatCompletionResponse {
    /// Content of the first choice; `None` when the server returned no choices.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|choice| choice.message.content.as_deref().unwrap_or(""))
    }

    pub fn token_usage(&self, policy: UsagePolicy) -> Result<TokenUsage, ClientError> {
        let usage = match (&self.usage, policy) {
            (Some(usage), _) => usage.clone(),
            (None, UsagePolicy::Tolerate) => Usage::default(),
            (None, UsagePolicy::Require) => return Err(ClientError::MissingUsage("usage")),
        };

        if policy == UsagePolicy::Require {
            if usage.prompt_tokens.is_none() {
                return Err(ClientError::MissingUsage("usage.prompt_tokens"));
            }
            if usage.completion_tokens.is_none() {
                return Err(ClientError::MissingUsage("usage.completion_tokens"));
            }
        }

        let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
        let completion_tokens = usage.completion_tokens.unwrap_or(0);
        Ok(TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: usage
                .total_tokens
                .unwrap_or(prompt_tokens + completion_tokens),
        })
    }
}

// Models list response
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<Model>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub owned_by: Option<String>,
}

/// One decoded chat completion with its wall-clock time.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: Option<String>,
    pub usage: TokenUsage,
    pub elapsed: Duration,
}

/// Configuration for creating an inference client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server root, e.g. `http://localhost:8000` (no `/v1` suffix)
    pub base_url: String,
    /// Model name to use for requests
    pub model: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// How to treat responses without usage metadata
    pub usage_policy: UsagePolicy,
}

/// Client for the `/v1/chat/completions` endpoint.
///
/// Idle connections are never kept, so every call opens its own connection
/// and measures a full round trip.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
    usage_policy: UsagePolicy,
}

impl InferenceClient {
    /// Creates a client for an OpenAI-compatible server.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vllm_bench::client::{ClientConfig, InferenceClient};
    /// use vllm_bench::config::UsagePolicy;
    /// use std::time::Duration;
    ///
    /// let client = InferenceClient::new(ClientConfig {
    ///     base_url: "http://localhost:8000".to_string(),
    ///     model: "Kimi-K2.5".to_string(),
    ///     timeout: Duration::from_secs(300),
    ///     usage_policy: UsagePolicy::Tolerate,
    /// })
    /// .unwrap();
    /// ```
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| ClientError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            timeout: config.timeout,
            usage_policy: config.usage_policy,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn create_request(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
            }],
            max_tokens,
            temperature,
            stream: false,
        }
    }

    /// Sends one non-streaming request and reads the full body.
    ///
    /// The clock starts right before the request is sent and stops once the
    /// body has been read, before JSON decoding.
    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<Completion, ClientError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(ClientError::from_status(status.as_u16(), text));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::from_reqwest(e, self.timeout))?;
        let elapsed = start.elapsed();

        let completion: ChatCompletionResponse =
            serde_json::from_slice(&body).map_err(|e| ClientError::Parse(e.to_string()))?;
        let usage = completion.token_usage(self.usage_policy)?;

        log::debug!(
            "chat completion finished in {:.3}s ({} prompt / {} completion tokens)",
            elapsed.as_secs_f64(),
            usage.prompt_tokens,
            usage.completion_tokens
        );

        Ok(Completion {
            content: completion.content().map(str::to_string),
            usage,
            elapsed,
        })
    }
}

/// Lists the models served at `base_url` with its own short-lived client.
pub async fn list_models(base_url: &str, timeout: Duration) -> Result<Vec<Model>, ClientError> {
    let client = Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(0)
        .build()
        .map_err(|e| ClientError::Other(format!("failed to build HTTP client: {}", e)))?;

    let url = format!("{}/v1/models", base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ClientError::from_reqwest(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response".to_string());
        return Err(ClientError::from_status(status.as_u16(), text));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ClientError::from_reqwest(e, timeout))?;
    let models: ModelsResponse = serde_json::from_slice(&body)
        .map_err(|e| ClientError::Parse(format!("invalid models response: {}", e)))?;

    Ok(models.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer, policy: UsagePolicy) -> InferenceClient {
        InferenceClient::new(ClientConfig {
            base_url: server.base_url(),
            model: "Kimi-K2.5".to_string(),
            timeout: Duration::from_secs(5),
            usage_policy: policy,
        })
        .expect("client init")
    }

    #[test]
    fn test_request_body_shape() {
        let client = InferenceClient::new(ClientConfig {
            base_url: "http://localhost:8000/".to_string(),
            model: "Kimi-K2.5".to_string(),
            timeout: Duration::from_secs(5),
            usage_policy: UsagePolicy::Tolerate,
        })
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");

        let request = client.create_request("Hello", 128, 0.0);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "Kimi-K2.5",
                "messages": [{ "role": "user", "content": "Hello" }],
                "max_tokens": 128,
                "temperature": 0.0,
                "stream": false
            })
        );
    }

    #[tokio::test]
    async fn test_round_trip() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .json_body(json!({
                        "model": "Kimi-K2.5",
                        "messages": [{ "role": "user", "content": "What is 2 + 2?" }],
                        "max_tokens": 1024,
                        "temperature": 0.7,
                        "stream": false
                    }));
                then.status(200).json_body(json!({
                    "id": "cmpl-1",
                    "object": "chat.completion",
                    "model": "Kimi-K2.5",
                    "choices": [{
                        "index": 0,
                        "message": { "role": "assistant", "content": "Four." },
                        "finish_reason": "stop"
                    }],
                    "usage": { "prompt_tokens": 14, "completion_tokens": 3, "total_tokens": 17 }
                }));
            })
            .await;

        let client = client_for(&server, UsagePolicy::Require);
        let request = client.create_request("What is 2 + 2?", 1024, 0.7);
        let completion = client.chat_completion(&request).await.expect("request should succeed");

        assert_eq!(completion.content.as_deref(), Some("Four."));
        assert_eq!(
            completion.usage,
            TokenUsage {
                prompt_tokens: 14,
                completion_tokens: 3,
                total_tokens: 17
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_usage_tolerated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": null } }]
                }));
            })
            .await;

        let client = client_for(&server, UsagePolicy::Tolerate);
        let request = client.create_request("Hi", 64, 0.0);
        let completion = client.chat_completion(&request).await.unwrap();
        assert_eq!(completion.usage, TokenUsage::default());
        assert_eq!(completion.content.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_missing_usage_required() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "ok" } }],
                    "usage": { "prompt_tokens": 4 }
                }));
            })
            .await;

        let client = client_for(&server, UsagePolicy::Require);
        let request = client.create_request("Hi", 64, 0.0);
        let err = client.chat_completion(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::MissingUsage("usage.completion_tokens")
        ));
    }

    #[tokio::test]
    async fn test_http_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(503).body("model is loading");
            })
            .await;

        let client = client_for(&server, UsagePolicy::Tolerate);
        let request = client.create_request("Hi", 64, 0.0);
        match client.chat_completion(&request).await {
            Err(ClientError::Http5xx { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "model is loading");
            }
            other => panic!("expected 5xx error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let client = client_for(&server, UsagePolicy::Tolerate);
        let request = client.create_request("Hi", 64, 0.0);
        let err = client.chat_completion(&request).await.unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
        assert!(matches!(err.error_type(), ErrorType::Parse));
    }

    #[tokio::test]
    async fn test_empty_choices_has_no_content() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [],
                    "usage": { "prompt_tokens": 4, "completion_tokens": 0 }
                }));
            })
            .await;

        let client = client_for(&server, UsagePolicy::Tolerate);
        let request = client.create_request("Hi", 64, 0.0);
        let completion = client.chat_completion(&request).await.unwrap();
        assert_eq!(completion.content, None);
        assert_eq!(completion.usage.total_tokens, 4);
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let client = InferenceClient::new(ClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            model: "m".to_string(),
            timeout: Duration::from_secs(2),
            usage_policy: UsagePolicy::Tolerate,
        })
        .unwrap();
        let request = client.create_request("Hi", 8, 0.0);
        let err = client.chat_completion(&request).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Connection(_) | ClientError::Other(_)
        ));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ClientError::from_status(404, String::new()),
            ClientError::Http4xx { status: 404, .. }
        ));
        assert!(matches!(
            ClientError::from_status(500, String::new()),
            ClientError::Http5xx { status: 500, .. }
        ));
        assert!(matches!(
            ClientError::from_status(302, String::new()),
            ClientError::Other(_)
        ));
    }
}

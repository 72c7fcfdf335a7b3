//! Language-model completion client.
//!
//! [`CompletionClient`] is the seam the summarizer and categorizer call
//! through. [`OpenAiClient`] speaks the OpenAI-compatible chat-completions
//! protocol with bounded retries: a 429 waits the rate-limit backoff, 5xx and
//! transport errors wait the error backoff, other 4xx fail immediately.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use toolharvest_shared::{LlmClientConfig, Result, ToolHarvestError};

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// One completion request: fixed system role, an instruction, the input text
/// appended to it, and sampling parameters.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub instruction: String,
    pub input: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Token counters reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Generated text plus usage.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// A language-model completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible transport
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// How a single HTTP attempt failed.
enum AttemptError {
    RateLimited(String),
    Transient(String),
    Fatal(ToolHarvestError),
}

/// Client for `POST {base_url}/chat/completions` with bearer auth.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    config: LlmClientConfig,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, config: LlmClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ToolHarvestError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
        })
    }

    async fn send_once(
        &self,
        endpoint: &str,
        body: &ChatRequest<'_>,
    ) -> std::result::Result<Completion, AttemptError> {
        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(self.api_key.trim())
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::RateLimited(format!("HTTP {status}")));
        }
        if status.is_server_error() {
            return Err(AttemptError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(AttemptError::Fatal(ToolHarvestError::Llm(format!(
                "completion service returned {status}: {text}"
            ))));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| {
            AttemptError::Fatal(ToolHarvestError::Llm(format!(
                "failed to parse completion response: {e}"
            )))
        })?;
        let text = parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .unwrap_or_default();
        Ok(Completion {
            text: text.trim().to_string(),
            usage: parsed.usage,
        })
    }

    fn log_usage(&self, usage: &TokenUsage) {
        let cost = usage.total_tokens as f64 / 1000.0 * self.config.cost_per_1k_tokens;
        info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            estimated_cost_usd = cost,
            "completion usage"
        );
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.config.model, temperature = request.temperature))]
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let endpoint = format!("{}/chat/completions", self.config.base_url);
        let user = format!("{}{}", request.instruction, request.input);
        let body = ChatRequest {
            model: &self.config.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
        };

        let mut retries = 0u32;
        loop {
            let (backoff, reason) = match self.send_once(&endpoint, &body).await {
                Ok(completion) => {
                    self.log_usage(&completion.usage);
                    debug!(chars = completion.text.len(), "completion received");
                    return Ok(completion);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::RateLimited(reason)) => (self.config.rate_limit_backoff, reason),
                Err(AttemptError::Transient(reason)) => (self.config.error_backoff, reason),
            };

            if retries >= self.config.max_retries {
                return Err(ToolHarvestError::Llm(format!(
                    "completion failed after {retries} retries: {reason}"
                )));
            }
            retries += 1;
            warn!(retry = retries, backoff_secs = backoff.as_secs(), %reason, "completion failed, retrying");
            tokio::time::sleep(backoff).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted client: replays responses in order and records requests.
    /// `None` entries simulate a failed request.
    pub(crate) struct ScriptedClient {
        responses: Mutex<VecDeque<Option<String>>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        pub(crate) fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = Option<S>>,
            S: Into<String>,
        {
            Self {
                responses: Mutex::new(responses.into_iter().map(|r| r.map(Into::into)).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            self.requests.lock().unwrap().push(request.clone());
            match self.responses.lock().unwrap().pop_front() {
                Some(Some(text)) => Ok(Completion {
                    text,
                    usage: TokenUsage::default(),
                }),
                Some(None) => Err(ToolHarvestError::Llm("scripted failure".into())),
                None => Err(ToolHarvestError::Llm("script exhausted".into())),
            }
        }
    }

    fn config(base_url: String, max_retries: u32) -> LlmClientConfig {
        LlmClientConfig {
            base_url,
            model: "gpt-test".into(),
            request_timeout: Duration::from_secs(5),
            max_retries,
            rate_limit_backoff: Duration::ZERO,
            error_backoff: Duration::ZERO,
            cost_per_1k_tokens: 0.002,
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "You are a test.".into(),
            instruction: "Summarize: ".into(),
            input: "hello".into(),
            temperature: 0.5,
            max_tokens: 64,
        }
    }

    fn ok_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        })
    }

    #[tokio::test]
    async fn sends_chat_request_and_reads_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-test",
                "max_tokens": 64,
                "messages": [
                    { "role": "system", "content": "You are a test." },
                    { "role": "user", "content": "Summarize: hello" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("  A summary.  ")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new("test-key", config(server.uri(), 3)).unwrap();
        let completion = client.complete(&request()).await.unwrap();
        assert_eq!(completion.text, "A summary.");
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn retries_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("done")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new("k", config(server.uri(), 3)).unwrap();
        assert_eq!(client.complete(&request()).await.unwrap().text, "done");
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = OpenAiClient::new("k", config(server.uri(), 2)).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, ToolHarvestError::Llm(_)));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new("k", config(server.uri(), 5)).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("bad key"));
    }
}

//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Two client paths against the same endpoint:
//!
//! - **streaming**: `stream: true`, reply decoded from Server-Sent Events
//!   into text fragments as they arrive;
//! - **one-shot**: the older request/response form, whole reply in one body.
//!
//! The provider chain uses a one-shot instance as fallback behind a
//! streaming one. All OpenAI wire types are private to this module.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::stream::{SseData, sse_fragments};
use crate::llm::{ChatRequest, Completion, ProviderError};
use crate::session::Message;

/// Hard timeout for the reachability check, independent of request timeout.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Covers OpenAI, OpenAI-compatible local servers (Ollama, LM Studio…),
/// and hosted alternatives. Constructed once at startup, then cheaply cloned
/// because `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_base_url: String,
    timeout_seconds: u64,
    api_key: String,
    streaming: bool,
}

impl OpenAiCompatibleProvider {
    /// Build a provider for `api_base_url` (the full completions endpoint).
    ///
    /// `api_key` is sent as `Authorization: Bearer <key>`; an empty key is a
    /// configuration error, reported before any request is made.
    pub fn new(
        api_base_url: String,
        api_key: String,
        timeout_seconds: u64,
        streaming: bool,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(ProviderError::Config("OPENAI_API_KEY is missing or empty".into()));
        }
        reqwest::Url::parse(&api_base_url)
            .map_err(|e| ProviderError::Config(format!("invalid api_base_url '{api_base_url}': {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, api_base_url, timeout_seconds, api_key, streaming })
    }

    pub fn label(&self) -> &'static str {
        if self.streaming { "openai" } else { "openai-oneshot" }
    }

    /// Lightweight reachability check.
    ///
    /// Sends a HEAD request to the configured endpoint.  Any HTTP response
    /// (including 4xx) means the server is reachable.  Only a transport-level
    /// failure (connection refused, timeout) is treated as unreachable.
    pub async fn ping(&self) -> Result<String, ProviderError> {
        let client = Client::builder()
            .timeout(PING_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build ping client: {e}")))?;
        let response = client
            .head(&self.api_base_url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("unreachable: {e}")))?;
        Ok(format!("{} reachable (HTTP {})", self.api_base_url, response.status()))
    }

    /// Start a completion. Streams when both this provider and the request
    /// ask for it; otherwise waits for the whole reply.
    pub async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let stream = self.streaming && request.stream;
        let payload = ChatCompletionRequest::new(request, stream);

        debug!(
            provider = self.label(),
            model = %payload.model,
            messages = payload.messages.len(),
            temperature = payload.temperature,
            max_tokens = payload.max_tokens,
            stream,
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).bearer_auth(&self.api_key).json(&payload);
        if stream {
            req = req.header(reqwest::header::ACCEPT, "text/event-stream");
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
            if e.is_timeout() {
                ProviderError::Request(format!("timed out after {}s", self.timeout_seconds))
            } else {
                ProviderError::Request(e.to_string())
            }
        })?;

        let response = check_status(response).await?;

        if stream {
            return Ok(Completion::Stream(sse_fragments(response.bytes_stream(), parse_chunk)));
        }

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");

        // Empty content is not an error here: the chat layer records a placeholder.
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(Completion::Text(text))
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(request: &'a ChatRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One `data:` payload of a streamed reply.
#[derive(Debug, Deserialize)]
struct ChunkEnvelope {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

fn parse_chunk(payload: &str) -> Result<SseData, ProviderError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(SseData::Skip);
    }
    if payload == "[DONE]" {
        return Ok(SseData::Done);
    }
    let chunk: ChunkEnvelope = serde_json::from_str(payload)
        .map_err(|e| ProviderError::Stream(format!("malformed stream chunk: {e}")))?;
    if let Some(err) = chunk.error {
        return Err(ProviderError::Stream(err.message));
    }
    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(text) if !text.is_empty() => Ok(SseData::Fragment(text)),
        _ => Ok(SseData::Skip),
    }
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = describe_error_body(status, &body);
    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}

fn describe_error_body(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {}", body.trim())
    }
}

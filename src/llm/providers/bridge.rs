//! Headless chat bridge provider.
//!
//! Talks to a small HTTP service that drives a browser-automated chat session.
//! The bridge keeps its own conversation state, so only the latest user
//! message is sent as `prompt`.
//!
//! Endpoints (relative to the normalised base URL):
//!
//! | method | path        | purpose                                   |
//! |--------|-------------|-------------------------------------------|
//! | POST   | `/queryAi`  | `{prompt, model, newChatIfMissing}`       |
//! | GET    | `/health`   | liveness                                  |
//! | GET    | `/start`    | launch the automated browser              |
//! | POST   | `/newChat`  | open a fresh conversation                 |
//! | POST   | `/retry`    | regenerate the last answer                |
//! | POST   | `/selectChat` | `{chatId}`: switch conversation         |
//! | GET    | `/currentChatList` | `{chats: [...]}`                   |
//! | GET    | `/currentGptList`  | `{models: [...]}`                  |
//!
//! Replies are JSON carrying `answer`, `text` or `result`, or plain text.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::llm::{ChatRequest, Completion, ProviderError};
use crate::session::Role;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON fields that may hold the answer, in lookup order.
const ANSWER_FIELDS: &[&str] = &["answer", "text", "result"];

#[derive(Debug, Clone)]
pub struct BridgeProvider {
    client: Client,
    base_url: String,
    timeout_seconds: u64,
    new_chat_if_missing: bool,
}

impl BridgeProvider {
    pub fn new(
        base_url: &str,
        timeout_seconds: u64,
        new_chat_if_missing: bool,
    ) -> Result<Self, ProviderError> {
        let base_url = normalize_base_url(base_url);
        let parsed = reqwest::Url::parse(&base_url)
            .map_err(|e| ProviderError::Config(format!("invalid bridge url '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProviderError::Config(format!(
                "bridge url must be http(s), got '{base_url}'"
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url, timeout_seconds, new_chat_if_missing })
    }

    pub fn query_endpoint(&self) -> String {
        self.endpoint("queryAi")
    }

    pub fn health_endpoint(&self) -> String {
        self.endpoint("health")
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Send the latest user message and wait for the whole answer.
    pub async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .ok_or_else(|| ProviderError::Request("no user message to send".into()))?;

        let body = QueryBody {
            prompt,
            model: &request.model,
            new_chat_if_missing: self.new_chat_if_missing,
        };
        debug!(url = %self.query_endpoint(), model = %request.model, prompt_len = prompt.len(), "sending bridge query");

        let response = self
            .client
            .post(self.query_endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let text = read_success_body(response).await?;
        Ok(Completion::Text(extract_answer(&text)))
    }

    /// `GET /health`; any 2xx is healthy and its body is shown verbatim.
    pub async fn health(&self) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(self.health_endpoint())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("unreachable: {e}")))?;
        let status = response.status();
        let body = read_success_body(response).await?;
        Ok(format!("bridge HTTP {status}: {}", body.trim()))
    }

    /// Ask the bridge to launch its browser session.
    pub async fn start(&self) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(self.endpoint("start"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = read_success_body(response).await?;
        info!(url = %self.base_url, "bridge browser started");
        Ok(status_text(&body))
    }

    /// Open a new conversation on the bridge side.
    pub async fn new_chat(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.endpoint("newChat"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        read_success_body(response).await?;
        info!(url = %self.base_url, "bridge conversation reset");
        Ok(())
    }

    /// Have the bridge regenerate its last answer; returns the new answer.
    pub async fn retry(&self) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.endpoint("retry"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = read_success_body(response).await?;
        debug!(url = %self.base_url, "bridge answer regenerated");
        Ok(extract_answer(&body))
    }

    /// Switch the bridge to an existing conversation.
    pub async fn select_chat(&self, chat_id: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.endpoint("selectChat"))
            .json(&SelectChatBody { chat_id })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = read_success_body(response).await?;
        info!(url = %self.base_url, %chat_id, "bridge conversation selected");
        Ok(extract_answer(&body))
    }

    /// Conversations visible in the bridge's browser session.
    pub async fn chat_list(&self) -> Result<Vec<String>, ProviderError> {
        self.fetch_list("currentChatList", "chats").await
    }

    /// Models offered by the bridge's chat page.
    pub async fn gpt_list(&self) -> Result<Vec<String>, ProviderError> {
        self.fetch_list("currentGptList", "models").await
    }

    async fn fetch_list(&self, path: &str, field: &str) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = read_success_body(response).await?;
        list_field(&body, field)
    }

    fn transport_error(&self, e: reqwest::Error) -> ProviderError {
        error!(url = %self.base_url, error = %e, "bridge request failed (transport)");
        if e.is_timeout() {
            ProviderError::Request(format!("bridge timed out after {}s", self.timeout_seconds))
        } else {
            ProviderError::Request(format!("bridge unreachable: {e}"))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    prompt: &'a str,
    model: &'a str,
    new_chat_if_missing: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectChatBody<'a> {
    chat_id: &'a str,
}

/// Strip surrounding whitespace and every trailing `/`.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Pull the answer out of a bridge reply body.
///
/// A JSON object yields its first present field of `answer`, `text`,
/// `result` (non-string values are rendered as JSON); a bare JSON string is
/// unwrapped; anything else is the answer verbatim.
pub fn extract_answer(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ANSWER_FIELDS
            .iter()
            .find_map(|k| map.get(*k))
            .map(value_text)
            .unwrap_or_else(|| body.to_string()),
        Ok(Value::String(s)) => s,
        _ => body.to_string(),
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Entries of the array under `field`; strings as-is, anything else as JSON.
fn list_field(body: &str, field: &str) -> Result<Vec<String>, ProviderError> {
    let parsed: Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::Request(format!("bridge list is not JSON: {e}")))?;
    match parsed.get(field) {
        Some(Value::Array(items)) => Ok(items.iter().map(value_text).collect()),
        Some(Value::Null) => Ok(Vec::new()),
        _ => Err(ProviderError::Request(format!("bridge reply has no '{field}' array"))),
    }
}

fn status_text(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("status")
            .map(value_text)
            .unwrap_or_else(|| body.trim().to_string()),
        _ => body.trim().to_string(),
    }
}

/// Return the body of a 2xx response, or the bridge's error message.
async fn read_success_body(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::Request(format!("failed to read bridge body: {e}")))?;
    if status.is_success() {
        return Ok(body);
    }

    let message = match serde_json::from_str::<Value>(&body) {
        Ok(Value::Object(map)) => map
            .get("error")
            .map(value_text)
            .unwrap_or_else(|| body.trim().to_string()),
        _ => body.trim().to_string(),
    };
    error!(%status, %message, "bridge returned HTTP error");
    Err(ProviderError::Request(format!("bridge HTTP {status}: {message}")))
}

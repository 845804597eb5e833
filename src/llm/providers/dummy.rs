//! Dummy LLM provider: echoes the latest user message prefixed with `[echo]`.
//! Used to exercise a full chat turn without a real API key.

use crate::llm::{ChatRequest, Completion, ProviderError};
use crate::session::Role;

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let content = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(Completion::Text(format!("[echo] {content}")))
    }

    pub async fn ping(&self) -> Result<String, ProviderError> {
        Ok("dummy provider ready".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;

    fn request(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".into(),
            messages,
            temperature: 0.0,
            max_output_tokens: 128,
            stream: false,
        }
    }

    async fn text(p: &DummyProvider, req: &ChatRequest) -> String {
        match p.complete(req).await.unwrap() {
            Completion::Text(t) => t,
            Completion::Stream(_) => panic!("dummy never streams"),
        }
    }

    #[tokio::test]
    async fn echoes_latest_user_message() {
        let req = request(vec![
            Message::new(Role::System, "sys"),
            Message::new(Role::User, "first"),
            Message::new(Role::Assistant, "[echo] first"),
            Message::new(Role::User, "hello"),
        ]);
        assert_eq!(text(&DummyProvider, &req).await, "[echo] hello");
    }

    #[tokio::test]
    async fn no_user_message_echoes_empty() {
        let req = request(vec![Message::new(Role::System, "sys")]);
        assert_eq!(text(&DummyProvider, &req).await, "[echo] ");
    }
}

//! One interactive chat session: a transcript plus the providers that answer it.
//!
//! A turn appends the user message, sends the whole transcript, drains the
//! reply through a [`DisplaySink`] and only then appends the assistant
//! message. If the provider fails the user message stays and nothing else is
//! recorded, so the transcript never holds a half-written reply.

use tracing::{debug, info};

use crate::error::ChatError;
use crate::llm::chain::ProviderChain;
#[cfg(feature = "backend-bridge")]
use crate::llm::providers::bridge::BridgeProvider;
#[cfg(feature = "backend-bridge")]
use crate::llm::stream::EMPTY_REPLY_PLACEHOLDER;
use crate::llm::stream::{DisplaySink, accumulate};
use crate::session::{Message, Parameters, Role, Transcript};

pub struct ChatSession {
    transcript: Transcript,
    providers: ProviderChain,
    stream: bool,
}

impl ChatSession {
    /// `stream` asks providers for incremental replies; providers that cannot
    /// stream answer in one piece regardless.
    pub fn new(transcript: Transcript, providers: ProviderChain, stream: bool) -> Self {
        Self { transcript, providers, stream }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn providers(&self) -> &ProviderChain {
        &self.providers
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        self.transcript.parameters_mut()
    }

    pub fn set_system_prompt(&mut self, text: &str) -> Result<(), ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("system prompt must not be empty".into()));
        }
        self.transcript.set_system_prompt(text);
        Ok(())
    }

    /// Start over locally: same system prompt and parameters, new run id.
    pub fn reset(&mut self) {
        self.transcript.reset();
        info!(run_id = %self.transcript.run_id(), "new chat session");
    }

    /// [`reset`](Self::reset), and ask a bridge backend to open a fresh
    /// conversation too. A bridge failure is logged, never surfaced.
    pub async fn new_chat(&mut self) {
        self.reset();
        self.reset_remote().await;
    }

    #[cfg(feature = "backend-bridge")]
    async fn reset_remote(&self) {
        if let crate::llm::LlmProvider::Bridge(bridge) = self.providers.primary() {
            if let Err(e) = bridge.new_chat().await {
                tracing::warn!(error = %e, "bridge newChat failed; continuing with local reset");
            }
        }
    }

    #[cfg(not(feature = "backend-bridge"))]
    async fn reset_remote(&self) {}

    /// The primary provider, when it is a chat bridge.
    #[cfg(feature = "backend-bridge")]
    pub fn bridge(&self) -> Result<&BridgeProvider, ChatError> {
        match self.providers.primary() {
            crate::llm::LlmProvider::Bridge(bridge) => Ok(bridge),
            _ => Err(bridge_only()),
        }
    }

    /// Ask the bridge to launch its browser; returns the bridge's status text.
    #[cfg(feature = "backend-bridge")]
    pub async fn start_bridge(&self) -> Result<String, ChatError> {
        Ok(self.bridge()?.start().await?)
    }

    #[cfg(not(feature = "backend-bridge"))]
    pub async fn start_bridge(&self) -> Result<String, ChatError> {
        Err(bridge_only())
    }

    /// Have the bridge regenerate its last answer and swap it into the
    /// transcript. On failure the previous reply is kept.
    #[cfg(feature = "backend-bridge")]
    pub async fn retry(&mut self) -> Result<&Message, ChatError> {
        if self.transcript.messages().last().map(|m| m.role) != Some(Role::Assistant) {
            return Err(ChatError::Validation("there is no reply to retry".into()));
        }
        let answer = self.bridge()?.retry().await?;
        let answer = if answer.trim().is_empty() { EMPTY_REPLY_PLACEHOLDER.to_string() } else { answer };
        debug!(run_id = %self.transcript.run_id(), chars = answer.len(), "bridge retry succeeded");
        self.transcript.replace_last_reply(answer)
    }

    #[cfg(not(feature = "backend-bridge"))]
    pub async fn retry(&mut self) -> Result<&Message, ChatError> {
        Err(bridge_only())
    }

    /// Switch the bridge to another of its conversations. The local
    /// transcript is left as it is.
    #[cfg(feature = "backend-bridge")]
    pub async fn select_chat(&self, chat_id: &str) -> Result<String, ChatError> {
        let chat_id = chat_id.trim();
        if chat_id.is_empty() {
            return Err(ChatError::Validation("chat id must not be empty".into()));
        }
        Ok(self.bridge()?.select_chat(chat_id).await?)
    }

    #[cfg(not(feature = "backend-bridge"))]
    pub async fn select_chat(&self, _chat_id: &str) -> Result<String, ChatError> {
        Err(bridge_only())
    }

    #[cfg(feature = "backend-bridge")]
    pub async fn chat_list(&self) -> Result<Vec<String>, ChatError> {
        Ok(self.bridge()?.chat_list().await?)
    }

    #[cfg(not(feature = "backend-bridge"))]
    pub async fn chat_list(&self) -> Result<Vec<String>, ChatError> {
        Err(bridge_only())
    }

    #[cfg(feature = "backend-bridge")]
    pub async fn gpt_list(&self) -> Result<Vec<String>, ChatError> {
        Ok(self.bridge()?.gpt_list().await?)
    }

    #[cfg(not(feature = "backend-bridge"))]
    pub async fn gpt_list(&self) -> Result<Vec<String>, ChatError> {
        Err(bridge_only())
    }

    /// Run one chat turn for `input`.
    ///
    /// Returns the recorded assistant message. Empty or whitespace-only input
    /// is rejected before anything is recorded.
    pub async fn submit<S>(&mut self, input: &str, sink: &mut S) -> Result<&Message, ChatError>
    where
        S: DisplaySink + ?Sized,
    {
        if input.trim().is_empty() {
            return Err(ChatError::Validation("message must not be empty".into()));
        }

        self.transcript.append(Role::User, input)?;
        let request = self.transcript.build_request(self.stream);
        debug!(
            run_id = %self.transcript.run_id(),
            messages = request.messages.len(),
            "submitting chat turn"
        );

        let completion = self.providers.complete(&request).await?;
        let reply = accumulate(completion.into_stream(), sink).await?;

        self.transcript.append(Role::Assistant, reply)
    }
}

fn bridge_only() -> ChatError {
    ChatError::Validation("only available with the bridge backend".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use crate::llm::providers::dummy::DummyProvider;

    fn session() -> ChatSession {
        let t = Transcript::initialize("be brief", Parameters::default());
        ChatSession::new(t, ProviderChain::single(LlmProvider::Dummy(DummyProvider)), true)
    }

    #[tokio::test]
    async fn turn_appends_user_then_assistant() {
        let mut s = session();
        let mut renders = Vec::new();
        let reply = s
            .submit("hello", &mut |full: &str| renders.push(full.to_string()))
            .await
            .unwrap()
            .clone();

        assert_eq!(reply, Message::new(Role::Assistant, "[echo] hello"));
        assert_eq!(renders, vec!["[echo] hello".to_string()]);
        let roles: Vec<Role> = s.transcript().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_recording() {
        let mut s = session();
        let err = s.submit("   \n", &mut |_: &str| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert_eq!(s.transcript().len(), 1);
    }

    #[cfg(feature = "backend-openai")]
    #[tokio::test]
    async fn provider_failure_keeps_user_message_only() {
        use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;

        let dead = OpenAiCompatibleProvider::new(
            "http://127.0.0.1:1/v1/chat/completions".into(),
            "sk-test".into(),
            2,
            true,
        )
        .unwrap();
        let t = Transcript::initialize("be brief", Parameters::default());
        let mut s = ChatSession::new(t, ProviderChain::single(LlmProvider::OpenAi(dead)), true);

        let err = s.submit("anyone there?", &mut |_: &str| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::Provider(_)));
        let last = s.transcript().messages().last().unwrap();
        assert_eq!(last, &Message::new(Role::User, "anyone there?"));
        assert_eq!(s.transcript().len(), 2);
    }

    #[test]
    fn reset_keeps_prompt_and_parameters() {
        let mut s = session();
        s.set_system_prompt("be verbose").unwrap();
        s.parameters_mut().set_temperature(1.5).unwrap();
        let old_id = s.transcript().run_id().clone();

        s.reset();
        assert_eq!(s.transcript().len(), 1);
        assert_eq!(s.transcript().system_prompt(), Some("be verbose"));
        assert_eq!(s.transcript().parameters().temperature(), 1.5);
        assert_ne!(s.transcript().run_id(), &old_id);
    }

    #[tokio::test]
    async fn bridge_commands_need_a_bridge_backend() {
        let mut s = session();
        s.submit("hello", &mut |_: &str| {}).await.unwrap();

        assert!(matches!(s.start_bridge().await, Err(ChatError::Validation(_))));
        assert!(matches!(s.retry().await, Err(ChatError::Validation(_))));
        assert!(matches!(s.chat_list().await, Err(ChatError::Validation(_))));
        assert!(matches!(s.gpt_list().await, Err(ChatError::Validation(_))));
        assert!(matches!(s.select_chat("abc").await, Err(ChatError::Validation(_))));
        assert_eq!(s.transcript().messages()[2], Message::new(Role::Assistant, "[echo] hello"));
    }

    #[test]
    fn empty_system_prompt_is_rejected() {
        let mut s = session();
        assert!(s.set_system_prompt("  ").is_err());
        assert_eq!(s.transcript().system_prompt(), Some("be brief"));
    }
}

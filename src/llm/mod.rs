//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! A call returns a [`Completion`]: either the whole reply at once or an
//! ordered stream of text fragments. [`chain::ProviderChain`] tries several
//! providers in order.

pub mod chain;
pub mod providers;
pub mod stream;

use std::pin::Pin;

use futures_util::Stream;
use thiserror::Error;

use crate::session::Message;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider misconfigured: {0}")]
    Config(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("all providers failed: {0}")]
    Exhausted(String),
}

// ── Request / reply ───────────────────────────────────────────────────────────

/// Everything a provider needs for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    /// Full conversation, system message first.
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub stream: bool,
}

/// Ordered text fragments, ending when the stream yields `None`.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

pub enum Completion {
    /// The complete reply from a request/response call.
    Text(String),
    /// Incremental fragments from a streaming call.
    Stream(FragmentStream),
}

impl Completion {
    /// View any completion as a fragment stream; a full reply is one fragment.
    pub fn into_stream(self) -> FragmentStream {
        match self {
            Completion::Text(text) => Box::pin(futures_util::stream::once(async move { Ok(text) })),
            Completion::Stream(s) => s,
        }
    }
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new match arms.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    #[cfg(feature = "backend-openai")]
    OpenAi(providers::openai_compatible::OpenAiCompatibleProvider),
    #[cfg(feature = "backend-bridge")]
    Bridge(providers::bridge::BridgeProvider),
}

impl LlmProvider {
    /// Short name used in logs and combined fallback errors.
    pub fn label(&self) -> &str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            #[cfg(feature = "backend-openai")]
            LlmProvider::OpenAi(p) => p.label(),
            #[cfg(feature = "backend-bridge")]
            LlmProvider::Bridge(_) => "bridge",
        }
    }

    /// Start a completion for `request`.
    pub async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(request).await,
            #[cfg(feature = "backend-openai")]
            LlmProvider::OpenAi(p) => p.complete(request).await,
            #[cfg(feature = "backend-bridge")]
            LlmProvider::Bridge(p) => p.complete(request).await,
        }
    }

    /// Liveness check; returns a human-readable status line.
    pub async fn ping(&self) -> Result<String, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.ping().await,
            #[cfg(feature = "backend-openai")]
            LlmProvider::OpenAi(p) => p.ping().await,
            #[cfg(feature = "backend-bridge")]
            LlmProvider::Bridge(p) => p.health().await,
        }
    }
}

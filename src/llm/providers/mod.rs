//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory, called at startup, before any
//! network traffic, so credential and URL problems surface immediately.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
#[cfg(feature = "backend-openai")]
pub mod openai_compatible;
#[cfg(feature = "backend-bridge")]
pub mod bridge;

use tracing::debug;

use crate::config::LlmConfig;
use crate::llm::chain::ProviderChain;
use crate::llm::{LlmProvider, ProviderError};

/// Construct the provider chain selected by `config.provider`.
///
/// `api_key` is sourced from `OPENAI_API_KEY` env (never TOML). The OpenAI
/// backend requires it; the bridge and dummy backends ignore it.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<ProviderChain, ProviderError> {
    let chain = match config.provider.as_str() {
        "dummy" => ProviderChain::single(LlmProvider::Dummy(dummy::DummyProvider)),
        #[cfg(feature = "backend-openai")]
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let api_key = api_key.unwrap_or_default();
            let primary = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                api_key.clone(),
                oai.timeout_seconds,
                oai.stream,
            )?;
            let mut providers = vec![LlmProvider::OpenAi(primary)];
            if oai.stream && oai.fallback_oneshot {
                let oneshot = openai_compatible::OpenAiCompatibleProvider::new(
                    oai.api_base_url.clone(),
                    api_key,
                    oai.timeout_seconds,
                    false,
                )?;
                providers.push(LlmProvider::OpenAi(oneshot));
            }
            ProviderChain::new(providers)?
        }
        #[cfg(feature = "backend-bridge")]
        "bridge" => {
            let b = &config.bridge;
            let p = bridge::BridgeProvider::new(&b.base_url, b.timeout_seconds, b.new_chat_if_missing)?;
            ProviderChain::single(LlmProvider::Bridge(p))
        }
        _ => return Err(ProviderError::UnknownProvider(config.provider.clone())),
    };
    debug!(provider = %config.provider, chain = ?chain.labels(), "llm provider chain built");
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm(provider: &str) -> LlmConfig {
        LlmConfig { provider: provider.into(), ..LlmConfig::default() }
    }

    #[test]
    fn dummy_needs_no_key() {
        let chain = build(&llm("dummy"), None).unwrap();
        assert_eq!(chain.labels(), vec!["dummy"]);
    }

    #[test]
    fn unknown_provider_errors() {
        let err = build(&llm("gemini"), None).unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(ref p) if p == "gemini"));
    }

    #[cfg(feature = "backend-openai")]
    #[test]
    fn openai_without_key_is_configuration_error() {
        assert!(matches!(build(&llm("openai"), None), Err(ProviderError::Config(_))));
        assert!(matches!(build(&llm("openai"), Some(String::new())), Err(ProviderError::Config(_))));
    }

    #[cfg(feature = "backend-openai")]
    #[test]
    fn openai_streaming_gets_oneshot_fallback() {
        let chain = build(&llm("openai"), Some("sk-test".into())).unwrap();
        assert_eq!(chain.labels(), vec!["openai", "openai-oneshot"]);
    }

    #[cfg(feature = "backend-openai")]
    #[test]
    fn openai_fallback_can_be_disabled() {
        let mut cfg = llm("openai");
        cfg.openai.fallback_oneshot = false;
        assert_eq!(build(&cfg, Some("sk-test".into())).unwrap().labels(), vec!["openai"]);

        cfg.openai.stream = false;
        cfg.openai.fallback_oneshot = true;
        assert_eq!(build(&cfg, Some("sk-test".into())).unwrap().labels(), vec!["openai-oneshot"]);
    }

    #[cfg(feature = "backend-bridge")]
    #[test]
    fn bridge_ignores_key() {
        let chain = build(&llm("bridge"), None).unwrap();
        assert_eq!(chain.labels(), vec!["bridge"]);
    }
}

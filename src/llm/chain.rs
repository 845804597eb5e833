//! Ordered provider fallback.
//!
//! A [`ProviderChain`] holds one or more providers. [`ProviderChain::complete`]
//! tries them strictly one after another and returns the first completion
//! that starts successfully. When every provider fails the individual
//! failures are folded into one [`ProviderError::Exhausted`].
//!
//! Fallback covers starting a completion only. Once a stream has been handed
//! back, a later error in that stream belongs to the caller.

use tracing::{debug, info, warn};

use super::{ChatRequest, Completion, LlmProvider, ProviderError};

#[derive(Debug, Clone)]
pub struct ProviderChain {
    providers: Vec<LlmProvider>,
}

impl ProviderChain {
    pub fn new(providers: Vec<LlmProvider>) -> Result<Self, ProviderError> {
        if providers.is_empty() {
            return Err(ProviderError::Config("provider chain is empty".into()));
        }
        Ok(Self { providers })
    }

    pub fn single(provider: LlmProvider) -> Self {
        Self { providers: vec![provider] }
    }

    /// The first provider; used for health probes and backend-specific calls.
    pub fn primary(&self) -> &LlmProvider {
        &self.providers[0]
    }

    pub fn labels(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.label()).collect()
    }

    pub async fn complete(&self, request: &ChatRequest) -> Result<Completion, ProviderError> {
        let mut failures: Vec<(String, ProviderError)> = Vec::new();

        for provider in &self.providers {
            debug!(provider = provider.label(), "attempting completion");
            match provider.complete(request).await {
                Ok(completion) => {
                    if !failures.is_empty() {
                        info!(
                            provider = provider.label(),
                            failed = failures.len(),
                            "fallback provider answered"
                        );
                    }
                    return Ok(completion);
                }
                Err(e) => {
                    warn!(provider = provider.label(), error = %e, "provider failed");
                    failures.push((provider.label().to_string(), e));
                }
            }
        }

        if failures.len() == 1 {
            let (_, e) = failures.remove(0);
            return Err(e);
        }
        let combined = failures
            .iter()
            .map(|(label, e)| format!("{label}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ProviderError::Exhausted(combined))
    }
}

//! Application-wide error types.
//!
//! [`AppError`] covers process-level failures (startup, logging, file I/O).
//! [`ChatError`] is the taxonomy a chat turn can surface to the user; every
//! variant is recovered at the console and rendered as a banner.

use thiserror::Error;

use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Errors raised by a chat turn or a transcript mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    /// Missing or invalid credential, URL or backend selection.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network failure, non-2xx response or malformed body.
    #[error("provider error: {0}")]
    Provider(String),

    /// Rejected user input (empty message, out-of-range parameter).
    #[error("validation error: {0}")]
    Validation(String),
}

impl From<ProviderError> for ChatError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UnknownProvider(_) | ProviderError::Config(_) => {
                ChatError::Configuration(e.to_string())
            }
            ProviderError::Request(_) | ProviderError::Stream(_) | ProviderError::Exhausted(_) => {
                ChatError::Provider(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn export_error_display() {
        let e = AppError::Export("disk full".into());
        assert!(e.to_string().contains("disk full"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }

    #[test]
    fn chat_error_is_transparent_inside_app_error() {
        let e: AppError = ChatError::Validation("empty message".into()).into();
        assert_eq!(e.to_string(), "validation error: empty message");
    }

    #[test]
    fn credential_failure_maps_to_configuration() {
        let e: ChatError = ProviderError::Config("OPENAI_API_KEY is not set".into()).into();
        assert!(matches!(e, ChatError::Configuration(ref m) if m.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn unknown_provider_maps_to_configuration() {
        let e: ChatError = ProviderError::UnknownProvider("gemini".into()).into();
        assert!(matches!(e, ChatError::Configuration(_)));
    }

    #[test]
    fn request_failure_maps_to_provider() {
        let e: ChatError = ProviderError::Request("HTTP 500".into()).into();
        assert!(matches!(e, ChatError::Provider(ref m) if m.contains("HTTP 500")));
    }
}

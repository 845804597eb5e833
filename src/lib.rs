//! primus-chat: a single-user chat session over an LLM backend.
//!
//! The transcript ([`session`]) is the only state; [`chat::ChatSession`]
//! drives one turn at a time through an [`llm::chain::ProviderChain`], and
//! [`console`] is the terminal front end.

pub mod chat;
pub mod config;
pub mod console;
pub mod error;
pub mod llm;
pub mod logger;
pub mod session;

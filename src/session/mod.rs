//! Session transcript manager.
//!
//! - **transcript**: messages, parameters, run id and every mutation.
//! - **export**: JSON / CSV documents and export files.

pub mod export;
pub mod transcript;

pub use transcript::{Message, Parameters, Role, RunId, Transcript};

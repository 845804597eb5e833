//! Conversation transcript: the ordered message sequence plus session parameters.
//!
//! A [`Transcript`] is owned by exactly one caller and every mutation goes
//! through `&mut self`, so there is no shared session state to coordinate.
//!
//! Invariant: at most one [`Role::System`] message exists and, when present,
//! it sits at index 0. [`Transcript::append`] refuses system messages so the
//! invariant cannot be broken from outside this module.

use std::fmt;
use std::ops::RangeInclusive;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatError;
use crate::llm::ChatRequest;

/// Models offered by the model selector.
pub const SUPPORTED_MODELS: &[&str] = &["gpt-4o-mini", "gpt-4o", "gpt-4.1-mini", "gpt-3.5-turbo"];

pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 128..=8192;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are PRIMUS: concise, capable, a little snarky when warranted, but always helpful.";

// ── Role / Message ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

// ── RunId ─────────────────────────────────────────────────────────────────────

/// Opaque per-session identifier, used only to name export files.
///
/// Shape: `YYYYMMDD-HHMMSS-xxxxxxxx`, the UTC start time plus eight hex digits
/// of a v4 UUID, so two sessions started within one second still differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{stamp}-{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Parameters ────────────────────────────────────────────────────────────────

/// Generation knobs sent with every request. Each setter validates its input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameters {
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl Parameters {
    pub fn new(
        model: impl Into<String>,
        temperature: f32,
        max_output_tokens: u32,
    ) -> Result<Self, ChatError> {
        let model = model.into();
        validate_model(&model)?;
        validate_temperature(temperature)?;
        validate_max_tokens(max_output_tokens)?;
        Ok(Self { model, temperature, max_output_tokens })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn set_model(&mut self, model: impl Into<String>) -> Result<(), ChatError> {
        let model = model.into();
        validate_model(&model)?;
        self.model = model;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ChatError> {
        validate_temperature(temperature)?;
        self.temperature = temperature;
        Ok(())
    }

    pub fn set_max_output_tokens(&mut self, max_output_tokens: u32) -> Result<(), ChatError> {
        validate_max_tokens(max_output_tokens)?;
        self.max_output_tokens = max_output_tokens;
        Ok(())
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

fn validate_model(model: &str) -> Result<(), ChatError> {
    if SUPPORTED_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(ChatError::Validation(format!(
            "unsupported model '{model}' (choose one of: {})",
            SUPPORTED_MODELS.join(", ")
        )))
    }
}

fn validate_temperature(temperature: f32) -> Result<(), ChatError> {
    // `contains` is false for NaN.
    if TEMPERATURE_RANGE.contains(&temperature) {
        Ok(())
    } else {
        Err(ChatError::Validation(format!(
            "temperature {temperature} outside {}..={}",
            TEMPERATURE_RANGE.start(),
            TEMPERATURE_RANGE.end()
        )))
    }
}

fn validate_max_tokens(max_output_tokens: u32) -> Result<(), ChatError> {
    if MAX_TOKENS_RANGE.contains(&max_output_tokens) {
        Ok(())
    } else {
        Err(ChatError::Validation(format!(
            "max tokens {max_output_tokens} outside {}..={}",
            MAX_TOKENS_RANGE.start(),
            MAX_TOKENS_RANGE.end()
        )))
    }
}

// ── Transcript ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    run_id: RunId,
    parameters: Parameters,
}

impl Transcript {
    /// Start a session: a single system message carrying `system_prompt`.
    pub fn initialize(system_prompt: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            messages: vec![Message::new(Role::System, system_prompt)],
            run_id: RunId::generate(),
            parameters,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    /// Content of the leading system message, if the transcript has one.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Replace the system message content in place.
    ///
    /// Only touches index 0, and only when it holds a system message; never
    /// inserts one. Returns whether the prompt was applied.
    pub fn set_system_prompt(&mut self, text: impl Into<String>) -> bool {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => {
                first.content = text.into();
                true
            }
            _ => false,
        }
    }

    /// Append a user or assistant message. Growth is unbounded.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Result<&Message, ChatError> {
        if role == Role::System {
            return Err(ChatError::Validation(
                "system messages can only be set through the system prompt".into(),
            ));
        }
        self.messages.push(Message::new(role, content));
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Conversation turns without the system message, for display.
    pub fn turns(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }

    /// Replace the content of the trailing assistant message.
    ///
    /// Fails, leaving the transcript untouched, unless the last message is
    /// an assistant reply.
    pub fn replace_last_reply(&mut self, content: impl Into<String>) -> Result<&Message, ChatError> {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content = content.into();
                Ok(last)
            }
            _ => Err(ChatError::Validation("there is no reply to replace".into())),
        }
    }

    /// Start a fresh session in place.
    ///
    /// The current system prompt and parameters carry over; messages are
    /// dropped and a new [`RunId`] is assigned.
    pub fn reset(&mut self) {
        let system_prompt = match self.messages.drain(..).next() {
            Some(first) if first.role == Role::System => first.content,
            _ => DEFAULT_SYSTEM_PROMPT.to_string(),
        };
        self.messages.push(Message::new(Role::System, system_prompt));
        self.run_id = RunId::generate();
    }

    /// The full message sequence, unmodified, plus the current parameters.
    pub fn build_request(&self, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.parameters.model.clone(),
            messages: self.messages.clone(),
            temperature: self.parameters.temperature,
            max_output_tokens: self.parameters.max_output_tokens,
            stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Transcript {
        Transcript::initialize("be brief", Parameters::default())
    }

    #[test]
    fn initialize_seeds_single_system_message() {
        let t = fresh();
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0], Message::new(Role::System, "be brief"));
        assert_eq!(t.system_prompt(), Some("be brief"));
    }

    #[test]
    fn build_request_keeps_insertion_order_system_first() {
        let mut t = fresh();
        t.append(Role::User, "one").unwrap();
        t.append(Role::Assistant, "two").unwrap();
        t.append(Role::User, "three").unwrap();
        t.append(Role::User, "three").unwrap();

        let req = t.build_request(true);
        let pairs: Vec<(Role, &str)> =
            req.messages.iter().map(|m| (m.role, m.content.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                (Role::System, "be brief"),
                (Role::User, "one"),
                (Role::Assistant, "two"),
                (Role::User, "three"),
                (Role::User, "three"),
            ]
        );
        assert!(req.stream);
        assert_eq!(req.model, DEFAULT_MODEL);
        assert_eq!(req.max_output_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn set_system_prompt_only_mutates_index_zero() {
        let mut t = fresh();
        t.append(Role::User, "hi").unwrap();
        t.append(Role::Assistant, "hello").unwrap();
        let before: Vec<Message> = t.messages()[1..].to_vec();

        assert!(t.set_system_prompt("be verbose"));
        assert_eq!(t.len(), 3);
        assert_eq!(t.system_prompt(), Some("be verbose"));
        assert_eq!(&t.messages()[1..], before.as_slice());
    }

    #[test]
    fn set_system_prompt_without_system_message_is_noop() {
        let mut t = Transcript {
            messages: vec![Message::new(Role::User, "orphan")],
            run_id: RunId::generate(),
            parameters: Parameters::default(),
        };
        assert!(!t.set_system_prompt("ignored"));
        assert_eq!(t.messages(), &[Message::new(Role::User, "orphan")]);
    }

    #[test]
    fn append_rejects_system_role() {
        let mut t = fresh();
        let err = t.append(Role::System, "second system").unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn reset_yields_one_system_message_and_new_run_id() {
        let mut t = fresh();
        t.append(Role::User, "hi").unwrap();
        t.set_system_prompt("updated");
        t.parameters_mut().set_model("gpt-4o").unwrap();
        let old_id = t.run_id().clone();

        t.reset();
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0].role, Role::System);
        assert_eq!(t.system_prompt(), Some("updated"));
        assert_eq!(t.parameters().model(), "gpt-4o");
        assert_ne!(t.run_id(), &old_id);
    }

    #[test]
    fn reset_without_system_message_restores_default_prompt() {
        let mut t = Transcript {
            messages: vec![Message::new(Role::User, "orphan")],
            run_id: RunId::generate(),
            parameters: Parameters::default(),
        };
        t.reset();
        assert_eq!(t.messages(), &[Message::new(Role::System, DEFAULT_SYSTEM_PROMPT)]);
    }

    #[test]
    fn replace_last_reply_only_touches_trailing_assistant() {
        let mut t = fresh();
        t.append(Role::User, "q").unwrap();
        assert!(matches!(t.replace_last_reply("x"), Err(ChatError::Validation(_))));

        t.append(Role::Assistant, "first try").unwrap();
        t.replace_last_reply("second try").unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.messages()[2], Message::new(Role::Assistant, "second try"));
    }

    #[test]
    fn turns_skip_system_message() {
        let mut t = fresh();
        t.append(Role::User, "q").unwrap();
        t.append(Role::Assistant, "a").unwrap();
        let roles: Vec<Role> = t.turns().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn run_id_shape() {
        let id = RunId::generate();
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn parameters_validate_ranges() {
        assert!(Parameters::new("gpt-4o", 2.0, 8192).is_ok());
        assert!(Parameters::new("gpt-4o", 2.1, 1024).is_err());
        assert!(Parameters::new("gpt-4o", f32::NAN, 1024).is_err());
        assert!(Parameters::new("gpt-4o", 0.5, 64).is_err());
        assert!(Parameters::new("davinci", 0.5, 1024).is_err());
    }

    #[test]
    fn parameter_setters_leave_value_on_error() {
        let mut p = Parameters::default();
        assert!(p.set_temperature(-0.1).is_err());
        assert_eq!(p.temperature(), DEFAULT_TEMPERATURE);
        p.set_model("gpt-4.1-mini").unwrap();
        assert_eq!(p.model(), "gpt-4.1-mini");
        p.set_max_output_tokens(4096).unwrap();
        assert_eq!(p.max_output_tokens(), 4096);
    }
}

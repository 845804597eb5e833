//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the path given with `-f`), then applies `PRIMUS_LOG_LEVEL` and
//! `PRIMUS_EXPORT_DIR` env overrides. The API key comes only from
//! `OPENAI_API_KEY`, never from TOML.

use std::{
    env, fs,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::session::Parameters;
use crate::session::export::DEFAULT_EXPORT_NAME;
use crate::session::transcript::{
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, DEFAULT_TEMPERATURE,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Accepted request timeout, in seconds.
pub const TIMEOUT_RANGE: RangeInclusive<u64> = 1..=600;

/// Chat defaults: parameters and system prompt for a fresh transcript.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub parameters: Parameters,
    pub system_prompt: String,
}

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    /// Stream replies as they are generated.
    pub stream: bool,
    /// Retry a failed streaming call once as a plain request/response call.
    pub fallback_oneshot: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            timeout_seconds: default_openai_timeout_seconds(),
            stream: true,
            fallback_oneshot: true,
        }
    }
}

/// Headless chat bridge configuration (`[llm.bridge]`).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub new_chat_if_missing: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_base_url(),
            timeout_seconds: default_bridge_timeout_seconds(),
            new_chat_if_missing: true,
        }
    }
}

/// LLM backend configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which backend is active (`"openai"`, `"bridge"`, `"dummy"`).
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
    pub bridge: BridgeConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: OpenAiConfig::default(),
            bridge: BridgeConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory receiving export files (already expanded, no `~`).
    pub dir: PathBuf,
    /// File name prefix: `<name>_<run_id>.json|csv`.
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    /// Decorative banner printed at startup, if the file is readable.
    pub banner: Option<PathBuf>,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Log to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    pub chat: ChatConfig,
    pub llm: LlmConfig,
    pub export: ExportConfig,
    pub ui: UiConfig,
    /// API key from `OPENAI_API_KEY`; `None` when unset.
    pub llm_api_key: Option<String>,
}

/// Values taken from the environment. Tests build this directly instead of
/// mutating process env.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub log_level: Option<String>,
    pub export_dir: Option<String>,
    pub api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("PRIMUS_LOG_LEVEL").ok(),
            export_dir: env::var("PRIMUS_EXPORT_DIR").ok(),
            api_key: env::var("OPENAI_API_KEY").ok(),
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    app: RawApp,
    #[serde(default)]
    chat: RawChat,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    export: RawExport,
    #[serde(default)]
    ui: RawUi,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

impl Default for RawApp {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_file: None }
    }
}

#[derive(Deserialize)]
struct RawChat {
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    system_prompt: String,
}

impl Default for RawChat {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAi,
    #[serde(default)]
    bridge: RawBridge,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: RawOpenAi::default(),
            bridge: RawBridge::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAi {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_true")]
    stream: bool,
    #[serde(default = "default_true")]
    fallback_oneshot: bool,
}

impl Default for RawOpenAi {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            timeout_seconds: default_openai_timeout_seconds(),
            stream: true,
            fallback_oneshot: true,
        }
    }
}

#[derive(Deserialize)]
struct RawBridge {
    #[serde(default = "default_bridge_base_url")]
    base_url: String,
    #[serde(default = "default_bridge_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_true")]
    new_chat_if_missing: bool,
}

impl Default for RawBridge {
    fn default() -> Self {
        Self {
            base_url: default_bridge_base_url(),
            timeout_seconds: default_bridge_timeout_seconds(),
            new_chat_if_missing: true,
        }
    }
}

#[derive(Deserialize)]
struct RawExport {
    #[serde(default = "default_export_dir")]
    dir: String,
    #[serde(default = "default_export_name")]
    name: String,
}

impl Default for RawExport {
    fn default() -> Self {
        Self { dir: default_export_dir(), name: default_export_name() }
    }
}

#[derive(Deserialize, Default)]
struct RawUi {
    #[serde(default)]
    banner: Option<String>,
}

fn default_log_level() -> String { "warn".to_string() }
fn default_model() -> String { DEFAULT_MODEL.to_string() }
fn default_temperature() -> f32 { DEFAULT_TEMPERATURE }
fn default_max_tokens() -> u32 { DEFAULT_MAX_TOKENS }
fn default_system_prompt() -> String { DEFAULT_SYSTEM_PROMPT.to_string() }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_bridge_base_url() -> String { "http://localhost:3001".to_string() }
fn default_bridge_timeout_seconds() -> u64 { 120 }
fn default_export_dir() -> String { "exports".to_string() }
fn default_export_name() -> String { DEFAULT_EXPORT_NAME.to_string() }

fn default_true() -> bool {
    true
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `config_path`, or `config/default.toml`, then apply env overrides.
/// If no path is given and `config/default.toml` does not exist, built-in defaults apply.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = EnvOverrides::from_env();
    match config_path {
        Some(path) => load_from(Path::new(path), &overrides),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                load_from(default_path, &overrides)
            } else {
                resolve(RawConfig::default(), &overrides)
            }
        }
    }
}

/// Load from an explicit path with the given overrides.
pub fn load_from(path: &Path, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    load_from_str(&raw, overrides)
        .map_err(|e| match e {
            AppError::Config(msg) => AppError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
}

/// Parse TOML text and resolve it.
pub fn load_from_str(raw: &str, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let parsed: RawConfig =
        toml::from_str(raw).map_err(|e| AppError::Config(format!("parse error: {e}")))?;
    resolve(parsed, overrides)
}

fn resolve(raw: RawConfig, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let parameters = Parameters::new(raw.chat.model, raw.chat.temperature, raw.chat.max_tokens)
        .map_err(|e| AppError::Config(format!("[chat] {e}")))?;

    check_timeout("llm.openai.timeout_seconds", raw.llm.openai.timeout_seconds)?;
    check_timeout("llm.bridge.timeout_seconds", raw.llm.bridge.timeout_seconds)?;

    let export_dir = overrides.export_dir.clone().unwrap_or(raw.export.dir);
    let export_name = raw.export.name.trim().to_string();
    if export_name.is_empty() {
        return Err(AppError::Config("export.name must not be empty".into()));
    }

    Ok(Config {
        log_level: overrides.log_level.clone().unwrap_or(raw.app.log_level),
        log_file: non_empty_path(raw.app.log_file),
        chat: ChatConfig { parameters, system_prompt: raw.chat.system_prompt },
        llm: LlmConfig {
            provider: raw.llm.provider,
            openai: OpenAiConfig {
                api_base_url: raw.llm.openai.api_base_url,
                timeout_seconds: raw.llm.openai.timeout_seconds,
                stream: raw.llm.openai.stream,
                fallback_oneshot: raw.llm.openai.fallback_oneshot,
            },
            bridge: BridgeConfig {
                base_url: raw.llm.bridge.base_url,
                timeout_seconds: raw.llm.bridge.timeout_seconds,
                new_chat_if_missing: raw.llm.bridge.new_chat_if_missing,
            },
        },
        export: ExportConfig { dir: expand_home(&export_dir), name: export_name },
        ui: UiConfig { banner: non_empty_path(raw.ui.banner) },
        llm_api_key: overrides.api_key.clone(),
    })
}

fn check_timeout(key: &str, value: u64) -> Result<(), AppError> {
    if TIMEOUT_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(AppError::Config(format!(
            "{key} = {value} outside {}..={}",
            TIMEOUT_RANGE.start(),
            TIMEOUT_RANGE.end()
        )))
    }
}

fn non_empty_path(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(|s| expand_home(&s))
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

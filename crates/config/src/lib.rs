//! Configuration loading, validation, and management for codeloop.
//!
//! Configuration is layered: built-in defaults, then the global file
//! `~/.codeloop/config.toml`, then the project file
//! `<project>/.codeloop/config.toml`, then environment variables.
//! Tables merge key by key, so a project file only needs the keys it changes.

use codeloop_core::{ActionProtocol, AutonomyLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens reserved for each model reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Context window of the model, in tokens
    #[serde(default = "default_context_window")]
    pub context_window: u32,

    /// Ask the backend for JSON-constrained output
    #[serde(default = "default_true")]
    pub json_mode: bool,

    /// File context store settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Action names for each protocol role
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentLoopConfig,

    /// Autonomy and security settings
    #[serde(default)]
    pub autonomy: AutonomyConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "devstral".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_context_window() -> u32 {
    32768
}
fn default_true() -> bool {
    true
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("context_window", &self.context_window)
            .field("json_mode", &self.json_mode)
            .field("context", &self.context)
            .field("protocol", &self.protocol)
            .field("agent", &self.agent)
            .field("autonomy", &self.autonomy)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Byte budget shared by active contents and explored summaries
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: usize,

    /// Fraction of capacity eviction shrinks down to
    #[serde(default = "default_eviction_target")]
    pub eviction_target: f64,

    /// Upper bound for model-written summaries
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Ask the model for summaries instead of the structural summarizer
    #[serde(default)]
    pub llm_summaries: bool,
}

fn default_capacity_bytes() -> usize {
    100_000
}
fn default_eviction_target() -> f64 {
    0.8
}
fn default_summary_max_chars() -> usize {
    500
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_capacity_bytes(),
            eviction_target: default_eviction_target(),
            summary_max_chars: default_summary_max_chars(),
            llm_summaries: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_announce")]
    pub announce: String,

    /// The one action that ends a turn
    #[serde(default = "default_terminal")]
    pub terminal: String,

    #[serde(default = "default_invoke_agent")]
    pub invoke_agent: String,

    #[serde(default = "default_return_to_main")]
    pub return_to_main: String,
}

fn default_announce() -> String {
    "respond".into()
}
fn default_terminal() -> String {
    "request_feedback".into()
}
fn default_invoke_agent() -> String {
    "invoke_agent".into()
}
fn default_return_to_main() -> String {
    "respond_to_master".into()
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            announce: default_announce(),
            terminal: default_terminal(),
            invoke_agent: default_invoke_agent(),
            return_to_main: default_return_to_main(),
        }
    }
}

impl ProtocolConfig {
    pub fn to_protocol(&self) -> ActionProtocol {
        ActionProtocol {
            announce: self.announce.clone(),
            terminal: self.terminal.clone(),
            invoke_agent: self.invoke_agent.clone(),
            return_to_main: self.return_to_main.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// Maximum model calls per user message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-tool time limit
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Write every assembled prompt here (diagnostics only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_prompt_path: Option<PathBuf>,

    /// Replace the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_max_iterations() -> u32 {
    25
}
fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            dump_prompt_path: None,
            system_prompt_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    #[serde(default = "default_autonomy_level")]
    pub level: String,

    /// Commands `execute_command` may run. Empty = any command.
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    #[serde(default)]
    pub forbidden_paths: Vec<String>,
}

fn default_autonomy_level() -> String {
    "supervised".into()
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            level: default_autonomy_level(),
            allowed_commands: vec![],
            forbidden_paths: vec![
                "/etc".into(),
                "/proc".into(),
                "/sys".into(),
                "~/.ssh".into(),
                "~/.gnupg".into(),
                "~/.aws".into(),
            ],
        }
    }
}

impl AutonomyConfig {
    pub fn autonomy_level(&self) -> Result<AutonomyLevel, ConfigError> {
        self.level.parse().map_err(ConfigError::ValidationError)
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load the layered configuration for a project directory.
    ///
    /// Environment overrides:
    /// - `CODELOOP_API_KEY`, then `OPENAI_API_KEY`
    /// - `CODELOOP_PROVIDER`, `CODELOOP_MODEL`
    /// - `OLLAMA_HOST` (base URL of the ollama provider)
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let global = Self::config_dir().join("config.toml");
        let project = Self::project_config_path(project_dir);
        let mut config = Self::load_layers(&[global.as_path(), project.as_path()])?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a single file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::load_layers(&[path])
    }

    /// Merge the given files in order; missing files are skipped.
    pub fn load_layers(paths: &[&Path]) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let mut found = 0;

        for path in paths {
            if !path.exists() {
                tracing::debug!("No config file at {}", path.display());
                continue;
            }
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let layer: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            merge_toml(&mut merged, layer);
            found += 1;
        }

        if found == 0 {
            tracing::info!("No config files found, using defaults");
        }

        let config: Self = merged.try_into().map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: paths.last().map(|p| p.to_path_buf()).unwrap_or_default(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("CODELOOP_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Ok(provider) = std::env::var("CODELOOP_PROVIDER") {
            self.default_provider = provider;
        }
        if let Ok(model) = std::env::var("CODELOOP_MODEL") {
            self.default_model = model;
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            let url = format!("{}/v1", host.trim_end_matches('/'));
            self.providers.entry("ollama".into()).or_default().api_url = Some(url);
        }
    }

    /// Get the global configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".codeloop")
    }

    pub fn project_config_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".codeloop").join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.context.capacity_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "context.capacity_bytes must be > 0".into(),
            ));
        }

        if !(self.context.eviction_target > 0.0 && self.context.eviction_target <= 1.0) {
            return Err(ConfigError::ValidationError(
                "context.eviction_target must be in (0.0, 1.0]".into(),
            ));
        }

        if self.max_tokens >= self.context_window {
            return Err(ConfigError::ValidationError(
                "max_tokens must be smaller than context_window".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        self.protocol
            .to_protocol()
            .validate()
            .map_err(ConfigError::ValidationError)?;
        self.autonomy.autonomy_level()?;

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            context_window: default_context_window(),
            json_mode: true,
            context: ContextConfig::default(),
            protocol: ProtocolConfig::default(),
            agent: AgentLoopConfig::default(),
            autonomy: AutonomyConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Recursively merge `overlay` into `base`; tables merge, everything else replaces.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

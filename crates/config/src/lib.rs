//! Configuration loading, validation, and management for raita.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! Validates all settings at startup. API credentials never appear in Debug
//! output.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ordered pool of interchangeable API credentials for the model host.
    /// The rotation client cycles through these on rate-limit failures.
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Base URL of the OpenAI-compatible model host
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Default max tokens per model response (None = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session transcript storage settings
    #[serde(default)]
    pub sessions: SessionConfig,
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_model() -> String {
    "llama-3.1-8b-instant".into()
}
fn default_temperature() -> f32 {
    0.3
}

/// Agent loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Ceiling on the working-message count within one turn.
    /// Crossing it mid tool-exchange terminates the turn with an error.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Hard per-turn deadline in seconds.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,

    /// Override for the built-in system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_messages() -> usize {
    30
}
fn default_turn_timeout_secs() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            turn_timeout_secs: default_turn_timeout_secs(),
            system_prompt: None,
        }
    }
}

/// Session transcript storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Storage backend: "memory" or "sqlite"
    #[serde(default = "default_session_backend")]
    pub backend: String,

    /// SQLite database path (only used by the sqlite backend)
    #[serde(default = "default_session_path")]
    pub path: String,
}

fn default_session_backend() -> String {
    "memory".into()
}
fn default_session_path() -> String {
    "sessions.db".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            path: default_session_path(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_keys", &format!("[{} key(s), REDACTED]", self.api_keys.len()))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.raita/config.toml),
    /// then apply environment variable overrides:
    /// - `RAITA_API_KEYS` — credential pool, JSON array or comma-separated
    /// - `RAITA_MODEL` — default model
    /// - `RAITA_BASE_URL` — model host base URL
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_keys.is_empty() {
            if let Ok(raw) = std::env::var("RAITA_API_KEYS") {
                config.api_keys = parse_api_keys(&raw);
            }
        }

        if let Ok(model) = std::env::var("RAITA_MODEL") {
            config.model = model;
        }

        if let Ok(base_url) = std::env::var("RAITA_BASE_URL") {
            config.base_url = base_url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".raita")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        // A turn needs room for at least system + user + assistant.
        if self.agent.max_messages < 3 {
            return Err(ConfigError::ValidationError(
                "agent.max_messages must be at least 3".into(),
            ));
        }

        if self.agent.turn_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.turn_timeout_secs must be positive".into(),
            ));
        }

        match self.sessions.backend.as_str() {
            "memory" | "sqlite" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown session backend '{other}' (expected 'memory' or 'sqlite')"
                )));
            }
        }

        Ok(())
    }

    /// Check if any API credential is configured.
    pub fn has_credentials(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            agent: AgentConfig::default(),
            sessions: SessionConfig::default(),
        }
    }
}

/// Parse a credential pool from its environment representation.
///
/// Accepts either a JSON array (`["k1","k2"]`) or a comma-separated list
/// (`k1,k2`). Whitespace around keys is trimmed; empty entries are dropped.
pub fn parse_api_keys(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(keys) = serde_json::from_str::<Vec<String>>(trimmed) {
            return keys
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
        tracing::warn!("RAITA_API_KEYS looks like JSON but failed to parse, falling back to comma split");
    }
    trimmed
        .split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_messages, 30);
        assert_eq!(config.agent.turn_timeout_secs, 120);
        assert_eq!(config.sessions.backend, "memory");
        assert!(!config.has_credentials());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.agent.max_messages, config.agent.max_messages);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_session_backend_rejected() {
        let mut config = AppConfig::default();
        config.sessions.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().sessions.backend, "memory");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_keys = ["gsk_one", "gsk_two"]
model = "llama-3.3-70b-versatile"

[agent]
max_messages = 20
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.api_keys.len(), 2);
        assert_eq!(config.model, "llama-3.3-70b-versatile");
        assert_eq!(config.agent.max_messages, 20);
        // Unspecified sections fall back to defaults
        assert_eq!(config.agent.turn_timeout_secs, 120);
    }

    #[test]
    fn parse_api_keys_json_array() {
        let keys = parse_api_keys(r#"["gsk_a", "gsk_b", "gsk_c"]"#);
        assert_eq!(keys, vec!["gsk_a", "gsk_b", "gsk_c"]);
    }

    #[test]
    fn parse_api_keys_comma_separated() {
        let keys = parse_api_keys(" gsk_a, gsk_b ,gsk_c ");
        assert_eq!(keys, vec!["gsk_a", "gsk_b", "gsk_c"]);
    }

    #[test]
    fn parse_api_keys_single() {
        let keys = parse_api_keys("gsk_only");
        assert_eq!(keys, vec!["gsk_only"]);
    }

    #[test]
    fn parse_api_keys_empty() {
        assert!(parse_api_keys("").is_empty());
        assert!(parse_api_keys(" , ,").is_empty());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let config = AppConfig {
            api_keys: vec!["gsk_secret_key".into()],
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("gsk_secret_key"));
        assert!(debug.contains("REDACTED"));
    }
}

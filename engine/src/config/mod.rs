//! Configuration management
//!
//! This module handles loading, validation, and management of the Arbor configuration.
//! Configuration is stored in TOML format at ~/.arbor/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace path (component artifacts), data directory (pipeline + ledgers), log level
//! - **llm**: Completion service settings
//! - **review**: Reviewer order, prior-decision window, tone modifiers
//! - **chat**: Tool loop bound and session lifetime
//! - **security**: Extra denied paths and writable workspace directories
//!
//! # Path Expansion
//!
//! The configuration system automatically:
//! - Expands ~ to the user's home directory
//! - Canonicalizes the workspace path, creating it if needed
//! - Creates the data directory if it doesn't exist
//!
//! # Examples
//!
//! ```no_run
//! use arbor_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Workspace: {:?}", config.core.workspace);
//! println!("Reviewers: {:?}", config.review.reviewers);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Completion service configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Review cycle configuration
    #[serde(default)]
    pub review: ReviewConfig,

    /// Conversational tool loop configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Path safety settings
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Workspace directory holding `components/<slug>/` artifacts (supports ~ expansion)
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory for the pipeline document and ledgers (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider backing every reviewer and the chat loop
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Base URL for Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,

    /// Response token ceiling per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Secret name looked up in the environment, then the OS keychain
    #[serde(default = "default_api_key_secret")]
    pub api_key_secret: String,
}

/// Review cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Reviewer ids in invocation order
    #[serde(default = "default_reviewers")]
    pub reviewers: Vec<String>,

    /// Number of prior decisions folded into each prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Opaque per-reviewer tone modifiers, appended to prompts verbatim
    #[serde(default)]
    pub tones: BTreeMap<String, String>,
}

/// Conversational tool loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum completion turns before a forced tool-free answer
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Inactivity window after which a session is swept
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// How often the sweeper runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Character bound for tool result previews
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

/// Path safety configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Extra path fragments that may never be read or written
    #[serde(default)]
    pub deny_list: Vec<String>,

    /// Workspace-relative directories write tools may touch
    #[serde(default = "default_writable_dirs")]
    pub writable_dirs: Vec<String>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.arbor/data")
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_api_key_secret() -> String {
    "anthropic_api_key".to_string()
}

fn default_reviewers() -> Vec<String> {
    ["ts", "ag", "pl", "ca", "px"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_history_window() -> usize {
    5
}

fn default_max_turns() -> usize {
    8
}

fn default_session_ttl() -> u64 {
    30 * 60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_preview_chars() -> usize {
    200
}

fn default_writable_dirs() -> Vec<String> {
    vec!["components".to_string()]
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            max_tokens: default_max_tokens(),
            api_key_secret: default_api_key_secret(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            reviewers: default_reviewers(),
            history_window: default_history_window(),
            tones: BTreeMap::new(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            session_ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            preview_chars: default_preview_chars(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            deny_list: Vec::new(),
            writable_dirs: default_writable_dirs(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.arbor/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or validation fails.
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Build a validated configuration rooted at explicit directories.
    ///
    /// Used by embedders and tests that do not want a config file on disk.
    pub fn for_directories(workspace: &Path, data_dir: &Path) -> Result<Self, EngineError> {
        let mut config = Self::default_config();
        config.core.workspace = workspace.to_path_buf();
        config.core.data_dir = data_dir.to_path_buf();
        config.validate_and_process()?;
        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.arbor/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".arbor").join("config.toml"))
    }

    fn default_config() -> Self {
        Self {
            core: CoreConfig {
                workspace: PathBuf::from("~/design-system"),
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig::default(),
            review: ReviewConfig::default(),
            chat: ChatConfig::default(),
            security: SecurityConfig::default(),
        }
    }

    /// Validate and process configuration
    ///
    /// Checks enumerated fields and bounds, expands `~`, canonicalizes the
    /// workspace (creating it if missing) and creates the data directory.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_providers = ["anthropic"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid provider '{}'. Must be one of: {}",
                self.llm.provider,
                valid_providers.join(", ")
            )));
        }

        if self.review.reviewers.is_empty() {
            return Err(EngineError::Config(
                "review.reviewers must name at least one reviewer".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for id in &self.review.reviewers {
            if !seen.insert(id.as_str()) {
                return Err(EngineError::Config(format!(
                    "review.reviewers lists '{}' more than once",
                    id
                )));
            }
        }

        if self.chat.max_turns == 0 {
            return Err(EngineError::Config(
                "chat.max_turns must be at least 1".to_string(),
            ));
        }
        if self.chat.sweep_interval_secs == 0 {
            return Err(EngineError::Config(
                "chat.sweep_interval_secs must be at least 1".to_string(),
            ));
        }

        self.core.workspace = expand_path(&self.core.workspace)?;
        self.core.workspace = canonicalize_or_create(&self.core.workspace)?;

        if !self.core.workspace.is_dir() {
            return Err(EngineError::Config(format!(
                "Workspace path is not a directory: {:?}",
                self.core.workspace
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Canonicalize path, creating it if it doesn't exist
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }

    path.canonicalize()
        .map_err(|e| EngineError::PathCanonicalization(path.to_path_buf(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.review.reviewers, vec!["ts", "ag", "pl", "ca", "px"]);
        assert_eq!(config.review.history_window, 5);
        assert_eq!(config.chat.max_turns, 8);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_for_directories_creates_missing_dirs() {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("ws");
        let data = temp.path().join("data");

        let config = Config::for_directories(&workspace, &data).unwrap();

        assert!(config.core.workspace.is_dir());
        assert!(config.core.data_dir.is_dir());
    }

    #[test]
    fn test_duplicate_reviewer_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default_config();
        config.core.workspace = temp.path().to_path_buf();
        config.core.data_dir = temp.path().join("data");
        config.review.reviewers = vec!["ts".to_string(), "ts".to_string()];

        let err = config.validate_and_process().unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_zero_max_turns_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default_config();
        config.core.workspace = temp.path().to_path_buf();
        config.core.data_dir = temp.path().join("data");
        config.chat.max_turns = 0;

        assert!(config.validate_and_process().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default_config();
        config
            .review
            .tones
            .insert("ag".to_string(), "dry and exacting".to_string());
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(
            deserialized.review.tones.get("ag").map(String::as_str),
            Some("dry and exacting")
        );
    }
}

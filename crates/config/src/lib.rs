//! Configuration management for quizloop
//!
//! Loads and saves engine, agent, action, and server parameters from a JSON file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, expand_home, safe_filename, workspace_path};

/// Environment variables consulted for the engine key, in order
pub const API_KEY_ENV_VARS: &[&str] = &[
    "QUIZLOOP_API_KEY",
    "GOOGLE_API_KEY",
    "OPENAI_API_KEY",
    "OPENROUTER_API_KEY",
];

/// Environment variable holding the front door shared secret
pub const SECRET_ENV_VAR: &str = "QUIZLOOP_SECRET";

/// Errors in the configuration layer
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("◆ CONFIG IO ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("◆ CONFIG PARSE ERROR: {0}")]
    Json(#[from] serde_json::Error),

    #[error("◆ CONFIG NOT FOUND: {0}")]
    NotFound(PathBuf),

    #[error("◆ INVALID CONFIG: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Reasoning engine connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Unset means the engine flavor's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_engine_timeout(),
        }
    }
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_engine_timeout() -> u64 {
    120
}

/// Orchestration loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Replaces the built-in directive when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            workspace: default_workspace(),
            directive: None,
        }
    }
}

fn default_max_iterations() -> u32 {
    25
}

fn default_workspace() -> String {
    "~/.quizloop/workspace".to_string()
}

/// Action catalog parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    #[serde(default = "default_action_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    #[serde(default = "default_max_error_chars")]
    pub max_error_chars: usize,
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default = "default_installer")]
    pub installer: Vec<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_action_timeout(),
            max_output_chars: default_max_output_chars(),
            max_error_chars: default_max_error_chars(),
            python: default_python(),
            installer: default_installer(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_action_timeout() -> u64 {
    120
}

fn default_max_output_chars() -> usize {
    50_000
}

fn default_max_error_chars() -> usize {
    2_000
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_installer() -> Vec<String> {
    vec![
        "python3".to_string(),
        "-m".to_string(),
        "pip".to_string(),
        "install".to_string(),
    ]
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) quizloop".to_string()
}

/// Front door parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secret: String::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7860
}

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location, falling back to defaults when absent
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ LOADING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reject values the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.engine.timeout_secs == 0 || self.actions.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }
        if self.actions.installer.is_empty() {
            return Err(ConfigError::Invalid(
                "actions.installer must name a command".to_string(),
            ));
        }
        Ok(())
    }

    /// Run workspace with `~` expanded
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agent.workspace)
    }

    /// Engine key from the file, or the first populated environment variable
    pub fn api_key(&self) -> Option<String> {
        if !self.engine.api_key.is_empty() {
            return Some(self.engine.api_key.clone());
        }
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn api_base(&self) -> Option<String> {
        self.engine
            .api_base
            .as_ref()
            .filter(|base| !base.is_empty())
            .cloned()
    }

    /// Explicitly configured model, ignoring blank values
    pub fn model(&self) -> Option<String> {
        self.engine
            .model
            .as_ref()
            .filter(|model| !model.trim().is_empty())
            .cloned()
    }

    /// Front door secret from the file, or `QUIZLOOP_SECRET`
    pub fn secret(&self) -> Option<String> {
        if !self.server.secret.is_empty() {
            return Some(self.server.secret.clone());
        }
        std::env::var(SECRET_ENV_VAR)
            .ok()
            .filter(|value| !value.is_empty())
    }
}

/// Write the default config (if missing) and create the workspace
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("◆ CONFIG ALREADY PRESENT AT {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("◆ CONFIG WRITTEN TO {:?}", config_path);
    }

    let config = Config::load().await?;
    let workspace = config.workspace_path();
    paths::ensure_dir(&workspace).await?;
    info!("◆ WORKSPACE READY AT {:?}", workspace);

    Ok(config)
}

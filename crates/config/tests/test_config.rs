//! Tests for Config serialization, defaults, and persistence

use quizloop_config::{
    ActionsConfig, AgentConfig, Config, ConfigError, EngineConfig, ServerConfig, SECRET_ENV_VAR,
};
use serial_test::serial;
use std::path::PathBuf;
use tempfile::TempDir;

fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert!(config.engine.model.is_none());
    assert!(config.model().is_none());
    assert_eq!(config.engine.temperature, 0.0);
    assert_eq!(config.engine.max_tokens, 4096);
    assert_eq!(config.engine.timeout_secs, 120);
    assert!(config.engine.api_key.is_empty());
    assert!(config.engine.api_base.is_none());

    assert_eq!(config.agent.max_iterations, 25);
    assert_eq!(config.agent.workspace, "~/.quizloop/workspace");
    assert!(config.agent.directive.is_none());

    assert_eq!(config.actions.timeout_secs, 120);
    assert_eq!(config.actions.max_output_chars, 50_000);
    assert_eq!(config.actions.max_error_chars, 2_000);
    assert_eq!(config.actions.python, "python3");
    assert_eq!(config.actions.installer, vec!["python3", "-m", "pip", "install"]);

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 7860);
    assert!(config.server.secret.is_empty());
}

#[test]
fn test_section_defaults_match_root() {
    let config = Config::default();
    assert_eq!(EngineConfig::default().model, config.engine.model);
    assert_eq!(AgentConfig::default().max_iterations, config.agent.max_iterations);
    assert_eq!(ActionsConfig::default().python, config.actions.python);
    assert_eq!(ServerConfig::default().port, config.server.port);
}

#[test]
fn test_partial_json_fills_defaults() {
    let json = r#"{ "agent": { "max_iterations": 7 }, "server": { "port": 9000 } }"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.agent.max_iterations, 7);
    assert_eq!(config.agent.workspace, "~/.quizloop/workspace");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert!(config.engine.model.is_none());
}

#[test]
fn test_empty_json_object_is_default() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config.agent.max_iterations, 25);
    assert_eq!(config.actions.max_output_chars, 50_000);
}

#[test]
fn test_api_base_not_serialized_when_none() {
    let json = serde_json::to_string(&Config::default()).unwrap();
    assert!(!json.contains("api_base"));
    assert!(!json.contains("directive"));
    assert!(!json.contains("\"model\""));
}

#[test]
fn test_blank_model_counts_as_unset() {
    let config: Config = serde_json::from_str(r#"{ "engine": { "model": "  " } }"#).unwrap();
    assert!(config.model().is_none());

    let config: Config =
        serde_json::from_str(r#"{ "engine": { "model": "gpt-4o" } }"#).unwrap();
    assert_eq!(config.model().as_deref(), Some("gpt-4o"));
}

#[tokio::test]
async fn test_load_missing_file_returns_defaults() {
    let dir = temp_dir();
    let path = dir.path().join("missing.json");

    let config = Config::load_from(&path).await.unwrap();
    assert_eq!(config.agent.max_iterations, 25);
}

#[tokio::test]
async fn test_save_and_load_preserves_values() {
    let dir = temp_dir();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.engine.api_key = "AIza-test".to_string();
    config.engine.model = Some("custom/model".to_string());
    config.agent.max_iterations = 3;
    config.agent.directive = Some("Be brief.".to_string());
    config.server.secret = "s3cret".to_string();
    config.save_to(&path).await.unwrap();
    assert!(path.exists());

    let loaded = Config::load_from(&path).await.unwrap();
    assert_eq!(loaded.engine.api_key, "AIza-test");
    assert_eq!(loaded.model().as_deref(), Some("custom/model"));
    assert_eq!(loaded.agent.max_iterations, 3);
    assert_eq!(loaded.agent.directive.as_deref(), Some("Be brief."));
    assert_eq!(loaded.server.secret, "s3cret");
}

#[tokio::test]
async fn test_load_invalid_json_fails() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let result = Config::load_from(&path).await;
    assert!(matches!(result, Err(ConfigError::Json(_))));
}

#[tokio::test]
async fn test_load_rejects_zero_iteration_cap() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, r#"{ "agent": { "max_iterations": 0 } }"#)
        .await
        .unwrap();

    let result = Config::load_from(&path).await;
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_workspace_path_absolute() {
    let mut config = Config::default();
    config.agent.workspace = "/custom/workspace".to_string();
    assert_eq!(config.workspace_path(), PathBuf::from("/custom/workspace"));
}

#[test]
fn test_workspace_path_expands_home() {
    let config = Config::default();
    let path = config.workspace_path();
    assert!(path.ends_with(".quizloop/workspace"));
    assert!(!path.to_string_lossy().starts_with('~'));
}

#[test]
#[serial]
fn test_secret_from_file_wins() {
    std::env::set_var(SECRET_ENV_VAR, "from-env");
    let mut config = Config::default();
    config.server.secret = "from-file".to_string();
    assert_eq!(config.secret().as_deref(), Some("from-file"));
    std::env::remove_var(SECRET_ENV_VAR);
}

#[test]
#[serial]
fn test_secret_falls_back_to_environment() {
    std::env::set_var(SECRET_ENV_VAR, "from-env");
    let config = Config::default();
    assert_eq!(config.secret().as_deref(), Some("from-env"));

    std::env::remove_var(SECRET_ENV_VAR);
    assert!(config.secret().is_none());
}

#[test]
#[serial]
fn test_api_key_environment_fallback() {
    let saved: Vec<(&str, Option<String>)> = quizloop_config::API_KEY_ENV_VARS
        .iter()
        .map(|var| (*var, std::env::var(var).ok()))
        .collect();
    for var in quizloop_config::API_KEY_ENV_VARS {
        std::env::remove_var(var);
    }

    let config = Config::default();
    assert!(!config.has_api_key());

    std::env::set_var("GOOGLE_API_KEY", "AIza-env");
    assert_eq!(config.api_key().as_deref(), Some("AIza-env"));

    std::env::remove_var("GOOGLE_API_KEY");
    std::env::set_var("OPENROUTER_API_KEY", "sk-or-env");
    std::env::set_var("OPENAI_API_KEY", "sk-env");
    assert_eq!(config.api_key().as_deref(), Some("sk-env"));

    for (var, value) in saved {
        match value {
            Some(value) => std::env::set_var(var, value),
            None => std::env::remove_var(var),
        }
    }
}

#[test]
fn test_api_key_lookup_order() {
    assert_eq!(
        quizloop_config::API_KEY_ENV_VARS,
        &[
            "QUIZLOOP_API_KEY",
            "GOOGLE_API_KEY",
            "OPENAI_API_KEY",
            "OPENROUTER_API_KEY"
        ]
    );
}

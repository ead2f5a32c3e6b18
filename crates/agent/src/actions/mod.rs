//! Action catalog
//!
//! An action is a named external capability with a JSON-schema argument
//! contract. The registry compiles every schema once at registration and is
//! read-only afterwards; the executor runs requests against it.

pub mod code;
pub mod download;
pub mod executor;
pub mod http;
pub mod install;
pub mod render;

pub use code::RunAnalysisCodeAction;
pub use download::DownloadResourceAction;
pub use executor::ActionExecutor;
pub use http::HttpPostAction;
pub use install::InstallDependenciesAction;
pub use render::RenderPageAction;

use async_trait::async_trait;
use jsonschema::Validator;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use quizloop_config::ActionsConfig;
use quizloop_provider::Tool;

/// Action-level errors. None of these escape the executor.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("◆ UNKNOWN ACTION: {0}")]
    UnknownAction(String),

    #[error("◆ DUPLICATE ACTION: {0}")]
    DuplicateAction(String),

    #[error("◆ INVALID SCHEMA FOR {name}: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("◆ INVALID ARGUMENTS: {0}")]
    SchemaViolation(String),

    #[error("◆ TIMEOUT AFTER {0:?}")]
    Timeout(Duration),

    #[error("◆ ACTION FAILED: {0}")]
    Failed(String),

    #[error("◆ DATA LINK ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("◆ NETWORK ERROR: {0}")]
    Http(#[from] reqwest::Error),

    #[error("◆ MALFORMED ARGUMENTS: {0}")]
    Arguments(#[from] serde_json::Error),

    #[error("◆ CANCELLED")]
    Cancelled,

    #[error("◆ ACTION PANICKED")]
    Panicked,
}

/// Per-run environment handed to every action
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub workspace: PathBuf,
    pub cancel: CancellationToken,
}

impl ActionContext {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the argument object
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value, ctx: &ActionContext) -> Result<String, ActionError>;
}

struct RegisteredAction {
    action: Arc<dyn Action>,
    validator: Validator,
}

/// Fixed catalog of named actions
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, RegisteredAction>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five built-in actions, configured from `config`
    pub fn with_defaults(config: &ActionsConfig) -> Result<Self, ActionError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut registry = Self::new();
        registry.register(RenderPageAction::new(client.clone()))?;
        registry.register(DownloadResourceAction::new(client.clone()))?;
        registry.register(RunAnalysisCodeAction::new(config.python.clone()))?;
        registry.register(HttpPostAction::new(client))?;
        registry.register(InstallDependenciesAction::new(config.installer.clone()))?;
        Ok(registry)
    }

    pub fn register<A: Action + 'static>(&mut self, action: A) -> Result<(), ActionError> {
        let name = action.name().to_string();
        if self.actions.contains_key(&name) {
            return Err(ActionError::DuplicateAction(name));
        }

        let validator =
            jsonschema::validator_for(&action.parameters()).map_err(|err| {
                ActionError::InvalidSchema {
                    name: name.clone(),
                    reason: err.to_string(),
                }
            })?;

        debug!("◆ REGISTERED ACTION: {}", name);
        self.actions.insert(
            name,
            RegisteredAction {
                action: Arc::new(action),
                validator,
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Action>, ActionError> {
        self.actions
            .get(name)
            .map(|entry| Arc::clone(&entry.action))
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))
    }

    /// Check `args` against the schema declared by `name`
    pub fn validate(&self, name: &str, args: &Value) -> Result<(), ActionError> {
        let entry = self
            .actions
            .get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;
        let messages: Vec<String> = entry
            .validator
            .iter_errors(args)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(ActionError::SchemaViolation(messages.join("; ")))
        }
    }

    /// Catalog in engine tool format, sorted by name
    pub fn definitions(&self) -> Vec<Tool> {
        let mut entries: Vec<&RegisteredAction> = self.actions.values().collect();
        entries.sort_by(|a, b| a.action.name().cmp(b.action.name()));
        entries
            .into_iter()
            .map(|entry| {
                Tool::new(
                    entry.action.name(),
                    entry.action.description(),
                    entry.action.parameters(),
                )
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => {
            let dropped = text[byte_idx..].chars().count();
            format!(
                "{}\n◆ TRUNCATED: {} CHARACTERS OMITTED",
                &text[..byte_idx],
                dropped
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let out = truncate_chars("ééééé", 2);
        assert!(out.starts_with("éé\n"));
        assert!(out.contains("3 CHARACTERS OMITTED"));
    }

    #[test]
    fn test_context_defaults_to_live_token() {
        let ctx = ActionContext::new("/tmp/run");
        assert_eq!(ctx.workspace, PathBuf::from("/tmp/run"));
        assert!(!ctx.cancel.is_cancelled());
    }
}

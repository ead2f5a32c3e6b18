//! Renders task history into engine messages

use std::path::Path;
use tracing::debug;

use quizloop_provider::{Message, ToolCallDef};

use crate::conversation::Conversation;
use crate::turn::{Outcome, Turn};

/// Built-in directive
pub const DEFAULT_DIRECTIVE: &str = r#"You are a careful data-analysis assistant that solves quiz tasks published on web pages.
You have actions to render web pages, download files, run Python analysis code, send HTTP POST requests, and install Python packages.

When asked to solve a quiz:
1. Use render_page to read the question.
2. If the task needs data (CSV, audio, text, images), download it first with download_resource.
3. Write and run Python with run_analysis_code to analyse the data. Files you downloaded are in the working directory.
4. Always verify your answer before giving it.
5. When you are done, reply with the final answer only, without calling any action."#;

/// Holds the directive and turns history into role-tagged messages
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    directive: String,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    /// Workspace file that overrides the built-in directive
    pub const DIRECTIVE_FILE: &'static str = "DIRECTIVE.md";

    pub fn new() -> Self {
        Self::with_directive(DEFAULT_DIRECTIVE)
    }

    pub fn with_directive(directive: impl Into<String>) -> Self {
        Self {
            directive: directive.into(),
        }
    }

    /// Use `DIRECTIVE.md` from the workspace when present
    pub async fn from_workspace(workspace: impl AsRef<Path>) -> Self {
        let path = workspace.as_ref().join(Self::DIRECTIVE_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => {
                debug!("◆ DIRECTIVE LOADED FROM {:?}", path);
                Self::with_directive(content.trim())
            }
            _ => Self::new(),
        }
    }

    pub fn directive(&self) -> &str {
        &self.directive
    }

    /// Messages for one engine call.
    ///
    /// A directive turn already in history is rendered as-is; otherwise the
    /// builder's directive is placed in front. Never more than one.
    pub fn render(&self, conversation: &Conversation) -> Vec<Message> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if !conversation.has_directive() {
            messages.push(Message::system(&self.directive));
        }

        for turn in conversation.turns() {
            messages.push(match turn {
                Turn::Directive { text } => Message::system(text),
                Turn::Instruction { text } => Message::user(text),
                Turn::Reasoning(reasoning) => Message::assistant_with_calls(
                    reasoning.text.clone(),
                    reasoning
                        .requests
                        .iter()
                        .map(|r| ToolCallDef::new(&r.id, &r.name, r.arguments.clone()))
                        .collect(),
                ),
                Turn::ActionResult(result) => {
                    let content = match &result.outcome {
                        Outcome::Success(payload) => payload.clone(),
                        Outcome::Failure(description) => format!("Error: {}", description),
                    };
                    Message::tool(&result.request_id, &result.action, content)
                }
            });
        }

        messages
    }
}

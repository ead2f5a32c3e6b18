//! Turn model for task history

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured invocation of an action, emitted inside a reasoning turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ActionRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result of one action: a payload or a failure description, never both
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Outcome {
    Success(String),
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Outcome::Success(text) | Outcome::Failure(text) => text,
        }
    }
}

/// Answer to exactly one action request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub request_id: String,
    pub action: String,
    pub outcome: Outcome,
}

impl ActionResult {
    pub fn success(request: &ActionRequest, payload: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            action: request.name.clone(),
            outcome: Outcome::Success(payload.into()),
        }
    }

    pub fn failure(request: &ActionRequest, description: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            action: request.name.clone(),
            outcome: Outcome::Failure(description.into()),
        }
    }
}

/// Output of one reasoning-engine invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTurn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<ActionRequest>,
}

impl ReasoningTurn {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            requests: Vec::new(),
        }
    }

    pub fn acting(text: Option<String>, requests: Vec<ActionRequest>) -> Self {
        Self { text, requests }
    }
}

/// One entry in task history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    Directive { text: String },
    Instruction { text: String },
    Reasoning(ReasoningTurn),
    ActionResult(ActionResult),
}

impl Turn {
    pub fn directive(text: impl Into<String>) -> Self {
        Turn::Directive { text: text.into() }
    }

    pub fn instruction(text: impl Into<String>) -> Self {
        Turn::Instruction { text: text.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Turn::Directive { .. } => "directive",
            Turn::Instruction { .. } => "instruction",
            Turn::Reasoning(_) => "reasoning",
            Turn::ActionResult(_) => "action_result",
        }
    }
}

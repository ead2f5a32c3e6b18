//! Task-solving core
//!
//! Alternates between a reasoning engine and a bounded catalog of actions
//! until the engine produces an answer without further action requests.

use std::time::Duration;
use thiserror::Error;

use quizloop_provider::ProviderError;

pub mod actions;
pub mod context;
pub mod conversation;
pub mod loop_agent;
pub mod router;
pub mod turn;

pub use actions::{Action, ActionContext, ActionError, ActionExecutor, ActionRegistry};
pub use context::ContextBuilder;
pub use conversation::Conversation;
pub use loop_agent::{AgentLoop, LoopConfig, RunOutcome, RunStatus, Task, ABORT_ANSWER};
pub use router::{route, Route, NO_ANSWER};
pub use turn::{ActionRequest, ActionResult, Outcome, ReasoningTurn, Turn};

/// Violations of history ordering and routing preconditions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("◆ INVALID TURN ORDER: {0}")]
    InvalidTurnOrder(String),

    #[error("◆ EMPTY HISTORY")]
    Empty,

    #[error("◆ LATEST TURN IS NOT A REASONING TURN: {0}")]
    NotReasoning(&'static str),

    #[error("◆ UNANSWERED REQUESTS: {0:?}")]
    Unanswered(Vec<String>),
}

/// Run-level errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("◆ STRUCTURAL FAULT: {0}")]
    Structural(#[from] StateError),

    #[error("◆ ENGINE FAILURE: {0}")]
    Engine(#[from] ProviderError),

    #[error("◆ ENGINE TIMEOUT AFTER {0:?}")]
    EngineTimeout(Duration),

    #[error("◆ RUN CANCELLED")]
    Cancelled,

    #[error("◆ DATA LINK ERROR: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

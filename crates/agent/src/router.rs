//! Decides what follows a reasoning turn

use crate::turn::{ActionRequest, Turn};
use crate::StateError;

/// Answer used when the engine finishes with no text
pub const NO_ANSWER: &str = "no answer produced";

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Execute these requests, then reason again
    Act(Vec<ActionRequest>),
    /// Terminate with this answer
    Finish(String),
}

/// Route on the latest turn of history.
///
/// Only a reasoning turn can be routed; anything else means the loop lost
/// track of its own state.
pub fn route(latest: Option<&Turn>) -> Result<Route, StateError> {
    match latest {
        None => Err(StateError::Empty),
        Some(Turn::Reasoning(reasoning)) => {
            if !reasoning.requests.is_empty() {
                return Ok(Route::Act(reasoning.requests.clone()));
            }
            let answer = reasoning
                .text
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or(NO_ANSWER);
            Ok(Route::Finish(answer.to_string()))
        }
        Some(other) => Err(StateError::NotReasoning(other.kind())),
    }
}

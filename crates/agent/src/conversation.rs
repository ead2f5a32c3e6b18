//! Conversation state: the append-only history of a single task run

use serde::Serialize;
use std::collections::HashSet;
use tracing::trace;

use crate::turn::Turn;
use crate::StateError;

/// Instruction used when history would otherwise hold only a directive
pub const PLACEHOLDER_INSTRUCTION: &str = "Please proceed with the task.";

/// Ordered task history.
///
/// Every mutation goes through [`Conversation::append`], which rejects turns
/// that would break the ordering rules and leaves history untouched when it
/// does:
///
/// * a directive turn may only be the first turn;
/// * an action-result turn must answer a request of the latest reasoning
///   turn that has not been answered yet;
/// * no instruction or reasoning turn may be appended while requests are
///   still pending.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Conversation {
    turns: Vec<Turn>,
    #[serde(skip)]
    pending: Vec<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// History with an optional directive followed by the task instruction
    pub fn seeded(directive: Option<&str>, instruction: &str) -> Result<Self, StateError> {
        let mut conversation = Self::new();
        if let Some(directive) = directive {
            conversation.append(Turn::directive(directive))?;
        }
        conversation.append(Turn::instruction(instruction))?;
        Ok(conversation)
    }

    pub fn append(&mut self, turn: Turn) -> Result<(), StateError> {
        match &turn {
            Turn::Directive { .. } => {
                if !self.turns.is_empty() {
                    return Err(StateError::InvalidTurnOrder(
                        "directive turn must be the first turn".to_string(),
                    ));
                }
            }
            Turn::Instruction { .. } => {
                if !self.pending.is_empty() {
                    return Err(StateError::InvalidTurnOrder(format!(
                        "instruction appended while {} request(s) are pending",
                        self.pending.len()
                    )));
                }
            }
            Turn::Reasoning(reasoning) => {
                if !self.pending.is_empty() {
                    return Err(StateError::InvalidTurnOrder(format!(
                        "reasoning turn appended while {} request(s) are pending",
                        self.pending.len()
                    )));
                }
                let mut seen = HashSet::new();
                for request in &reasoning.requests {
                    if request.id.is_empty() || !seen.insert(request.id.as_str()) {
                        return Err(StateError::InvalidTurnOrder(format!(
                            "reasoning turn carries empty or duplicate request id '{}'",
                            request.id
                        )));
                    }
                }
            }
            Turn::ActionResult(result) => {
                if !self.pending.contains(&result.request_id) {
                    return Err(StateError::InvalidTurnOrder(format!(
                        "no pending request with id '{}'",
                        result.request_id
                    )));
                }
            }
        }

        match &turn {
            Turn::Reasoning(reasoning) => {
                self.pending = reasoning.requests.iter().map(|r| r.id.clone()).collect();
            }
            Turn::ActionResult(result) => {
                self.pending.retain(|id| id != &result.request_id);
            }
            Turn::Directive { .. } | Turn::Instruction { .. } => {}
        }

        trace!("appending {} turn #{}", turn.kind(), self.turns.len());
        self.turns.push(turn);
        Ok(())
    }

    /// Appends the placeholder instruction if no instruction exists yet
    pub fn ensure_instruction(&mut self) -> Result<bool, StateError> {
        if self.has_instruction() {
            return Ok(false);
        }
        self.append(Turn::instruction(PLACEHOLDER_INSTRUCTION))?;
        Ok(true)
    }

    /// Fresh iterator over history, oldest first
    pub fn turns(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }

    pub fn latest(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Request ids of the latest reasoning turn still awaiting a result
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn has_directive(&self) -> bool {
        matches!(self.turns.first(), Some(Turn::Directive { .. }))
    }

    pub fn has_instruction(&self) -> bool {
        self.turns
            .iter()
            .any(|turn| matches!(turn, Turn::Instruction { .. }))
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::{ActionRequest, ActionResult, ReasoningTurn};
    use serde_json::json;

    fn request(id: &str) -> ActionRequest {
        ActionRequest::new(id, "render_page", json!({"url": "https://example.test"}))
    }

    fn acting(ids: &[&str]) -> Turn {
        Turn::Reasoning(ReasoningTurn::acting(
            None,
            ids.iter().map(|id| request(id)).collect(),
        ))
    }

    fn result(id: &str) -> Turn {
        Turn::ActionResult(ActionResult::success(&request(id), "ok"))
    }

    #[test]
    fn test_empty_conversation() {
        let conversation = Conversation::new();
        assert!(conversation.is_empty());
        assert!(conversation.latest().is_none());
        assert!(conversation.pending().is_empty());
        assert!(!conversation.has_directive());
    }

    #[test]
    fn test_seeded_order() {
        let conversation = Conversation::seeded(Some("policy"), "solve").unwrap();
        let kinds: Vec<_> = conversation.turns().map(Turn::kind).collect();
        assert_eq!(kinds, vec!["directive", "instruction"]);
        assert!(conversation.has_directive());
        assert!(conversation.has_instruction());
    }

    #[test]
    fn test_directive_only_first() {
        let mut conversation = Conversation::new();
        conversation.append(Turn::instruction("solve")).unwrap();
        let err = conversation.append(Turn::directive("policy")).unwrap_err();
        assert!(matches!(err, StateError::InvalidTurnOrder(_)));
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_directive_exactly_once() {
        let mut conversation = Conversation::new();
        conversation.append(Turn::directive("policy")).unwrap();
        assert!(conversation.append(Turn::directive("policy")).is_err());
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_result_without_pending_request_rejected_without_mutation() {
        let mut conversation = Conversation::seeded(None, "solve").unwrap();
        let before = conversation.clone().into_turns();

        let err = conversation.append(result("call_1")).unwrap_err();
        assert!(matches!(err, StateError::InvalidTurnOrder(_)));
        assert_eq!(conversation.clone().into_turns(), before);
    }

    #[test]
    fn test_results_must_match_latest_reasoning_turn() {
        let mut conversation = Conversation::seeded(None, "solve").unwrap();
        conversation.append(acting(&["a", "b"])).unwrap();
        assert_eq!(conversation.pending(), &["a".to_string(), "b".to_string()]);

        assert!(conversation.append(result("zzz")).is_err());

        // results may arrive in any order
        conversation.append(result("b")).unwrap();
        conversation.append(result("a")).unwrap();
        assert!(conversation.pending().is_empty());

        // duplicate answer is rejected
        assert!(conversation.append(result("a")).is_err());
        assert_eq!(conversation.len(), 4);
    }

    #[test]
    fn test_reasoning_blocked_while_pending() {
        let mut conversation = Conversation::seeded(None, "solve").unwrap();
        conversation.append(acting(&["a"])).unwrap();

        assert!(conversation
            .append(Turn::Reasoning(ReasoningTurn::answer("done")))
            .is_err());
        assert!(conversation.append(Turn::instruction("more")).is_err());

        conversation.append(result("a")).unwrap();
        conversation
            .append(Turn::Reasoning(ReasoningTurn::answer("done")))
            .unwrap();
    }

    #[test]
    fn test_stale_request_ids_cannot_be_answered_later() {
        let mut conversation = Conversation::seeded(None, "solve").unwrap();
        conversation.append(acting(&["a"])).unwrap();
        conversation.append(result("a")).unwrap();
        conversation.append(acting(&["b"])).unwrap();

        assert!(conversation.append(result("a")).is_err());
        conversation.append(result("b")).unwrap();
    }

    #[test]
    fn test_duplicate_request_ids_rejected() {
        let mut conversation = Conversation::seeded(None, "solve").unwrap();
        assert!(conversation.append(acting(&["x", "x"])).is_err());
        assert!(conversation.append(acting(&[""])).is_err());
        assert!(conversation.pending().is_empty());
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_ensure_instruction_adds_placeholder_once() {
        let mut conversation = Conversation::new();
        conversation.append(Turn::directive("policy")).unwrap();

        assert!(conversation.ensure_instruction().unwrap());
        assert!(!conversation.ensure_instruction().unwrap());
        assert_eq!(
            conversation.latest(),
            Some(&Turn::instruction(PLACEHOLDER_INSTRUCTION))
        );
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_turns_is_restartable() {
        let conversation = Conversation::seeded(Some("policy"), "solve").unwrap();
        assert_eq!(conversation.turns().count(), 2);
        assert_eq!(conversation.turns().count(), 2);
        assert_eq!(conversation.turns().next(), Some(&Turn::directive("policy")));
    }
}

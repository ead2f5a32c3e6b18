//! Shared test actions and providers
#![allow(dead_code)]

use async_trait::async_trait;
use quizloop_agent::{Action, ActionContext, ActionError, ActionRegistry};
use quizloop_provider::{ChatParams, ChatResponse, Provider, ProviderError, ToolCall};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns its `text` argument
pub struct EchoAction;

#[async_trait]
impl Action for EchoAction {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echo text back"
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }
    async fn execute(&self, args: Value, _ctx: &ActionContext) -> Result<String, ActionError> {
        Ok(args["text"].as_str().unwrap_or_default().to_string())
    }
}

/// Sleeps for `ms` milliseconds, then reports it
pub struct SleepAction;

#[async_trait]
impl Action for SleepAction {
    fn name(&self) -> &str {
        "sleep"
    }
    fn description(&self) -> &str {
        "Sleep"
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "ms": { "type": "integer", "minimum": 0 } },
            "required": ["ms"]
        })
    }
    async fn execute(&self, args: Value, _ctx: &ActionContext) -> Result<String, ActionError> {
        let ms = args["ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(format!("slept {}ms", ms))
    }
}

/// Always fails
pub struct FailAction;

#[async_trait]
impl Action for FailAction {
    fn name(&self) -> &str {
        "fail"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters(&self) -> Value {
        json!({ "type": "object" })
    }
    async fn execute(&self, _args: Value, _ctx: &ActionContext) -> Result<String, ActionError> {
        Err(ActionError::Failed("boom".to_string()))
    }
}

/// Panics inside its task
pub struct PanicAction;

#[async_trait]
impl Action for PanicAction {
    fn name(&self) -> &str {
        "panic"
    }
    fn description(&self) -> &str {
        "Panics"
    }
    fn parameters(&self) -> Value {
        json!({ "type": "object" })
    }
    async fn execute(&self, _args: Value, _ctx: &ActionContext) -> Result<String, ActionError> {
        panic!("action blew up");
    }
}

/// Counts its invocations
pub struct CountAction {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Action for CountAction {
    fn name(&self) -> &str {
        "count"
    }
    fn description(&self) -> &str {
        "Count invocations"
    }
    fn parameters(&self) -> Value {
        json!({ "type": "object" })
    }
    async fn execute(&self, _args: Value, _ctx: &ActionContext) -> Result<String, ActionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("call #{}", n))
    }
}

pub fn test_registry(calls: Arc<AtomicUsize>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register(EchoAction).unwrap();
    registry.register(SleepAction).unwrap();
    registry.register(FailAction).unwrap();
    registry.register(PanicAction).unwrap();
    registry.register(CountAction { calls }).unwrap();
    registry
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

type Script = dyn Fn(usize, &ChatParams) -> Result<ChatResponse, ProviderError> + Send + Sync;

/// Provider whose replies are computed from the call index and the request
pub struct ScriptedProvider {
    script: Box<Script>,
    pub seen: Arc<Mutex<Vec<ChatParams>>>,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new(
        script: impl Fn(usize, &ChatParams) -> Result<ChatResponse, ProviderError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            seen: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    /// Replies in order; the last reply repeats
    pub fn replies(replies: Vec<ChatResponse>) -> Self {
        Self::new(move |idx, _| Ok(replies[idx.min(replies.len() - 1)].clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let idx = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(params.clone());
            seen.len() - 1
        };
        (self.script)(idx, &params)
    }

    fn default_model(&self) -> String {
        "scripted".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

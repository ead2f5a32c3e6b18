//! Orchestration loop - alternates reasoning and action phases

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use quizloop_config::{paths::ensure_dir, Config};
use quizloop_provider::{ChatParams, Provider, Tool, ToolChoice};

use crate::actions::{ActionContext, ActionExecutor};
use crate::context::ContextBuilder;
use crate::conversation::Conversation;
use crate::router::{route, Route};
use crate::turn::{ActionRequest, ReasoningTurn, Turn};
use crate::{AgentError, Result, StateError};

/// Answer returned when the iteration cap is hit
pub const ABORT_ANSWER: &str = "task aborted: iteration limit";

/// Engine parameters for a loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Empty means the provider's default model
    pub model: String,
    pub max_iterations: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    pub engine_timeout: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_iterations: 25,
            temperature: 0.0,
            max_tokens: 4096,
            engine_timeout: Duration::from_secs(120),
        }
    }
}

impl LoopConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model().unwrap_or_default(),
            max_iterations: config.agent.max_iterations.max(1),
            temperature: config.engine.temperature,
            max_tokens: config.engine.max_tokens,
            engine_timeout: Duration::from_secs(config.engine.timeout_secs),
        }
    }
}

/// A task for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub instruction: String,
}

impl Task {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }

    pub fn from_url(url: &str) -> Self {
        Self::new(format!(
            "Go to this URL and solve the task found there: {}",
            url
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    IterationLimit,
}

/// Result of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub answer: String,
    pub status: RunStatus,
    /// Number of action phases executed
    pub round_trips: u32,
    pub conversation: Conversation,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

enum Phase {
    Reason,
    Act(Vec<ActionRequest>),
    Done(String, RunStatus),
}

/// Drives one task from instruction to answer
pub struct AgentLoop<P: Provider> {
    provider: Arc<P>,
    executor: ActionExecutor,
    context: ContextBuilder,
    catalog: Vec<Tool>,
    config: LoopConfig,
}

impl<P: Provider> AgentLoop<P> {
    pub fn new(
        provider: P,
        executor: ActionExecutor,
        context: ContextBuilder,
        config: LoopConfig,
    ) -> Self {
        let catalog = executor.definitions();
        Self {
            provider: Arc::new(provider),
            executor,
            context,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn catalog(&self) -> &[Tool] {
        &self.catalog
    }

    /// Solve `task` with actions operating in `ctx.workspace`
    pub async fn run(&self, task: &Task, ctx: &ActionContext) -> Result<RunOutcome> {
        let conversation = Conversation::seeded(Some(self.context.directive()), &task.instruction)?;
        self.run_conversation(conversation, ctx).await
    }

    /// Same as [`AgentLoop::run`], aborting when `cancel` fires
    pub async fn run_with_cancel(
        &self,
        task: &Task,
        ctx: &ActionContext,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let ctx = ctx.clone().with_cancel(cancel);
        self.run(task, &ctx).await
    }

    /// Continue from an existing history
    pub async fn run_conversation(
        &self,
        mut conversation: Conversation,
        ctx: &ActionContext,
    ) -> Result<RunOutcome> {
        let started_at = Utc::now();
        ensure_dir(&ctx.workspace).await?;
        info!(
            "◆ RUN STARTED (max {} round trips, workspace {:?})",
            self.config.max_iterations, ctx.workspace
        );

        let mut round_trips = 0u32;
        let mut phase = Phase::Reason;

        loop {
            phase = match phase {
                Phase::Reason => {
                    if ctx.cancel.is_cancelled() {
                        return Err(AgentError::Cancelled);
                    }
                    conversation.ensure_instruction()?;

                    let reasoning = self.reason(&conversation, ctx).await.map_err(|e| {
                        error!("◆ ENGINE CALL FAILED: {}", e);
                        e
                    })?;
                    conversation.append(Turn::Reasoning(reasoning))?;

                    match route(conversation.latest())? {
                        Route::Finish(answer) => Phase::Done(answer, RunStatus::Completed),
                        Route::Act(_) if round_trips >= self.config.max_iterations => {
                            warn!(
                                "◆ ITERATION LIMIT REACHED AFTER {} ROUND TRIPS",
                                round_trips
                            );
                            Phase::Done(ABORT_ANSWER.to_string(), RunStatus::IterationLimit)
                        }
                        Route::Act(requests) => Phase::Act(requests),
                    }
                }

                Phase::Act(requests) => {
                    round_trips += 1;
                    debug!(
                        "◆ ROUND TRIP {}: {} action(s)",
                        round_trips,
                        requests.len()
                    );

                    let results = self.executor.execute(&requests, ctx).await;
                    if ctx.cancel.is_cancelled() {
                        return Err(AgentError::Cancelled);
                    }
                    for result in results {
                        conversation.append(Turn::ActionResult(result))?;
                    }
                    if !conversation.pending().is_empty() {
                        return Err(StateError::Unanswered(conversation.pending().to_vec()).into());
                    }
                    Phase::Reason
                }

                Phase::Done(answer, status) => {
                    info!("◆ RUN FINISHED ({:?}) AFTER {} ROUND TRIPS", status, round_trips);
                    return Ok(RunOutcome {
                        answer,
                        status,
                        round_trips,
                        conversation,
                        started_at,
                        finished_at: Utc::now(),
                    });
                }
            };
        }
    }

    /// One engine invocation, mapped back into a reasoning turn
    async fn reason(
        &self,
        conversation: &Conversation,
        ctx: &ActionContext,
    ) -> Result<ReasoningTurn> {
        let model = if self.config.model.is_empty() {
            self.provider.default_model()
        } else {
            self.config.model.clone()
        };
        let params = ChatParams {
            model,
            messages: self.context.render(conversation),
            tools: self.catalog.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tool_choice: ToolChoice::Auto,
        };

        let timeout = self.config.engine_timeout;
        let response = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(AgentError::Cancelled),
            result = tokio::time::timeout(timeout, self.provider.chat(params)) => match result {
                Ok(response) => response?,
                Err(_) => return Err(AgentError::EngineTimeout(timeout)),
            },
        };

        let requests = normalize_requests(response.tool_calls.into_iter().map(|call| {
            ActionRequest::new(call.id, call.name, call.arguments)
        }));
        let text = response.content.filter(|text| !text.trim().is_empty());
        debug!(
            "◆ ENGINE REPLIED: {} request(s), text: {}",
            requests.len(),
            text.is_some()
        );

        Ok(ReasoningTurn::acting(text, requests))
    }
}

/// Replace empty or repeated request ids with fresh ones
fn normalize_requests(requests: impl IntoIterator<Item = ActionRequest>) -> Vec<ActionRequest> {
    let mut seen = HashSet::new();
    requests
        .into_iter()
        .map(|mut request| {
            if request.id.trim().is_empty() || seen.contains(&request.id) {
                request.id = format!("call_{}", uuid::Uuid::new_v4().simple());
            }
            seen.insert(request.id.clone());
            request
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_from_url() {
        let task = Task::from_url("https://example.test/quiz");
        assert_eq!(
            task.instruction,
            "Go to this URL and solve the task found there: https://example.test/quiz"
        );
    }

    #[test]
    fn test_normalize_requests_fixes_ids() {
        let requests = normalize_requests(vec![
            ActionRequest::new("a", "render_page", json!({})),
            ActionRequest::new("a", "render_page", json!({})),
            ActionRequest::new("", "http_post", json!({})),
            ActionRequest::new("b", "http_post", json!({})),
        ]);
        assert_eq!(requests[0].id, "a");
        assert_ne!(requests[1].id, "a");
        assert!(requests[1].id.starts_with("call_"));
        assert!(requests[2].id.starts_with("call_"));
        assert_eq!(requests[3].id, "b");

        let ids: HashSet<_> = requests.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_loop_config_from_config() {
        let mut config = Config::default();
        config.agent.max_iterations = 3;
        config.engine.timeout_secs = 7;
        let loop_config = LoopConfig::from_config(&config);
        assert_eq!(loop_config.max_iterations, 3);
        assert_eq!(loop_config.engine_timeout, Duration::from_secs(7));
        assert!(loop_config.model.is_empty());

        config.engine.model = Some("gpt-4o".to_string());
        assert_eq!(LoopConfig::from_config(&config).model, "gpt-4o");
    }
}

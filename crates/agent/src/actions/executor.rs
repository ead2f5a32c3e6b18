//! Runs requested actions and turns every outcome into a result turn

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use quizloop_config::ActionsConfig;
use quizloop_provider::Tool;

use super::{truncate_chars, Action, ActionContext, ActionError, ActionRegistry};
use crate::turn::{ActionRequest, ActionResult};

pub struct ActionExecutor {
    registry: Arc<ActionRegistry>,
    timeout: Duration,
    max_output_chars: usize,
    max_error_chars: usize,
}

impl ActionExecutor {
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self::from_config(registry, &ActionsConfig::default())
    }

    pub fn from_config(registry: Arc<ActionRegistry>, config: &ActionsConfig) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(config.timeout_secs),
            max_output_chars: config.max_output_chars,
            max_error_chars: config.max_error_chars,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_limits(mut self, max_output_chars: usize, max_error_chars: usize) -> Self {
        self.max_output_chars = max_output_chars;
        self.max_error_chars = max_error_chars;
        self
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn definitions(&self) -> Vec<Tool> {
        self.registry.definitions()
    }

    /// Execute `requests` concurrently.
    ///
    /// Returns exactly one result per request, in request order. Unknown
    /// actions, schema violations, errors, panics and timeouts all come back
    /// as failure results; nothing is raised to the caller. If `ctx.cancel`
    /// fires, in-flight actions are aborted and reported as cancelled.
    pub async fn execute(
        &self,
        requests: &[ActionRequest],
        ctx: &ActionContext,
    ) -> Vec<ActionResult> {
        let mut slots: Vec<Option<ActionResult>> = vec![None; requests.len()];
        let mut set = JoinSet::new();

        for (idx, request) in requests.iter().enumerate() {
            let action = match self.prepare(request) {
                Ok(action) => action,
                Err(err) => {
                    slots[idx] = Some(self.failure(request, &err));
                    continue;
                }
            };

            debug!("◆ DISPATCHING {} [{}]", request.name, request.id);
            let args = request.arguments.clone();
            let ctx = ctx.clone();
            let timeout = self.timeout;
            set.spawn(async move {
                let outcome = match tokio::time::timeout(timeout, action.execute(args, &ctx)).await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ActionError::Timeout(timeout)),
                };
                (idx, outcome)
            });
        }

        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled(), if !cancelled => {
                    warn!("◆ CANCELLING {} IN-FLIGHT ACTION(S)", set.len());
                    set.abort_all();
                    cancelled = true;
                }
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok((idx, outcome))) => {
                        slots[idx] = Some(self.settle(&requests[idx], outcome));
                    }
                    Some(Err(err)) if err.is_panic() => {
                        warn!("◆ ACTION TASK PANICKED: {}", err);
                    }
                    Some(Err(_)) => {}
                },
            }
        }

        // a slot is only empty if its task panicked or was aborted
        let fallback = if cancelled {
            ActionError::Cancelled
        } else {
            ActionError::Panicked
        };
        slots
            .into_iter()
            .zip(requests)
            .map(|(slot, request)| slot.unwrap_or_else(|| self.failure(request, &fallback)))
            .collect()
    }

    fn prepare(&self, request: &ActionRequest) -> Result<Arc<dyn Action>, ActionError> {
        let action = self.registry.resolve(&request.name)?;
        self.registry.validate(&request.name, &request.arguments)?;
        Ok(action)
    }

    fn settle(
        &self,
        request: &ActionRequest,
        outcome: Result<String, ActionError>,
    ) -> ActionResult {
        match outcome {
            Ok(payload) => {
                debug!(
                    "◆ {} [{}] SUCCEEDED ({} bytes)",
                    request.name,
                    request.id,
                    payload.len()
                );
                ActionResult::success(request, truncate_chars(&payload, self.max_output_chars))
            }
            Err(err) => self.failure(request, &err),
        }
    }

    fn failure(&self, request: &ActionRequest, err: &ActionError) -> ActionResult {
        warn!("◆ {} [{}] FAILED: {}", request.name, request.id, err);
        ActionResult::failure(
            request,
            truncate_chars(&err.to_string(), self.max_error_chars),
        )
    }
}

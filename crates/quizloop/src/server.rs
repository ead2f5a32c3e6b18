//! HTTP front door: accepts tasks and answers them synchronously

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use quizloop_agent::{ActionContext, AgentLoop, Task};
use quizloop_provider::Provider;

/// Shared by every request
pub struct AppState<P: Provider> {
    agent: Arc<AgentLoop<P>>,
    secret: String,
    runs_dir: PathBuf,
}

impl<P: Provider> AppState<P> {
    /// Each run gets its own directory under `runs_dir`
    pub fn new(agent: AgentLoop<P>, secret: impl Into<String>, runs_dir: PathBuf) -> Self {
        Self {
            agent: Arc::new(agent),
            secret: secret.into(),
            runs_dir,
        }
    }
}

#[derive(Deserialize)]
struct SolveRequest {
    url: String,
    secret: String,
    #[serde(default)]
    email: Option<String>,
}

type Reply = (StatusCode, Json<Value>);

fn reject(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "error": message })))
}

pub fn router<P: Provider + 'static>(state: Arc<AppState<P>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/solve", post(solve::<P>))
        .layer(cors)
        .with_state(state)
}

pub async fn serve<P: Provider + 'static>(
    state: Arc<AppState<P>>,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("◆ FRONT DOOR LISTENING ON {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("◆ SHUTTING DOWN");
        })
        .await?;
    Ok(())
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /solve - run one task to completion
async fn solve<P: Provider + 'static>(
    State(state): State<Arc<AppState<P>>>,
    body: Bytes,
) -> Reply {
    let request: SolveRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("◆ REJECTED MALFORMED TASK: {}", e);
            return reject(StatusCode::BAD_REQUEST, "invalid json");
        }
    };

    if request.secret != state.secret {
        warn!("◆ REJECTED TASK WITH WRONG SECRET");
        return reject(StatusCode::FORBIDDEN, "invalid secret");
    }

    let run_id = uuid::Uuid::new_v4().simple().to_string();
    info!(
        "◆ TASK {} ACCEPTED: {} (from {})",
        run_id,
        request.url,
        request.email.as_deref().unwrap_or("anonymous")
    );

    // a dropped request cancels its run
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let ctx = ActionContext::new(state.runs_dir.join(&run_id)).with_cancel(cancel);
    let task = Task::from_url(&request.url);
    let agent = Arc::clone(&state.agent);

    let handle = tokio::spawn(async move { agent.run(&task, &ctx).await });
    match handle.await {
        Ok(Ok(outcome)) => {
            info!(
                "◆ TASK {} ANSWERED AFTER {} ROUND TRIPS",
                run_id, outcome.round_trips
            );
            (StatusCode::OK, Json(json!({ "answer": outcome.answer })))
        }
        Ok(Err(e)) => {
            error!("◆ TASK {} FAILED: {}", run_id, e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "task failed")
        }
        Err(e) => {
            error!("◆ TASK {} ABORTED: {}", run_id, e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "task failed")
        }
    }
}

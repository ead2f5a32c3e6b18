//! quizloop command implementations

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use quizloop_agent::context::DEFAULT_DIRECTIVE;
use quizloop_agent::{
    ActionContext, ActionExecutor, ActionRegistry, AgentLoop, ContextBuilder, LoopConfig,
    RunStatus, Task,
};
use quizloop_config::{self, Config};
use quizloop_provider::{ChatCompletionsProvider, EngineFlavor};

use crate::server::{self, AppState};

/// Initialize config and workspace
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing quizloop...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = quizloop_config::init().await?;
    let workspace = config.workspace_path();

    let directive = workspace.join(ContextBuilder::DIRECTIVE_FILE);
    if directive.exists() {
        println!("  {} already present", directive.display());
    } else {
        tokio::fs::write(&directive, format!("{}\n", DEFAULT_DIRECTIVE))
            .await
            .with_context(|| format!("writing {}", directive.display()))?;
        println!("  Created {}", directive.display());
    }

    println!("\n◆ quizloop initialized");
    println!("\nNext steps:");
    println!(
        "  1. Add an engine key to {} (or set GOOGLE_API_KEY)",
        quizloop_config::config_path().display()
    );
    println!("  2. Solve a task: quizloop solve --url https://example.com/quiz");
    println!("  3. Or serve tasks over HTTP: QUIZLOOP_SECRET=... quizloop serve");

    Ok(())
}

/// Show system status
pub async fn status_command() -> Result<()> {
    let config_path = quizloop_config::config_path();

    println!("◆ quizloop System Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() {
            "[OK]"
        } else {
            "[Missing]"
        }
    );

    let config = Config::load().await?;
    let workspace = config.workspace_path();
    println!(
        "Workspace: {} {}",
        workspace.display(),
        if workspace.exists() {
            "[OK]"
        } else {
            "[Missing]"
        }
    );
    match config.api_key() {
        Some(key) => {
            let flavor = EngineFlavor::detect(&key, config.api_base().as_deref());
            let model = config
                .model()
                .unwrap_or_else(|| flavor.default_model().to_string());
            println!("Model:     {}", model);
            println!("API Key:   [Set] ({:?})", flavor);
        }
        None => {
            println!(
                "Model:     {}",
                config.model().as_deref().unwrap_or("(engine default)")
            );
            println!("API Key:   [Missing]");
        }
    }
    println!(
        "Secret:    {}",
        if config.secret().is_some() {
            "[Set]"
        } else {
            "[Missing]"
        }
    );
    println!("Max round trips: {}", config.agent.max_iterations);
    println!(
        "Front door: {}:{}",
        config.server.host, config.server.port
    );

    println!("\n◆ Ready");
    Ok(())
}

pub struct SolveOptions {
    pub url: Option<String>,
    pub message: Option<String>,
    pub max_iterations: Option<u32>,
    pub transcript: Option<PathBuf>,
}

/// Solve one task and print the answer
pub async fn solve_command(options: SolveOptions) -> Result<()> {
    let mut config = Config::load().await?;
    if let Some(max) = options.max_iterations {
        anyhow::ensure!(max >= 1, "--max-iterations must be at least 1");
        config.agent.max_iterations = max;
    }

    let task = match (options.url, options.message) {
        (Some(url), _) => Task::from_url(&url),
        (None, Some(message)) => Task::new(message),
        (None, None) => anyhow::bail!("either --url or --message is required"),
    };

    let workspace = config.workspace_path();
    let agent = build_agent(&config, &workspace).await?;
    let ctx = ActionContext::new(&workspace);

    let outcome = agent.run(&task, &ctx).await?;
    if outcome.status == RunStatus::IterationLimit {
        warn!("◆ RUN STOPPED AT THE ITERATION LIMIT");
    }

    if let Some(path) = options.transcript {
        let json = serde_json::to_string_pretty(&outcome)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing transcript to {}", path.display()))?;
        info!("◆ TRANSCRIPT WRITTEN TO {}", path.display());
    }

    println!("{}", outcome.answer);
    Ok(())
}

/// Start the HTTP front door
pub async fn serve_command(host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = Config::load().await?;
    let secret = config.secret().context(
        "No shared secret configured. Set server.secret in the config file or QUIZLOOP_SECRET",
    )?;

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;

    let workspace = config.workspace_path();
    let agent = build_agent(&config, &workspace).await?;
    let state = Arc::new(AppState::new(agent, secret, workspace.join("runs")));

    server::serve(state, addr).await
}

/// Wire provider, action catalog and directive from configuration
async fn build_agent(
    config: &Config,
    workspace: &std::path::Path,
) -> Result<AgentLoop<ChatCompletionsProvider>> {
    let api_key = config.api_key().with_context(|| {
        format!(
            "No API key configured. Set engine.api_key in {} or one of {}",
            quizloop_config::config_path().display(),
            quizloop_config::API_KEY_ENV_VARS.join(", ")
        )
    })?;

    let provider =
        ChatCompletionsProvider::new(api_key, config.api_base(), config.model())
            .with_timeout(Duration::from_secs(config.engine.timeout_secs));

    let registry = ActionRegistry::with_defaults(&config.actions)
        .context("building the action catalog")?;
    let executor = ActionExecutor::from_config(Arc::new(registry), &config.actions);

    let context = match &config.agent.directive {
        Some(directive) if !directive.trim().is_empty() => {
            ContextBuilder::with_directive(directive.trim())
        }
        _ => ContextBuilder::from_workspace(workspace).await,
    };

    Ok(AgentLoop::new(
        provider,
        executor,
        context,
        LoopConfig::from_config(config),
    ))
}

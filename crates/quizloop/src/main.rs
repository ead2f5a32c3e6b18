//! quizloop - autonomous quiz-solving agent

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;
mod server;

use commands::{init_command, serve_command, solve_command, status_command, SolveOptions};

/// quizloop - solve web-hosted tasks with a reasoning engine and a small action catalog
#[derive(Parser)]
#[command(name = "quizloop")]
#[command(about = "◆ An autonomous quiz-solving agent loop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and workspace
    Init,
    /// Show system status
    Status,
    /// Solve a single task and print the answer
    Solve {
        /// URL of the page describing the task
        #[arg(short, long, conflicts_with = "message", required_unless_present = "message")]
        url: Option<String>,
        /// Free-text task instruction
        #[arg(short, long)]
        message: Option<String>,
        /// Round-trip cap for this run
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Write the full run (answer, status, history) as JSON
        #[arg(short, long)]
        transcript: Option<PathBuf>,
    },
    /// Start the HTTP front door
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if matches!(cli.command, Commands::Serve { verbose: true, .. }) {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Status => status_command().await,
        Commands::Solve {
            url,
            message,
            max_iterations,
            transcript,
        } => {
            solve_command(SolveOptions {
                url,
                message,
                max_iterations,
                transcript,
            })
            .await
        }
        Commands::Serve { host, port, .. } => serve_command(host, port).await,
    };

    if let Err(e) = result {
        error!("◆ {:#}", e);
        std::process::exit(1);
    }
}

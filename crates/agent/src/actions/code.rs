//! run_analysis_code: execute a Python snippet inside the run workspace

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use quizloop_config::paths::ensure_dir;

use super::{Action, ActionContext, ActionError};

pub struct RunAnalysisCodeAction {
    interpreter: String,
}

impl RunAnalysisCodeAction {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

#[derive(Deserialize)]
struct CodeArgs {
    code: String,
    #[serde(default)]
    args: Vec<String>,
}

#[async_trait]
impl Action for RunAnalysisCodeAction {
    fn name(&self) -> &str {
        "run_analysis_code"
    }

    fn description(&self) -> &str {
        "Run Python code in the working directory (where downloaded files live) and \
         return its printed output. Print the values you need."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": { "type": "string", "description": "Python source to execute" },
                "args": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional command-line arguments"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ActionContext) -> Result<String, ActionError> {
        let args: CodeArgs = serde_json::from_value(args)?;

        ensure_dir(&ctx.workspace).await?;
        // removed on drop if anything below fails early
        let snippet = tempfile::Builder::new()
            .prefix("snippet_")
            .suffix(".py")
            .tempfile_in(&ctx.workspace)?;
        tokio::fs::write(snippet.path(), &args.code).await?;
        debug!("◆ RUNNING {} {:?}", self.interpreter, snippet.path());

        let output = Command::new(&self.interpreter)
            .arg(snippet.path())
            .args(&args.args)
            .current_dir(&ctx.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let path = snippet.path().to_path_buf();
        if let Err(e) = snippet.close() {
            warn!("◆ SNIPPET CLEANUP FAILED FOR {:?}: {}", path, e);
        }

        let output = output.map_err(|e| {
            ActionError::Failed(format!("cannot start {}: {}", self.interpreter, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let mut report = format!("exit code {}", code);
            if !stderr.trim().is_empty() {
                report.push_str(&format!("\nstderr:\n{}", stderr.trim_end()));
            }
            if !stdout.trim().is_empty() {
                report.push_str(&format!("\nstdout:\n{}", stdout.trim_end()));
            }
            return Err(ActionError::Failed(report));
        }

        let mut parts = Vec::new();
        if !stdout.is_empty() {
            parts.push(stdout.into_owned());
        }
        if !stderr.trim().is_empty() {
            parts.push(format!("stderr:\n{}", stderr));
        }
        Ok(if parts.is_empty() {
            "(no output)".to_string()
        } else {
            parts.join("\n")
        })
    }
}

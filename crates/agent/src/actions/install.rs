//! install_dependencies: install Python packages with the configured installer

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Action, ActionContext, ActionError};

pub struct InstallDependenciesAction {
    installer: Vec<String>,
}

impl InstallDependenciesAction {
    /// `installer` is the command prefix, e.g. `["python3", "-m", "pip", "install"]`
    pub fn new(installer: Vec<String>) -> Self {
        Self { installer }
    }
}

#[derive(Deserialize)]
struct InstallArgs {
    packages: Vec<String>,
}

/// Package specifiers like `pandas`, `numpy==1.26.4`, `scikit-learn>=1.3`
fn is_valid_package(package: &str) -> bool {
    let mut chars = package.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || "-_.=<>!~[],".contains(c))
}

#[async_trait]
impl Action for InstallDependenciesAction {
    fn name(&self) -> &str {
        "install_dependencies"
    }

    fn description(&self) -> &str {
        "Install Python packages needed by analysis code (e.g. pandas, numpy)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "packages": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "description": "Package names, optionally with version specifiers"
                }
            },
            "required": ["packages"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ActionContext) -> Result<String, ActionError> {
        let args: InstallArgs = serde_json::from_value(args)?;
        if args.packages.is_empty() {
            return Err(ActionError::Failed("no packages given".to_string()));
        }
        if let Some(bad) = args.packages.iter().find(|p| !is_valid_package(p)) {
            return Err(ActionError::Failed(format!(
                "invalid package identifier '{}'",
                bad
            )));
        }

        let (program, prefix) = self
            .installer
            .split_first()
            .ok_or_else(|| ActionError::Failed("no installer configured".to_string()))?;

        debug!("◆ INSTALLING {:?} WITH {}", args.packages, program);
        let mut cmd = Command::new(program);
        cmd.args(prefix)
            .args(&args.packages)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if ctx.workspace.is_dir() {
            cmd.current_dir(&ctx.workspace);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| ActionError::Failed(format!("cannot start {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ActionError::Failed(format!(
                "installer exited with {}: {}",
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr.trim()
            )));
        }

        info!("◆ INSTALLED {}", args.packages.join(", "));
        Ok(format!("installed {}", args.packages.join(", ")))
    }
}

//! download_resource: save a remote file into the run workspace

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

use quizloop_config::{paths::ensure_dir, safe_filename};

use super::{Action, ActionContext, ActionError};

const FALLBACK_NAME: &str = "download.bin";

pub struct DownloadResourceAction {
    client: reqwest::Client,
}

impl DownloadResourceAction {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct DownloadArgs {
    url: String,
    destination: Option<String>,
}

#[async_trait]
impl Action for DownloadResourceAction {
    fn name(&self) -> &str {
        "download_resource"
    }

    fn description(&self) -> &str {
        "Download a file (CSV, PDF, audio, image, ...) into the working directory so \
         analysis code can read it. Returns the saved path."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "File URL" },
                "destination": {
                    "type": "string",
                    "description": "File name to save as (defaults to the URL's last path segment)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ActionContext) -> Result<String, ActionError> {
        let args: DownloadArgs = serde_json::from_value(args)?;
        let target = destination_path(ctx, &args.url, args.destination.as_deref());
        debug!("◆ DOWNLOADING {} -> {:?}", args.url, target);

        let response = self.client.get(&args.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Failed(format!(
                "{} returned HTTP {}",
                args.url, status
            )));
        }
        let bytes = response.bytes().await?;

        ensure_dir(&ctx.workspace).await?;
        tokio::fs::write(&target, &bytes).await?;

        Ok(format!("saved {} bytes to {}", bytes.len(), target.display()))
    }
}

/// Workspace path for the download; never escapes the workspace
fn destination_path(ctx: &ActionContext, url: &str, hint: Option<&str>) -> PathBuf {
    let name = hint
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|h| h.rsplit(['/', '\\']).next().unwrap_or(h).to_string())
        .or_else(|| {
            reqwest::Url::parse(url).ok().and_then(|parsed| {
                parsed
                    .path_segments()
                    .and_then(|segments| segments.last())
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| FALLBACK_NAME.to_string());

    ctx.workspace.join(safe_filename(&name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_from_url() {
        let ctx = ActionContext::new("/work");
        assert_eq!(
            destination_path(&ctx, "https://example.test/files/data.csv?sig=1", None),
            PathBuf::from("/work/data.csv")
        );
    }

    #[test]
    fn test_destination_hint_cannot_escape() {
        let ctx = ActionContext::new("/work");
        let path = destination_path(&ctx, "https://example.test/x", Some("../../etc/passwd"));
        assert_eq!(path, PathBuf::from("/work/passwd"));

        let path = destination_path(&ctx, "https://example.test/x", Some(".."));
        assert_eq!(path.parent(), Some(std::path::Path::new("/work")));
    }

    #[test]
    fn test_destination_fallback() {
        let ctx = ActionContext::new("/work");
        assert_eq!(
            destination_path(&ctx, "https://example.test/", None),
            PathBuf::from("/work/download.bin")
        );
    }
}

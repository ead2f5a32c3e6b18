//! http_post: send a JSON body to a URL

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

use super::{Action, ActionContext, ActionError};

pub struct HttpPostAction {
    client: reqwest::Client,
}

impl HttpPostAction {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct PostArgs {
    url: String,
    body: Value,
    #[serde(default)]
    headers: HashMap<String, String>,
}

#[async_trait]
impl Action for HttpPostAction {
    fn name(&self) -> &str {
        "http_post"
    }

    fn description(&self) -> &str {
        "POST a JSON body to a URL (for example to submit an answer). Returns the status \
         code and the response body."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Target URL" },
                "body": { "description": "JSON payload" },
                "headers": {
                    "type": "object",
                    "additionalProperties": { "type": "string" },
                    "description": "Extra request headers"
                }
            },
            "required": ["url", "body"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ActionContext) -> Result<String, ActionError> {
        let args: PostArgs = serde_json::from_value(args)?;
        debug!("◆ POSTING TO {}", args.url);

        let mut request = self.client.post(&args.url).json(&args.body);
        for (name, value) in &args.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            Ok(format!("status: {}\n{}", status.as_u16(), text))
        } else {
            Ok(format!(
                "status: {} (request was not accepted)\n{}",
                status.as_u16(),
                text
            ))
        }
    }
}

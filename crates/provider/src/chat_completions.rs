//! OpenAI-compatible chat-completions engine
//!
//! Works with OpenAI, OpenRouter, and Gemini's OpenAI-compatible endpoint.

use crate::*;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, trace};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Hosted engine family, inferred from the key or the base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFlavor {
    OpenAi,
    OpenRouter,
    Gemini,
}

impl EngineFlavor {
    pub fn detect(api_key: &str, api_base: Option<&str>) -> Self {
        if let Some(base) = api_base {
            if base.contains("openrouter") {
                return EngineFlavor::OpenRouter;
            }
            if base.contains("generativelanguage.googleapis.com") {
                return EngineFlavor::Gemini;
            }
        }
        if api_key.starts_with("sk-or-") {
            EngineFlavor::OpenRouter
        } else if api_key.starts_with("AIza") {
            EngineFlavor::Gemini
        } else {
            EngineFlavor::OpenAi
        }
    }

    pub fn default_base(self) -> &'static str {
        match self {
            EngineFlavor::OpenAi => OPENAI_BASE,
            EngineFlavor::OpenRouter => OPENROUTER_BASE,
            EngineFlavor::Gemini => GEMINI_BASE,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            EngineFlavor::OpenAi => "gpt-4o-mini",
            EngineFlavor::OpenRouter => "google/gemini-flash-1.5",
            EngineFlavor::Gemini => "gemini-1.5-flash",
        }
    }
}

/// Chat-completions client
pub struct ChatCompletionsProvider {
    client: Client,
    api_key: String,
    api_base: String,
    default_model: String,
    flavor: EngineFlavor,
}

impl ChatCompletionsProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
    ) -> Self {
        let api_key = api_key.into();
        let flavor = EngineFlavor::detect(&api_key, api_base.as_deref());
        let api_base = api_base
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or_else(|| flavor.default_base().to_string());
        let default_model = default_model.unwrap_or_else(|| flavor.default_model().to_string());

        Self {
            client: Client::new(),
            api_key,
            api_base,
            default_model,
            flavor,
        }
    }

    /// Bound every HTTP exchange with the engine
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }

    pub fn flavor(&self) -> EngineFlavor {
        self.flavor
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(&self, params: &ChatParams) -> serde_json::Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        let messages: Vec<serde_json::Value> = params
            .messages
            .iter()
            .map(|m| {
                let mut obj = json!({ "role": &m.role });
                match &m.content {
                    Some(content) => obj["content"] = json!(content),
                    None => obj["content"] = serde_json::Value::Null,
                }
                if let Some(tool_calls) = &m.tool_calls {
                    // the wire format carries arguments as a JSON-encoded string
                    let calls: Vec<serde_json::Value> = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": &call.id,
                                "type": &call.call_type,
                                "function": {
                                    "name": &call.function.name,
                                    "arguments": call.function.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    obj["tool_calls"] = json!(calls);
                }
                if let Some(tool_call_id) = &m.tool_call_id {
                    obj["tool_call_id"] = json!(tool_call_id);
                }
                if let Some(name) = &m.name {
                    obj["name"] = json!(name);
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });

        if !params.tools.is_empty() {
            let tools: Vec<serde_json::Value> = params
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": &t.function.name,
                            "description": &t.function.description,
                            "parameters": &t.function.parameters
                        }
                    })
                })
                .collect();

            body["tools"] = json!(tools);
            body["tool_choice"] = match &params.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::Required(name) => {
                    json!({"type": "function", "function": {"name": name}})
                }
                ToolChoice::None => json!("none"),
            };
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ChatResponse> {
        let choice = json["choices"]
            .get(0)
            .ok_or(ProviderError::InvalidResponse)?;
        let message = &choice["message"];
        let content = message["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let function = &call["function"];
                let args = match &function["arguments"] {
                    serde_json::Value::String(raw) if raw.trim().is_empty() => json!({}),
                    serde_json::Value::String(raw) => serde_json::from_str(raw)
                        .unwrap_or_else(|_| serde_json::Value::String(raw.clone())),
                    serde_json::Value::Null => json!({}),
                    other => other.clone(),
                };

                tool_calls.push(ToolCall {
                    id: call["id"].as_str().unwrap_or("").to_string(),
                    name: function["name"].as_str().unwrap_or("").to_string(),
                    arguments: args,
                });
            }
        }

        let usage = match json["usage"].as_object() {
            Some(usage) => Usage {
                prompt_tokens: usage
                    .get("prompt_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
                completion_tokens: usage
                    .get("completion_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
                total_tokens: usage
                    .get("total_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32,
            },
            None => Usage::default(),
        };

        Ok(ChatResponse {
            content,
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

#[async_trait::async_trait]
impl Provider for ChatCompletionsProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NoApiKey);
        }
        trace!("◆ ENGINE REQUEST TO {}", self.api_base);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&params);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        let json: serde_json::Value = response.json().await?;

        if !status.is_success() {
            // Gemini wraps errors in a one-element array
            let error = json["error"]["message"]
                .as_str()
                .or_else(|| json[0]["error"]["message"].as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(ProviderError::Api(format!("{}: {}", status.as_u16(), error)));
        }

        let response = self.parse_response(json)?;
        debug!(
            "◆ ENGINE RESPONSE: {} ACTION REQUESTS, {} TOKENS",
            response.tool_calls.len(),
            response.usage.total_tokens
        );
        Ok(response)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

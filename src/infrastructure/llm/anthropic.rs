//! Anthropic messages-API adapter.
//!
//! Wire quirks handled here: the system prompt is a top-level field, turns
//! carry typed content blocks, tool results travel as `tool_result` blocks
//! inside a user turn, and `max_tokens` is mandatory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ports::{ChatCompletion, ChatRequest, LlmClient, ToolSchema};
use crate::domain::{errors::Result, ChatMessage, MessageRole, ToolCall};

use super::{effective_temperature, error_for_status, retry_after_hint, transport_error};

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicChat {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicChat {
    pub fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<ContentBlock>,
}

/// Splits the uniform message list into Anthropic's `(system, messages)`
/// shape. Consecutive system turns concatenate; tool results become user
/// turns carrying `tool_result` blocks.
fn to_wire_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<WireMessage>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut wire: Vec<WireMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => system_parts.push(&msg.content),
            MessageRole::User => wire.push(WireMessage {
                role: "user".into(),
                content: vec![ContentBlock::Text {
                    text: msg.content.clone(),
                }],
            }),
            MessageRole::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: msg.content.clone(),
                    });
                }
                for call in &msg.tool_calls {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    });
                }
                wire.push(WireMessage {
                    role: "assistant".into(),
                    content: blocks,
                });
            }
            MessageRole::Tool => wire.push(WireMessage {
                role: "user".into(),
                content: vec![ContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone(),
                }],
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, wire)
}

fn to_wire_tools(tools: &[ToolSchema]) -> Option<Vec<WireTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|tool| WireTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.parameters.clone(),
            })
            .collect(),
    )
}

fn from_wire_content(content: Vec<ContentBlock>) -> ChatCompletion {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls = Vec::new();
    for block in content {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::new(id, name, input));
            }
            ContentBlock::ToolResult { .. } => {}
        }
    }
    ChatCompletion {
        text: text_parts.join("\n"),
        tool_calls,
    }
}

#[async_trait]
impl LlmClient for AnthropicChat {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let (system, messages) = to_wire_messages(&request.messages);
        let body = WireRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            tools: to_wire_tools(&request.tools),
            temperature: effective_temperature(&request.model, request.temperature),
        };

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_hint(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(
                PROVIDER,
                status,
                retry_after,
                &request.model,
                &body,
            ));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        Ok(from_wire_content(parsed.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_turns_lift_into_the_system_field() {
        let messages = vec![
            ChatMessage::system("you are grounded"),
            ChatMessage::user("hello"),
        ];
        let (system, wire) = to_wire_messages(&messages);
        assert_eq!(system.as_deref(), Some("you are grounded"));
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn tool_round_trip_uses_typed_blocks() {
        let messages = vec![
            ChatMessage::user("total sales?"),
            ChatMessage::assistant_with_tools(
                "checking",
                vec![ToolCall::new("tu_1", "rag_search", json!({"query": "sales"}))],
            ),
            ChatMessage::tool_result("tu_1", "rag_search", "3 passages"),
        ];
        let (_, wire) = to_wire_messages(&messages);
        assert!(matches!(
            wire[1].content[1],
            ContentBlock::ToolUse { ref id, .. } if id == "tu_1"
        ));
        assert_eq!(wire[2].role, "user");
        assert!(matches!(
            wire[2].content[0],
            ContentBlock::ToolResult { ref tool_use_id, .. } if tool_use_id == "tu_1"
        ));
    }

    #[test]
    fn reply_blocks_split_into_text_and_tool_calls() {
        let completion = from_wire_content(vec![
            ContentBlock::Text {
                text: "let me search".into(),
            },
            ContentBlock::ToolUse {
                id: "tu_2".into(),
                name: "web_fetch".into(),
                input: json!({"url": "https://example.com"}),
            },
        ]);
        assert_eq!(completion.text, "let me search");
        assert_eq!(completion.tool_calls[0].name, "web_fetch");
    }
}

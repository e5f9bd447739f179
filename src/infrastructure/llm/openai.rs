//! OpenAI chat-completions adapter.
//!
//! Wire quirks handled here: tool-call arguments travel as a JSON-encoded
//! string, tool results are `role: "tool"` messages keyed by `tool_call_id`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ports::{ChatCompletion, ChatRequest, LlmClient, ToolSchema};
use crate::domain::{errors::Result, ChatMessage, MessageRole, ToolCall};

use super::{effective_temperature, error_for_status, retry_after_hint, transport_error};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiChat {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiChat {
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
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON object encoded as a string, per the OpenAI wire format.
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

fn to_wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|msg| match msg.role {
            MessageRole::Assistant if msg.has_tool_calls() => WireMessage {
                role: "assistant".into(),
                content: (!msg.content.is_empty()).then(|| msg.content.clone()),
                tool_calls: Some(
                    msg.tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            id: call.id.clone(),
                            kind: "function".into(),
                            function: WireFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect(),
                ),
                tool_call_id: None,
            },
            MessageRole::Tool => WireMessage {
                role: "tool".into(),
                content: Some(msg.content.clone()),
                tool_calls: None,
                tool_call_id: msg.tool_call_id.clone(),
            },
            role => WireMessage {
                role: role.as_str().into(),
                content: Some(msg.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
        })
        .collect()
}

fn to_wire_tools(tools: &[ToolSchema]) -> Option<Vec<WireTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|tool| WireTool {
                kind: "function",
                function: WireFunctionDef {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect(),
    )
}

fn from_wire_message(message: WireMessage) -> ChatCompletion {
    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::Null);
            ToolCall::new(call.id, call.function.name, arguments)
        })
        .collect();
    ChatCompletion {
        text: message.content.unwrap_or_default(),
        tool_calls,
    }
}

#[async_trait]
impl LlmClient for OpenAiChat {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let body = WireRequest {
            model: request.model.clone(),
            messages: to_wire_messages(&request.messages),
            tools: to_wire_tools(&request.tools),
            temperature: effective_temperature(&request.model, request.temperature),
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .unwrap_or(WireMessage {
                role: "assistant".into(),
                content: None,
                tool_calls: None,
                tool_call_id: None,
            });

        Ok(from_wire_message(message))
    }
}

//! Gemini generate-content adapter.
//!
//! Wire quirks handled here: the assistant role is called "model", tool
//! calls and results are `functionCall`/`functionResponse` parts, the
//! system prompt is a separate `systemInstruction` field, and the protocol
//! carries no tool-call ids, so we synthesize them on the way out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ports::{ChatCompletion, ChatRequest, LlmClient, ToolSchema};
use crate::domain::{errors::Result, ChatMessage, MessageRole, ToolCall};

use super::{effective_temperature, error_for_status, retry_after_hint, transport_error};

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiChat {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiChat {
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
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolGroup>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<WirePart>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolGroup {
    function_declarations: Vec<WireFunctionDecl>,
}

#[derive(Serialize)]
struct WireFunctionDecl {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct WireGenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Deserialize)]
struct WireCandidate {
    content: WireContent,
}

fn text_part(text: String) -> WirePart {
    WirePart {
        text: Some(text),
        ..WirePart::default()
    }
}

fn to_wire_contents(messages: &[ChatMessage]) -> (Option<WireContent>, Vec<WireContent>) {
    let mut system_parts: Vec<WirePart> = Vec::new();
    let mut contents: Vec<WireContent> = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => system_parts.push(text_part(msg.content.clone())),
            MessageRole::User => contents.push(WireContent {
                role: Some("user".into()),
                parts: vec![text_part(msg.content.clone())],
            }),
            MessageRole::Assistant => {
                let mut parts = Vec::new();
                if !msg.content.is_empty() {
                    parts.push(text_part(msg.content.clone()));
                }
                for call in &msg.tool_calls {
                    parts.push(WirePart {
                        function_call: Some(WireFunctionCall {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..WirePart::default()
                    });
                }
                contents.push(WireContent {
                    role: Some("model".into()),
                    parts,
                });
            }
            MessageRole::Tool => contents.push(WireContent {
                role: Some("user".into()),
                parts: vec![WirePart {
                    function_response: Some(WireFunctionResponse {
                        name: msg.tool_name.clone().unwrap_or_default(),
                        response: serde_json::json!({ "content": msg.content }),
                    }),
                    ..WirePart::default()
                }],
            }),
        }
    }

    let system_instruction = if system_parts.is_empty() {
        None
    } else {
        Some(WireContent {
            role: None,
            parts: system_parts,
        })
    };
    (system_instruction, contents)
}

fn to_wire_tools(tools: &[ToolSchema]) -> Option<Vec<WireToolGroup>> {
    if tools.is_empty() {
        return None;
    }
    Some(vec![WireToolGroup {
        function_declarations: tools
            .iter()
            .map(|tool| WireFunctionDecl {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            })
            .collect(),
    }])
}

/// Ids are synthesized here; the conversation layer threads them back
/// through `tool_result` turns so every protocol sees the same shape.
fn from_wire_content(content: WireContent) -> ChatCompletion {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls = Vec::new();
    for part in content.parts {
        if let Some(text) = part.text {
            text_parts.push(text);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall::new(
                Uuid::new_v4().to_string(),
                call.name,
                call.args,
            ));
        }
    }
    ChatCompletion {
        text: text_parts.join("\n"),
        tool_calls,
    }
}

#[async_trait]
impl LlmClient for GeminiChat {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let (system_instruction, contents) = to_wire_contents(&request.messages);
        let body = WireRequest {
            contents,
            system_instruction,
            tools: to_wire_tools(&request.tools),
            generation_config: effective_temperature(&request.model, request.temperature)
                .map(|temperature| WireGenerationConfig { temperature }),
        };

        let response = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, request.model
            ))
            .header("x-goog-api-key", &self.api_key)
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

        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| from_wire_content(candidate.content))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_turns_use_the_model_role() {
        let messages = vec![
            ChatMessage::system("stay grounded"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let (system, contents) = to_wire_contents(&messages);
        assert!(system.is_some());
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn tool_results_become_function_response_parts() {
        let messages = vec![ChatMessage::tool_result(
            "ignored-id",
            "rag_search",
            "2 passages",
        )];
        let (_, contents) = to_wire_contents(&messages);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        let response = contents[0].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "rag_search");
        assert_eq!(response.response["content"], json!("2 passages"));
    }

    #[test]
    fn function_calls_get_synthesized_ids() {
        let completion = from_wire_content(WireContent {
            role: Some("model".into()),
            parts: vec![WirePart {
                function_call: Some(WireFunctionCall {
                    name: "web_fetch".into(),
                    args: json!({"url": "https://example.com"}),
                }),
                ..WirePart::default()
            }],
        });
        assert_eq!(completion.tool_calls.len(), 1);
        assert!(!completion.tool_calls[0].id.is_empty());
        assert_eq!(completion.tool_calls[0].name, "web_fetch");
    }

    #[test]
    fn declarations_are_grouped_under_one_tool_entry() {
        let tools = vec![
            ToolSchema::new("rag_search", "search the index", json!({"type": "object"})),
            ToolSchema::new("web_fetch", "fetch a page", json!({"type": "object"})),
        ];
        let groups = to_wire_tools(&tools).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].function_declarations.len(), 2);
    }
}

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::application::services::retrieval::{RetrievalResult, RetrievalService};
use crate::domain::errors::{EngineError, Result};
use crate::domain::ports::{
    ChatRequest, LlmClient, LlmClientFactory, ProviderKind, ToolSchema, WebFetcher,
};
use crate::domain::{ChatMessage, ToolCall};
use crate::infrastructure::{LlmConfig, OrchestratorConfig};

const RAG_SEARCH: &str = "rag_search";
const WEB_FETCH: &str = "web_fetch";

const GROUNDED_SYSTEM_PROMPT: &str = "You are a document question-answering assistant. \
Use the rag_search tool to find passages from the indexed documents before answering; \
base your answer only on what the passages say and mention which sources you used. \
If no relevant passages are found, say so plainly instead of guessing. \
Use the web_fetch tool only when the user explicitly refers to a web page.";

const OPEN_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer from your own \
knowledge. Use the web_fetch tool when the user refers to a specific web page.";

/// One question against the engine. Provider, model, and scope default from
/// configuration and are overridable per query.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub question: String,
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// `None` means the whole index; `Some` restricts retrieval to these
    /// document ids.
    pub selected_document_ids: Option<Vec<String>>,
    /// When false, the retrieval tool is not offered at all and the model
    /// answers from its own knowledge.
    pub use_rag: bool,
    /// Prior turns of the conversation, oldest first.
    pub history: Vec<ChatMessage>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            provider: None,
            model: None,
            temperature: None,
            selected_document_ids: None,
            use_rag: true,
            history: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_documents(mut self, document_ids: Vec<String>) -> Self {
        self.selected_document_ids = Some(document_ids);
        self
    }

    pub fn without_rag(mut self) -> Self {
        self.use_rag = false;
        self
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

/// Final answer plus the source labels of every passage that grounded it.
#[derive(Debug, Clone)]
pub struct QueryAnswer {
    pub text: String,
    /// Sorted, deduplicated citation tags, e.g. `"csv: sales.csv"`.
    pub references: Vec<String>,
}

/// Cooperative cancellation handle, checked between orchestration steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tool-driven query loop.
///
/// Each round asks the model to either answer or call tools; tool results
/// are appended and the loop repeats. After `max_tool_rounds` rounds the
/// model is asked one final time with no tools offered, so every query
/// terminates in a bounded number of completions.
pub struct QueryOrchestrator {
    llm: Arc<dyn LlmClientFactory>,
    retrieval: Arc<RetrievalService>,
    web: Arc<dyn WebFetcher>,
    config: OrchestratorConfig,
    defaults: LlmConfig,
}

impl QueryOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClientFactory>,
        retrieval: Arc<RetrievalService>,
        web: Arc<dyn WebFetcher>,
        config: OrchestratorConfig,
        defaults: LlmConfig,
    ) -> Self {
        Self {
            llm,
            retrieval,
            web,
            config,
            defaults,
        }
    }

    pub async fn answer(&self, request: QueryRequest) -> Result<QueryAnswer> {
        self.answer_with_cancel(request, &CancelToken::new()).await
    }

    #[instrument(skip(self, request, cancel), fields(use_rag = request.use_rag))]
    pub async fn answer_with_cancel(
        &self,
        request: QueryRequest,
        cancel: &CancelToken,
    ) -> Result<QueryAnswer> {
        let provider = request.provider.unwrap_or(self.defaults.provider);
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.defaults.model.clone());
        let temperature = request.temperature.or(self.defaults.temperature);
        let client = self.llm.client(provider)?;

        let system_prompt = if request.use_rag {
            GROUNDED_SYSTEM_PROMPT
        } else {
            OPEN_SYSTEM_PROMPT
        };
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(request.history.iter().cloned());
        messages.push(ChatMessage::user(&request.question));

        let tools = self.tool_schemas(request.use_rag);
        let mut references: BTreeSet<String> = BTreeSet::new();
        let mut rounds = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if rounds >= self.config.max_tool_rounds {
                warn!(rounds, "tool budget exhausted, forcing a final answer");
                break;
            }

            let chat = self.chat_request(&model, messages.clone(), temperature, tools.clone());
            let completion = self.complete_with_timeout(client.as_ref(), &chat).await?;

            if !completion.has_tool_calls() {
                info!(rounds, "answered without further tool use");
                return Ok(QueryAnswer {
                    text: completion.text,
                    references: references.into_iter().collect(),
                });
            }

            messages.push(ChatMessage::assistant_with_tools(
                completion.text,
                completion.tool_calls.clone(),
            ));
            rounds += 1;

            for call in completion.tool_calls {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let result_text = match self.execute_tool(&call, &request, &mut references).await {
                    Ok(text) => text,
                    Err(err) if err.is_recoverable_in_tool_loop() => {
                        warn!(tool = %call.name, error = %err, "tool failed, continuing");
                        format!("Tool '{}' failed: {err}", call.name)
                    }
                    Err(err) => return Err(err),
                };
                messages.push(ChatMessage::tool_result(
                    call.id,
                    call.name,
                    truncate_chars(&result_text, self.config.tool_result_max_chars),
                ));
            }
        }

        // Final completion with no tools on offer: the model must answer
        // from the context it already has.
        let chat = self.chat_request(&model, messages, temperature, Vec::new());
        let completion = self.complete_with_timeout(client.as_ref(), &chat).await?;
        Ok(QueryAnswer {
            text: completion.text,
            references: references.into_iter().collect(),
        })
    }

    fn chat_request(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        tools: Vec<ToolSchema>,
    ) -> ChatRequest {
        let mut chat = ChatRequest::new(model, messages).with_tools(tools);
        if let Some(temperature) = temperature {
            chat = chat.with_temperature(temperature);
        }
        chat
    }

    async fn complete_with_timeout(
        &self,
        client: &dyn LlmClient,
        chat: &ChatRequest,
    ) -> Result<crate::domain::ports::ChatCompletion> {
        tokio::time::timeout(self.config.llm_timeout(), client.complete(chat))
            .await
            .map_err(|_| EngineError::timeout("chat completion"))?
    }

    fn tool_schemas(&self, use_rag: bool) -> Vec<ToolSchema> {
        let mut tools = Vec::with_capacity(2);
        if use_rag {
            tools.push(ToolSchema::new(
                RAG_SEARCH,
                "Search the indexed documents for passages relevant to a query.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What to look for, phrased as a search query."
                        },
                        "document_ids": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Optional: restrict the search to these document ids."
                        }
                    },
                    "required": ["query"]
                }),
            ));
        }
        tools.push(ToolSchema::new(
            WEB_FETCH,
            "Fetch a web page and return its readable text.",
            json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "Absolute http(s) URL to fetch." }
                },
                "required": ["url"]
            }),
        ));
        tools
    }

    async fn execute_tool(
        &self,
        call: &ToolCall,
        request: &QueryRequest,
        references: &mut BTreeSet<String>,
    ) -> Result<String> {
        debug!(tool = %call.name, "executing tool");
        match call.name.as_str() {
            RAG_SEARCH => {
                let query = call
                    .arguments
                    .get("query")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| EngineError::tool(RAG_SEARCH, "missing 'query' argument"))?;
                // A model-supplied scope narrows within the caller's scope,
                // never widens past it.
                let call_scope: Option<Vec<String>> =
                    call.arguments.get("document_ids").and_then(|v| {
                        v.as_array().map(|ids| {
                            ids.iter()
                                .filter_map(|id| id.as_str().map(str::to_string))
                                .collect()
                        })
                    });
                let scope = match (&request.selected_document_ids, call_scope) {
                    (Some(caller), Some(model)) => Some(
                        model
                            .into_iter()
                            .filter(|id| caller.contains(id))
                            .collect::<Vec<_>>(),
                    ),
                    (Some(caller), None) => Some(caller.clone()),
                    (None, model) => model,
                };
                let result = self.retrieval.retrieve_auto(query, scope.as_deref()).await?;
                for passage in &result.passages {
                    references.insert(passage.source_label.clone());
                }
                Ok(render_passages(&result))
            }
            WEB_FETCH => {
                let url = call
                    .arguments
                    .get("url")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| EngineError::tool(WEB_FETCH, "missing 'url' argument"))?;
                let page = tokio::time::timeout(self.config.web_fetch_timeout(), self.web.fetch(url))
                    .await
                    .map_err(|_| EngineError::timeout(WEB_FETCH))??;
                references.insert(format!("web: {}", page.origin));
                Ok(match page.title {
                    Some(title) if !title.is_empty() => format!("# {title}\n\n{}", page.text),
                    _ => page.text,
                })
            }
            other => Err(EngineError::tool(other, "unknown tool")),
        }
    }
}

/// Renders passages grouped by source, so rows from one table read as a
/// block rather than interleaving with prose from another document.
fn render_passages(result: &RetrievalResult) -> String {
    if result.is_empty() {
        return "No relevant passages found in the indexed documents.".to_string();
    }

    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    for passage in &result.passages {
        let label = passage.source_label.as_str();
        let text = passage.text.as_str();
        match groups.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, texts)) => texts.push(text),
            None => groups.push((label, vec![text])),
        }
    }

    let mut out = String::new();
    for (label, texts) in groups {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str("Source: ");
        out.push_str(label);
        for text in texts {
            out.push_str("\n\n");
            out.push_str(text);
        }
    }
    out
}

/// Char-boundary-safe truncation with a marker.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("\n[truncated]");
    out
}

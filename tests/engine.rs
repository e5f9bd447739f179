//! End-to-end engine tests over in-process fakes: a keyword embedding, a
//! scripted chat backend, and a canned web fetcher. No network, no Qdrant.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use docqa::domain::chunking::ChunkingConfig;
use docqa::domain::ports::{
    ChatCompletion, ChatRequest, EmbeddingService, FetchedPage, LlmClient, LlmClientFactory,
    ProviderKind, WebFetcher,
};
use docqa::domain::{
    Embedding, EngineError, MessageRole, NormalizedUnit, SourceType, TabularInfo, ToolCall,
};
use docqa::infrastructure::{InMemoryIndex, LlmConfig, OrchestratorConfig, RetrievalConfig};
use docqa::{
    CancelToken, IngestionService, QueryOrchestrator, QueryRequest, Result, RetrievalService,
};

/// Maps two topic keywords onto orthogonal axes, so relevance in these
/// tests is exact rather than approximate.
struct KeywordEmbedding;

#[async_trait]
impl EmbeddingService for KeywordEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let lowered = text.to_lowercase();
        Ok(Embedding::new(vec![
            lowered.contains("sales") as u8 as f32,
            lowered.contains("weather") as u8 as f32,
            0.01,
        ]))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Chat backend that replays a fixed reply script and records every request
/// it receives, so tests can assert on the exact conversation shape.
struct ScriptedLlm {
    replies: Mutex<VecDeque<ChatCompletion>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<ChatCompletion>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn recorded(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

struct StubFactory(Arc<ScriptedLlm>);

impl LlmClientFactory for StubFactory {
    fn client(&self, _provider: ProviderKind) -> Result<Arc<dyn LlmClient>> {
        Ok(self.0.clone())
    }
}

struct StubWebFetcher;

#[async_trait]
impl WebFetcher for StubWebFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        Ok(FetchedPage {
            origin: url.to_string(),
            title: Some("Example".to_string()),
            text: "hello from the page".to_string(),
        })
    }
}

fn text_reply(text: &str) -> ChatCompletion {
    ChatCompletion {
        text: text.to_string(),
        tool_calls: Vec::new(),
    }
}

fn tool_reply(id: &str, name: &str, arguments: serde_json::Value) -> ChatCompletion {
    ChatCompletion {
        text: String::new(),
        tool_calls: vec![ToolCall::new(id, name, arguments)],
    }
}

struct Harness {
    ingestion: IngestionService,
    orchestrator: QueryOrchestrator,
    llm: Arc<ScriptedLlm>,
}

impl Harness {
    fn new(replies: Vec<ChatCompletion>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let embedding = Arc::new(KeywordEmbedding);
        let index = Arc::new(InMemoryIndex::new());
        let llm = ScriptedLlm::new(replies);
        let retrieval = Arc::new(RetrievalService::new(
            embedding.clone(),
            index.clone(),
            RetrievalConfig::default(),
        ));
        Self {
            ingestion: IngestionService::new(embedding, index, ChunkingConfig::default()),
            orchestrator: QueryOrchestrator::new(
                Arc::new(StubFactory(llm.clone())),
                retrieval,
                Arc::new(StubWebFetcher),
                OrchestratorConfig::default(),
                LlmConfig::default(),
            ),
            llm,
        }
    }

    async fn seed(&self) {
        let table = "| region | sales |\n| --- | --- |\n| north | 100 |\n| south | 200 |";
        self.ingestion
            .ingest(
                NormalizedUnit::new(SourceType::Csv, "sales.csv", table).with_tabular(
                    TabularInfo {
                        rows: 2,
                        columns: 2,
                        sheet_name: None,
                    },
                ),
            )
            .await
            .unwrap();
        self.ingestion
            .ingest(NormalizedUnit::new(
                SourceType::Txt,
                "weather.txt",
                "weather report for the week",
            ))
            .await
            .unwrap();
    }
}

fn tool_messages(request: &ChatRequest) -> Vec<&str> {
    request
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .map(|m| m.content.as_str())
        .collect()
}

#[tokio::test]
async fn reingesting_a_document_replaces_its_chunks() {
    let harness = Harness::new(Vec::new());
    harness
        .ingestion
        .ingest(NormalizedUnit::new(
            SourceType::Json,
            "items.json",
            r#"[{"a": 1}, {"a": 2}, {"a": 3}]"#,
        ))
        .await
        .unwrap();
    let receipt = harness
        .ingestion
        .ingest(NormalizedUnit::new(
            SourceType::Json,
            "items.json",
            r#"[{"a": 1}]"#,
        ))
        .await
        .unwrap();
    assert_eq!(receipt.chunk_count, 1);

    let summaries = harness.ingestion.list_documents().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].chunk_count, 1);
}

#[tokio::test]
async fn grounded_answer_collects_references() {
    let harness = Harness::new(vec![
        tool_reply("call-1", "rag_search", json!({"query": "total sales"})),
        text_reply("North had 100 and south had 200."),
    ]);
    harness.seed().await;

    let answer = harness
        .orchestrator
        .answer(QueryRequest::new("What were the sales by region?"))
        .await
        .unwrap();

    assert_eq!(answer.text, "North had 100 and south had 200.");
    assert_eq!(answer.references, vec!["csv: sales.csv".to_string()]);

    let requests = harness.llm.recorded();
    assert_eq!(requests.len(), 2);
    // First request offers both tools.
    let names: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["rag_search", "web_fetch"]);
    // Second request carries the passages grouped under their source.
    let results = tool_messages(&requests[1]);
    assert_eq!(results.len(), 1);
    assert!(results[0].contains("Source: csv: sales.csv"));
    assert!(results[0].contains("north"));
}

#[tokio::test]
async fn tool_budget_forces_a_final_answer_without_tools() {
    let search = || tool_reply("call-n", "rag_search", json!({"query": "sales"}));
    let harness = Harness::new(vec![
        search(),
        search(),
        search(),
        // A fourth tool call would exceed the budget; the script answers
        // in text because the final request offers no tools.
        text_reply("best effort answer"),
    ]);
    harness.seed().await;

    let answer = harness
        .orchestrator
        .answer(QueryRequest::new("total sales?"))
        .await
        .unwrap();
    assert_eq!(answer.text, "best effort answer");

    let requests = harness.llm.recorded();
    assert_eq!(requests.len(), 4);
    assert!(requests[3].tools.is_empty(), "final request must offer no tools");
    assert!(!requests[2].tools.is_empty());
}

#[tokio::test]
async fn deleted_documents_leave_no_grounding() {
    let harness = Harness::new(vec![
        tool_reply("call-1", "rag_search", json!({"query": "total sales"})),
        text_reply("I found nothing about that in the documents."),
    ]);
    harness.seed().await;
    harness.ingestion.delete("sales.csv").await.unwrap();
    harness.ingestion.delete("weather.txt").await.unwrap();

    let answer = harness
        .orchestrator
        .answer(QueryRequest::new("What were the sales?"))
        .await
        .unwrap();
    assert!(answer.references.is_empty());

    let requests = harness.llm.recorded();
    let results = tool_messages(&requests[1]);
    assert!(results[0].contains("No relevant passages"));
}

#[tokio::test]
async fn unknown_tool_is_reported_and_the_loop_continues() {
    let harness = Harness::new(vec![
        tool_reply("call-1", "sql_query", json!({"sql": "select 1"})),
        text_reply("answered anyway"),
    ]);
    harness.seed().await;

    let answer = harness
        .orchestrator
        .answer(QueryRequest::new("run some sql"))
        .await
        .unwrap();
    assert_eq!(answer.text, "answered anyway");

    let requests = harness.llm.recorded();
    let results = tool_messages(&requests[1]);
    assert!(results[0].contains("failed"), "failure must surface to the model");
}

#[tokio::test]
async fn disabling_rag_withholds_the_search_tool() {
    let harness = Harness::new(vec![text_reply("from general knowledge")]);
    harness.seed().await;

    let answer = harness
        .orchestrator
        .answer(QueryRequest::new("What is Rust?").without_rag())
        .await
        .unwrap();
    assert_eq!(answer.text, "from general knowledge");
    assert!(answer.references.is_empty());

    let requests = harness.llm.recorded();
    let names: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["web_fetch"]);
}

#[tokio::test]
async fn document_selection_scopes_retrieval() {
    let harness = Harness::new(vec![
        tool_reply("call-1", "rag_search", json!({"query": "total sales"})),
        text_reply("nothing in scope"),
    ]);
    harness.seed().await;

    // The sales table exists but is outside the selected scope.
    let answer = harness
        .orchestrator
        .answer(
            QueryRequest::new("What were the sales?")
                .with_documents(vec!["weather.txt".to_string()]),
        )
        .await
        .unwrap();
    assert!(answer.references.is_empty());

    let requests = harness.llm.recorded();
    let results = tool_messages(&requests[1]);
    assert!(results[0].contains("No relevant passages"));
}

#[tokio::test]
async fn model_supplied_ids_cannot_widen_past_the_selection() {
    let harness = Harness::new(vec![
        tool_reply(
            "call-1",
            "rag_search",
            json!({"query": "total sales", "document_ids": ["sales.csv"]}),
        ),
        text_reply("nothing in scope"),
    ]);
    harness.seed().await;

    // The model names a document the caller did not select; the search must
    // stay inside the caller's scope.
    let answer = harness
        .orchestrator
        .answer(
            QueryRequest::new("What were the sales?")
                .with_documents(vec!["weather.txt".to_string()]),
        )
        .await
        .unwrap();
    assert!(answer.references.is_empty());

    let requests = harness.llm.recorded();
    let results = tool_messages(&requests[1]);
    assert!(results[0].contains("No relevant passages"));
}

#[tokio::test]
async fn web_fetch_results_carry_title_and_reference() {
    let harness = Harness::new(vec![
        tool_reply("call-1", "web_fetch", json!({"url": "https://example.com/page"})),
        text_reply("the page says hello"),
    ]);

    let answer = harness
        .orchestrator
        .answer(QueryRequest::new("What does that page say?"))
        .await
        .unwrap();
    assert_eq!(
        answer.references,
        vec!["web: https://example.com/page".to_string()]
    );

    let requests = harness.llm.recorded();
    let results = tool_messages(&requests[1]);
    assert!(results[0].starts_with("# Example"));
    assert!(results[0].contains("hello from the page"));
}

#[tokio::test]
async fn cancelled_queries_abort_before_completion() {
    let harness = Harness::new(vec![text_reply("never reached")]);
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = harness
        .orchestrator
        .answer_with_cancel(QueryRequest::new("anything"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert!(harness.llm.recorded().is_empty());
}

#[tokio::test]
async fn empty_documents_are_rejected_at_ingest() {
    let harness = Harness::new(Vec::new());
    let err = harness
        .ingestion
        .ingest(NormalizedUnit::new(SourceType::Pdf, "scan.pdf", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyContent { origin } if origin == "scan.pdf"));
}

//! Retrieval-and-orchestration engine for grounded question answering.
//!
//! The crate turns heterogeneous extracted content (prose, tabular rows,
//! crawled pages, JSON records) into an embedded chunk index, retrieves
//! relevant passages by vector similarity, and answers natural-language
//! questions through a bounded tool-calling loop over pluggable
//! chat-completion backends (OpenAI, Anthropic, Gemini).
//!
//! Layering follows hexagonal conventions:
//! - [`domain`]: entities, the chunking engine, error taxonomy, and the
//!   ports (traits) the engine depends on;
//! - [`application`]: services wiring ports into the ingestion, retrieval,
//!   and query-orchestration use cases;
//! - [`infrastructure`]: concrete adapters — configuration, the OpenAI
//!   embedding client, in-memory and Qdrant index stores, and one chat
//!   adapter per provider wire protocol.
//!
//! File parsing, HTML-to-text extraction, and the HTTP surface are external
//! collaborators: callers hand the engine already-extracted text and get
//! back plain structured results.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    CancelToken, IndexStats, IngestReceipt, IngestionService, QueryAnswer, QueryOrchestrator,
    QueryRequest, RetrievalResult, RetrievalService, RetrievedPassage,
};
pub use domain::{EngineError, Result};
pub use infrastructure::EngineConfig;

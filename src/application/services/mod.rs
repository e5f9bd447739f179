mod ingestion;
mod orchestrator;
mod retrieval;

pub use ingestion::{IndexStats, IngestReceipt, IngestionService};
pub use orchestrator::{CancelToken, QueryAnswer, QueryOrchestrator, QueryRequest};
pub use retrieval::{RetrievalResult, RetrievalService, RetrievedPassage};

pub mod services;

pub use services::{
    CancelToken, IndexStats, IngestReceipt, IngestionService, QueryAnswer, QueryOrchestrator,
    QueryRequest, RetrievalResult, RetrievalService, RetrievedPassage,
};

mod embedding;
mod llm;
mod vector_store;
mod web;

pub use embedding::EmbeddingService;
pub use llm::{ChatCompletion, ChatRequest, LlmClient, LlmClientFactory, ProviderKind, ToolSchema};
pub use vector_store::VectorStore;
pub use web::{FetchedPage, WebFetcher};

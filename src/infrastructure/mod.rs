pub mod config;
pub mod embedding;
pub mod index_store;
pub mod llm;

pub use config::{
    EmbeddingConfig, EngineConfig, LlmConfig, OrchestratorConfig, RetrievalConfig,
};
pub use embedding::OpenAiEmbedding;
pub use index_store::{InMemoryIndex, QdrantIndex};
pub use llm::ProviderRegistry;

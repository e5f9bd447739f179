use async_trait::async_trait;

use crate::domain::{errors::Result, Embedding};

/// Embedding provider port. Ingestion and retrieval must share one
/// implementation so query and corpus vectors live in the same space.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;
    fn dimension(&self) -> usize;
}

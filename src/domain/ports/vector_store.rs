use async_trait::async_trait;

use crate::domain::{
    errors::Result, Chunk, DocumentSummary, Embedding, SearchHit, SourceDocument,
};

/// Index store port: persists document metadata and chunk vectors keyed by
/// document and chunk id.
///
/// Implementations must replace a document's chunk set atomically — a
/// concurrent `search` never observes a mix of pre- and post-upsert chunks
/// for the same document — and must serialize `upsert_document` and
/// `delete_document` for the same id.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace every chunk of `document.id` with the given chunk/embedding
    /// pairs and record the document metadata.
    async fn upsert_document(
        &self,
        document: &SourceDocument,
        chunks: Vec<(Chunk, Embedding)>,
    ) -> Result<()>;

    /// Remove the document and all its chunks. Unknown ids are a no-op.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    /// Nearest-neighbour search under cosine similarity. When
    /// `allowed_document_ids` is given the restriction is a pre-filter:
    /// all `top_k` results are drawn from the allowed set. An empty index
    /// or an empty allowed set yields an empty result, not an error.
    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
        allowed_document_ids: Option<&[String]>,
    ) -> Result<Vec<SearchHit>>;
}

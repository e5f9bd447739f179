use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::{
    errors::EngineError, errors::Result, ports::VectorStore, Chunk, DocumentSummary, Embedding,
    SearchHit, SourceDocument,
};

struct DocumentEntry {
    document: SourceDocument,
    chunks: Vec<(Chunk, Embedding)>,
}

/// In-process index store.
///
/// One `RwLock` over the whole map gives the required semantics directly:
/// an upsert swaps a document's entry in a single write, so readers never
/// observe a mixed pre/post chunk set, and upsert/delete for the same id
/// serialize on the write lock. Embeddings are computed before the lock is
/// taken, keeping the critical section free of I/O.
pub struct InMemoryIndex {
    documents: RwLock<HashMap<String, DocumentEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_poisoned<T>(_: T) -> EngineError {
    EngineError::index("index lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryIndex {
    async fn upsert_document(
        &self,
        document: &SourceDocument,
        chunks: Vec<(Chunk, Embedding)>,
    ) -> Result<()> {
        let mut documents = self.documents.write().map_err(lock_poisoned)?;
        documents.insert(
            document.id.clone(),
            DocumentEntry {
                document: document.clone(),
                chunks,
            },
        );
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut documents = self.documents.write().map_err(lock_poisoned)?;
        documents.remove(document_id);
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let documents = self.documents.read().map_err(lock_poisoned)?;
        let mut summaries: Vec<DocumentSummary> = documents
            .values()
            .map(|entry| DocumentSummary {
                id: entry.document.id.clone(),
                source_type: entry.document.source_type,
                origin: entry.document.origin.clone(),
                chunk_count: entry.chunks.len(),
                tabular: entry.document.tabular.clone(),
                chunking_strategy: entry.document.chunking_strategy,
                created_at: entry.document.created_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
        allowed_document_ids: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        let documents = self.documents.read().map_err(lock_poisoned)?;

        // Pre-filter: only the allowed entries are ever scored.
        let entries: Vec<&DocumentEntry> = match allowed_document_ids {
            Some(allowed) => allowed
                .iter()
                .filter_map(|id| documents.get(id))
                .collect(),
            None => documents.values().collect(),
        };

        let mut hits: Vec<SearchHit> = entries
            .iter()
            .flat_map(|entry| {
                entry.chunks.iter().map(|(chunk, embedding)| SearchHit {
                    chunk: chunk.clone(),
                    source_type: entry.document.source_type,
                    origin: entry.document.origin.clone(),
                    score: query.cosine_similarity(embedding),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.position.cmp(&b.chunk.position))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

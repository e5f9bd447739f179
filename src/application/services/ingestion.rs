use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::chunking::{chunk_unit, strategy_for, ChunkingConfig};
use crate::domain::errors::{EngineError, Result};
use crate::domain::ports::{EmbeddingService, VectorStore};
use crate::domain::{ChunkingStrategy, DocumentSummary, NormalizedUnit, SourceDocument};

/// What an ingest produced, returned to the caller for display and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub document_id: String,
    pub chunk_count: usize,
    pub chunking_strategy: ChunkingStrategy,
}

/// Aggregate view over the index, derived from document summaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub unique_documents: usize,
    pub total_chunks: usize,
    pub by_source_type: BTreeMap<String, usize>,
    pub by_chunking_strategy: BTreeMap<String, usize>,
}

/// Ingestion pipeline: chunk, embed, then index in one atomic replace.
///
/// Embeddings for every chunk are computed before the store is touched, so
/// a provider failure part-way leaves the previous version of the document
/// intact and searchable.
pub struct IngestionService {
    embedding: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorStore>,
    chunking: ChunkingConfig,
}

impl IngestionService {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorStore>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            embedding,
            index,
            chunking,
        }
    }

    #[instrument(skip(self, unit), fields(document_id = %unit.document_id))]
    pub async fn ingest(&self, unit: NormalizedUnit) -> Result<IngestReceipt> {
        if unit.is_empty() {
            return Err(EngineError::empty_content(&unit.origin));
        }

        let chunks = chunk_unit(&unit, &self.chunking);
        if chunks.is_empty() {
            return Err(EngineError::empty_content(&unit.origin));
        }

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let embeddings = self.embedding.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(EngineError::embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let strategy = strategy_for(unit.source_type);
        let document = SourceDocument::from_unit(&unit, strategy);
        let chunk_count = chunks.len();
        self.index
            .upsert_document(&document, chunks.into_iter().zip(embeddings).collect())
            .await?;

        info!(chunk_count, strategy = strategy.as_str(), "document indexed");
        Ok(IngestReceipt {
            document_id: document.id,
            chunk_count,
            chunking_strategy: strategy,
        })
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, document_id: &str) -> Result<()> {
        self.index.delete_document(document_id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        self.index.list_documents().await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let summaries = self.index.list_documents().await?;
        let mut stats = IndexStats {
            unique_documents: summaries.len(),
            ..IndexStats::default()
        };
        for summary in &summaries {
            stats.total_chunks += summary.chunk_count;
            *stats
                .by_source_type
                .entry(summary.source_type.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_chunking_strategy
                .entry(summary.chunking_strategy.as_str().to_string())
                .or_default() += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Embedding, SourceType};
    use crate::infrastructure::InMemoryIndex;
    use async_trait::async_trait;

    struct FlatEmbedding;

    #[async_trait]
    impl EmbeddingService for FlatEmbedding {
        async fn embed(&self, _text: &str) -> Result<Embedding> {
            Ok(Embedding::new(vec![1.0, 0.0]))
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
            Ok(texts.iter().map(|_| Embedding::new(vec![1.0, 0.0])).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn service() -> IngestionService {
        IngestionService::new(
            Arc::new(FlatEmbedding),
            Arc::new(InMemoryIndex::new()),
            ChunkingConfig::default(),
        )
    }

    #[tokio::test]
    async fn whitespace_only_content_is_rejected() {
        let err = service()
            .ingest(NormalizedUnit::new(SourceType::Txt, "blank.txt", "  \n\t "))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyContent { origin } if origin == "blank.txt"));
    }

    #[tokio::test]
    async fn receipt_reports_strategy_and_count() {
        let receipt = service()
            .ingest(NormalizedUnit::new(
                SourceType::Json,
                "items.json",
                r#"[{"a": 1}, {"a": 2}, {"a": 3}]"#,
            ))
            .await
            .unwrap();
        assert_eq!(receipt.document_id, "items.json");
        assert_eq!(receipt.chunk_count, 3);
        assert_eq!(receipt.chunking_strategy, ChunkingStrategy::JsonRecord);
    }

    #[tokio::test]
    async fn stats_aggregate_over_documents() {
        let service = service();
        service
            .ingest(NormalizedUnit::new(SourceType::Txt, "a.txt", "alpha"))
            .await
            .unwrap();
        service
            .ingest(NormalizedUnit::new(SourceType::Txt, "b.txt", "beta"))
            .await
            .unwrap();
        service
            .ingest(NormalizedUnit::new(
                SourceType::Json,
                "c.json",
                r#"[{"x": 1}, {"x": 2}]"#,
            ))
            .await
            .unwrap();

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.unique_documents, 3);
        assert_eq!(stats.total_chunks, 4);
        assert_eq!(stats.by_source_type["txt"], 2);
        assert_eq!(stats.by_chunking_strategy["json-record"], 1);
    }
}

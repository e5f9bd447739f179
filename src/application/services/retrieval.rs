use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::errors::Result;
use crate::domain::ports::{EmbeddingService, VectorStore};
use crate::infrastructure::RetrievalConfig;

/// One passage handed to the orchestrator, detached from index internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    /// Citation tag, `"<source_type>: <origin>"`.
    pub source_label: String,
    pub document_id: String,
    pub position: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub passages: Vec<RetrievedPassage>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Semantic retrieval over the index: embed the query, search, then apply
/// the relevance floor. Scope filtering happens in the store, so unselected
/// documents are never scored.
pub struct RetrievalService {
    embedding: Arc<dyn EmbeddingService>,
    index: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl RetrievalService {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        index: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedding,
            index,
            config,
        }
    }

    /// Retrieve with a k chosen from the query's shape: aggregation-style
    /// questions over tabular data widen k so whole tables reach the model.
    pub async fn retrieve_auto(
        &self,
        query: &str,
        selected: Option<&[String]>,
    ) -> Result<RetrievalResult> {
        let k = if looks_structured(query) {
            self.config.structured_top_k
        } else {
            self.config.top_k
        };
        self.retrieve(query, selected, Some(k)).await
    }

    #[instrument(skip(self, selected), fields(k))]
    pub async fn retrieve(
        &self,
        query: &str,
        selected: Option<&[String]>,
        k: Option<usize>,
    ) -> Result<RetrievalResult> {
        let k = k.unwrap_or(self.config.top_k).clamp(1, self.config.max_k);

        // Unknown ids in the selection are dropped rather than erroring, so
        // a selector holding a deleted document still gets an answer scoped
        // to what remains.
        let validated = match selected {
            Some(ids) => Some(self.validate_selection(ids).await?),
            None => None,
        };
        if matches!(&validated, Some(ids) if ids.is_empty()) {
            return Ok(RetrievalResult::default());
        }

        let query_embedding = self.embedding.embed(query).await?;
        let hits = self
            .index
            .search(&query_embedding, k, validated.as_deref())
            .await?;

        let mut seen: HashSet<(String, usize)> = HashSet::new();
        let passages: Vec<RetrievedPassage> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.config.min_score)
            .filter(|hit| seen.insert((hit.chunk.document_id.clone(), hit.chunk.position)))
            .map(|hit| RetrievedPassage {
                source_label: hit.source_label(),
                text: hit.chunk.text,
                document_id: hit.chunk.document_id,
                position: hit.chunk.position,
                score: hit.score,
            })
            .collect();

        debug!(passages = passages.len(), "retrieval complete");
        Ok(RetrievalResult { passages })
    }

    async fn validate_selection(&self, selected: &[String]) -> Result<Vec<String>> {
        let known: HashSet<String> = self
            .index
            .list_documents()
            .await?
            .into_iter()
            .map(|summary| summary.id)
            .collect();
        Ok(selected
            .iter()
            .filter(|id| known.contains(*id))
            .cloned()
            .collect())
    }
}

/// Heuristic for aggregation-style questions that need broad tabular
/// context rather than a handful of best passages.
///
/// Markers match whole words only, so prose like "summarize" does not trip
/// the "sum" marker.
fn looks_structured(query: &str) -> bool {
    const MARKERS: &[&str] = &[
        "total", "sum", "average", "mean", "median", "count", "how many", "maximum", "minimum",
        "highest", "lowest", "per row", "per column", "table", "spreadsheet", "rows", "columns",
    ];
    let normalized: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let padded = format!(" {normalized} ");
    MARKERS
        .iter()
        .any(|marker| padded.contains(&format!(" {marker} ")))
}

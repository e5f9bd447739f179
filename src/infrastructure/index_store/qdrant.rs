use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    Range, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use crate::domain::{
    errors::EngineError, errors::Result, ports::VectorStore, Chunk, ChunkingStrategy,
    DocumentSummary, Embedding, SearchHit, SourceDocument, SourceType, TabularInfo,
};

const SCROLL_PAGE: u32 = 256;

/// Qdrant-backed index store for persistent deployments.
///
/// Chunk payloads carry the full document metadata, so summaries and search
/// hits reconstruct without a second lookup. Point ids are UUIDv5 of the
/// chunk id, so re-ingesting a document overwrites its points in place; a
/// concurrent search sees either the old version or the new, never an
/// absent document. Stale tail points from a previously longer version are
/// removed after the new points land. `write_gate` serializes upsert and
/// delete, matching the in-memory store's write-lock semantics.
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
    write_gate: tokio::sync::Mutex<()>,
}

impl QdrantIndex {
    pub async fn new(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| EngineError::index(e.to_string()))?;

        let index = Self {
            client,
            collection: collection.to_string(),
            dimension,
            write_gate: tokio::sync::Mutex::new(()),
        };
        index.ensure_collection().await?;
        Ok(index)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| EngineError::index(e.to_string()))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| EngineError::index(e.to_string()))?;
        }
        Ok(())
    }

    fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes()).to_string()
    }

    fn chunk_payload(document: &SourceDocument, chunk: &Chunk) -> Result<Payload> {
        let mut payload = serde_json::json!({
            "chunk_id": chunk.id,
            "document_id": chunk.document_id,
            "text": chunk.text,
            "position": chunk.position,
            "source_type": document.source_type.as_str(),
            "origin": document.origin,
            "chunking_strategy": document.chunking_strategy.as_str(),
            "created_at": document.created_at.to_rfc3339(),
        });
        if let Some((start, end)) = chunk.row_range {
            payload["row_start"] = start.into();
            payload["row_end"] = end.into();
        }
        if let Some(tabular) = &document.tabular {
            payload["rows"] = tabular.rows.into();
            payload["columns"] = tabular.columns.into();
            if let Some(sheet) = &tabular.sheet_name {
                payload["sheet_name"] = sheet.clone().into();
            }
        }
        payload
            .try_into()
            .map_err(|_| EngineError::index("failed to build chunk payload"))
    }

    fn document_filter(document_id: &str) -> Filter {
        Filter::must([Condition::matches(
            "document_id",
            document_id.to_string(),
        )])
    }

    /// Points of a document at or past the new chunk count: the stale tail
    /// left behind when a re-ingest shrinks the document.
    fn stale_filter(document_id: &str, new_chunk_count: usize) -> Filter {
        Filter::must([
            Condition::matches("document_id", document_id.to_string()),
            Condition::range(
                "position",
                Range {
                    gte: Some(new_chunk_count as f64),
                    ..Range::default()
                },
            ),
        ])
    }

    async fn delete_by_filter(&self, filter: Filter) -> Result<()> {
        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(filter))
            .await
            .map_err(|e| EngineError::index(e.to_string()))?;
        Ok(())
    }

    fn allowed_filter(allowed: &[String]) -> Filter {
        Filter::should(
            allowed
                .iter()
                .map(|id| Condition::matches("document_id", id.clone()))
                .collect::<Vec<_>>(),
        )
    }
}

fn payload_chunk(payload: &HashMap<String, qdrant_client::qdrant::Value>) -> Option<Chunk> {
    let id = payload.get("chunk_id")?.as_str()?.to_string();
    let document_id = payload.get("document_id")?.as_str()?.to_string();
    let text = payload.get("text")?.as_str()?.to_string();
    let position = payload.get("position")?.as_integer()? as usize;
    let row_range = match (
        payload.get("row_start").and_then(|v| v.as_integer()),
        payload.get("row_end").and_then(|v| v.as_integer()),
    ) {
        (Some(start), Some(end)) => Some((start as usize, end as usize)),
        _ => None,
    };
    Some(Chunk {
        id,
        document_id,
        text,
        position,
        row_range,
    })
}

fn payload_source(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> Option<(SourceType, String)> {
    let source_type = SourceType::parse(payload.get("source_type")?.as_str()?)?;
    let origin = payload.get("origin")?.as_str()?.to_string();
    Some((source_type, origin))
}

fn payload_tabular(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> Option<TabularInfo> {
    let rows = payload.get("rows")?.as_integer()? as usize;
    let columns = payload.get("columns")?.as_integer()? as usize;
    Some(TabularInfo {
        rows,
        columns,
        sheet_name: payload
            .get("sheet_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    })
}

#[async_trait]
impl VectorStore for QdrantIndex {
    async fn upsert_document(
        &self,
        document: &SourceDocument,
        chunks: Vec<(Chunk, Embedding)>,
    ) -> Result<()> {
        let _gate = self.write_gate.lock().await;

        let points = chunks
            .iter()
            .map(|(chunk, embedding)| {
                Ok(PointStruct::new(
                    Self::point_id(&chunk.id),
                    embedding.as_slice().to_vec(),
                    Self::chunk_payload(document, chunk)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        if points.is_empty() {
            return self.delete_by_filter(Self::document_filter(&document.id)).await;
        }

        // Deterministic point ids overwrite the previous version in place,
        // so the document is never absent mid-replace and a failed upsert
        // leaves the old version intact. Only the stale tail of a shrunken
        // re-ingest remains to be deleted afterwards.
        let new_chunk_count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
            .await
            .map_err(|e| EngineError::index(e.to_string()))?;
        self.delete_by_filter(Self::stale_filter(&document.id, new_chunk_count))
            .await
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        self.delete_by_filter(Self::document_filter(document_id)).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let mut summaries: HashMap<String, DocumentSummary> = HashMap::new();
        let mut offset = None;

        loop {
            let mut scroll = ScrollPointsBuilder::new(&self.collection)
                .limit(SCROLL_PAGE)
                .with_payload(true);
            if let Some(offset_id) = offset {
                scroll = scroll.offset(offset_id);
            }

            let page = self
                .client
                .scroll(scroll)
                .await
                .map_err(|e| EngineError::index(e.to_string()))?;

            for point in &page.result {
                let payload = &point.payload;
                let Some(chunk) = payload_chunk(payload) else {
                    continue;
                };
                let Some((source_type, origin)) = payload_source(payload) else {
                    continue;
                };
                let strategy = payload
                    .get("chunking_strategy")
                    .and_then(|v| v.as_str())
                    .and_then(|s| ChunkingStrategy::parse(s))
                    .unwrap_or(ChunkingStrategy::SlidingWindow);
                let created_at = payload
                    .get("created_at")
                    .and_then(|v| v.as_str())
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);

                let entry = summaries
                    .entry(chunk.document_id.clone())
                    .or_insert_with(|| DocumentSummary {
                        id: chunk.document_id.clone(),
                        source_type,
                        origin,
                        chunk_count: 0,
                        tabular: payload_tabular(payload),
                        chunking_strategy: strategy,
                        created_at,
                    });
                entry.chunk_count += 1;
            }

            match page.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        let mut result: Vec<DocumentSummary> = summaries.into_values().collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }

    async fn search(
        &self,
        query: &Embedding,
        top_k: usize,
        allowed_document_ids: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        if matches!(allowed_document_ids, Some(allowed) if allowed.is_empty()) {
            return Ok(Vec::new());
        }

        let mut search = SearchPointsBuilder::new(
            &self.collection,
            query.as_slice().to_vec(),
            top_k as u64,
        )
        .with_payload(true);
        if let Some(allowed) = allowed_document_ids {
            search = search.filter(Self::allowed_filter(allowed));
        }

        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| EngineError::index(e.to_string()))?;

        let mut hits: Vec<SearchHit> = response
            .result
            .into_iter()
            .filter_map(|point| {
                let chunk = payload_chunk(&point.payload)?;
                let (source_type, origin) = payload_source(&point.payload)?;
                Some(SearchHit {
                    chunk,
                    source_type,
                    origin,
                    score: point.score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.position.cmp(&b.chunk.position))
        });
        Ok(hits)
    }
}

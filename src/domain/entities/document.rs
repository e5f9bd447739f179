use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shape of the content a normalized unit was extracted from.
///
/// The shape decides the chunking strategy: prose-like sources get sliding
/// windows, tabular sources get row ranges, JSON gets one record per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Txt,
    Markdown,
    Docx,
    Csv,
    Excel,
    Json,
    Web,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Markdown => "markdown",
            Self::Docx => "docx",
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Json => "json",
            Self::Web => "web",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Markdown),
            "docx" => Some(Self::Docx),
            "csv" => Some(Self::Csv),
            "excel" | "xls" | "xlsx" => Some(Self::Excel),
            "json" => Some(Self::Json),
            "web" | "html" | "url" => Some(Self::Web),
            _ => None,
        }
    }

    pub fn is_tabular(&self) -> bool {
        matches!(self, Self::Csv | Self::Excel)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row and column metadata carried by tabular sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularInfo {
    pub rows: usize,
    pub columns: usize,
    pub sheet_name: Option<String>,
}

/// One unit of already-extracted content, ready for chunking and indexing.
///
/// The content normalizer does no parsing: the document parser, OCR, or web
/// fetcher hands it UTF-8 text plus source metadata, and it derives the
/// stable `document_id` from origin identity. An Excel sheet gets its own
/// unit (and id `origin#sheet`), so every sheet deletes independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedUnit {
    pub document_id: String,
    pub source_type: SourceType,
    pub origin: String,
    pub text: String,
    pub tabular: Option<TabularInfo>,
}

impl NormalizedUnit {
    pub fn new(source_type: SourceType, origin: impl Into<String>, text: impl Into<String>) -> Self {
        let origin = origin.into();
        Self {
            document_id: origin.clone(),
            source_type,
            origin,
            text: text.into(),
            tabular: None,
        }
    }

    /// Attach tabular metadata; a sheet name folds into the document id.
    pub fn with_tabular(mut self, tabular: TabularInfo) -> Self {
        if let Some(sheet) = tabular.sheet_name.as_deref() {
            self.document_id = format!("{}#{}", self.origin, sheet);
        }
        self.tabular = Some(tabular);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// How a document was split into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkingStrategy {
    SlidingWindow,
    RowRange,
    JsonRecord,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlidingWindow => "sliding-window",
            Self::RowRange => "row-range",
            Self::JsonRecord => "json-record",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sliding-window" => Some(Self::SlidingWindow),
            "row-range" => Some(Self::RowRange),
            "json-record" => Some(Self::JsonRecord),
            _ => None,
        }
    }
}

/// One ingested unit as the index stores it. Owns its chunks: deleting the
/// document cascades to every chunk with a matching `document_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub source_type: SourceType,
    pub origin: String,
    pub tabular: Option<TabularInfo>,
    pub chunking_strategy: ChunkingStrategy,
    pub created_at: DateTime<Utc>,
}

impl SourceDocument {
    pub fn from_unit(unit: &NormalizedUnit, strategy: ChunkingStrategy) -> Self {
        Self {
            id: unit.document_id.clone(),
            source_type: unit.source_type,
            origin: unit.origin.clone(),
            tabular: unit.tabular.clone(),
            chunking_strategy: strategy,
            created_at: Utc::now(),
        }
    }

    /// Stable human-readable tag used for citations: `"<source_type>: <origin>"`.
    pub fn source_label(&self) -> String {
        format!("{}: {}", self.source_type, self.origin)
    }
}

/// Document-level view for selector UIs and stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub source_type: SourceType,
    pub origin: String,
    pub chunk_count: usize,
    pub tabular: Option<TabularInfo>,
    pub chunking_strategy: ChunkingStrategy,
    pub created_at: DateTime<Utc>,
}

/// A retrievable passage. `id` is deterministic (`document_id` plus
/// position), so re-ingesting a document replaces rather than accumulates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub position: usize,
    /// 1-based inclusive row bounds for row-range chunks.
    pub row_range: Option<(usize, usize)>,
}

impl Chunk {
    pub fn new(document_id: impl Into<String>, position: usize, text: impl Into<String>) -> Self {
        let document_id = document_id.into();
        Self {
            id: chunk_id(&document_id, position),
            document_id,
            text: text.into(),
            position,
            row_range: None,
        }
    }

    pub fn with_row_range(mut self, start: usize, end: usize) -> Self {
        self.row_range = Some((start, end));
        self
    }
}

/// Deterministic chunk identity within a document.
pub fn chunk_id(document_id: &str, position: usize) -> String {
    format!("{document_id}::{position}")
}

/// One scored nearest-neighbour result from the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub source_type: SourceType,
    pub origin: String,
    pub score: f32,
}

impl SearchHit {
    pub fn source_label(&self) -> String {
        format!("{}: {}", self.source_type, self.origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_defaults_to_origin() {
        let unit = NormalizedUnit::new(SourceType::Pdf, "report.pdf", "body");
        assert_eq!(unit.document_id, "report.pdf");
    }

    #[test]
    fn sheet_name_folds_into_document_id() {
        let unit = NormalizedUnit::new(SourceType::Excel, "book.xlsx", "| a |").with_tabular(
            TabularInfo {
                rows: 4,
                columns: 1,
                sheet_name: Some("Q1".into()),
            },
        );
        assert_eq!(unit.document_id, "book.xlsx#Q1");
        assert_eq!(unit.origin, "book.xlsx");
    }

    #[test]
    fn chunk_ids_are_deterministic() {
        let a = Chunk::new("sales.csv", 0, "row data");
        let b = Chunk::new("sales.csv", 0, "row data");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id, "sales.csv::0");
    }

    #[test]
    fn source_label_format() {
        let unit = NormalizedUnit::new(SourceType::Csv, "sales.csv", "x");
        let doc = SourceDocument::from_unit(&unit, ChunkingStrategy::RowRange);
        assert_eq!(doc.source_label(), "csv: sales.csv");
    }

    #[test]
    fn source_type_round_trips_through_parse() {
        for ty in [
            SourceType::Pdf,
            SourceType::Txt,
            SourceType::Markdown,
            SourceType::Docx,
            SourceType::Csv,
            SourceType::Excel,
            SourceType::Json,
            SourceType::Web,
        ] {
            assert_eq!(SourceType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(SourceType::parse("tarball"), None);
    }
}

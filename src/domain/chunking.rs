//! Chunking engine: splits a normalized unit into an ordered, finite,
//! deterministic sequence of chunks.
//!
//! Strategy selection follows the source shape. Prose-like text gets
//! overlapping sliding windows so context survives chunk boundaries.
//! Tabular text is cut along row boundaries with the header repeated in
//! every chunk, never mid-row. JSON arrays yield one record per chunk with
//! key structure intact. Identical input and configuration always produce
//! the same chunk id sequence, which is what makes re-ingestion an
//! idempotent replace.

use serde::{Deserialize, Serialize};

use crate::domain::entities::{Chunk, ChunkingStrategy, NormalizedUnit, SourceType};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size for prose chunks, in characters (token-approximating).
    pub window_chars: usize,
    /// Overlap between consecutive prose windows, in characters.
    pub overlap_chars: usize,
    /// Target rows per tabular chunk.
    pub rows_per_chunk: usize,
    /// Hard byte-ish ceiling per chunk; oversized row ranges are halved
    /// until they fit.
    pub max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: 1000,
            overlap_chars: 200,
            rows_per_chunk: 20,
            max_chunk_chars: 25_000,
        }
    }
}

/// Strategy a given source shape chunks with.
pub fn strategy_for(source_type: SourceType) -> ChunkingStrategy {
    match source_type {
        SourceType::Csv | SourceType::Excel => ChunkingStrategy::RowRange,
        SourceType::Json => ChunkingStrategy::JsonRecord,
        _ => ChunkingStrategy::SlidingWindow,
    }
}

/// Split one normalized unit into chunks. Empty content yields zero chunks;
/// the caller rejects the document in that case.
pub fn chunk_unit(unit: &NormalizedUnit, config: &ChunkingConfig) -> Vec<Chunk> {
    if unit.is_empty() {
        return Vec::new();
    }
    match strategy_for(unit.source_type) {
        ChunkingStrategy::SlidingWindow => window_chunks(&unit.document_id, &unit.text, config),
        ChunkingStrategy::RowRange => row_range_chunks(unit, config),
        ChunkingStrategy::JsonRecord => json_record_chunks(unit, config),
    }
}

/// Fixed-size overlapping windows over the character sequence.
///
/// Windows end on whitespace where one exists in the back half of the
/// window, and operate on `char` boundaries throughout, so a multi-byte
/// character is never split.
fn window_chunks(document_id: &str, text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    let window = config.window_chars.max(1);
    // An overlap at or past half the window would stall forward progress.
    let overlap = config.overlap_chars.min(window / 2);

    if chars.len() <= window {
        return vec![Chunk::new(document_id, 0, text)];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut position = 0usize;

    while start < chars.len() {
        let hard_end = (start + window).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            let floor = start + window / 2;
            match chars[floor..hard_end].iter().rposition(|c| c.is_whitespace()) {
                Some(offset) => floor + offset + 1,
                None => hard_end,
            }
        };

        let body: String = chars[start..end].iter().collect();
        if !body.trim().is_empty() {
            chunks.push(Chunk::new(document_id, position, body));
            position += 1;
        }

        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Contiguous row ranges of a pre-rendered table, header repeated per chunk.
///
/// The normalizer supplies tabular text as a pipe table (header row plus a
/// `|---|` separator). Ranges that overflow `max_chunk_chars` fall back to
/// half the row count, down to single-row chunks.
fn row_range_chunks(unit: &NormalizedUnit, config: &ChunkingConfig) -> Vec<Chunk> {
    let lines: Vec<&str> = unit.text.lines().collect();
    let header_len = table_header_len(&lines);
    let header = lines[..header_len].join("\n");
    let rows = &lines[header_len..];
    let data_rows: Vec<&str> = rows.iter().copied().filter(|l| !l.trim().is_empty()).collect();

    if data_rows.is_empty() {
        // Header-only table still indexes as a single chunk.
        return vec![Chunk::new(&unit.document_id, 0, unit.text.trim_end())];
    }

    let sheet = unit
        .tabular
        .as_ref()
        .and_then(|t| t.sheet_name.as_deref());

    let mut chunks = Vec::new();
    let mut position = 0usize;
    let mut start = 0usize;
    let target = config.rows_per_chunk.max(1);

    while start < data_rows.len() {
        let mut take = target.min(data_rows.len() - start);
        let mut body = render_row_range(&header, &data_rows[start..start + take], sheet, start);
        while body.len() > config.max_chunk_chars && take > 1 {
            take /= 2;
            body = render_row_range(&header, &data_rows[start..start + take], sheet, start);
        }

        let end = start + take;
        chunks.push(
            Chunk::new(&unit.document_id, position, body).with_row_range(start + 1, end),
        );
        position += 1;
        start = end;
    }

    chunks
}

fn render_row_range(header: &str, rows: &[&str], sheet: Option<&str>, start: usize) -> String {
    let mut out = String::new();
    if let Some(sheet) = sheet {
        out.push_str(&format!(
            "## Sheet: {} (Rows {}-{})\n\n",
            sheet,
            start + 1,
            start + rows.len()
        ));
    }
    out.push_str(header);
    for row in rows {
        out.push('\n');
        out.push_str(row);
    }
    out
}

/// Number of leading lines that form the table header: the column row plus
/// a separator row when the second line is one (`| --- | --- |`).
fn table_header_len(lines: &[&str]) -> usize {
    if lines.is_empty() {
        return 0;
    }
    match lines.get(1) {
        Some(second)
            if !second.trim().is_empty()
                && second
                    .chars()
                    .all(|c| matches!(c, '|' | '-' | ':' | '=' | ' ')) =>
        {
            2
        }
        _ => 1,
    }
}

/// One logical record per chunk for JSON sources.
///
/// A top-level array yields one chunk per element, pretty-printed so key
/// structure survives in the chunk text. Objects and scalars become a
/// single chunk. Text that does not parse as JSON degrades to sliding
/// windows rather than being dropped.
fn json_record_chunks(unit: &NormalizedUnit, config: &ChunkingConfig) -> Vec<Chunk> {
    let parsed: serde_json::Value = match serde_json::from_str(&unit.text) {
        Ok(value) => value,
        Err(_) => return window_chunks(&unit.document_id, &unit.text, config),
    };

    match parsed {
        serde_json::Value::Array(records) if !records.is_empty() => records
            .iter()
            .enumerate()
            .map(|(position, record)| {
                let body = serde_json::to_string_pretty(record)
                    .unwrap_or_else(|_| record.to_string());
                Chunk::new(&unit.document_id, position, body)
            })
            .collect(),
        serde_json::Value::Array(_) => Vec::new(),
        other => {
            let body =
                serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string());
            vec![Chunk::new(&unit.document_id, 0, body)]
        }
    }
}

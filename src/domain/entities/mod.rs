mod conversation;
mod document;
mod embedding;

pub use conversation::{ChatMessage, MessageRole, ToolCall};
pub use document::{
    Chunk, ChunkingStrategy, DocumentSummary, NormalizedUnit, SearchHit, SourceDocument,
    SourceType, TabularInfo,
};
pub use embedding::Embedding;

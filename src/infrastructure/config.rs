use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::chunking::ChunkingConfig;
use crate::domain::errors::{EngineError, Result};
use crate::domain::ports::ProviderKind;

/// Engine configuration. Every section has working defaults; deployments
/// override via a YAML file, then env vars on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub orchestrator: OrchestratorConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of passages per retrieval.
    pub top_k: usize,
    /// Widened k for queries that look like aggregations over tabular data,
    /// so whole tables make it into context.
    pub structured_top_k: usize,
    /// Upper bound on any requested k.
    pub max_k: usize,
    /// Minimum cosine similarity a passage must clear; below it the result
    /// is "no grounding available" rather than noise.
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            structured_top_k: 10,
            max_k: 20,
            min_score: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum decide/tool-exec round-trips before a final answer is forced.
    pub max_tool_rounds: usize,
    /// Tool results are truncated to this many characters to bound prompt
    /// size.
    pub tool_result_max_chars: usize,
    pub llm_timeout_secs: u64,
    pub web_fetch_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 3,
            tool_result_max_chars: 8000,
            llm_timeout_secs: 120,
            web_fetch_timeout_secs: 30,
        }
    }
}

impl OrchestratorConfig {
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn web_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.web_fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    /// Hard input cap per embedded text; the provider rejects longer input.
    pub max_input_chars: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            max_input_chars: 30_000,
            timeout_secs: 60,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| EngineError::config(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_yaml_str(&raw)
    }

    /// Defaults, then `.env`, then `DOCQA_*` env vars.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::default().apply_env()
    }

    fn apply_env(mut self) -> Self {
        if let Some(kind) = env_var("DOCQA_LLM_PROVIDER").and_then(|v| ProviderKind::parse(&v)) {
            self.llm.provider = kind;
        }
        if let Some(model) = env_var("DOCQA_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = env_var("DOCQA_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(dim) = env_var("DOCQA_EMBEDDING_DIMENSION").and_then(|v| v.parse().ok()) {
            self.embedding.dimension = dim;
        }
        if let Some(rounds) = env_var("DOCQA_MAX_TOOL_ROUNDS").and_then(|v| v.parse().ok()) {
            self.orchestrator.max_tool_rounds = rounds;
        }
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.chunking.window_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert!((config.retrieval.min_score - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.orchestrator.max_tool_rounds, 3);
        assert_eq!(config.embedding.dimension, 1536);
    }

    #[test]
    fn yaml_overrides_merge_over_defaults() {
        let config = EngineConfig::from_yaml_str(
            r#"
retrieval:
  top_k: 8
llm:
  provider: anthropic
  model: claude-sonnet-4-5
"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.max_k, 20);
        assert_eq!(config.llm.provider, ProviderKind::Anthropic);
        assert_eq!(config.llm.model, "claude-sonnet-4-5");
    }

    #[test]
    fn invalid_yaml_is_a_config_error() {
        let err = EngineConfig::from_yaml_str("retrieval: [not, a, map]").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}

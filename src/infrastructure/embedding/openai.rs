use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{errors::EngineError, errors::Result, ports::EmbeddingService, Embedding};
use crate::infrastructure::config::EmbeddingConfig;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI `/v1/embeddings` adapter. Corpus and query embeddings both go
/// through this one client, regardless of which chat provider answers the
/// query.
pub struct OpenAiEmbedding {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    max_input_chars: usize,
}

impl OpenAiEmbedding {
    pub fn new(api_key: impl Into<String>, config: &EmbeddingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EngineError::embedding(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            dimension: config.dimension,
            max_input_chars: config.max_input_chars,
        })
    }

    pub fn from_env(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| EngineError::embedding("OPENAI_API_KEY is not set"))?;
        Self::new(api_key, config)
    }

    /// Point the adapter at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn check_input_sizes(&self, texts: &[&str]) -> Result<()> {
        for (i, text) in texts.iter().enumerate() {
            let chars = text.chars().count();
            if chars > self.max_input_chars {
                return Err(EngineError::embedding(format!(
                    "input {i} is {chars} chars, exceeding the {} char limit",
                    self.max_input_chars
                )));
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingObject>,
}

#[derive(Deserialize)]
struct EmbeddingObject {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingService for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut batch = self.embed_batch(&[text]).await?;
        batch
            .pop()
            .ok_or_else(|| EngineError::embedding("provider returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.check_input_sizes(texts)?;

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EngineError::embedding(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::embedding(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EngineError::embedding(format!("malformed response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(EngineError::embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|obj| obj.index);
        Ok(data
            .into_iter()
            .map(|obj| Embedding::new(obj.embedding))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy for the engine.
///
/// Ingestion-side errors (`EmptyContent`, `EmbeddingProvider`, `IndexStore`)
/// abort the ingest call entirely; no partial document is left indexed.
/// Within query orchestration a `ToolExecution` failure is recorded as a
/// tool-result turn and the loop continues, while provider authentication
/// and availability errors abort the whole query.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Document '{origin}' has no extractable content")]
    EmptyContent { origin: String },

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Index store error: {0}")]
    IndexStore(String),

    #[error("Authentication failed for provider '{provider}'")]
    ProviderAuthentication { provider: String },

    #[error("Provider '{provider}' rate limited the request")]
    ProviderRateLimit {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Model '{model}' is not available on provider '{provider}'")]
    InvalidModel { provider: String, model: String },

    #[error("Provider '{provider}' unavailable: {detail}")]
    ProviderUnavailable { provider: String, detail: String },

    #[error("Tool '{tool}' failed: {detail}")]
    ToolExecution { tool: String, detail: String },

    #[error("Operation '{operation}' timed out")]
    Timeout { operation: String },

    #[error("Query cancelled by caller")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn empty_content(origin: impl Into<String>) -> Self {
        Self::EmptyContent {
            origin: origin.into(),
        }
    }

    pub fn embedding(detail: impl Into<String>) -> Self {
        Self::EmbeddingProvider(detail.into())
    }

    pub fn index(detail: impl Into<String>) -> Self {
        Self::IndexStore(detail.into())
    }

    pub fn authentication(provider: impl Into<String>) -> Self {
        Self::ProviderAuthentication {
            provider: provider.into(),
        }
    }

    pub fn rate_limit(provider: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::ProviderRateLimit {
            provider: provider.into(),
            retry_after,
        }
    }

    pub fn invalid_model(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::InvalidModel {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn unavailable(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            detail: detail.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config(detail.into())
    }

    /// Whether the query loop may continue after this error by recording it
    /// as a failed tool result instead of aborting.
    pub fn is_recoverable_in_tool_loop(&self) -> bool {
        matches!(
            self,
            Self::ToolExecution { .. }
                | Self::EmbeddingProvider(_)
                | Self::IndexStore(_)
                | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

//! Chat-completion adapters: one per backend wire protocol, all surfacing
//! the same request/response shape and failure taxonomy.

mod anthropic;
mod gemini;
mod openai;

use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicChat;
pub use gemini::GeminiChat;
pub use openai::OpenAiChat;

use crate::domain::errors::{EngineError, Result};
use crate::domain::ports::{LlmClient, LlmClientFactory, ProviderKind};

/// Models that reject any temperature other than their default; requests
/// against them are pinned to 1.0.
const TEMPERATURE_RESTRICTED_MODELS: &[&str] = &["gpt-5", "o1-preview", "o1-mini"];

pub(crate) fn effective_temperature(model: &str, requested: Option<f32>) -> Option<f32> {
    if TEMPERATURE_RESTRICTED_MODELS
        .iter()
        .any(|m| m.eq_ignore_ascii_case(model))
    {
        requested.map(|_| 1.0)
    } else {
        requested
    }
}

/// Uniform mapping from an HTTP error response to the engine taxonomy.
/// Adapters call this and never retry on their own.
pub(crate) fn error_for_status(
    provider: &str,
    status: reqwest::StatusCode,
    retry_after: Option<Duration>,
    model: &str,
    body: &str,
) -> EngineError {
    match status.as_u16() {
        401 | 403 => EngineError::authentication(provider),
        429 => EngineError::rate_limit(provider, retry_after),
        404 => EngineError::invalid_model(provider, model),
        400 if body.contains("model") => EngineError::invalid_model(provider, model),
        _ => EngineError::unavailable(provider, format!("{status}: {body}")),
    }
}

pub(crate) fn retry_after_hint(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> EngineError {
    EngineError::unavailable(provider, err.to_string())
}

fn api_key_from_env(provider: ProviderKind) -> Result<String> {
    let var = match provider {
        ProviderKind::OpenAi => "OPENAI_API_KEY",
        ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        ProviderKind::Gemini => "GOOGLE_API_KEY",
    };
    std::env::var(var)
        .ok()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| EngineError::authentication(provider.as_str()))
}

/// Default [`LlmClientFactory`]: resolves API keys from the environment and
/// shares one HTTP connection pool across adapters.
pub struct ProviderRegistry {
    http: reqwest::Client,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClientFactory for ProviderRegistry {
    fn client(&self, provider: ProviderKind) -> Result<Arc<dyn LlmClient>> {
        let api_key = api_key_from_env(provider)?;
        Ok(match provider {
            ProviderKind::OpenAi => Arc::new(OpenAiChat::new(self.http.clone(), api_key)),
            ProviderKind::Anthropic => Arc::new(AnthropicChat::new(self.http.clone(), api_key)),
            ProviderKind::Gemini => Arc::new(GeminiChat::new(self.http.clone(), api_key)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_models_pin_temperature() {
        assert_eq!(effective_temperature("gpt-5", Some(0.2)), Some(1.0));
        assert_eq!(effective_temperature("GPT-5", Some(0.2)), Some(1.0));
        assert_eq!(effective_temperature("gpt-5", None), None);
        assert_eq!(effective_temperature("gpt-4o-mini", Some(0.2)), Some(0.2));
    }

    #[test]
    fn status_codes_map_to_the_taxonomy() {
        use reqwest::StatusCode;
        assert!(matches!(
            error_for_status("openai", StatusCode::UNAUTHORIZED, None, "m", ""),
            EngineError::ProviderAuthentication { .. }
        ));
        assert!(matches!(
            error_for_status(
                "openai",
                StatusCode::TOO_MANY_REQUESTS,
                Some(Duration::from_secs(7)),
                "m",
                ""
            ),
            EngineError::ProviderRateLimit {
                retry_after: Some(d),
                ..
            } if d == Duration::from_secs(7)
        ));
        assert!(matches!(
            error_for_status("gemini", StatusCode::NOT_FOUND, None, "nope", ""),
            EngineError::InvalidModel { .. }
        ));
        assert!(matches!(
            error_for_status("anthropic", StatusCode::BAD_GATEWAY, None, "m", "boom"),
            EngineError::ProviderUnavailable { .. }
        ));
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::Result;

/// Text-extracted web page returned by the external fetch collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub origin: String,
    pub title: Option<String>,
    pub text: String,
}

/// Web-fetch collaborator port. Fetching, HTML-to-text conversion, and any
/// crawling limits live entirely behind this trait.
#[async_trait]
pub trait WebFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

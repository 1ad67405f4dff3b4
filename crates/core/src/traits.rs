use crate::error::{FetchError, InferenceError, SearchError};
use crate::models::{ImagePayload, Sampling, SearchHit};
use async_trait::async_trait;

#[async_trait]
pub trait SearchProvider {
    /// Ranked hits for `query`, most relevant first.
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError>;
}

#[async_trait]
pub trait DocumentFetcher {
    /// Clean article for `url`. The text is never empty.
    async fn fetch(&self, url: &str) -> Result<ExtractedArticle, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub text: String,
}

pub trait ContentExtractor {
    fn extract(&self, html: &str) -> ExtractedArticle;
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub system: String,
    pub prompt: String,
    pub image: Option<ImagePayload>,
    pub max_tokens: u32,
    pub sampling: Sampling,
}

#[async_trait]
pub trait InferenceBackend {
    fn name(&self) -> &str;

    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

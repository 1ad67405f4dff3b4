use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query text is empty")]
    EmptyText,

    #[error("requested result count must be at least 1")]
    ZeroResultCount,

    #[error("invalid base64 image payload: {0}")]
    InvalidImage(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {provider}: {details}")]
    ProviderResponse { provider: String, details: String },

    #[error("search provider returned status {status}")]
    Status { status: u16 },

    #[error("search request timed out after {0:?}")]
    Timeout(Duration),

    #[error("search request failed: {0}")]
    Request(String),
}

impl SearchError {
    /// Whether another attempt against the provider could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Http(error) => error.is_timeout() || error.is_connect() || error.is_request(),
            SearchError::Status { status } => *status == 429 || *status >= 500,
            SearchError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Coarse classification of a failed fetch, surfaced on every `fetch_failed` source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Network,
    HttpStatus,
    ExtractionEmpty,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {details}")]
    Network { url: String, details: String },

    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("{url} exceeded the response cap of {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("no readable text could be extracted from {url}")]
    ExtractionEmpty { url: String },

    #[error("fetching {url} timed out after {elapsed:?}")]
    Timeout { url: String, elapsed: Duration },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Network { .. } | FetchError::TooLarge { .. } | FetchError::Timeout { .. } => {
                FetchErrorKind::Network
            }
            FetchError::HttpStatus { .. } => FetchErrorKind::HttpStatus,
            FetchError::ExtractionEmpty { .. } => FetchErrorKind::ExtractionEmpty,
        }
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model runtime returned status {status}: {details}")]
    Runtime { status: u16, details: String },

    #[error("invalid runtime response: {0}")]
    InvalidResponse(String),

    #[error("model returned an empty completion")]
    EmptyOutput,
}

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("nothing to summarize: article text is empty")]
    EmptyInput,

    #[error("summary inference failed: {0}")]
    Inference(#[from] InferenceError),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("answer inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("answer generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Request-level failures. Per-source failures never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no sources could be retrieved: {0}")]
    SearchUnavailable(#[source] SearchError),

    #[error("the model failed to produce an answer: {0}")]
    GenerationFailed(#[source] GenerationError),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SearchUnavailable(_) => "search_unavailable",
            PipelineError::GenerationFailed(_) => "generation_failed",
        }
    }
}

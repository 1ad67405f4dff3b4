pub mod aggregator;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod generator;
pub mod model_handle;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod runtime;
pub mod search;
pub mod summarizer;
pub mod text;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use aggregator::SourceAggregator;
pub use error::{
    FetchError, FetchErrorKind, GenerationError, InferenceError, PipelineError, QueryError,
    SearchError, SummarizeError,
};
pub use extractor::ReadableExtractor;
pub use fetcher::{FetcherConfig, HttpDocumentFetcher, DEFAULT_USER_AGENT};
pub use generator::AnswerGenerator;
pub use model_handle::ModelHandle;
pub use models::{
    AnswerResponse, CitedSource, GroundedPrompt, ImagePayload, OmissionReason, OmittedSource,
    PipelineOptions, PromptSource, Query, Sampling, SearchHit, SourceResult, SourceStatus,
};
pub use orchestrator::{PipelineOrchestrator, PipelineStage};
pub use prompt::PromptAssembler;
pub use runtime::{OllamaConfig, OllamaRuntime, DEFAULT_OLLAMA_ENDPOINT};
pub use search::{BraveSearch, BraveSearchConfig, BRAVE_WEB_SEARCH_ENDPOINT};
pub use summarizer::{Summarizer, SummarizerOptions};
pub use text::{normalize_paragraphs, normalize_whitespace, truncate_at_boundary};
pub use traits::{
    ContentExtractor, DocumentFetcher, ExtractedArticle, InferenceBackend, InferenceRequest,
    SearchProvider,
};

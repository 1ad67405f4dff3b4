use crate::error::{FetchErrorKind, QueryError};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decoded image bytes attached to a query for multimodal reasoning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: None,
        }
    }

    /// Accepts plain base64 or a `data:<mime>;base64,<payload>` URL.
    pub fn from_base64(encoded: &str) -> Result<Self, QueryError> {
        let trimmed = encoded.trim();
        let (mime_type, payload) = match trimmed.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    QueryError::InvalidImage("data url has no payload".to_string())
                })?;
                let mime = header
                    .split(';')
                    .next()
                    .map(str::trim)
                    .filter(|mime| !mime.is_empty())
                    .map(str::to_string);
                (mime, payload)
            }
            None => (None, trimmed),
        };

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|error| QueryError::InvalidImage(error.to_string()))?;
        if bytes.is_empty() {
            return Err(QueryError::InvalidImage("image payload is empty".to_string()));
        }

        Ok(Self { bytes, mime_type })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// One inbound question. Immutable once built.
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    top_k: usize,
    image: Option<ImagePayload>,
}

impl Query {
    pub fn new(
        text: impl Into<String>,
        top_k: usize,
        image: Option<ImagePayload>,
    ) -> Result<Self, QueryError> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(QueryError::EmptyText);
        }
        if top_k == 0 {
            return Err(QueryError::ZeroResultCount);
        }

        Ok(Self { text, top_k, image })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    FetchFailed,
    SummarizeFailed,
}

/// Outcome of fetch + summarize for a single search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    /// Zero-based position of the hit in the provider's relevance order.
    pub position: usize,
    pub url: String,
    pub title: String,
    pub snippet: Option<String>,
    /// Model summary when `status` is `Ok`; the snippet when summarisation failed.
    pub summary: Option<String>,
    pub status: SourceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<FetchErrorKind>,
    pub elapsed_ms: u64,
}

impl SourceResult {
    pub fn from_hit(position: usize, hit: SearchHit) -> Self {
        Self {
            position,
            url: hit.url,
            title: hit.title,
            snippet: hit.snippet,
            summary: None,
            status: SourceStatus::FetchFailed,
            fetch_error: None,
            elapsed_ms: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SourceStatus::Ok
    }

    pub fn has_degraded_summary(&self) -> bool {
        self.status == SourceStatus::SummarizeFailed
            && self.summary.as_deref().is_some_and(|text| !text.trim().is_empty())
    }
}

/// A source block placed in the prompt under its citation number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSource {
    pub citation: usize,
    pub position: usize,
    pub title: String,
    pub url: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundedPrompt {
    pub system: String,
    pub user: String,
    pub sources: Vec<PromptSource>,
    /// Positions of usable sources left out because the budget ran out.
    pub excluded_for_budget: Vec<usize>,
}

impl GroundedPrompt {
    pub fn char_len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CitedSource {
    pub citation: usize,
    pub url: String,
    pub title: String,
    pub snippet: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OmissionReason {
    FetchFailed,
    SummarizeFailed,
    ExcludedForBudget,
}

impl OmissionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OmissionReason::FetchFailed => "fetch_failed",
            OmissionReason::SummarizeFailed => "summarize_failed",
            OmissionReason::ExcludedForBudget => "excluded_for_budget",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OmittedSource {
    pub position: usize,
    pub url: String,
    pub title: String,
    pub reason: OmissionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
    /// Sources in citation order: `sources[i].citation == i + 1`.
    pub sources: Vec<CitedSource>,
    pub omitted: Vec<OmittedSource>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_result_count: usize,
    pub search_timeout: Duration,
    /// Deadline for one fetch + summarize unit.
    pub source_timeout: Duration,
    pub generation_timeout: Duration,
    pub prompt_char_budget: usize,
    pub summary_max_tokens: u32,
    pub summary_word_target: usize,
    pub summary_input_max_chars: usize,
    pub summary_sampling: Sampling,
    pub answer_max_tokens: u32,
    pub answer_word_target: usize,
    pub answer_sampling: Sampling,
    /// Cite sources whose summary fell back to the search snippet.
    pub cite_degraded_sources: bool,
}

impl PipelineOptions {
    pub fn effective_top_k(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_result_count.max(1))
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_result_count: 12,
            search_timeout: Duration::from_secs(12),
            source_timeout: Duration::from_secs(90),
            generation_timeout: Duration::from_secs(180),
            prompt_char_budget: 12_000,
            summary_max_tokens: 256,
            summary_word_target: 200,
            summary_input_max_chars: 6_000,
            summary_sampling: Sampling {
                temperature: 0.1,
                top_p: 0.9,
            },
            answer_max_tokens: 768,
            answer_word_target: 250,
            answer_sampling: Sampling {
                temperature: 0.2,
                top_p: 0.95,
            },
            cite_degraded_sources: false,
        }
    }
}

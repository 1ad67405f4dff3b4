use crate::error::SummarizeError;
use crate::model_handle::ModelHandle;
use crate::models::{PipelineOptions, Sampling};
use crate::text::truncate_at_boundary;
use crate::traits::{InferenceBackend, InferenceRequest};

const SUMMARY_SYSTEM_PROMPT: &str = "You are a precise research assistant. Produce concise but \
information-dense summaries highlighting key facts, statistics, quotes, and caveats. Use bullet \
points when appropriate.";

#[derive(Debug, Clone)]
pub struct SummarizerOptions {
    pub max_input_chars: usize,
    pub word_target: usize,
    pub max_tokens: u32,
    pub sampling: Sampling,
}

impl From<&PipelineOptions> for SummarizerOptions {
    fn from(options: &PipelineOptions) -> Self {
        Self {
            max_input_chars: options.summary_input_max_chars,
            word_target: options.summary_word_target,
            max_tokens: options.summary_max_tokens,
            sampling: options.summary_sampling,
        }
    }
}

/// Condenses one article into grounding context for the final prompt.
pub struct Summarizer<B> {
    model: ModelHandle<B>,
    options: SummarizerOptions,
}

impl<B> Summarizer<B>
where
    B: InferenceBackend + Send + Sync,
{
    pub fn new(model: ModelHandle<B>, options: SummarizerOptions) -> Self {
        Self { model, options }
    }

    pub async fn summarize(
        &self,
        query: &str,
        source_label: &str,
        article_text: &str,
    ) -> Result<String, SummarizeError> {
        let request = self.request(query, source_label, article_text)?;
        Ok(self.model.infer(&request).await?)
    }

    fn request(
        &self,
        query: &str,
        source_label: &str,
        article_text: &str,
    ) -> Result<InferenceRequest, SummarizeError> {
        let prepared = truncate_at_boundary(article_text, self.options.max_input_chars);
        if prepared.is_empty() {
            return Err(SummarizeError::EmptyInput);
        }

        let prompt = format!(
            "Summarize the following webpage content so it can be used as grounding context for \
             answering the question: \"{query}\". Focus on what is relevant to that question. \
             Keep it under {words} words and avoid redundancy.\n\n\
             Content from {source_label}:\n\n{prepared}",
            words = self.options.word_target,
        );

        Ok(InferenceRequest {
            system: SUMMARY_SYSTEM_PROMPT.to_string(),
            prompt,
            image: None,
            max_tokens: self.options.max_tokens,
            sampling: self.options.sampling,
        })
    }
}

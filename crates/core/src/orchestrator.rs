use crate::aggregator::SourceAggregator;
use crate::error::PipelineError;
use crate::generator::AnswerGenerator;
use crate::model_handle::ModelHandle;
use crate::models::{
    AnswerResponse, CitedSource, GroundedPrompt, OmissionReason, OmittedSource, PipelineOptions,
    Query, SourceResult, SourceStatus,
};
use crate::prompt::PromptAssembler;
use crate::summarizer::{Summarizer, SummarizerOptions};
use crate::traits::{DocumentFetcher, InferenceBackend, SearchProvider};
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Searching,
    Aggregating,
    Assembling,
    Generating,
    Completed,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::Searching => "searching",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::Assembling => "assembling",
            PipelineStage::Generating => "generating",
            PipelineStage::Completed => "completed",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(stage: &mut PipelineStage, next: PipelineStage) {
    debug!(from = %stage, to = %next, "pipeline stage");
    *stage = next;
}

/// End-to-end `answer` operation: search, fetch and summarize, assemble, generate.
///
/// Summaries and the final answer share one [`ModelHandle`], so at most one
/// inference call is in flight per pipeline. Only a failed search or a failed
/// generation ends a request with an error.
pub struct PipelineOrchestrator<S, F, B> {
    aggregator: SourceAggregator<S, F, B>,
    assembler: PromptAssembler,
    generator: AnswerGenerator<B>,
    options: PipelineOptions,
}

impl<S, F, B> PipelineOrchestrator<S, F, B>
where
    S: SearchProvider + Send + Sync,
    F: DocumentFetcher + Send + Sync,
    B: InferenceBackend + Send + Sync,
{
    pub fn new(search: S, fetcher: F, backend: B, options: PipelineOptions) -> Self {
        let model = ModelHandle::new(backend);
        let summarizer = Summarizer::new(model.clone(), SummarizerOptions::from(&options));
        let aggregator = SourceAggregator::new(
            search,
            fetcher,
            summarizer,
            options.search_timeout,
            options.source_timeout,
        );

        Self {
            aggregator,
            assembler: PromptAssembler::from(&options),
            generator: AnswerGenerator::new(model, &options),
            options,
        }
    }

    pub async fn answer(&self, query: &Query) -> Result<AnswerResponse, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("answer", %request_id);
        self.run(query).instrument(span).await
    }

    async fn run(&self, query: &Query) -> Result<AnswerResponse, PipelineError> {
        let started = Instant::now();
        let mut stage = PipelineStage::Received;
        let top_k = self.options.effective_top_k(query.top_k());
        info!(
            query = query.text(),
            top_k,
            has_image = query.image().is_some(),
            "answering query"
        );

        transition(&mut stage, PipelineStage::Searching);
        let hits = match self.aggregator.search(query.text(), top_k).await {
            Ok(hits) => hits,
            Err(error) => {
                transition(&mut stage, PipelineStage::Failed);
                warn!(%error, "search unavailable");
                return Err(PipelineError::SearchUnavailable(error));
            }
        };

        transition(&mut stage, PipelineStage::Aggregating);
        let results = self.aggregator.collect(query.text(), hits).await;

        transition(&mut stage, PipelineStage::Assembling);
        let prompt = self.assembler.assemble(query.text(), &results, query.image());
        debug!(
            cited = prompt.sources.len(),
            excluded_for_budget = prompt.excluded_for_budget.len(),
            prompt_chars = prompt.char_len(),
            "prompt assembled"
        );

        transition(&mut stage, PipelineStage::Generating);
        let answer = match self.generator.generate(&prompt, query.image()).await {
            Ok(answer) => answer,
            Err(error) => {
                transition(&mut stage, PipelineStage::Failed);
                warn!(%error, "answer generation failed");
                return Err(PipelineError::GenerationFailed(error));
            }
        };

        transition(&mut stage, PipelineStage::Completed);
        let response = respond(answer, &prompt, &results);
        info!(
            sources = response.sources.len(),
            omitted = response.omitted.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answer ready"
        );
        Ok(response)
    }
}

fn respond(answer: String, prompt: &GroundedPrompt, results: &[SourceResult]) -> AnswerResponse {
    let sources = prompt
        .sources
        .iter()
        .map(|source| CitedSource {
            citation: source.citation,
            url: source.url.clone(),
            title: source.title.clone(),
            snippet: results
                .get(source.position)
                .and_then(|result| result.snippet.clone()),
            summary: source.summary.clone(),
        })
        .collect();

    let cited = prompt
        .sources
        .iter()
        .map(|source| source.position)
        .collect::<HashSet<_>>();
    let over_budget = prompt
        .excluded_for_budget
        .iter()
        .copied()
        .collect::<HashSet<_>>();

    let omitted = results
        .iter()
        .filter(|result| !cited.contains(&result.position))
        .filter_map(|result| {
            let reason = if over_budget.contains(&result.position) {
                OmissionReason::ExcludedForBudget
            } else {
                match result.status {
                    SourceStatus::FetchFailed => OmissionReason::FetchFailed,
                    SourceStatus::SummarizeFailed => OmissionReason::SummarizeFailed,
                    SourceStatus::Ok => return None,
                }
            };
            Some(OmittedSource {
                position: result.position,
                url: result.url.clone(),
                title: result.title.clone(),
                reason,
            })
        })
        .collect();

    AnswerResponse {
        answer,
        sources,
        omitted,
    }
}

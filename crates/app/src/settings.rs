use anyhow::Context;
use clap::Args;
use grounded_answer_core::{
    BraveSearch, BraveSearchConfig, FetcherConfig, HttpDocumentFetcher, OllamaConfig,
    OllamaRuntime, PipelineOptions, PipelineOrchestrator, ReadableExtractor, Sampling,
    BRAVE_WEB_SEARCH_ENDPOINT, DEFAULT_OLLAMA_ENDPOINT,
};
use std::time::Duration;

pub type WebPipeline =
    PipelineOrchestrator<BraveSearch, HttpDocumentFetcher<ReadableExtractor>, OllamaRuntime>;

/// Process configuration shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Brave Search subscription token
    #[arg(long, env = "GROUNDED_BRAVE_API_KEY", hide_env_values = true)]
    pub brave_api_key: Option<String>,

    /// Brave web search endpoint
    #[arg(long, env = "GROUNDED_BRAVE_ENDPOINT", default_value = BRAVE_WEB_SEARCH_ENDPOINT)]
    pub brave_endpoint: String,

    /// Brave safesearch level (off, moderate, strict)
    #[arg(long, env = "GROUNDED_SAFE_SEARCH", default_value = "moderate")]
    pub safe_search: String,

    /// Ollama base URL
    #[arg(long, env = "GROUNDED_OLLAMA_URL", default_value = DEFAULT_OLLAMA_ENDPOINT)]
    pub ollama_url: String,

    /// Model used for summaries and answers
    #[arg(long, env = "GROUNDED_MODEL", default_value = "llava:7b")]
    pub model: String,

    /// How long Ollama keeps the model loaded, e.g. "10m"
    #[arg(long, env = "GROUNDED_KEEP_ALIVE")]
    pub keep_alive: Option<String>,

    /// Sources requested when a query does not say
    #[arg(long, env = "GROUNDED_DEFAULT_TOP_K", default_value_t = 6)]
    pub default_top_k: usize,

    /// Hard cap on sources per query
    #[arg(long, env = "GROUNDED_MAX_RESULTS", default_value_t = 12)]
    pub max_results: usize,

    #[arg(long, env = "GROUNDED_SEARCH_TIMEOUT_SECS", default_value_t = 12)]
    pub search_timeout_secs: u64,

    /// Deadline for fetching and summarizing one source
    #[arg(long, env = "GROUNDED_SOURCE_TIMEOUT_SECS", default_value_t = 90)]
    pub source_timeout_secs: u64,

    #[arg(long, env = "GROUNDED_FETCH_TIMEOUT_SECS", default_value_t = 12)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "GROUNDED_GENERATION_TIMEOUT_SECS", default_value_t = 180)]
    pub generation_timeout_secs: u64,

    /// Largest page body accepted, in bytes
    #[arg(long, env = "GROUNDED_MAX_RESPONSE_BYTES", default_value_t = 2 * 1024 * 1024)]
    pub max_response_bytes: usize,

    /// Character budget for the final prompt
    #[arg(long, env = "GROUNDED_PROMPT_CHAR_BUDGET", default_value_t = 12_000)]
    pub prompt_char_budget: usize,

    /// Article characters sent to the summarizer
    #[arg(long, env = "GROUNDED_SUMMARY_INPUT_CHARS", default_value_t = 6_000)]
    pub summary_input_chars: usize,

    #[arg(long, env = "GROUNDED_SUMMARY_WORDS", default_value_t = 200)]
    pub summary_words: usize,

    #[arg(long, env = "GROUNDED_SUMMARY_MAX_TOKENS", default_value_t = 256)]
    pub summary_max_tokens: u32,

    #[arg(long, env = "GROUNDED_ANSWER_WORDS", default_value_t = 250)]
    pub answer_words: usize,

    #[arg(long, env = "GROUNDED_ANSWER_MAX_TOKENS", default_value_t = 768)]
    pub answer_max_tokens: u32,

    #[arg(long, env = "GROUNDED_TEMPERATURE", default_value_t = 0.2)]
    pub temperature: f32,

    #[arg(long, env = "GROUNDED_TOP_P", default_value_t = 0.95)]
    pub top_p: f32,

    /// Cite sources whose summary fell back to the search snippet
    #[arg(long, env = "GROUNDED_CITE_DEGRADED", default_value_t = false)]
    pub cite_degraded_sources: bool,
}

impl Settings {
    pub fn pipeline_options(&self) -> PipelineOptions {
        let defaults = PipelineOptions::default();
        PipelineOptions {
            max_result_count: self.max_results,
            search_timeout: Duration::from_secs(self.search_timeout_secs),
            source_timeout: Duration::from_secs(self.source_timeout_secs),
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            prompt_char_budget: self.prompt_char_budget,
            summary_max_tokens: self.summary_max_tokens,
            summary_word_target: self.summary_words,
            summary_input_max_chars: self.summary_input_chars,
            answer_max_tokens: self.answer_max_tokens,
            answer_word_target: self.answer_words,
            answer_sampling: Sampling {
                temperature: self.temperature,
                top_p: self.top_p,
            },
            cite_degraded_sources: self.cite_degraded_sources,
            ..defaults
        }
    }

    /// Retries share the pipeline's search deadline, so each attempt gets a slice of it.
    fn search_config(&self, api_key: String, options: &PipelineOptions) -> BraveSearchConfig {
        let mut config = BraveSearchConfig::new(api_key);
        config.endpoint = self.brave_endpoint.clone();
        config.safe_search = self.safe_search.clone();
        config.within_budget(options.search_timeout)
    }

    pub fn build_pipeline(&self) -> anyhow::Result<WebPipeline> {
        let options = self.pipeline_options();

        let api_key = self
            .brave_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .context("GROUNDED_BRAVE_API_KEY (or --brave-api-key) must be set")?;
        let search = BraveSearch::new(self.search_config(api_key, &options))
            .context("failed to build search client")?;

        let fetcher = HttpDocumentFetcher::new(
            FetcherConfig {
                timeout: Duration::from_secs(self.fetch_timeout_secs),
                max_response_bytes: self.max_response_bytes,
                ..FetcherConfig::default()
            },
            ReadableExtractor,
        )
        .context("failed to build page fetcher")?;

        let runtime = OllamaRuntime::new(OllamaConfig {
            endpoint: self.ollama_url.clone(),
            model: self.model.clone(),
            timeout: options.generation_timeout.max(options.source_timeout),
            keep_alive: self.keep_alive.clone(),
        })
        .context("failed to build model runtime client")?;

        Ok(PipelineOrchestrator::new(search, fetcher, runtime, options))
    }
}

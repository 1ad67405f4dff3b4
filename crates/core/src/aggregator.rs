use crate::error::{FetchError, SearchError};
use crate::models::{SearchHit, SourceResult, SourceStatus};
use crate::summarizer::Summarizer;
use crate::traits::{DocumentFetcher, ExtractedArticle, InferenceBackend, SearchProvider};
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::{Duration, Instant};
use tokio::time::{timeout, timeout_at};
use tracing::{debug, info, warn};

/// Runs one search, then fetches and summarizes every hit concurrently.
///
/// Fetches overlap freely; summaries queue on the shared model handle. Nothing
/// is spawned, so dropping the returned future cancels every in-flight unit.
pub struct SourceAggregator<S, F, B> {
    search: S,
    fetcher: F,
    summarizer: Summarizer<B>,
    search_timeout: Duration,
    source_timeout: Duration,
}

impl<S, F, B> SourceAggregator<S, F, B>
where
    S: SearchProvider + Send + Sync,
    F: DocumentFetcher + Send + Sync,
    B: InferenceBackend + Send + Sync,
{
    pub fn new(
        search: S,
        fetcher: F,
        summarizer: Summarizer<B>,
        search_timeout: Duration,
        source_timeout: Duration,
    ) -> Self {
        Self {
            search,
            fetcher,
            summarizer,
            search_timeout,
            source_timeout,
        }
    }

    /// One [`SourceResult`] per hit, in the provider's order, whatever order
    /// the units finish in. Only the search call itself can fail.
    pub async fn aggregate(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SourceResult>, SearchError> {
        let hits = self.search(query, top_k).await?;
        Ok(self.collect(query, hits).await)
    }

    /// At most `top_k` hits, bounded by the search deadline.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, SearchError> {
        let hits = match timeout(self.search_timeout, self.search.search(query, top_k)).await {
            Ok(hits) => hits?,
            Err(_) => return Err(SearchError::Timeout(self.search_timeout)),
        };
        let hits = hits.into_iter().take(top_k).collect::<Vec<_>>();
        info!(hits = hits.len(), top_k, "search returned");
        Ok(hits)
    }

    /// Fetches and summarizes `hits` concurrently into a buffer indexed by position.
    pub async fn collect(&self, query: &str, hits: Vec<SearchHit>) -> Vec<SourceResult> {
        let mut slots: Vec<Option<SourceResult>> = vec![None; hits.len()];
        let mut pending = hits
            .into_iter()
            .enumerate()
            .map(|(position, hit)| async move {
                (position, self.process(query, position, hit).await)
            })
            .collect::<FuturesUnordered<_>>();

        while let Some((position, result)) = pending.next().await {
            debug!(
                position,
                status = ?result.status,
                elapsed_ms = result.elapsed_ms,
                "source settled"
            );
            slots[position] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }

    async fn process(&self, query: &str, position: usize, hit: SearchHit) -> SourceResult {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.source_timeout;
        let mut result = SourceResult::from_hit(position, hit);

        let fetched = match timeout_at(deadline, self.fetcher.fetch(&result.url)).await {
            Ok(fetched) => fetched,
            Err(_) => Err(FetchError::Timeout {
                url: result.url.clone(),
                elapsed: started.elapsed(),
            }),
        };

        let ExtractedArticle { title, text } = match fetched {
            Ok(article) => article,
            Err(error) => {
                warn!(position, url = %result.url, %error, "source fetch failed");
                result.status = SourceStatus::FetchFailed;
                result.fetch_error = Some(error.kind());
                result.elapsed_ms = started.elapsed().as_millis() as u64;
                return result;
            }
        };

        // The page's own title wins over the search title.
        if let Some(title) = title.filter(|title| !title.trim().is_empty()) {
            result.title = title;
        }

        let label = if result.title.trim().is_empty() {
            result.url.clone()
        } else {
            result.title.clone()
        };

        match timeout_at(deadline, self.summarizer.summarize(query, &label, &text)).await {
            Ok(Ok(summary)) => {
                result.summary = Some(summary);
                result.status = SourceStatus::Ok;
            }
            Ok(Err(error)) => {
                warn!(position, url = %result.url, %error, "summary failed, keeping snippet");
                degrade(&mut result);
            }
            Err(_) => {
                warn!(position, url = %result.url, "summary timed out, keeping snippet");
                degrade(&mut result);
            }
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result
    }
}

fn degrade(result: &mut SourceResult) {
    result.status = SourceStatus::SummarizeFailed;
    result.summary = result
        .snippet
        .clone()
        .filter(|snippet| !snippet.trim().is_empty());
}

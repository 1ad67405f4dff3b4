//! In-memory collaborators shared by the aggregator and orchestrator tests.

use crate::error::{FetchError, FetchErrorKind, InferenceError, SearchError};
use crate::models::SearchHit;
use crate::traits::{
    DocumentFetcher, ExtractedArticle, InferenceBackend, InferenceRequest, SearchProvider,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Marker that makes [`ScriptedModel`] fail a summary request.
pub const FAIL_SUMMARY: &str = "FAIL_SUMMARY";

/// Marker that makes [`ScriptedModel`] stall a summary for `slow_summary`.
pub const SLOW_SUMMARY: &str = "SLOW_SUMMARY";

pub fn hit(index: usize) -> SearchHit {
    SearchHit {
        url: format!("https://site{index}.example/article"),
        title: format!("Article {index}"),
        snippet: Some(format!("snippet {index}")),
    }
}

#[derive(Default, Clone)]
pub struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

pub struct FakeSearch {
    pub outcome: Result<Vec<SearchHit>, u16>,
    pub delay: Duration,
    pub calls: Arc<Mutex<Vec<(String, usize)>>>,
}

impl FakeSearch {
    pub fn returning(hits: Vec<SearchHit>) -> Self {
        Self {
            outcome: Ok(hits),
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            outcome: Err(status),
            delay: Duration::ZERO,
            calls: Arc::default(),
        }
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((query.to_string(), count));
        }
        tokio::time::sleep(self.delay).await;
        match &self.outcome {
            Ok(hits) => Ok(hits.clone()),
            Err(status) => Err(SearchError::Status { status: *status }),
        }
    }
}

#[derive(Clone)]
pub struct FakePage {
    pub delay: Duration,
    pub outcome: Result<ExtractedArticle, FetchErrorKind>,
}

#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, FakePage>,
    pub gauge: Gauge,
}

impl FakeFetcher {
    pub fn page(self, url: &str, delay: Duration, text: &str) -> Self {
        self.article(url, delay, None, text)
    }

    pub fn titled_page(self, url: &str, title: &str, text: &str) -> Self {
        self.article(url, Duration::ZERO, Some(title), text)
    }

    fn article(mut self, url: &str, delay: Duration, title: Option<&str>, text: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FakePage {
                delay,
                outcome: Ok(ExtractedArticle {
                    title: title.map(str::to_string),
                    text: text.to_string(),
                }),
            },
        );
        self
    }

    pub fn failure(mut self, url: &str, delay: Duration, kind: FetchErrorKind) -> Self {
        self.pages.insert(
            url.to_string(),
            FakePage {
                delay,
                outcome: Err(kind),
            },
        );
        self
    }
}

#[async_trait]
impl DocumentFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<ExtractedArticle, FetchError> {
        let page = self.pages.get(url).cloned().unwrap_or(FakePage {
            delay: Duration::ZERO,
            outcome: Err(FetchErrorKind::Network),
        });

        self.gauge.enter();
        tokio::time::sleep(page.delay).await;
        self.gauge.exit();

        page.outcome.map_err(|kind| match kind {
            FetchErrorKind::Network => FetchError::Network {
                url: url.to_string(),
                details: "connection refused".to_string(),
            },
            FetchErrorKind::HttpStatus => FetchError::HttpStatus {
                url: url.to_string(),
                status: 500,
            },
            FetchErrorKind::ExtractionEmpty => FetchError::ExtractionEmpty {
                url: url.to_string(),
            },
        })
    }
}

/// Summaries echo the last line of the prompt (the article text); the final
/// answer is the configured reply.
pub struct ScriptedModel {
    pub answer: Result<String, u16>,
    pub delay: Duration,
    pub slow_summary: Duration,
    pub gauge: Gauge,
    pub summaries: Arc<AtomicUsize>,
    pub answer_requests: Arc<Mutex<Vec<InferenceRequest>>>,
}

impl ScriptedModel {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            delay: Duration::from_millis(10),
            slow_summary: Duration::ZERO,
            gauge: Gauge::default(),
            summaries: Arc::default(),
            answer_requests: Arc::default(),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            answer: Err(status),
            ..Self::answering("")
        }
    }
}

#[async_trait]
impl InferenceBackend for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.exit();

        if request.prompt.starts_with("Summarize") {
            if request.prompt.contains(SLOW_SUMMARY) {
                tokio::time::sleep(self.slow_summary).await;
            }
            self.summaries.fetch_add(1, Ordering::SeqCst);
            if request.prompt.contains(FAIL_SUMMARY) {
                return Err(InferenceError::Runtime {
                    status: 500,
                    details: "summary failed".to_string(),
                });
            }
            let article = request.prompt.lines().last().unwrap_or_default();
            return Ok(format!("summary of {article}"));
        }

        if let Ok(mut requests) = self.answer_requests.lock() {
            requests.push(request.clone());
        }
        match &self.answer {
            Ok(answer) => Ok(answer.clone()),
            Err(status) => Err(InferenceError::Runtime {
                status: *status,
                details: "model crashed".to_string(),
            }),
        }
    }
}

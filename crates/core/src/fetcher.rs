use crate::error::FetchError;
use crate::traits::{ContentExtractor, DocumentFetcher, ExtractedArticle};
use async_trait::async_trait;
use reqwest::{header, redirect, Client};
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = concat!("grounded-answer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_response_bytes: usize,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(12),
            max_response_bytes: 2 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Downloads a page over HTTP and hands the markup to a [`ContentExtractor`].
pub struct HttpDocumentFetcher<E> {
    client: Client,
    extractor: E,
    max_response_bytes: usize,
}

impl<E> HttpDocumentFetcher<E>
where
    E: ContentExtractor,
{
    pub fn new(config: FetcherConfig, extractor: E) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .redirect(redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            extractor,
            max_response_bytes: config.max_response_bytes,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|error| FetchError::Network {
            url: url.to_string(),
            details: error.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::Network {
                url: url.to_string(),
                details: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let started = Instant::now();
        let mut response = self
            .client
            .get(parsed)
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|error| transport_error(url, error, started))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_response_bytes,
        };

        if response
            .content_length()
            .is_some_and(|length| length > self.max_response_bytes as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|error| transport_error(url, error, started))?
        {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl<E> DocumentFetcher for HttpDocumentFetcher<E>
where
    E: ContentExtractor + Send + Sync,
{
    async fn fetch(&self, url: &str) -> Result<ExtractedArticle, FetchError> {
        let body = self.download(url).await?;
        let html = String::from_utf8_lossy(&body);
        let article = self.extractor.extract(&html);

        if article.text.trim().is_empty() {
            return Err(FetchError::ExtractionEmpty {
                url: url.to_string(),
            });
        }

        debug!(
            url,
            title = article.title.as_deref().unwrap_or_default(),
            bytes = body.len(),
            chars = article.text.len(),
            "extracted article"
        );
        Ok(article)
    }
}

fn transport_error(url: &str, error: reqwest::Error, started: Instant) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            elapsed: started.elapsed(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            details: error.to_string(),
        }
    }
}

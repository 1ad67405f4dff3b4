use crate::error::SearchError;
use crate::models::SearchHit;
use crate::text::normalize_whitespace;
use crate::traits::SearchProvider;
use async_trait::async_trait;
use regex::Regex;
use reqwest::{header, Client};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const BRAVE_WEB_SEARCH_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave caps `count` for web results at 20.
const BRAVE_MAX_COUNT: usize = 20;

#[derive(Debug, Clone)]
pub struct BraveSearchConfig {
    pub api_key: String,
    pub endpoint: String,
    pub safe_search: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl BraveSearchConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: BRAVE_WEB_SEARCH_ENDPOINT.to_string(),
            safe_search: "moderate".to_string(),
            user_agent: crate::fetcher::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(12),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(4),
        }
    }

    /// Shrinks the per-attempt timeout so every attempt plus the backoff
    /// between them fits inside `budget`. When the backoff alone eats the
    /// budget, a single attempt gets all of it.
    pub fn within_budget(mut self, budget: Duration) -> Self {
        let attempts = self.max_attempts.max(1);
        let per_attempt = budget.saturating_sub(self.total_backoff()) / attempts;
        self.timeout = if per_attempt.is_zero() {
            budget
        } else {
            per_attempt
        };
        self
    }

    /// Sum of the sleeps taken between attempts when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        let mut backoff = self.initial_backoff;
        let mut total = Duration::ZERO;
        for _ in 1..self.max_attempts.max(1) {
            total += backoff;
            backoff = (backoff * 2).min(self.max_backoff);
        }
        total
    }
}

pub struct BraveSearch {
    config: BraveSearchConfig,
    endpoint: Url,
    client: Client,
    markup: Regex,
}

impl BraveSearch {
    pub fn new(config: BraveSearchConfig) -> Result<Self, SearchError> {
        let endpoint = Url::parse(&config.endpoint)?;
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        let markup = Regex::new(r"<[^>]*>")
            .map_err(|error| SearchError::Request(format!("invalid snippet filter: {error}")))?;

        Ok(Self {
            config,
            endpoint,
            client,
            markup,
        })
    }

    async fn request_once(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError> {
        let count = count.min(BRAVE_MAX_COUNT).to_string();
        let response = self
            .client
            .get(self.endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .header("X-Subscription-Token", &self.config.api_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("search_lang", "en"),
                ("safesearch", self.config.safe_search.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await?;
        parse_web_results(&payload, &self.markup)
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.request_once(query, count).await {
                Ok(hits) => {
                    debug!(attempt, hits = hits.len(), "brave search succeeded");
                    return Ok(hits);
                }
                Err(error) if error.is_transient() && attempt < self.config.max_attempts => {
                    warn!(attempt, %error, "brave search failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Reads `web.results[]`, dropping entries without a title or an absolute http(s) url.
fn parse_web_results(payload: &Value, markup: &Regex) -> Result<Vec<SearchHit>, SearchError> {
    let Some(results) = payload.pointer("/web/results") else {
        return Ok(Vec::new());
    };
    let results = results.as_array().ok_or_else(|| SearchError::ProviderResponse {
        provider: "brave".to_string(),
        details: "web.results is not an array".to_string(),
    })?;

    let hits = results
        .iter()
        .filter_map(|item| {
            let url = item.get("url").and_then(Value::as_str)?;
            let parsed = Url::parse(url).ok()?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return None;
            }

            let title = item
                .get("title")
                .and_then(Value::as_str)
                .map(|title| strip_markup(markup, title))
                .filter(|title| !title.is_empty())?;
            let snippet = item
                .get("description")
                .and_then(Value::as_str)
                .map(|snippet| strip_markup(markup, snippet))
                .filter(|snippet| !snippet.is_empty());

            Some(SearchHit {
                url: parsed.to_string(),
                title,
                snippet,
            })
        })
        .collect();

    Ok(hits)
}

fn strip_markup(markup: &Regex, text: &str) -> String {
    let stripped = markup.replace_all(text, "");
    normalize_whitespace(
        &stripped
            .replace("&amp;", "&")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buffer = [0u8; 1024];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            match socket.read(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(read) => request.extend_from_slice(&buffer[..read]),
            }
        }
    }

    /// Leaves the first connection unanswered, then serves `body` on the second.
    async fn stall_then_answer(body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let address = listener.local_addr().expect("listener has an address");

        tokio::spawn(async move {
            let mut stalled = Vec::new();
            if let Ok((socket, _)) = listener.accept().await {
                stalled.push(socket);
            }
            if let Ok((mut socket, _)) = listener.accept().await {
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
            drop(stalled);
        });

        format!("http://{address}/res/v1/web/search")
    }

    fn markup() -> Regex {
        Regex::new(r"<[^>]*>").expect("pattern is valid")
    }

    #[test]
    fn web_results_keep_provider_order_and_skip_unusable_entries() {
        let payload = json!({
            "web": {
                "results": [
                    {"url": "https://a.example/post", "title": "First <strong>hit</strong>", "description": "About <strong>Rust</strong> &amp; async"},
                    {"url": "", "title": "No url"},
                    {"url": "https://b.example/", "title": ""},
                    {"url": "mailto:someone@example.com", "title": "Mail"},
                    {"url": "relative/path", "title": "Relative"},
                    {"url": "https://c.example/page", "title": "Third"}
                ]
            }
        });

        let hits = parse_web_results(&payload, &markup()).expect("payload should parse");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://a.example/post");
        assert_eq!(hits[0].title, "First hit");
        assert_eq!(hits[0].snippet.as_deref(), Some("About Rust & async"));
        assert_eq!(hits[1].url, "https://c.example/page");
        assert_eq!(hits[1].snippet, None);
    }

    #[test]
    fn missing_web_section_means_no_hits() {
        let hits = parse_web_results(&json!({"query": {"original": "x"}}), &markup())
            .expect("payload should parse");
        assert!(hits.is_empty());
    }

    #[test]
    fn malformed_results_are_a_provider_error() {
        let result = parse_web_results(&json!({"web": {"results": "nope"}}), &markup());
        assert!(matches!(result, Err(SearchError::ProviderResponse { .. })));
    }

    #[test]
    fn throttling_and_server_errors_are_retried() {
        assert!(SearchError::Status { status: 429 }.is_transient());
        assert!(SearchError::Status { status: 503 }.is_transient());
        assert!(!SearchError::Status { status: 401 }.is_transient());
    }

    #[test]
    fn default_attempts_fit_inside_the_search_budget() {
        let budget = Duration::from_secs(12);
        let config = BraveSearchConfig::new("key").within_budget(budget);

        assert_eq!(config.total_backoff(), Duration::from_secs(3));
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert!(config.timeout * config.max_attempts + config.total_backoff() <= budget);
    }

    #[test]
    fn budget_smaller_than_backoff_goes_to_one_attempt() {
        let config = BraveSearchConfig::new("key").within_budget(Duration::from_secs(2));
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn stalled_attempt_is_retried_within_the_outer_deadline() {
        let body = json!({
            "web": {"results": [{"url": "https://a.example/", "title": "A", "description": "d"}]}
        })
        .to_string();
        let endpoint = stall_then_answer(body).await;

        let budget = Duration::from_secs(2);
        let mut config = BraveSearchConfig::new("key");
        config.endpoint = endpoint;
        config.initial_backoff = Duration::from_millis(10);
        config.max_backoff = Duration::from_millis(20);
        let config = config.within_budget(budget);
        let search = BraveSearch::new(config).expect("client should build");

        let hits = tokio::time::timeout(budget, search.search("rust", 5))
            .await
            .expect("retry should finish inside the budget")
            .expect("second attempt should succeed");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://a.example/");
    }
}

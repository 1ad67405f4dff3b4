use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use grounded_answer_core::{
    AnswerResponse, DocumentFetcher, ImagePayload, InferenceBackend, PipelineError,
    PipelineOrchestrator, Query, QueryError, SearchProvider,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub struct AppState<S, F, B> {
    pub pipeline: Arc<PipelineOrchestrator<S, F, B>>,
    pub default_top_k: usize,
}

impl<S, F, B> Clone for AppState<S, F, B> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            default_top_k: self.default_top_k,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Raw base64 or a `data:<mime>;base64,` URL.
    #[serde(default)]
    pub image_base64: Option<String>,
}

pub fn create_router<S, F, B>(state: AppState<S, F, B>) -> Router
where
    S: SearchProvider + Send + Sync + 'static,
    F: DocumentFetcher + Send + Sync + 'static,
    B: InferenceBackend + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/query", post(answer_query::<S, F, B>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// A client disconnect drops this future, which cancels the pipeline with it.
async fn answer_query<S, F, B>(
    State(state): State<AppState<S, F, B>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<AnswerResponse>, ApiError>
where
    S: SearchProvider + Send + Sync + 'static,
    F: DocumentFetcher + Send + Sync + 'static,
    B: InferenceBackend + Send + Sync + 'static,
{
    let image = request
        .image_base64
        .as_deref()
        .filter(|encoded| !encoded.trim().is_empty())
        .map(ImagePayload::from_base64)
        .transpose()?;
    let top_k = request.top_k.unwrap_or(state.default_top_k);
    let query = Query::new(request.query, top_k, image)?;

    let response = state.pipeline.answer(&query).await?;
    Ok(Json(response))
}

#[derive(Debug)]
pub enum ApiError {
    Query(QueryError),
    Pipeline(PipelineError),
}

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        ApiError::Query(error)
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        ApiError::Pipeline(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::Query(QueryError::InvalidImage(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_image", self.message())
            }
            ApiError::Query(_) => (StatusCode::BAD_REQUEST, "invalid_query", self.message()),
            ApiError::Pipeline(error @ PipelineError::SearchUnavailable(_)) => {
                (StatusCode::BAD_GATEWAY, error.kind(), self.message())
            }
            ApiError::Pipeline(error @ PipelineError::GenerationFailed(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, error.kind(), self.message())
            }
        };

        if status.is_server_error() {
            warn!(%status, kind, error = %message, "query failed");
        }
        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}

impl ApiError {
    fn message(&self) -> String {
        match self {
            ApiError::Query(error) => error.to_string(),
            ApiError::Pipeline(error) => error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use grounded_answer_core::{
        ExtractedArticle, FetchError, InferenceError, InferenceRequest, PipelineOptions,
        SearchError, SearchHit,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    struct StaticSearch {
        hits: Option<Vec<SearchHit>>,
    }

    #[async_trait]
    impl SearchProvider for StaticSearch {
        async fn search(&self, _query: &str, count: usize) -> Result<Vec<SearchHit>, SearchError> {
            match &self.hits {
                Some(hits) => Ok(hits.iter().take(count).cloned().collect()),
                None => Err(SearchError::Status { status: 503 }),
            }
        }
    }

    struct StaticFetcher;

    #[async_trait]
    impl DocumentFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<ExtractedArticle, FetchError> {
            if url.contains("broken") {
                return Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                });
            }
            Ok(ExtractedArticle {
                title: None,
                text: format!("Article text from {url}."),
            })
        }
    }

    struct CannedModel {
        answer_fails: bool,
    }

    #[async_trait]
    impl InferenceBackend for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
            if request.prompt.starts_with("Summarize") {
                return Ok("A short summary.".to_string());
            }
            if self.answer_fails {
                return Err(InferenceError::Runtime {
                    status: 500,
                    details: "out of memory".to_string(),
                });
            }
            Ok("The answer [1].".to_string())
        }
    }

    fn hit(url: &str, title: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: title.to_string(),
            snippet: Some(format!("About {title}")),
        }
    }

    fn app(hits: Option<Vec<SearchHit>>, answer_fails: bool) -> Router {
        let pipeline = PipelineOrchestrator::new(
            StaticSearch { hits },
            StaticFetcher,
            CannedModel { answer_fails },
            PipelineOptions::default(),
        );
        create_router(AppState {
            pipeline: Arc::new(pipeline),
            default_top_k: 6,
        })
    }

    fn default_hits() -> Option<Vec<SearchHit>> {
        Some(vec![
            hit("https://good.example/a", "Good"),
            hit("https://broken.example/b", "Broken"),
        ])
    }

    async fn post_query(app: Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build");
        let response = app.oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let json = serde_json::from_slice(&bytes).expect("body should be json");
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("request should build");

        let response = app(None, false)
            .oneshot(request)
            .await
            .expect("router is infallible");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        let json: Value = serde_json::from_slice(&bytes).expect("body should be json");
        assert_eq!(json, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn query_returns_answer_with_cited_and_omitted_sources() {
        let (status, body) = post_query(
            app(default_hits(), false),
            json!({ "query": "what is good?", "top_k": 2 }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "The answer [1].");
        assert_eq!(body["sources"][0]["citation"], 1);
        assert_eq!(body["sources"][0]["url"], "https://good.example/a");
        assert_eq!(body["sources"][0]["summary"], "A short summary.");
        assert_eq!(body["omitted"][0]["url"], "https://broken.example/b");
        assert_eq!(body["omitted"][0]["reason"], "fetch_failed");
    }

    #[tokio::test]
    async fn blank_query_and_bad_image_are_client_errors() {
        let (status, body) = post_query(app(default_hits(), false), json!({ "query": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_query");

        let (status, body) = post_query(
            app(default_hits(), false),
            json!({ "query": "what is this?", "image_base64": "%%%" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_image");
    }

    #[tokio::test]
    async fn pipeline_failures_map_to_distinct_statuses() {
        let (status, body) = post_query(app(None, false), json!({ "query": "anything" })).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "search_unavailable");

        let (status, body) = post_query(app(default_hits(), true), json!({ "query": "anything" })).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "generation_failed");
        assert!(body["error"]
            .as_str()
            .is_some_and(|message| message.contains("failed to produce an answer")));
    }
}

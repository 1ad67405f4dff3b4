use crate::error::InferenceError;
use crate::traits::{InferenceBackend, InferenceRequest};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

/// Owned handle to the one model instance of the process.
///
/// Summaries and the final answer share the same weights, and a local runtime
/// cannot serve them in parallel, so every call queues on a single async mutex.
/// Clones share the queue. Dropping a waiting or running call releases it.
pub struct ModelHandle<B> {
    backend: Arc<Mutex<B>>,
}

impl<B> Clone for ModelHandle<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B> ModelHandle<B>
where
    B: InferenceBackend + Send + Sync,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    /// Runs one inference with exclusive access to the backend.
    /// A blank completion is reported as [`InferenceError::EmptyOutput`].
    pub async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        let queued_at = Instant::now();
        let backend = self.backend.lock().await;
        let started_at = Instant::now();
        debug!(
            backend = backend.name(),
            queued_ms = started_at.duration_since(queued_at).as_millis() as u64,
            max_tokens = request.max_tokens,
            has_image = request.image.is_some(),
            "model call started"
        );

        let output = backend.infer(request).await?;
        debug!(
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            output_chars = output.len(),
            "model call finished"
        );

        let output = output.trim();
        if output.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        Ok(output.to_string())
    }
}

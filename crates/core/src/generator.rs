use crate::error::GenerationError;
use crate::model_handle::ModelHandle;
use crate::models::{GroundedPrompt, ImagePayload, PipelineOptions, Sampling};
use crate::traits::{InferenceBackend, InferenceRequest};
use std::time::Duration;

/// Single final-answer call. No retries: inference is the slowest step.
pub struct AnswerGenerator<B> {
    model: ModelHandle<B>,
    max_tokens: u32,
    sampling: Sampling,
    timeout: Duration,
}

impl<B> AnswerGenerator<B>
where
    B: InferenceBackend + Send + Sync,
{
    pub fn new(model: ModelHandle<B>, options: &PipelineOptions) -> Self {
        Self {
            model,
            max_tokens: options.answer_max_tokens,
            sampling: options.answer_sampling,
            timeout: options.generation_timeout,
        }
    }

    /// The deadline covers waiting for the model as well as running it.
    pub async fn generate(
        &self,
        prompt: &GroundedPrompt,
        image: Option<&ImagePayload>,
    ) -> Result<String, GenerationError> {
        let request = InferenceRequest {
            system: prompt.system.clone(),
            prompt: prompt.user.clone(),
            image: image.cloned(),
            max_tokens: self.max_tokens,
            sampling: self.sampling,
        };

        match tokio::time::timeout(self.timeout, self.model.infer(&request)).await {
            Ok(answer) => Ok(answer?),
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
        }
    }
}

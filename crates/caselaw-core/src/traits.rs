use async_trait::async_trait;
use thiserror::Error;

use crate::types::WorkerFailure;

/// Failure modes of the external text-generation capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation timed out")]
    Timeout,
    #[error("generation rate limited")]
    RateLimited,
    #[error("generation service error: {0}")]
    ServiceError(String),
}

impl From<GenerationError> for WorkerFailure {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Timeout => WorkerFailure::Timeout,
            GenerationError::RateLimited => WorkerFailure::RateLimited,
            GenerationError::ServiceError(msg) => WorkerFailure::ServiceError(msg),
        }
    }
}

/// Black-box text generation backend (a remote language model).
///
/// Implementations must be cancel-safe: the orchestrator drops the future
/// when a request is cancelled or its timeout elapses.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError>;
}

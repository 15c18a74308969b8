// Model Invocation Boundary
// The engine never talks to a provider itself; callers supply an invoker.
// Failures carry a retryable flag that drives the retry schedule.

use crate::config::models::ModelConfig;
use crate::error::StageError;
use crate::execution::context::CancellationToken;

use async_trait::async_trait;

/// A fully-resolved request for one model call
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Resolved prompt text, templates already substituted
    pub prompt: String,

    /// Resolved system prompt, if the stage declared one
    pub system_prompt: Option<String>,

    /// Model selection and sampling parameters
    pub model: ModelConfig,
}

/// Raw response from a model call
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Raw response text
    pub text: String,

    /// Reported input token count
    pub input_tokens: u64,

    /// Reported output token count
    pub output_tokens: u64,
}

/// Capability supplied by the caller to perform model calls.
///
/// Implementations should surface transient provider failures (rate
/// limits, 5xx) as `StageError::Invocation { retryable: true, .. }` and
/// permanent ones (auth, bad request) as non-retryable. The cancellation
/// token may be observed mid-call where the transport supports aborting.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: &ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, StageError>;
}

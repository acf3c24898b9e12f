//! Upstream AI provider seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Text produced by an upstream model together with its token accounting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl AiResponse {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Failures reported by an [`AiProvider`]
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider error: {0}")]
    Other(String),
}

/// An upstream model that can generate an analysis for a prompt
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider name used in logs and errors
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<AiResponse, ProviderError>;
}

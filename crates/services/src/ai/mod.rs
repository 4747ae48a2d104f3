//! Provider-facing traits and their HTTP implementations.

use async_trait::async_trait;
use interview_core::analysis::AnalysisContext;
use interview_core::model::{AudioRef, PromptVariant};

use crate::error::AiError;

pub mod analysis;
pub mod openai;
pub mod pricing;
pub mod usage;
pub mod workflow;

pub use analysis::{CompletionAnalysis, CompletionSynthesis};
pub use openai::OpenAiClient;
pub use pricing::PriceBook;
pub use usage::{AiUsageHandle, AiUsageService};
pub use workflow::WorkflowClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Text returned by a provider together with what it cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub role: Role,
    pub content: String,
    pub model: String,
    pub max_tokens: u32,
    pub json_mode: bool,
}

/// Single-message chat completion.
#[async_trait]
pub trait CompletionService: Send + Sync {
    fn provider(&self) -> &str;

    /// # Errors
    ///
    /// Returns `AiError` when the request fails or yields no content.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, AiError>;
}

/// Produces the raw follow-up analysis for an answered question.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;

    /// # Errors
    ///
    /// Returns `AiError` when the provider call fails.
    async fn analyse(&self, context: &AnalysisContext) -> Result<Completion, AiError>;
}

/// Produces one wiki draft from a conversation transcript.
#[async_trait]
pub trait SynthesisService: Send + Sync {
    fn provider(&self) -> &str;
    fn model(&self) -> &str;

    /// # Errors
    ///
    /// Returns `AiError` when the provider call fails.
    async fn synthesize(
        &self,
        prompt: &PromptVariant,
        business_segment: &str,
        conversation: &str,
    ) -> Result<Completion, AiError>;
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// # Errors
    ///
    /// Returns `AiError` when the audio cannot be read or transcribed.
    async fn transcribe(&self, audio: &AudioRef) -> Result<String, AiError>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Render `text` and store it at `target`.
    ///
    /// # Errors
    ///
    /// Returns `AiError` when synthesis or writing the artifact fails.
    async fn synthesize_speech(&self, text: &str, target: &AudioRef) -> Result<AudioRef, AiError>;
}

/// Stand-in used when no provider is configured; every call fails as disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAi;

#[async_trait]
impl CompletionService for DisabledAi {
    fn provider(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, AiError> {
        Err(AiError::Disabled)
    }
}

#[async_trait]
impl SpeechToText for DisabledAi {
    async fn transcribe(&self, _audio: &AudioRef) -> Result<String, AiError> {
        Err(AiError::Disabled)
    }
}

#[async_trait]
impl TextToSpeech for DisabledAi {
    async fn synthesize_speech(
        &self,
        _text: &str,
        _target: &AudioRef,
    ) -> Result<AudioRef, AiError> {
        Err(AiError::Disabled)
    }
}

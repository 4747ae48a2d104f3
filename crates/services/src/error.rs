//! Shared error types for the services crate.

use thiserror::Error;

use interview_core::model::{
    InterviewId, QuestionRef, RatingError, TemplateError, TemplateId, WikiId,
};
use interview_core::LifecycleError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by AI provider clients.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AiError {
    #[error("AI provider is not configured")]
    Disabled,
    #[error("AI provider returned an empty response")]
    EmptyResponse,
    #[error("AI provider request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("audio file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors emitted while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid url for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Outcome of a failed background job.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JobError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("external service failed: {0}")]
    ExternalService(#[from] AiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("job queue is closed")]
    Closed,
}

impl JobError {
    /// Whether the queue may run the job again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::ExternalService(_) | JobError::Storage(_))
    }
}

/// Errors emitted by `InterviewService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InterviewError {
    #[error("interview {0} not found")]
    InterviewNotFound(InterviewId),
    #[error("template {0} not found")]
    TemplateNotFound(TemplateId),
    #[error("question {0} is not part of the interview")]
    QuestionNotFound(QuestionRef),
    #[error("question {0} already has an answer")]
    AlreadyAnswered(QuestionRef),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Wiki(#[from] WikiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `WikiService` and wiki synthesis.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WikiError {
    #[error("wiki {0} not found")]
    WikiNotFound(WikiId),
    #[error("interview {0} not found")]
    InterviewNotFound(InterviewId),
    #[error("synthesis returned no content")]
    EmptyArtifact,
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Rating(#[from] RatingError),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `TemplateService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TemplateServiceError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("prompt directory error: {0}")]
    Prompts(#[from] std::io::Error),
}

//! Background jobs: what runs, how it is keyed, and who runs it.

use async_trait::async_trait;
use interview_core::model::{
    AdditionalQuestionId, AudioScope, InterviewId, QuestionId, ResponseId, TemplateId,
};

use crate::error::JobError;

pub mod queue;
pub mod retry;

pub use queue::{FailedJob, TokioJobQueue};
pub use retry::RetryPolicy;

/// Unit of background work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Analyse a submitted answer and adjust the question set.
    Followup {
        interview_id: InterviewId,
        response_id: ResponseId,
    },
    /// Pre-synthesize audio for a template question.
    TemplateAudio {
        template_id: TemplateId,
        question_id: QuestionId,
    },
    /// Pre-synthesize audio for an injected question.
    AdditionalAudio {
        interview_id: InterviewId,
        question_id: AdditionalQuestionId,
    },
}

impl Job {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Followup { .. } => "followup",
            Job::TemplateAudio { .. } | Job::AdditionalAudio { .. } => "audio",
        }
    }

    /// Key identifying the job's subject; a completed key is never run again.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        match self {
            Job::Followup { response_id, .. } => format!("followup:{response_id}"),
            Job::TemplateAudio {
                template_id,
                question_id,
            } => format!(
                "audio:{}:{template_id}:{question_id}",
                AudioScope::Template.as_str()
            ),
            Job::AdditionalAudio {
                interview_id,
                question_id,
            } => format!(
                "audio:{}:{interview_id}:{question_id}",
                AudioScope::Interview.as_str()
            ),
        }
    }
}

/// Accepts jobs for asynchronous, at-least-once execution.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// # Errors
    ///
    /// Returns `JobError::Closed` if the queue no longer accepts work.
    async fn enqueue(&self, job: Job) -> Result<(), JobError>;
}

/// Executes one job run.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// # Errors
    ///
    /// Returns `JobError`; retryable errors are run again by the queue.
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

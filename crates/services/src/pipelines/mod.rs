//! Background pipelines and the handler that routes queued jobs to them.

use async_trait::async_trait;

use crate::error::JobError;
use crate::jobs::{Job, JobHandler};

pub mod audio;
pub mod context;
pub mod followup;
pub mod wiki;

pub use audio::AudioPipeline;
pub use followup::{FollowupOutcome, FollowupPipeline};
pub use wiki::WikiPipeline;

/// Dispatches each job kind to its pipeline.
#[derive(Clone)]
pub struct PipelineRouter {
    followup: FollowupPipeline,
    audio: AudioPipeline,
}

impl PipelineRouter {
    #[must_use]
    pub fn new(followup: FollowupPipeline, audio: AudioPipeline) -> Self {
        Self { followup, audio }
    }
}

#[async_trait]
impl JobHandler for PipelineRouter {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        match *job {
            Job::Followup {
                interview_id,
                response_id,
            } => self.followup.run(interview_id, response_id).await.map(|_| ()),
            Job::TemplateAudio {
                template_id,
                question_id,
            } => self
                .audio
                .run_template(template_id, question_id)
                .await
                .map(|_| ()),
            Job::AdditionalAudio {
                interview_id,
                question_id,
            } => self
                .audio
                .run_additional(interview_id, question_id)
                .await
                .map(|_| ()),
        }
    }
}

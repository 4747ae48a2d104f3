use std::sync::Arc;

use interview_core::Clock;
use interview_core::model::{
    DEFAULT_BUSINESS_SEGMENT, GENERATED_VERSION, InterviewId, NewWiki, PromptVariant, Wiki,
    normalize_artifact,
};
use storage::repository::{Storage, UsagePurpose};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use super::context::conversation_transcript;
use crate::ai::{AiUsageService, SynthesisService};
use crate::error::WikiError;
use crate::prompt_assignment::PromptAssignment;

/// Turns a stopped interview into wiki drafts, one per assigned prompt.
#[derive(Clone)]
pub struct WikiPipeline {
    storage: Storage,
    synthesis: Arc<dyn SynthesisService>,
    usage: AiUsageService,
    prompts: Arc<PromptAssignment>,
    variants: usize,
    clock: Clock,
}

impl WikiPipeline {
    #[must_use]
    pub fn new(
        storage: Storage,
        synthesis: Arc<dyn SynthesisService>,
        usage: AiUsageService,
        prompts: Arc<PromptAssignment>,
        variants: usize,
        clock: Clock,
    ) -> Self {
        Self {
            storage,
            synthesis,
            usage,
            prompts,
            variants,
            clock,
        }
    }

    /// Assigns prompts and synthesizes one wiki per prompt concurrently.
    ///
    /// Variants that fail are logged and left out of the result.
    ///
    /// # Errors
    ///
    /// Returns `WikiError::InterviewNotFound` for an unknown interview and
    /// `WikiError::Storage` if the interview or prompt counters cannot be read.
    #[instrument(skip(self), fields(interview_id = %interview_id))]
    pub async fn run(&self, interview_id: InterviewId) -> Result<Vec<Wiki>, WikiError> {
        let interview = self
            .storage
            .interviews
            .get_interview(interview_id)
            .await?
            .ok_or(WikiError::InterviewNotFound(interview_id))?;
        let segment = self
            .storage
            .templates
            .get_template(interview.template_id)
            .await?
            .map(|t| t.business_segment().to_string())
            .unwrap_or_else(|| DEFAULT_BUSINESS_SEGMENT.to_string());
        let responses = self.storage.responses.list_responses(interview_id).await?;
        let conversation = conversation_transcript(&interview.tracker, &responses);

        let prompts = self.prompts.assign(self.variants).await?;
        if prompts.is_empty() {
            warn!(pool = self.prompts.pool().label(), "no wiki prompts available");
            return Ok(Vec::new());
        }

        let wikis = self
            .fan_out(interview_id, prompts, segment.into(), conversation.into())
            .await;
        info!(count = wikis.len(), "wiki synthesis finished");
        Ok(wikis)
    }

    /// Runs every prompt on its own task and keeps the successful wikis in
    /// prompt order.
    pub async fn fan_out(
        &self,
        interview_id: InterviewId,
        prompts: Vec<PromptVariant>,
        segment: Arc<str>,
        conversation: Arc<str>,
    ) -> Vec<Wiki> {
        let mut tasks = JoinSet::new();
        for (index, prompt) in prompts.into_iter().enumerate() {
            let pipeline = self.clone();
            let segment = Arc::clone(&segment);
            let conversation = Arc::clone(&conversation);
            tasks.spawn(async move {
                let prompt_id = prompt.id.clone();
                let result = pipeline
                    .run_variant(interview_id, &prompt, &segment, &conversation)
                    .await;
                (index, prompt_id, result)
            });
        }

        let mut produced = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(wiki))) => produced.push((index, wiki)),
                Ok((_, prompt_id, Err(err))) => {
                    warn!(prompt = %prompt_id, error = %err, "wiki variant failed");
                }
                Err(err) => warn!(error = %err, "wiki variant task aborted"),
            }
        }

        produced.sort_by_key(|(index, _)| *index);
        produced.into_iter().map(|(_, wiki)| wiki).collect()
    }

    /// Synthesizes and stores one version-1 wiki.
    ///
    /// # Errors
    ///
    /// Returns `WikiError::Ai` when synthesis fails, `WikiError::EmptyArtifact`
    /// when it yields nothing after normalization, and `WikiError::Storage` on
    /// persistence failures.
    pub async fn run_variant(
        &self,
        interview_id: InterviewId,
        prompt: &PromptVariant,
        segment: &str,
        conversation: &str,
    ) -> Result<Wiki, WikiError> {
        let handle = self
            .usage
            .start_request(
                Some(interview_id),
                UsagePurpose::Wiki,
                self.synthesis.provider(),
                self.synthesis.model(),
            )
            .await?;

        let completion = match self
            .synthesis
            .synthesize(prompt, segment, conversation)
            .await
        {
            Ok(completion) => completion,
            Err(err) => {
                if let Err(usage_err) = self
                    .usage
                    .finish_failure(&handle, Some(err.to_string()))
                    .await
                {
                    warn!(error = %usage_err, "failed to close wiki usage row");
                }
                return Err(err.into());
            }
        };
        self.usage
            .finish_success(&handle, completion.usage, Some(completion.content.clone()))
            .await?;

        let content = normalize_artifact(&completion.content);
        if content.is_empty() {
            return Err(WikiError::EmptyArtifact);
        }

        let wiki = self
            .storage
            .wikis
            .insert_wiki(NewWiki {
                interview_id,
                content,
                version: GENERATED_VERSION,
                prompt_id: prompt.id.clone(),
                selected: false,
                created_at: self.clock.now(),
            })
            .await?;
        Ok(wiki)
    }
}

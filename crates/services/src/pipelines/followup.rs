use std::sync::Arc;

use interview_core::analysis::AnalysisResult;
use interview_core::model::{
    AdditionalQuestion, AdditionalQuestionId, InterviewId, NewAdditionalQuestion, NewResponse,
    QuestionRef, Response, ResponseId, RunningInterview, Template,
};
use interview_core::{Clock, PlannedQuestion};
use storage::repository::{Storage, UsagePurpose};
use tracing::{debug, info, instrument, warn};

use super::context::analysis_context;
use crate::ai::{AiUsageService, AnalysisService};
use crate::error::JobError;
use crate::jobs::{Job, JobDispatcher};
use crate::locks::InterviewLocks;

/// What one follow-up run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowupOutcome {
    pub added: Vec<AdditionalQuestionId>,
    pub retired: Vec<AdditionalQuestionId>,
    /// Additions came from an earlier run for the same response.
    pub reused: bool,
}

/// Analyses an answer and adjusts the interview's question set.
#[derive(Clone)]
pub struct FollowupPipeline {
    storage: Storage,
    analysis: Arc<dyn AnalysisService>,
    usage: AiUsageService,
    dispatcher: Arc<dyn JobDispatcher>,
    locks: InterviewLocks,
    clock: Clock,
}

impl FollowupPipeline {
    #[must_use]
    pub fn new(
        storage: Storage,
        analysis: Arc<dyn AnalysisService>,
        usage: AiUsageService,
        dispatcher: Arc<dyn JobDispatcher>,
        locks: InterviewLocks,
        clock: Clock,
    ) -> Self {
        Self {
            storage,
            analysis,
            usage,
            dispatcher,
            locks,
            clock,
        }
    }

    /// Runs the analysis for `response_id` and applies its additions and removals.
    ///
    /// The raw analysis output is stored with the response. A rerun parses the
    /// stored output instead of calling the analysis service again and re-applies
    /// both lists, inserting only additions that are not stored yet.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Validation` when the analysis output does not match the
    /// expected schema, `JobError::NotFound` for unknown subjects, and
    /// `JobError::ExternalService` / `JobError::Storage` for retryable failures.
    #[instrument(skip(self), fields(interview_id = %interview_id, response_id = %response_id))]
    pub async fn run(
        &self,
        interview_id: InterviewId,
        response_id: ResponseId,
    ) -> Result<FollowupOutcome, JobError> {
        let response = self
            .storage
            .responses
            .get_response(response_id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("response {response_id}")))?;
        if response.skipped {
            debug!("skipped answers are not analysed");
            return Ok(FollowupOutcome::default());
        }

        let stored = self.storage.responses.analysis_output(response_id).await?;
        let reused = stored.is_some();
        let raw = match stored {
            Some(raw) => {
                info!("reusing stored analysis");
                raw
            }
            None => self.request_analysis(interview_id, &response).await?,
        };

        let result =
            AnalysisResult::parse(&raw).map_err(|err| JobError::Validation(err.to_string()))?;
        if !reused {
            self.storage
                .responses
                .record_analysis(response_id, &raw)
                .await?;
        }
        debug!(
            concepts = result.concepts.len(),
            additions = result.additional_questions.len(),
            removals = result.removed_optional_questions.len(),
            "analysis parsed"
        );

        let added = self
            .apply_additions(interview_id, response_id, &result.additional_questions)
            .await?;
        self.enqueue_audio(interview_id, &added).await;
        let retired = self
            .apply_removals(interview_id, &result.removed_optional_questions)
            .await?;

        info!(added = added.len(), retired = retired.len(), "follow-up applied");
        Ok(FollowupOutcome {
            added: added.iter().map(|q| q.id).collect(),
            retired,
            reused,
        })
    }

    /// Calls the analysis service and returns its raw output.
    async fn request_analysis(
        &self,
        interview_id: InterviewId,
        response: &Response,
    ) -> Result<String, JobError> {
        let interview = self.load_interview(interview_id).await?;
        let template = self.load_template(&interview).await?;
        let question = interview
            .tracker
            .questions()
            .iter()
            .find(|q| q.question_ref == response.question_ref)
            .map(|q| q.text.clone())
            .ok_or_else(|| JobError::NotFound(format!("question {}", response.question_ref)))?;
        let responses = self.storage.responses.list_responses(interview_id).await?;
        let context = analysis_context(
            template.business_segment(),
            &interview.tracker,
            &responses,
            &question,
            &response.combined_text(),
        );

        let handle = self
            .usage
            .start_request(
                Some(interview_id),
                UsagePurpose::Analysis,
                self.analysis.provider(),
                self.analysis.model(),
            )
            .await?;
        let completion = match self.analysis.analyse(&context).await {
            Ok(completion) => completion,
            Err(err) => {
                if let Err(usage_err) = self
                    .usage
                    .finish_failure(&handle, Some(err.to_string()))
                    .await
                {
                    warn!(error = %usage_err, "failed to close analysis usage row");
                }
                return Err(err.into());
            }
        };
        self.usage
            .finish_success(&handle, completion.usage, Some(completion.content.clone()))
            .await?;
        Ok(completion.content)
    }

    async fn load_interview(&self, id: InterviewId) -> Result<RunningInterview, JobError> {
        self.storage
            .interviews
            .get_interview(id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("interview {id}")))
    }

    async fn load_template(&self, interview: &RunningInterview) -> Result<Template, JobError> {
        self.storage
            .templates
            .get_template(interview.template_id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("template {}", interview.template_id)))
    }

    /// Stores the new questions and splices them in after the cursor.
    ///
    /// Texts already stored for the response are reused, and any stored question
    /// missing from the question set is spliced in again.
    async fn apply_additions(
        &self,
        interview_id: InterviewId,
        response_id: ResponseId,
        texts: &[String],
    ) -> Result<Vec<AdditionalQuestion>, JobError> {
        let texts: Vec<&str> = texts
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.locks.lock(interview_id).await;
        let mut interview = self.load_interview(interview_id).await?;
        let category = interview.tracker.cursor().category.clone();
        let mut stored = self
            .storage
            .additional_questions
            .list_for_response(response_id)
            .await?;

        let mut added = Vec::with_capacity(texts.len());
        for text in texts {
            if let Some(idx) = stored.iter().position(|q| q.text.trim() == text) {
                added.push(stored.swap_remove(idx));
                continue;
            }
            let question = self
                .storage
                .additional_questions
                .insert_additional(NewAdditionalQuestion {
                    interview_id,
                    text: text.to_string(),
                    category: category.clone(),
                    triggering_response_id: response_id,
                })
                .await?;
            added.push(question);
        }

        let missing: Vec<PlannedQuestion> = added
            .iter()
            .filter(|q| !interview.tracker.questions().contains(q.question_ref()))
            .map(|q| PlannedQuestion::new(q.question_ref(), q.text.clone()))
            .collect();
        if !missing.is_empty() {
            self.splice(&mut interview, missing).await?;
        }
        Ok(added)
    }

    /// Injects at the cursor step and stores the tracker. Caller holds the lock.
    async fn splice(
        &self,
        interview: &mut RunningInterview,
        planned: Vec<PlannedQuestion>,
    ) -> Result<(), JobError> {
        let step = interview.tracker.cursor().step;
        if let Err(err) = interview.tracker.inject(planned, step) {
            warn!(
                interview_id = %interview.id,
                error = %err,
                "follow-up questions stored but not scheduled"
            );
            return Ok(());
        }
        self.storage.interviews.save_interview(interview).await?;
        Ok(())
    }

    async fn enqueue_audio(&self, interview_id: InterviewId, questions: &[AdditionalQuestion]) {
        for question in questions {
            let job = Job::AdditionalAudio {
                interview_id,
                question_id: question.id,
            };
            if let Err(err) = self.dispatcher.enqueue(job).await {
                warn!(
                    question_id = %question.id,
                    error = %err,
                    "failed to enqueue audio synthesis"
                );
            }
        }
    }

    /// Retires optional questions by recording system skips.
    ///
    /// Unknown texts and failed lookups are logged and passed over. A question
    /// retired by an earlier run is marked skipped again without a new response.
    async fn apply_removals(
        &self,
        interview_id: InterviewId,
        texts: &[String],
    ) -> Result<Vec<AdditionalQuestionId>, JobError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.locks.lock(interview_id).await;
        let responses = self.storage.responses.list_responses(interview_id).await?;
        let mut retired = Vec::new();
        let mut settled = Vec::new();

        for text in texts {
            let found = match self
                .storage
                .additional_questions
                .find_by_text(interview_id, text.trim())
                .await
            {
                Ok(found) => found,
                Err(err) => {
                    warn!(text = %text, error = %err, "optional question lookup failed");
                    continue;
                }
            };
            let Some(question) = found else {
                warn!(text = %text, "optional question to remove not found");
                continue;
            };

            let question_ref = question.question_ref();
            if retired.contains(&question.id) || settled.contains(&question_ref) {
                continue;
            }
            if let Some(existing) = responses.iter().find(|r| r.question_ref == question_ref) {
                if existing.skipped && !existing.by_user {
                    settled.push(question_ref);
                }
                debug!(question_id = %question.id, "optional question already settled");
                continue;
            }

            let skip = NewResponse::retired(interview_id, question_ref, self.clock.now());
            match self.storage.responses.insert_response(skip).await {
                Ok(_) => retired.push(question.id),
                Err(err) => {
                    warn!(question_id = %question.id, error = %err, "failed to retire optional question");
                }
            }
        }

        settled.extend(retired.iter().map(|id| QuestionRef::Additional(*id)));
        let mut interview = self.load_interview(interview_id).await?;
        let unmarked: Vec<QuestionRef> = settled
            .into_iter()
            .filter(|r| !interview.tracker.skipped().contains(r))
            .collect();
        if !unmarked.is_empty() {
            for question_ref in unmarked {
                interview.tracker.mark_skipped(question_ref);
            }
            self.storage.interviews.save_interview(&interview).await?;
        }
        Ok(retired)
    }
}

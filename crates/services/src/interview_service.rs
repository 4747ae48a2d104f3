use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use interview_core::model::{
    AnswerPayload, AudioRef, InterviewId, NewResponse, QuestionRef, Response, RunningInterview,
    TemplateId, Wiki,
};
use interview_core::progress::Position;
use interview_core::{Clock, InterviewState, PlannedQuestion, ProgressTracker};
use storage::repository::{Storage, StorageError};
use tracing::{debug, info, instrument, warn};

use crate::ai::SpeechToText;
use crate::error::InterviewError;
use crate::jobs::{Job, JobDispatcher};
use crate::locks::InterviewLocks;
use crate::pipelines::WikiPipeline;

//
// ─── VIEWS ─────────────────────────────────────────────────────────────────────
//

/// A question ready to be shown, with its pre-synthesized audio when available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedQuestion {
    pub question_ref: QuestionRef,
    pub text: String,
    pub audio: Option<AudioRef>,
}

/// One answered (or skipped) question of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub question: String,
    pub response: Response,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Drives an interview: answering, moving through questions and the lifecycle.
///
/// Every tracker mutation happens under the interview's lock. Follow-up
/// analysis is queued, wiki synthesis runs when the interview is stopped.
#[derive(Clone)]
pub struct InterviewService {
    storage: Storage,
    transcriber: Arc<dyn SpeechToText>,
    dispatcher: Arc<dyn JobDispatcher>,
    wikis: WikiPipeline,
    locks: InterviewLocks,
    clock: Clock,
}

impl InterviewService {
    #[must_use]
    pub fn new(
        storage: Storage,
        transcriber: Arc<dyn SpeechToText>,
        dispatcher: Arc<dyn JobDispatcher>,
        wikis: WikiPipeline,
        locks: InterviewLocks,
        clock: Clock,
    ) -> Self {
        Self {
            storage,
            transcriber,
            dispatcher,
            wikis,
            locks,
            clock,
        }
    }

    /// Creates an active interview positioned on the template's first question.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::TemplateNotFound` for an unknown template.
    pub async fn start(
        &self,
        template_id: TemplateId,
    ) -> Result<RunningInterview, InterviewError> {
        let template = self
            .storage
            .templates
            .get_template(template_id)
            .await?
            .ok_or(InterviewError::TemplateNotFound(template_id))?;
        let tracker = ProgressTracker::from_template(&template);
        let interview = self
            .storage
            .interviews
            .create_interview(template_id, &tracker, self.clock.now())
            .await?;
        info!(
            interview_id = %interview.id,
            template_id = %template_id,
            questions = tracker.questions().len(),
            "interview started"
        );
        Ok(interview)
    }

    /// Records an answer and queues its follow-up analysis.
    ///
    /// Audio answers are transcribed first; a failed transcription leaves the
    /// transcript empty. Skips are recorded without analysis.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::Lifecycle` unless the interview is active,
    /// `InterviewError::QuestionNotFound` if the question is not part of it and
    /// `InterviewError::AlreadyAnswered` if it already has an answer.
    #[instrument(skip(self, payload), fields(interview_id = %interview_id, question = %question_ref))]
    pub async fn submit_answer(
        &self,
        interview_id: InterviewId,
        question_ref: QuestionRef,
        payload: AnswerPayload,
    ) -> Result<Response, InterviewError> {
        let transcript = match (&payload.audio, payload.skip) {
            (Some(audio), false) => match self.transcriber.transcribe(audio).await {
                Ok(text) => text,
                Err(err) => {
                    warn!(audio = %audio, error = %err, "transcription failed, storing answer without it");
                    String::new()
                }
            },
            _ => String::new(),
        };

        let response = {
            let _guard = self.locks.lock(interview_id).await;
            let mut interview = self.load(interview_id).await?;
            interview.tracker.ensure_active("answer")?;
            if !interview.tracker.questions().contains(question_ref) {
                return Err(InterviewError::QuestionNotFound(question_ref));
            }

            let responses = self.storage.responses.list_responses(interview_id).await?;
            if responses
                .iter()
                .any(|r| r.question_ref == question_ref && !r.skipped)
            {
                return Err(InterviewError::AlreadyAnswered(question_ref));
            }

            let new = NewResponse {
                interview_id,
                question_ref,
                text: payload.text.trim().to_string(),
                audio: payload.audio,
                transcript,
                skipped: payload.skip,
                by_user: true,
                created_at: self.clock.now(),
            };
            let response = match self.storage.responses.insert_response(new).await {
                Ok(response) => response,
                Err(StorageError::Conflict) => {
                    return Err(InterviewError::AlreadyAnswered(question_ref));
                }
                Err(err) => return Err(err.into()),
            };

            if response.skipped {
                interview.tracker.mark_skipped(question_ref);
                self.storage.interviews.save_interview(&interview).await?;
            }
            response
        };

        if response.skipped {
            debug!("question skipped");
        } else {
            let job = Job::Followup {
                interview_id,
                response_id: response.id,
            };
            if let Err(err) = self.dispatcher.enqueue(job).await {
                warn!(response_id = %response.id, error = %err, "failed to enqueue follow-up analysis");
            }
        }
        Ok(response)
    }

    /// The question under the cursor, or `None` once every question was asked.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::Lifecycle` unless the interview is active or paused.
    pub async fn current_question(
        &self,
        interview_id: InterviewId,
    ) -> Result<Option<PresentedQuestion>, InterviewError> {
        let interview = self.load(interview_id).await?;
        interview.tracker.ensure_running("query")?;
        match interview.tracker.current_question() {
            Some(planned) => Ok(Some(self.present(interview.template_id, planned).await?)),
            None => Ok(None),
        }
    }

    /// Moves past the current question, skipping questions that already have
    /// a response.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::Lifecycle` unless the interview is active.
    pub async fn next_question(
        &self,
        interview_id: InterviewId,
    ) -> Result<Option<PresentedQuestion>, InterviewError> {
        let (template_id, next) = {
            let _guard = self.locks.lock(interview_id).await;
            let mut interview = self.load(interview_id).await?;
            interview.tracker.ensure_active("advance")?;

            let settled: HashSet<QuestionRef> = self
                .storage
                .responses
                .list_responses(interview_id)
                .await?
                .iter()
                .map(|r| r.question_ref)
                .collect();

            let next = loop {
                match interview.tracker.advance() {
                    Some(planned) if settled.contains(&planned.question_ref) => {
                        debug!(question = %planned.question_ref, "already answered, passing over");
                    }
                    other => break other,
                }
            };
            self.storage.interviews.save_interview(&interview).await?;
            (interview.template_id, next)
        };

        match next {
            Some(planned) => Ok(Some(self.present(template_id, &planned).await?)),
            None => {
                info!(interview_id = %interview_id, "no questions left");
                Ok(None)
            }
        }
    }

    /// # Errors
    ///
    /// Returns `InterviewError::Lifecycle` unless the interview is active.
    pub async fn pause(&self, interview_id: InterviewId) -> Result<(), InterviewError> {
        self.transition(interview_id, ProgressTracker::pause).await
    }

    /// # Errors
    ///
    /// Returns `InterviewError::Lifecycle` unless the interview is paused.
    pub async fn resume(&self, interview_id: InterviewId) -> Result<(), InterviewError> {
        self.transition(interview_id, ProgressTracker::resume).await
    }

    /// Stops the interview and synthesizes its wikis.
    ///
    /// Returns the wikis that were produced; failing variants are left out.
    /// Stopping an interview that is already stopped but has no wikis runs
    /// the synthesis again.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::Lifecycle` unless the interview is active,
    /// paused, or stopped without wikis, and `InterviewError::Wiki` if prompts
    /// cannot be assigned.
    pub async fn stop(&self, interview_id: InterviewId) -> Result<Vec<Wiki>, InterviewError> {
        {
            let _guard = self.locks.lock(interview_id).await;
            let mut interview = self.load(interview_id).await?;
            if interview.state() == InterviewState::Stopped
                && self.storage.wikis.list_wikis(interview_id).await?.is_empty()
            {
                info!(interview_id = %interview_id, "retrying wiki synthesis");
            } else {
                interview.tracker.stop()?;
                self.storage.interviews.save_interview(&interview).await?;
                info!(interview_id = %interview_id, "interview stopped");
            }
        }
        Ok(self.wikis.run(interview_id).await?)
    }

    /// # Errors
    ///
    /// Returns `InterviewError::InterviewNotFound` for an unknown interview.
    pub async fn position(&self, interview_id: InterviewId) -> Result<Position, InterviewError> {
        Ok(self.load(interview_id).await?.tracker.position())
    }

    /// Questions with their responses, in the order they were answered.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::InterviewNotFound` for an unknown interview.
    pub async fn history(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<HistoryEntry>, InterviewError> {
        let interview = self.load(interview_id).await?;
        let texts: HashMap<QuestionRef, &str> = interview
            .tracker
            .questions()
            .iter()
            .map(|q| (q.question_ref, q.text.as_str()))
            .collect();

        let responses = self.storage.responses.list_responses(interview_id).await?;
        Ok(responses
            .into_iter()
            .filter_map(|response| {
                let question = texts.get(&response.question_ref)?.to_string();
                Some(HistoryEntry { question, response })
            })
            .collect())
    }

    async fn transition<F, E>(
        &self,
        interview_id: InterviewId,
        apply: F,
    ) -> Result<(), InterviewError>
    where
        F: FnOnce(&mut ProgressTracker) -> Result<(), E>,
        InterviewError: From<E>,
    {
        let _guard = self.locks.lock(interview_id).await;
        let mut interview = self.load(interview_id).await?;
        apply(&mut interview.tracker)?;
        self.storage.interviews.save_interview(&interview).await?;
        debug!(interview_id = %interview_id, state = %interview.state(), "interview state changed");
        Ok(())
    }

    async fn load(&self, interview_id: InterviewId) -> Result<RunningInterview, InterviewError> {
        self.storage
            .interviews
            .get_interview(interview_id)
            .await?
            .ok_or(InterviewError::InterviewNotFound(interview_id))
    }

    async fn present(
        &self,
        template_id: TemplateId,
        planned: &PlannedQuestion,
    ) -> Result<PresentedQuestion, InterviewError> {
        let audio = match planned.question_ref {
            QuestionRef::Mandatory(id) => self
                .storage
                .templates
                .get_template(template_id)
                .await?
                .and_then(|t| t.questions().find(|q| q.id == id).and_then(|q| q.audio.clone())),
            QuestionRef::Additional(id) => self
                .storage
                .additional_questions
                .get_additional(id)
                .await?
                .and_then(|q| q.audio),
        };
        Ok(PresentedQuestion {
            question_ref: planned.question_ref,
            text: planned.text.clone(),
            audio,
        })
    }
}

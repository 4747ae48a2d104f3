use std::sync::Arc;

use interview_core::model::{
    AdditionalQuestionId, AudioRef, AudioScope, InterviewId, QuestionId, TemplateId,
};
use storage::repository::Storage;
use tracing::{debug, info, instrument};

use crate::ai::TextToSpeech;
use crate::error::JobError;

/// Renders question texts to audio so they can be played without waiting.
#[derive(Clone)]
pub struct AudioPipeline {
    storage: Storage,
    speech: Arc<dyn TextToSpeech>,
}

impl AudioPipeline {
    #[must_use]
    pub fn new(storage: Storage, speech: Arc<dyn TextToSpeech>) -> Self {
        Self { storage, speech }
    }

    /// # Errors
    ///
    /// Returns `JobError::NotFound` for an unknown template or question and
    /// `JobError::ExternalService` when synthesis fails.
    #[instrument(skip(self), fields(template_id = %template_id, question_id = %question_id))]
    pub async fn run_template(
        &self,
        template_id: TemplateId,
        question_id: QuestionId,
    ) -> Result<AudioRef, JobError> {
        let template = self
            .storage
            .templates
            .get_template(template_id)
            .await?
            .ok_or_else(|| JobError::NotFound(format!("template {template_id}")))?;
        let question = template
            .questions()
            .find(|q| q.id == question_id)
            .ok_or_else(|| JobError::NotFound(format!("question {question_id}")))?;

        if let Some(audio) = &question.audio {
            debug!(audio = %audio, "question audio already present");
            return Ok(audio.clone());
        }

        let target =
            AudioRef::for_question(AudioScope::Template, template_id.value(), question_id.value());
        let audio = self.speech.synthesize_speech(&question.text, &target).await?;
        self.storage
            .templates
            .set_question_audio(question_id, &audio)
            .await?;
        info!(audio = %audio, "question audio stored");
        Ok(audio)
    }

    /// # Errors
    ///
    /// Returns `JobError::NotFound` if the question does not exist in the
    /// interview and `JobError::ExternalService` when synthesis fails.
    #[instrument(skip(self), fields(interview_id = %interview_id, question_id = %question_id))]
    pub async fn run_additional(
        &self,
        interview_id: InterviewId,
        question_id: AdditionalQuestionId,
    ) -> Result<AudioRef, JobError> {
        let question = self
            .storage
            .additional_questions
            .get_additional(question_id)
            .await?
            .filter(|q| q.interview_id == interview_id)
            .ok_or_else(|| JobError::NotFound(format!("additional question {question_id}")))?;

        if let Some(audio) = question.audio {
            debug!(audio = %audio, "question audio already present");
            return Ok(audio);
        }

        let target = AudioRef::for_question(
            AudioScope::Interview,
            interview_id.value(),
            question_id.value(),
        );
        let audio = self.speech.synthesize_speech(&question.text, &target).await?;
        self.storage
            .additional_questions
            .set_additional_audio(question_id, &audio)
            .await?;
        info!(audio = %audio, "question audio stored");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use interview_core::model::{NewAdditionalQuestion, ResponseId, TemplateDraft};
    use interview_core::time::fixed_now;

    use super::*;
    use crate::error::AiError;

    #[derive(Default)]
    struct RecordingSpeech {
        calls: Mutex<Vec<(String, AudioRef)>>,
    }

    #[async_trait]
    impl TextToSpeech for RecordingSpeech {
        async fn synthesize_speech(
            &self,
            text: &str,
            target: &AudioRef,
        ) -> Result<AudioRef, AiError> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), target.clone()));
            Ok(target.clone())
        }
    }

    #[tokio::test]
    async fn template_audio_is_stored_once() {
        let storage = Storage::in_memory();
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = AudioPipeline::new(storage.clone(), speech.clone());
        let draft = TemplateDraft::new([("general".to_string(), vec!["Role?".to_string()])]).unwrap();
        let template = storage
            .templates
            .create_template(&draft, fixed_now())
            .await
            .unwrap();
        let question_id = template.questions().next().unwrap().id;

        let first = pipeline
            .run_template(template.id(), question_id)
            .await
            .unwrap();
        let second = pipeline
            .run_template(template.id(), question_id)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.as_str(),
            format!(
                "global/q_i{}_q{}.mp3",
                template.id().value(),
                question_id.value()
            )
        );
        assert_eq!(speech.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn additional_audio_uses_interview_scope() {
        let storage = Storage::in_memory();
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = AudioPipeline::new(storage.clone(), speech.clone());
        let interview_id = InterviewId::new(7);
        let question = storage
            .additional_questions
            .insert_additional(NewAdditionalQuestion {
                interview_id,
                text: "Why?".into(),
                category: "general".into(),
                triggering_response_id: ResponseId::new(1),
            })
            .await
            .unwrap();

        let audio = pipeline
            .run_additional(interview_id, question.id)
            .await
            .unwrap();

        assert_eq!(
            audio.as_str(),
            format!("global/aq_i7_q{}.mp3", question.id.value())
        );
        let calls = speech.calls.lock().unwrap();
        assert_eq!(calls[0].0, "Why?");
    }

    #[tokio::test]
    async fn additional_audio_of_other_interview_is_not_found() {
        let storage = Storage::in_memory();
        let pipeline = AudioPipeline::new(storage.clone(), Arc::new(RecordingSpeech::default()));
        let question = storage
            .additional_questions
            .insert_additional(NewAdditionalQuestion {
                interview_id: InterviewId::new(1),
                text: "Why?".into(),
                category: "general".into(),
                triggering_response_id: ResponseId::new(1),
            })
            .await
            .unwrap();

        let result = pipeline
            .run_additional(InterviewId::new(2), question.id)
            .await;

        assert!(matches!(result, Err(JobError::NotFound(_))));
    }
}

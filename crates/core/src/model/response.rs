use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{InterviewId, ResponseId};
use crate::model::question::{AudioRef, QuestionRef};

/// What the subject submitted for the current question.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnswerPayload {
    pub text: String,
    pub audio: Option<AudioRef>,
    pub skip: bool,
}

impl AnswerPayload {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            audio: None,
            skip: false,
        }
    }

    #[must_use]
    pub fn skipped() -> Self {
        Self {
            skip: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_audio(mut self, audio: AudioRef) -> Self {
        self.audio = Some(audio);
        self
    }
}

/// Insert shape for a response; the repository assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResponse {
    pub interview_id: InterviewId,
    pub question_ref: QuestionRef,
    pub text: String,
    pub audio: Option<AudioRef>,
    pub transcript: String,
    pub skipped: bool,
    pub by_user: bool,
    pub created_at: DateTime<Utc>,
}

impl NewResponse {
    /// A skipped response recorded by the system to retire an optional question.
    #[must_use]
    pub fn retired(
        interview_id: InterviewId,
        question_ref: QuestionRef,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            interview_id,
            question_ref,
            text: String::new(),
            audio: None,
            transcript: String::new(),
            skipped: true,
            by_user: false,
            created_at,
        }
    }
}

/// Recorded answer to one question.
///
/// At most one non-skipped response exists per question of an interview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: ResponseId,
    pub interview_id: InterviewId,
    pub question_ref: QuestionRef,
    pub text: String,
    pub audio: Option<AudioRef>,
    pub transcript: String,
    pub skipped: bool,
    pub by_user: bool,
    pub created_at: DateTime<Utc>,
}

impl Response {
    #[must_use]
    pub fn from_new(id: ResponseId, new: NewResponse) -> Self {
        Self {
            id,
            interview_id: new.interview_id,
            question_ref: new.question_ref,
            text: new.text,
            audio: new.audio,
            transcript: new.transcript,
            skipped: new.skipped,
            by_user: new.by_user,
            created_at: new.created_at,
        }
    }

    /// Answer text followed by the transcript, as shown in conversation history.
    #[must_use]
    pub fn combined_text(&self) -> String {
        let text = self.text.trim();
        let transcript = self.transcript.trim();
        match (text.is_empty(), transcript.is_empty()) {
            (_, true) => text.to_owned(),
            (true, false) => transcript.to_owned(),
            (false, false) => format!("{text}\n{transcript}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::QuestionId;
    use crate::time::fixed_now;

    fn response(text: &str, transcript: &str) -> Response {
        Response {
            id: ResponseId::new(1),
            interview_id: InterviewId::new(1),
            question_ref: QuestionRef::Mandatory(QuestionId::new(1)),
            text: text.into(),
            audio: None,
            transcript: transcript.into(),
            skipped: false,
            by_user: true,
            created_at: fixed_now(),
        }
    }

    #[test]
    fn combined_text_joins_non_empty_parts() {
        assert_eq!(response("typed", "spoken").combined_text(), "typed\nspoken");
        assert_eq!(response(" typed ", "").combined_text(), "typed");
        assert_eq!(response("", "spoken").combined_text(), "spoken");
    }

    #[test]
    fn retired_response_is_system_skip() {
        let new = NewResponse::retired(
            InterviewId::new(1),
            QuestionRef::Mandatory(QuestionId::new(2)),
            fixed_now(),
        );
        assert!(new.skipped);
        assert!(!new.by_user);
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ids::{AdditionalQuestionId, InterviewId, QuestionId, ResponseId, TemplateId};

/// First sequence number handed out to injected questions of an interview.
pub const ADDITIONAL_ORDER_START: u32 = 1000;

//
// ─── REFERENCES ────────────────────────────────────────────────────────────────
//

/// Points at exactly one question: either a template question or an injected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum QuestionRef {
    Mandatory(QuestionId),
    Additional(AdditionalQuestionId),
}

impl QuestionRef {
    #[must_use]
    pub fn is_additional(&self) -> bool {
        matches!(self, QuestionRef::Additional(_))
    }
}

impl fmt::Display for QuestionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionRef::Mandatory(id) => write!(f, "q:{id}"),
            QuestionRef::Additional(id) => write!(f, "aq:{id}"),
        }
    }
}

/// Owner of a synthesized audio artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioScope {
    /// Template question, keyed by template id.
    Template,
    /// Injected question, keyed by interview id.
    Interview,
}

impl AudioScope {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioScope::Template => "template",
            AudioScope::Interview => "interview",
        }
    }

    fn file_prefix(self) -> &'static str {
        match self {
            AudioScope::Template => "q",
            AudioScope::Interview => "aq",
        }
    }
}

/// Relative location of a stored audio artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(String);

impl AudioRef {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Deterministic path for the spoken version of a question.
    ///
    /// The scope prefix keeps template and injected question ids from colliding
    /// even when their numeric values match.
    #[must_use]
    pub fn for_question(scope: AudioScope, owner_id: u64, question_id: u64) -> Self {
        Self(format!(
            "global/{}_i{owner_id}_q{question_id}.mp3",
            scope.file_prefix()
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// Mandatory question belonging to a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub template_id: TemplateId,
    pub text: String,
    pub category: String,
    pub order: u32,
    pub audio: Option<AudioRef>,
}

impl Question {
    #[must_use]
    pub fn question_ref(&self) -> QuestionRef {
        QuestionRef::Mandatory(self.id)
    }
}

/// Question injected into one running interview by the follow-up analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalQuestion {
    pub id: AdditionalQuestionId,
    pub interview_id: InterviewId,
    pub text: String,
    pub category: String,
    pub order: u32,
    pub triggering_response_id: ResponseId,
    pub audio: Option<AudioRef>,
}

impl AdditionalQuestion {
    #[must_use]
    pub fn question_ref(&self) -> QuestionRef {
        QuestionRef::Additional(self.id)
    }
}

/// Insert shape for an additional question; the repository assigns id and order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdditionalQuestion {
    pub interview_id: InterviewId,
    pub text: String,
    pub category: String,
    pub triggering_response_id: ResponseId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_paths_are_scoped() {
        let template = AudioRef::for_question(AudioScope::Template, 3, 9);
        let interview = AudioRef::for_question(AudioScope::Interview, 3, 9);
        assert_eq!(template.as_str(), "global/q_i3_q9.mp3");
        assert_eq!(interview.as_str(), "global/aq_i3_q9.mp3");
        assert_ne!(template, interview);
    }

    #[test]
    fn question_ref_serializes_with_kind_tag() {
        let json = serde_json::to_string(&QuestionRef::Additional(AdditionalQuestionId::new(5)))
            .unwrap();
        assert_eq!(json, r#"{"kind":"additional","id":5}"#);
    }
}

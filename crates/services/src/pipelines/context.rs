//! Snapshots of an interview handed to analysis and synthesis.

use std::collections::HashMap;

use interview_core::ProgressTracker;
use interview_core::analysis::{AnalysisContext, ContextEntry, EntryStatus};
use interview_core::model::{QuestionRef, Response};

/// The response that settles each question: a non-skipped one wins over skips.
#[must_use]
pub fn settled_responses(responses: &[Response]) -> HashMap<QuestionRef, &Response> {
    let mut settled: HashMap<QuestionRef, &Response> = HashMap::new();
    for response in responses {
        match settled.get(&response.question_ref) {
            Some(existing) if !existing.skipped => {}
            _ => {
                settled.insert(response.question_ref, response);
            }
        }
    }
    settled
}

/// Builds the analysis snapshot for the answer just given to `current_question`.
#[must_use]
pub fn analysis_context(
    business_segment: &str,
    tracker: &ProgressTracker,
    responses: &[Response],
    current_question: &str,
    answer: &str,
) -> AnalysisContext {
    let settled = settled_responses(responses);
    let entries = tracker.questions().iter().map(|planned| {
        let status = match settled.get(&planned.question_ref) {
            Some(response) if response.skipped => EntryStatus::Skipped,
            Some(response) => EntryStatus::Answered(response.combined_text()),
            None if tracker.skipped().contains(&planned.question_ref) => EntryStatus::Skipped,
            None => EntryStatus::Open,
        };
        ContextEntry {
            text: planned.text.clone(),
            optional: planned.question_ref.is_additional(),
            status,
        }
    });

    AnalysisContext::assemble(business_segment, current_question, answer, entries)
}

/// Transcript of answered questions in response order, as fed to synthesis.
#[must_use]
pub fn conversation_transcript(tracker: &ProgressTracker, responses: &[Response]) -> String {
    let texts: HashMap<QuestionRef, &str> = tracker
        .questions()
        .iter()
        .map(|q| (q.question_ref, q.text.as_str()))
        .collect();

    responses
        .iter()
        .filter(|r| !r.skipped)
        .filter_map(|r| {
            let question = texts.get(&r.question_ref)?;
            Some(format!("system: {question}\nuser: {}", r.combined_text()))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use interview_core::PlannedQuestion;
    use interview_core::model::{
        AdditionalQuestionId, Category, InterviewId, NewResponse, Question, QuestionId,
        ResponseId, Template, TemplateId,
    };
    use interview_core::time::fixed_now;

    use super::*;

    fn tracker() -> ProgressTracker {
        let questions = ["Role?", "Team?", "Tools?"]
            .iter()
            .zip(1_u32..)
            .map(|(text, n)| Question {
                id: QuestionId::new(u64::from(n)),
                template_id: TemplateId::new(1),
                text: (*text).to_string(),
                category: "general".into(),
                order: n,
                audio: None,
            })
            .collect();
        let template = Template::from_persisted(
            TemplateId::new(1),
            None,
            None,
            vec![Category {
                name: "general".into(),
                position: 0,
                questions,
            }],
            fixed_now(),
        );
        ProgressTracker::from_template(&template)
    }

    fn response(id: u64, question_ref: QuestionRef, text: &str, skipped: bool) -> Response {
        Response::from_new(
            ResponseId::new(id),
            NewResponse {
                interview_id: InterviewId::new(1),
                question_ref,
                text: text.into(),
                audio: None,
                transcript: String::new(),
                skipped,
                by_user: true,
                created_at: fixed_now(),
            },
        )
    }

    #[test]
    fn answer_wins_over_earlier_skip() {
        let q = QuestionRef::Mandatory(QuestionId::new(1));
        let responses = vec![response(1, q, "", true), response(2, q, "Dev", false)];
        assert_eq!(settled_responses(&responses)[&q].id, ResponseId::new(2));
    }

    #[test]
    fn context_marks_injected_questions_optional() {
        let mut tracker = tracker();
        let extra = QuestionRef::Additional(AdditionalQuestionId::new(10));
        tracker
            .inject(vec![PlannedQuestion::new(extra, "Why?")], 0)
            .unwrap();
        let responses = vec![
            response(1, QuestionRef::Mandatory(QuestionId::new(1)), "Dev", false),
            response(2, QuestionRef::Mandatory(QuestionId::new(3)), "", true),
        ];

        let context = analysis_context("general", &tracker, &responses, "Role?", "Dev");

        assert!(context.history.is_empty());
        assert_eq!(context.unanswered_optional, vec!["Why?"]);
        assert_eq!(context.unanswered_mandatory, vec!["Team?"]);
        assert_eq!(context.skipped, vec!["Tools?"]);
    }

    #[test]
    fn transcript_lists_answers_in_response_order() {
        let tracker = tracker();
        let responses = vec![
            response(1, QuestionRef::Mandatory(QuestionId::new(2)), "5", false),
            response(2, QuestionRef::Mandatory(QuestionId::new(1)), "Dev", false),
            response(3, QuestionRef::Mandatory(QuestionId::new(3)), "", true),
        ];

        assert_eq!(
            conversation_transcript(&tracker, &responses),
            "system: Team?\nuser: 5\nsystem: Role?\nuser: Dev"
        );
    }
}

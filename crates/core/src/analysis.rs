//! Follow-up analysis contract: the context sent out and the result trusted back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnalysisError {
    #[error("no JSON object found in analysis output")]
    NoJsonObject,

    #[error("analysis output does not match the expected schema: {0}")]
    Schema(String),
}

//
// ─── CONTEXT ───────────────────────────────────────────────────────────────────
//

/// Where a question stands when the snapshot is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Open,
    Answered(String),
    Skipped,
}

/// One question of the interview as seen by the snapshot builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub text: String,
    pub optional: bool,
    pub status: EntryStatus,
}

/// Snapshot of an interview handed to the analysis service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AnalysisContext {
    pub business_segment: String,
    pub current_question: String,
    pub answer: String,
    pub history: Vec<String>,
    pub unanswered_mandatory: Vec<String>,
    pub unanswered_optional: Vec<String>,
    pub skipped: Vec<String>,
}

impl AnalysisContext {
    /// Sorts entries into history, open and skipped lists.
    ///
    /// Entries whose text equals `current_question` (trimmed, case-insensitive)
    /// are left out of history and of the unanswered lists. Questions that share
    /// that text are left out together.
    #[must_use]
    pub fn assemble(
        business_segment: impl Into<String>,
        current_question: impl Into<String>,
        answer: impl Into<String>,
        entries: impl IntoIterator<Item = ContextEntry>,
    ) -> Self {
        let current_question = current_question.into();
        let current_key = text_key(&current_question);
        let mut context = Self {
            business_segment: business_segment.into(),
            answer: answer.into(),
            ..Self::default()
        };

        for entry in entries {
            let is_current = text_key(&entry.text) == current_key;
            match entry.status {
                EntryStatus::Skipped => context.skipped.push(entry.text),
                _ if is_current => {}
                EntryStatus::Answered(answer) => context
                    .history
                    .push(format!("System: {}\nUser: {answer}", entry.text)),
                EntryStatus::Open if entry.optional => context.unanswered_optional.push(entry.text),
                EntryStatus::Open => context.unanswered_mandatory.push(entry.text),
            }
        }

        context.current_question = current_question;
        context
    }

    #[must_use]
    pub fn history_text(&self) -> String {
        self.history.join("\n\n")
    }
}

fn text_key(text: &str) -> String {
    text.trim().to_lowercase()
}

//
// ─── RESULT ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Notes {
    Text(String),
    Lines(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAnalysis {
    concepts: Vec<String>,
    additional_questions: Vec<String>,
    removed_optional_questions: Vec<String>,
    notes: Notes,
}

/// Validated analysis output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AnalysisResult {
    pub concepts: Vec<String>,
    pub additional_questions: Vec<String>,
    pub removed_optional_questions: Vec<String>,
    pub notes: String,
}

impl AnalysisResult {
    /// Extracts and validates the four-key analysis object from raw model output.
    ///
    /// Strings are trimmed, blank entries dropped and repeated additions collapsed.
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::NoJsonObject` if no JSON object can be located and
    /// `AnalysisError::Schema` if the object has missing, extra or mistyped keys.
    pub fn parse(raw: &str) -> Result<Self, AnalysisError> {
        let object = extract_json_object(raw).ok_or(AnalysisError::NoJsonObject)?;
        let parsed: RawAnalysis =
            serde_json::from_str(object).map_err(|e| AnalysisError::Schema(e.to_string()))?;

        let notes = match parsed.notes {
            Notes::Text(text) => text.trim().to_owned(),
            Notes::Lines(lines) => clean(lines).join("\n"),
        };

        let mut additional_questions: Vec<String> = Vec::new();
        for question in clean(parsed.additional_questions) {
            if !additional_questions.contains(&question) {
                additional_questions.push(question);
            }
        }

        Ok(Self {
            concepts: clean(parsed.concepts),
            additional_questions,
            removed_optional_questions: clean(parsed.removed_optional_questions),
            notes,
        })
    }
}

fn clean(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Locates a JSON object inside model output.
///
/// Tries the whole trimmed text, then a fenced code block, then the span from
/// the first `{` to the last `}`. Returns the first candidate that parses as a
/// JSON object.
#[must_use]
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let candidates = [Some(raw.trim()), fenced_block(raw), brace_span(raw)];
    candidates
        .into_iter()
        .flatten()
        .find(|candidate| is_json_object(candidate))
}

fn fenced_block(raw: &str) -> Option<&str> {
    let start = raw.find("```")?;
    let after = &raw[start + 3..];
    let after = after
        .strip_prefix("json")
        .or_else(|| after.strip_prefix("JSON"))
        .unwrap_or(after);
    let end = after.find("```")?;
    Some(after[..end].trim())
}

fn brace_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

fn is_json_object(candidate: &str) -> bool {
    candidate.starts_with('{')
        && matches!(
            serde_json::from_str::<serde_json::Value>(candidate),
            Ok(serde_json::Value::Object(_))
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"concepts":["onboarding"],"additional_questions":["Q1a"],"removed_optional_questions":[],"notes":"ok"}"#;

    #[test]
    fn extracts_object_surrounded_by_prose() {
        let raw = "Here is the result: {\"a\":1} thanks";
        assert_eq!(extract_json_object(raw), Some("{\"a\":1}"));
    }

    #[test]
    fn extracts_fenced_object() {
        let raw = format!("Sure!\n```json\n{VALID}\n```\nanything else?");
        assert_eq!(extract_json_object(&raw), Some(VALID));
    }

    #[test]
    fn no_object_yields_none() {
        assert_eq!(extract_json_object("no braces here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
        assert_eq!(extract_json_object("[1, 2]"), None);
    }

    #[test]
    fn parses_valid_payload() {
        let result = AnalysisResult::parse(VALID).unwrap();
        assert_eq!(result.additional_questions, vec!["Q1a"]);
        assert_eq!(result.notes, "ok");
    }

    #[test]
    fn trims_and_deduplicates_questions() {
        let raw = r#"{"concepts":[" a ",""],"additional_questions":["  Why? ","Why?",""],"removed_optional_questions":[" old "],"notes":["x"," y "]}"#;
        let result = AnalysisResult::parse(raw).unwrap();
        assert_eq!(result.concepts, vec!["a"]);
        assert_eq!(result.additional_questions, vec!["Why?"]);
        assert_eq!(result.removed_optional_questions, vec!["old"]);
        assert_eq!(result.notes, "x\ny");
    }

    #[test]
    fn missing_key_is_schema_error() {
        let raw = r#"{"concepts":[],"additional_questions":[],"notes":""}"#;
        assert!(matches!(
            AnalysisResult::parse(raw),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[test]
    fn unknown_key_is_schema_error() {
        let raw = r#"{"concepts":[],"additional_questions":[],"removed_optional_questions":[],"notes":"","extra":1}"#;
        assert!(matches!(
            AnalysisResult::parse(raw),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[test]
    fn prose_only_is_missing_object() {
        assert_eq!(
            AnalysisResult::parse("I could not analyse this."),
            Err(AnalysisError::NoJsonObject)
        );
    }

    fn entry(text: &str, optional: bool, status: EntryStatus) -> ContextEntry {
        ContextEntry {
            text: text.into(),
            optional,
            status,
        }
    }

    #[test]
    fn assemble_excludes_current_question_by_text() {
        let context = AnalysisContext::assemble(
            "general",
            "What is your role?",
            "Developer",
            vec![
                entry("what is your role? ", false, EntryStatus::Answered("Developer".into())),
                entry("Team size?", false, EntryStatus::Answered("5".into())),
                entry("What is your role?", false, EntryStatus::Open),
                entry("Tools?", false, EntryStatus::Open),
                entry("Hobbies?", true, EntryStatus::Open),
                entry("Pets?", true, EntryStatus::Skipped),
            ],
        );

        assert_eq!(context.history, vec!["System: Team size?\nUser: 5"]);
        assert_eq!(context.unanswered_mandatory, vec!["Tools?"]);
        assert_eq!(context.unanswered_optional, vec!["Hobbies?"]);
        assert_eq!(context.skipped, vec!["Pets?"]);
        assert_eq!(context.current_question, "What is your role?");
    }
}

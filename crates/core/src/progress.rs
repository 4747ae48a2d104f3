//! Cursor and effective question sequence of a running interview.
//!
//! The tracker is a plain value: callers load it, mutate it and store it back
//! while holding the per-interview lock.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{QuestionRef, Template};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrackerError {
    #[error("interview has no active category")]
    NoActiveCategory,

    #[error("step {step} is outside the active category ({len} questions)")]
    StepOutOfRange { step: usize, len: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LifecycleError {
    #[error("cannot {action} an interview that is {from}")]
    InvalidTransition {
        from: InterviewState,
        action: &'static str,
    },
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a running interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewState {
    Active,
    Paused,
    Stopped,
    Completed,
}

impl InterviewState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewState::Active => "active",
            InterviewState::Paused => "paused",
            InterviewState::Stopped => "stopped",
            InterviewState::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(InterviewState::Active),
            "paused" => Some(InterviewState::Paused),
            "stopped" => Some(InterviewState::Stopped),
            "completed" => Some(InterviewState::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for InterviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── QUESTION SET ──────────────────────────────────────────────────────────────
//

/// One entry of the effective question sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedQuestion {
    pub question_ref: QuestionRef,
    pub text: String,
}

impl PlannedQuestion {
    #[must_use]
    pub fn new(question_ref: QuestionRef, text: impl Into<String>) -> Self {
        Self {
            question_ref,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CategorySlot {
    name: String,
    items: Vec<PlannedQuestion>,
}

/// Template questions plus injected ones, grouped by category in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionSet {
    categories: Vec<CategorySlot>,
}

impl QuestionSet {
    #[must_use]
    pub fn from_template(template: &Template) -> Self {
        let categories = template
            .categories()
            .iter()
            .map(|category| CategorySlot {
                name: category.name.clone(),
                items: category
                    .questions
                    .iter()
                    .map(|q| PlannedQuestion::new(q.question_ref(), q.text.clone()))
                    .collect(),
            })
            .collect();
        Self { categories }
    }

    /// Every planned question in presentation order.
    pub fn iter(&self) -> impl Iterator<Item = &PlannedQuestion> {
        self.categories.iter().flat_map(|c| c.items.iter())
    }

    /// Questions of one category in presentation order.
    #[must_use]
    pub fn category(&self, name: &str) -> Option<&[PlannedQuestion]> {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.items.as_slice())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, question_ref: QuestionRef) -> bool {
        self.iter().any(|q| q.question_ref == question_ref)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.name == name)
    }
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// Position inside the question set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub category: String,
    pub step: usize,
}

/// Progress snapshot reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    /// 1-based number of the current question; equals `total` once exhausted.
    pub step: usize,
    pub total: usize,
    pub state: InterviewState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressTracker {
    cursor: Cursor,
    state: InterviewState,
    exhausted: bool,
    questions: QuestionSet,
    skipped: Vec<QuestionRef>,
}

impl ProgressTracker {
    /// Active tracker positioned on the first question of the first non-empty category.
    #[must_use]
    pub fn from_template(template: &Template) -> Self {
        let questions = QuestionSet::from_template(template);
        let first = questions
            .categories
            .iter()
            .find(|c| !c.items.is_empty())
            .or_else(|| questions.categories.first())
            .map(|c| c.name.clone())
            .unwrap_or_default();
        let exhausted = questions.is_empty();

        Self {
            cursor: Cursor {
                category: first,
                step: 0,
            },
            state: InterviewState::Active,
            exhausted,
            questions,
            skipped: Vec::new(),
        }
    }

    #[must_use]
    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    #[must_use]
    pub fn state(&self) -> InterviewState {
        self.state
    }

    #[must_use]
    pub fn questions(&self) -> &QuestionSet {
        &self.questions
    }

    #[must_use]
    pub fn skipped(&self) -> &[QuestionRef] {
        &self.skipped
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// The question under the cursor, or `None` once exhausted.
    #[must_use]
    pub fn current_question(&self) -> Option<&PlannedQuestion> {
        if self.exhausted {
            return None;
        }
        let idx = self.questions.index_of(&self.cursor.category)?;
        self.questions.categories[idx].items.get(self.cursor.step)
    }

    /// Moves to the next question.
    ///
    /// Continues within the active category, then with the first non-empty
    /// later category. Returns `None` and stays exhausted when nothing is left.
    pub fn advance(&mut self) -> Option<PlannedQuestion> {
        if self.exhausted {
            return None;
        }
        let Some(idx) = self.questions.index_of(&self.cursor.category) else {
            self.exhausted = true;
            return None;
        };

        let active = &self.questions.categories[idx];
        if self.cursor.step + 1 < active.items.len() {
            self.cursor.step += 1;
            return active.items.get(self.cursor.step).cloned();
        }

        let next = self.questions.categories[idx + 1..]
            .iter()
            .find(|c| !c.items.is_empty());
        match next {
            Some(slot) => {
                self.cursor = Cursor {
                    category: slot.name.clone(),
                    step: 0,
                };
                slot.items.first().cloned()
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }

    /// Splices `list` into the active category right after `at_step`.
    ///
    /// The cursor keeps pointing at the same question: it moves forward by
    /// `list.len()` only when it sits after `at_step`. From the question at
    /// `at_step` the next [`advance`](Self::advance) yields `list[0]`. An
    /// exhausted tracker whose last question is `at_step` is reopened so the
    /// injected questions are still asked.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError` if there is no active category or `at_step` is
    /// outside it.
    pub fn inject(
        &mut self,
        list: Vec<PlannedQuestion>,
        at_step: usize,
    ) -> Result<(), TrackerError> {
        let idx = self
            .questions
            .index_of(&self.cursor.category)
            .ok_or(TrackerError::NoActiveCategory)?;
        let slot = &mut self.questions.categories[idx];
        if at_step >= slot.items.len() {
            return Err(TrackerError::StepOutOfRange {
                step: at_step,
                len: slot.items.len(),
            });
        }
        if list.is_empty() {
            return Ok(());
        }

        let added = list.len();
        let tail = slot.items.split_off(at_step + 1);
        slot.items.extend(list);
        slot.items.extend(tail);

        if self.cursor.step > at_step {
            self.cursor.step += added;
        } else if self.exhausted {
            self.exhausted = false;
        }
        Ok(())
    }

    /// Records a skipped question without moving the cursor.
    pub fn mark_skipped(&mut self, question_ref: QuestionRef) {
        if !self.skipped.contains(&question_ref) {
            self.skipped.push(question_ref);
        }
    }

    #[must_use]
    pub fn position(&self) -> Position {
        let total = self.questions.len();
        let step = if self.exhausted {
            total
        } else {
            let before: usize = self
                .questions
                .categories
                .iter()
                .take_while(|c| c.name != self.cursor.category)
                .map(|c| c.items.len())
                .sum();
            before + self.cursor.step + 1
        };
        Position {
            step,
            total,
            state: self.state,
        }
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `LifecycleError` unless the interview is active.
    pub fn ensure_active(&self, action: &'static str) -> Result<(), LifecycleError> {
        self.require(&[InterviewState::Active], action)
    }

    /// # Errors
    ///
    /// Returns `LifecycleError` unless the interview is active or paused.
    pub fn ensure_running(&self, action: &'static str) -> Result<(), LifecycleError> {
        self.require(&[InterviewState::Active, InterviewState::Paused], action)
    }

    /// # Errors
    ///
    /// Returns `LifecycleError` unless the interview is active.
    pub fn pause(&mut self) -> Result<(), LifecycleError> {
        self.transition(&[InterviewState::Active], InterviewState::Paused, "pause")
    }

    /// # Errors
    ///
    /// Returns `LifecycleError` unless the interview is paused.
    pub fn resume(&mut self) -> Result<(), LifecycleError> {
        self.transition(&[InterviewState::Paused], InterviewState::Active, "continue")
    }

    /// # Errors
    ///
    /// Returns `LifecycleError` unless the interview is active or paused.
    pub fn stop(&mut self) -> Result<(), LifecycleError> {
        self.transition(
            &[InterviewState::Active, InterviewState::Paused],
            InterviewState::Stopped,
            "stop",
        )
    }

    /// # Errors
    ///
    /// Returns `LifecycleError` unless the interview is stopped or already completed.
    pub fn complete(&mut self) -> Result<(), LifecycleError> {
        self.transition(
            &[InterviewState::Stopped, InterviewState::Completed],
            InterviewState::Completed,
            "complete",
        )
    }

    fn require(
        &self,
        allowed: &[InterviewState],
        action: &'static str,
    ) -> Result<(), LifecycleError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    fn transition(
        &mut self,
        allowed: &[InterviewState],
        to: InterviewState,
        action: &'static str,
    ) -> Result<(), LifecycleError> {
        self.require(allowed, action)?;
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdditionalQuestionId, Category, Question, QuestionId, TemplateId};
    use crate::time::fixed_now;

    fn template(categories: &[(&str, &[&str])]) -> Template {
        let mut next_id = 0_u64;
        let categories = categories
            .iter()
            .enumerate()
            .map(|(position, (name, texts))| Category {
                name: (*name).to_string(),
                position: u32::try_from(position).unwrap(),
                questions: texts
                    .iter()
                    .map(|text| {
                        next_id += 1;
                        Question {
                            id: QuestionId::new(next_id),
                            template_id: TemplateId::new(1),
                            text: (*text).to_string(),
                            category: (*name).to_string(),
                            order: u32::try_from(next_id).unwrap(),
                            audio: None,
                        }
                    })
                    .collect(),
            })
            .collect();
        Template::from_persisted(TemplateId::new(1), None, None, categories, fixed_now())
    }

    fn extra(id: u64, text: &str) -> PlannedQuestion {
        PlannedQuestion::new(QuestionRef::Additional(AdditionalQuestionId::new(id)), text)
    }

    fn texts(tracker: &ProgressTracker) -> Vec<String> {
        tracker.questions().iter().map(|q| q.text.clone()).collect()
    }

    #[test]
    fn advance_visits_every_question_once_in_order() {
        let template = template(&[
            ("intro", &["A1", "A2"]),
            ("empty", &[]),
            ("work", &["B1"]),
            ("wrap", &["C1", "C2"]),
        ]);
        let mut tracker = ProgressTracker::from_template(&template);

        let mut visited = vec![tracker.current_question().unwrap().text.clone()];
        while let Some(q) = tracker.advance() {
            visited.push(q.text);
        }

        assert_eq!(visited, vec!["A1", "A2", "B1", "C1", "C2"]);
        assert!(tracker.is_exhausted());
        assert_eq!(tracker.current_question(), None);
        assert_eq!(tracker.advance(), None);
    }

    #[test]
    fn starts_on_first_non_empty_category() {
        let template = template(&[("empty", &[]), ("work", &["B1"])]);
        let tracker = ProgressTracker::from_template(&template);
        assert_eq!(tracker.cursor().category, "work");
        assert_eq!(tracker.current_question().unwrap().text, "B1");
    }

    #[test]
    fn inject_splices_after_step_and_advance_yields_first_injected() {
        let template = template(&[("general", &["Q1", "Q2", "Q3"])]);
        let mut tracker = ProgressTracker::from_template(&template);

        tracker
            .inject(vec![extra(10, "Q1a"), extra(11, "Q1b")], 0)
            .unwrap();

        assert_eq!(texts(&tracker), vec!["Q1", "Q1a", "Q1b", "Q2", "Q3"]);
        assert_eq!(tracker.current_question().unwrap().text, "Q1");
        assert_eq!(tracker.advance().unwrap().text, "Q1a");
        assert_eq!(tracker.cursor().step, 1);
    }

    #[test]
    fn inject_behind_cursor_keeps_logical_position() {
        let template = template(&[("general", &["Q1", "Q2", "Q3"])]);
        let mut tracker = ProgressTracker::from_template(&template);
        tracker.advance();
        tracker.advance();

        tracker.inject(vec![extra(10, "Q1a")], 0).unwrap();

        assert_eq!(texts(&tracker), vec!["Q1", "Q1a", "Q2", "Q3"]);
        assert_eq!(tracker.current_question().unwrap().text, "Q3");
    }

    #[test]
    fn inject_rejects_step_outside_category() {
        let template = template(&[("general", &["Q1"])]);
        let mut tracker = ProgressTracker::from_template(&template);
        let err = tracker.inject(vec![extra(1, "x")], 4).unwrap_err();
        assert_eq!(err, TrackerError::StepOutOfRange { step: 4, len: 1 });
    }

    #[test]
    fn inject_after_last_question_reopens_exhausted_tracker() {
        let template = template(&[("general", &["Q1"])]);
        let mut tracker = ProgressTracker::from_template(&template);
        assert_eq!(tracker.advance(), None);

        tracker.inject(vec![extra(1, "Q1a")], 0).unwrap();

        assert!(!tracker.is_exhausted());
        assert_eq!(tracker.advance().unwrap().text, "Q1a");
        assert_eq!(tracker.advance(), None);
    }

    #[test]
    fn mark_skipped_leaves_cursor_alone() {
        let template = template(&[("general", &["Q1", "Q2"])]);
        let mut tracker = ProgressTracker::from_template(&template);
        let first = tracker.current_question().unwrap().question_ref;

        tracker.mark_skipped(first);
        tracker.mark_skipped(first);

        assert_eq!(tracker.skipped(), &[first]);
        assert_eq!(tracker.cursor().step, 0);
    }

    #[test]
    fn position_counts_across_categories() {
        let template = template(&[("a", &["A1", "A2"]), ("b", &["B1"])]);
        let mut tracker = ProgressTracker::from_template(&template);
        tracker.advance();
        tracker.advance();
        let position = tracker.position();
        assert_eq!((position.step, position.total), (3, 3));
    }

    #[test]
    fn lifecycle_transitions_are_guarded() {
        let template = template(&[("a", &["A1"])]);
        let mut tracker = ProgressTracker::from_template(&template);

        assert!(tracker.resume().is_err());
        tracker.pause().unwrap();
        assert!(tracker.ensure_active("answer").is_err());
        assert!(tracker.pause().is_err());
        tracker.resume().unwrap();
        tracker.stop().unwrap();
        assert_eq!(
            tracker.stop().unwrap_err(),
            LifecycleError::InvalidTransition {
                from: InterviewState::Stopped,
                action: "stop",
            }
        );
        tracker.complete().unwrap();
        assert_eq!(tracker.state(), InterviewState::Completed);
    }

    #[test]
    fn survives_json_round_trip() {
        let template = template(&[("a", &["A1", "A2"])]);
        let mut tracker = ProgressTracker::from_template(&template);
        tracker.advance();
        let json = serde_json::to_string(&tracker).unwrap();
        let restored: ProgressTracker = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, tracker);
    }
}

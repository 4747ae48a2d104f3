use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{InterviewId, RatingId};

/// Lowest accepted score.
pub const MIN_SCORE: u8 = 1;
/// Highest accepted score.
pub const MAX_SCORE: u8 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RatingError {
    #[error("score {score} is outside {MIN_SCORE}..={MAX_SCORE}")]
    ScoreOutOfRange { score: u8 },
}

/// Subject feedback on an interview's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub id: RatingId,
    pub interview_id: InterviewId,
    pub score: u8,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validated insert shape for a rating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRating {
    pub interview_id: InterviewId,
    pub score: u8,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewRating {
    /// Blank feedback is stored as `None`.
    ///
    /// # Errors
    ///
    /// Returns `RatingError::ScoreOutOfRange` unless `MIN_SCORE <= score <= MAX_SCORE`.
    pub fn new(
        interview_id: InterviewId,
        score: u8,
        feedback: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, RatingError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(RatingError::ScoreOutOfRange { score });
        }
        let feedback = feedback
            .map(|f| f.trim().to_owned())
            .filter(|f| !f.is_empty());
        Ok(Self {
            interview_id,
            score,
            feedback,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn rejects_scores_outside_range() {
        let id = InterviewId::new(1);
        assert_eq!(
            NewRating::new(id, 0, None, fixed_now()),
            Err(RatingError::ScoreOutOfRange { score: 0 })
        );
        assert!(NewRating::new(id, 6, None, fixed_now()).is_err());
        assert!(NewRating::new(id, 5, None, fixed_now()).is_ok());
    }

    #[test]
    fn blank_feedback_is_dropped() {
        let rating =
            NewRating::new(InterviewId::new(1), 3, Some("  ".into()), fixed_now()).unwrap();
        assert_eq!(rating.feedback, None);

        let rating =
            NewRating::new(InterviewId::new(1), 4, Some(" clear ".into()), fixed_now()).unwrap();
        assert_eq!(rating.feedback.as_deref(), Some("clear"));
    }
}

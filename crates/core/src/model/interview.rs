use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{InterviewId, TemplateId, WikiId};
use crate::progress::{InterviewState, ProgressTracker};

/// One subject's traversal of a template.
///
/// The tracker carries cursor, lifecycle state and the effective question set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningInterview {
    pub id: InterviewId,
    pub template_id: TemplateId,
    pub title: Option<String>,
    pub selected_wiki: Option<WikiId>,
    pub created_at: DateTime<Utc>,
    pub tracker: ProgressTracker,
}

impl RunningInterview {
    #[must_use]
    pub fn state(&self) -> InterviewState {
        self.tracker.state()
    }
}

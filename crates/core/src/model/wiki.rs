use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{InterviewId, WikiId};
use crate::model::prompt::PromptId;

/// Version number of machine-generated wikis; edits produce higher versions.
pub const GENERATED_VERSION: u32 = 1;

/// Narrative artifact synthesized from one interview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wiki {
    pub id: WikiId,
    pub interview_id: InterviewId,
    pub content: String,
    pub version: u32,
    pub prompt_id: PromptId,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
}

impl Wiki {
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.version == GENERATED_VERSION
    }

    /// Title derived from the content, see [`extract_title`].
    #[must_use]
    pub fn title(&self) -> Option<String> {
        extract_title(&self.content)
    }
}

/// Insert shape for a wiki; the repository assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWiki {
    pub interview_id: InterviewId,
    pub content: String,
    pub version: u32,
    pub prompt_id: PromptId,
    pub selected: bool,
    pub created_at: DateTime<Utc>,
}

/// Cleans a synthesized artifact.
///
/// Strips surrounding whitespace and code fences. A language tag on the opening
/// fence line is dropped, as is a bare leading `markdown` line.
#[must_use]
pub fn normalize_artifact(raw: &str) -> String {
    let trimmed = raw.trim();
    let fenced = trimmed.starts_with('`');
    let body = trimmed.trim_matches('`');

    let body = match body.split_once('\n') {
        Some((first, rest)) if is_language_tag(first, fenced) => rest,
        None if is_language_tag(body, fenced) => "",
        _ => body,
    };

    body.trim().to_owned()
}

fn is_language_tag(line: &str, fenced: bool) -> bool {
    let tag = line.trim();
    if tag.eq_ignore_ascii_case("markdown") {
        return true;
    }
    fenced
        && !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
}

/// First markdown headline without its `#` markers, else the first non-empty line.
#[must_use]
pub fn extract_title(content: &str) -> Option<String> {
    let headline = content
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim())
        .filter(|line| !line.is_empty());

    headline
        .or_else(|| content.lines().map(str::trim).find(|line| !line.is_empty()))
        .map(str::to_owned)
}

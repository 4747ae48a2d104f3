use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder a wiki prompt must contain; replaced by the conversation transcript.
pub const CONVERSATION_PLACEHOLDER: &str = "{conversation}";

/// Identifier of a synthesis prompt variant within its pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptId(String);

impl PromptId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A prompt variant. `body` is `None` for remote workflows that keep their own prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptVariant {
    pub id: PromptId,
    pub body: Option<String>,
}

impl PromptVariant {
    /// Renders the prompt for a conversation; remote variants get the bare conversation.
    #[must_use]
    pub fn render(&self, conversation: &str) -> String {
        match &self.body {
            Some(body) => body.replace(CONVERSATION_PLACEHOLDER, conversation),
            None => conversation.to_owned(),
        }
    }
}

/// Picks the `n` least-used prompts of `pool`.
///
/// Missing counters count as zero. Ties keep pool order.
#[must_use]
pub fn select_least_used(
    pool: &[PromptId],
    usage: &HashMap<PromptId, u64>,
    n: usize,
) -> Vec<PromptId> {
    let mut ranked: Vec<(usize, u64, &PromptId)> = pool
        .iter()
        .enumerate()
        .map(|(idx, id)| (idx, usage.get(id).copied().unwrap_or(0), id))
        .collect();
    ranked.sort_by_key(|(idx, count, _)| (*count, *idx));
    ranked
        .into_iter()
        .take(n)
        .map(|(_, _, id)| id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<PromptId> {
        names.iter().map(|n| PromptId::new(*n)).collect()
    }

    #[test]
    fn picks_lowest_usage_first() {
        let pool = ids(&["p1", "p2", "p3"]);
        let usage = HashMap::from([
            (PromptId::new("p1"), 0),
            (PromptId::new("p2"), 0),
            (PromptId::new("p3"), 1),
        ]);
        assert_eq!(select_least_used(&pool, &usage, 2), ids(&["p1", "p2"]));
    }

    #[test]
    fn ties_follow_pool_order() {
        let pool = ids(&["b", "a", "c"]);
        let usage = HashMap::from([(PromptId::new("b"), 3), (PromptId::new("c"), 3)]);
        assert_eq!(select_least_used(&pool, &usage, 3), ids(&["a", "b", "c"]));
    }

    #[test]
    fn caps_at_pool_size() {
        let pool = ids(&["only"]);
        assert_eq!(select_least_used(&pool, &HashMap::new(), 2).len(), 1);
    }

    #[test]
    fn render_fills_placeholder() {
        let variant = PromptVariant {
            id: PromptId::new("1"),
            body: Some("Summarize:\n{conversation}".into()),
        };
        assert_eq!(variant.render("system: hi"), "Summarize:\nsystem: hi");
    }
}

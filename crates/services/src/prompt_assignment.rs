use std::path::Path;
use std::sync::Arc;

use interview_core::model::{CONVERSATION_PLACEHOLDER, PromptId, PromptVariant};
use storage::repository::{PromptUsageRepository, StorageError};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Rotating set of wiki prompt variants sharing one usage counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPool {
    label: String,
    variants: Vec<PromptVariant>,
}

impl PromptPool {
    #[must_use]
    pub fn new(label: impl Into<String>, variants: Vec<PromptVariant>) -> Self {
        Self {
            label: label.into(),
            variants,
        }
    }

    /// Prompts `1..=size` kept by a remote workflow.
    #[must_use]
    pub fn numbered(label: impl Into<String>, size: usize) -> Self {
        let variants = (1..=size)
            .map(|i| PromptVariant {
                id: PromptId::new(i.to_string()),
                body: None,
            })
            .collect();
        Self::new(label, variants)
    }

    /// Loads every `*.txt` file of `dir`; the file stem is the prompt id.
    ///
    /// Files lacking the conversation placeholder are skipped.
    ///
    /// # Errors
    ///
    /// Returns `std::io::Error` if the directory or a file cannot be read.
    pub async fn load_dir(label: impl Into<String>, dir: &Path) -> Result<Self, std::io::Error> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut variants = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let body = tokio::fs::read_to_string(&path).await?;
            let body = body.trim();
            if !body.contains(CONVERSATION_PLACEHOLDER) {
                warn!(prompt = stem, "prompt is missing the conversation placeholder, skipped");
                continue;
            }
            variants.push(PromptVariant {
                id: PromptId::new(stem),
                body: Some(body.to_string()),
            });
        }

        variants.sort_by(|a, b| a.id.cmp(&b.id));
        info!(count = variants.len(), dir = %dir.display(), "loaded wiki prompts");
        Ok(Self::new(label, variants))
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn variants(&self) -> &[PromptVariant] {
        &self.variants
    }

    #[must_use]
    pub fn get(&self, id: &PromptId) -> Option<&PromptVariant> {
        self.variants.iter().find(|v| &v.id == id)
    }
}

/// Least-used-first assignment of pool prompts with persisted counters.
pub struct PromptAssignment {
    pool: PromptPool,
    usage: Arc<dyn PromptUsageRepository>,
    guard: Mutex<()>,
}

impl PromptAssignment {
    #[must_use]
    pub fn new(pool: PromptPool, usage: Arc<dyn PromptUsageRepository>) -> Self {
        Self {
            pool,
            usage,
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PromptPool {
        &self.pool
    }

    /// Picks the `n` least-used prompts and counts them as used.
    ///
    /// Ties are broken by pool order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the counters cannot be read or written.
    pub async fn assign(&self, n: usize) -> Result<Vec<PromptVariant>, StorageError> {
        let ids: Vec<PromptId> = self.pool.variants.iter().map(|v| v.id.clone()).collect();

        let _guard = self.guard.lock().await;
        let chosen = self.usage.take_least_used(&self.pool.label, &ids, n).await?;

        Ok(chosen
            .iter()
            .filter_map(|id| self.pool.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use storage::repository::InMemoryRepository;

    use super::*;

    #[tokio::test]
    async fn assigns_least_used_and_counts_them() {
        let repo = Arc::new(InMemoryRepository::new());
        let assignment = PromptAssignment::new(PromptPool::numbered("wiki", 3), repo.clone());
        repo.take_least_used("wiki", &[PromptId::new("3")], 1)
            .await
            .unwrap();

        let chosen = assignment.assign(2).await.unwrap();

        let ids: Vec<&str> = chosen.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        let counts = repo.usage_counts("wiki").await.unwrap();
        assert!(["1", "2", "3"]
            .iter()
            .all(|id| counts.get(&PromptId::new(*id)) == Some(&1)));
    }

    #[tokio::test]
    async fn rotates_through_the_pool() {
        let repo = Arc::new(InMemoryRepository::new());
        let assignment = PromptAssignment::new(PromptPool::numbered("wiki", 3), repo);

        let first = assignment.assign(2).await.unwrap();
        let second = assignment.assign(2).await.unwrap();

        assert_eq!(first[0].id.as_str(), "1");
        assert_eq!(second[0].id.as_str(), "3");
        assert_eq!(second.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assignments_count_every_pick() {
        let repo = Arc::new(InMemoryRepository::new());
        let assignment = Arc::new(PromptAssignment::new(
            PromptPool::numbered("wiki", 3),
            repo.clone(),
        ));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..24 {
            let assignment = Arc::clone(&assignment);
            tasks.spawn(async move { assignment.assign(2).await.unwrap().len() });
        }
        let mut picked = 0;
        while let Some(len) = tasks.join_next().await {
            picked += len.unwrap();
        }

        assert_eq!(picked, 48);
        let counts = repo.usage_counts("wiki").await.unwrap();
        assert_eq!(counts.values().sum::<u64>(), 48);
        assert!(counts.values().all(|c| *c == 16));
    }

    #[tokio::test]
    async fn load_dir_requires_placeholder() {
        let dir = std::env::temp_dir().join(format!("prompts-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("b.txt"), "Summarize: {conversation}")
            .await
            .unwrap();
        tokio::fs::write(dir.join("a.txt"), "no placeholder").await.unwrap();
        tokio::fs::write(dir.join("c.md"), "{conversation}").await.unwrap();

        let pool = PromptPool::load_dir("local", &dir).await.unwrap();

        let ids: Vec<&str> = pool.variants().iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}

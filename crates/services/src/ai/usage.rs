use std::sync::Arc;

use chrono::{DateTime, Utc};
use interview_core::Clock;
use interview_core::model::InterviewId;
use storage::repository::{
    AiPriceBookRepository, AiUsageCompletion, AiUsageRecord, AiUsageRepository, AiUsageStatus,
    NewAiUsageRecord, StorageError, UsagePurpose,
};
use tracing::warn;

use super::TokenUsage;
use super::pricing::PriceBook;

#[derive(Clone, Debug)]
pub struct AiUsageHandle {
    pub id: i64,
    pub provider: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
}

/// Two-phase usage ledger: open a row before a provider call, close it after.
#[derive(Clone)]
pub struct AiUsageService {
    clock: Clock,
    usage_repo: Arc<dyn AiUsageRepository>,
    price_book: PriceBook,
}

impl AiUsageService {
    #[must_use]
    pub fn new(
        clock: Clock,
        usage_repo: Arc<dyn AiUsageRepository>,
        price_repo: Arc<dyn AiPriceBookRepository>,
    ) -> Self {
        Self {
            clock,
            usage_repo,
            price_book: PriceBook::new(price_repo),
        }
    }

    #[must_use]
    pub fn price_book(&self) -> &PriceBook {
        &self.price_book
    }

    /// Open a usage row for a call about to be made.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    pub async fn start_request(
        &self,
        interview_id: Option<InterviewId>,
        purpose: UsagePurpose,
        provider: &str,
        model: &str,
    ) -> Result<AiUsageHandle, StorageError> {
        let now = self.clock.now();
        let id = self
            .usage_repo
            .insert_started(NewAiUsageRecord {
                interview_id,
                purpose,
                provider: provider.to_string(),
                model: model.to_string(),
                created_at: now,
            })
            .await?;

        Ok(AiUsageHandle {
            id,
            provider: provider.to_string(),
            model: model.to_string(),
            started_at: now,
        })
    }

    /// Close a row as succeeded, pricing the tokens when the model is priced.
    ///
    /// Returns the cost in micro-USD if it could be computed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be updated.
    pub async fn finish_success(
        &self,
        handle: &AiUsageHandle,
        usage: Option<TokenUsage>,
        raw_output: Option<String>,
    ) -> Result<Option<u64>, StorageError> {
        let cost = match usage {
            Some(usage) => {
                let cost = self
                    .price_book
                    .estimate_cost_micro_usd(&handle.provider, &handle.model, usage)
                    .await?;
                if cost.is_none() {
                    warn!(
                        provider = %handle.provider,
                        model = %handle.model,
                        "no price entry for model, cost not recorded"
                    );
                }
                cost
            }
            None => None,
        };

        self.usage_repo
            .update_completion(
                handle.id,
                AiUsageCompletion {
                    status: AiUsageStatus::Succeeded,
                    prompt_tokens: usage.map(|u| u.prompt_tokens),
                    completion_tokens: usage.map(|u| u.completion_tokens),
                    total_tokens: usage.map(|u| u.total_tokens),
                    cost_micro_usd: cost,
                    raw_output,
                },
            )
            .await?;

        Ok(cost)
    }

    /// Close a row as failed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be updated.
    pub async fn finish_failure(
        &self,
        handle: &AiUsageHandle,
        raw_output: Option<String>,
    ) -> Result<(), StorageError> {
        self.usage_repo
            .update_completion(handle.id, AiUsageCompletion::failed(raw_output))
            .await
    }

    /// Usage rows recorded for one interview.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    pub async fn list_for_interview(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<AiUsageRecord>, StorageError> {
        self.usage_repo.list_usage(interview_id).await
    }
}

#[cfg(test)]
mod tests {
    use interview_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    use super::*;
    use crate::config::ModelPrice;

    fn service() -> AiUsageService {
        let repo = Arc::new(InMemoryRepository::new());
        AiUsageService::new(fixed_clock(), repo.clone(), repo)
    }

    #[tokio::test]
    async fn success_records_tokens_cost_and_raw_output() {
        let usage = service();
        usage
            .price_book()
            .seed_missing(
                "openai",
                &[ModelPrice {
                    model: "gpt-4o".into(),
                    input_micro_usd_per_million: 1_000_000,
                    output_micro_usd_per_million: 1_000_000,
                }],
            )
            .await
            .unwrap();
        let interview_id = InterviewId::new(3);

        let handle = usage
            .start_request(Some(interview_id), UsagePurpose::Analysis, "openai", "gpt-4o")
            .await
            .unwrap();
        let cost = usage
            .finish_success(
                &handle,
                Some(TokenUsage {
                    prompt_tokens: 1_000,
                    completion_tokens: 1_000,
                    total_tokens: 2_000,
                }),
                Some("{}".into()),
            )
            .await
            .unwrap();

        assert_eq!(cost, Some(2_000));
        let rows = usage.list_for_interview(interview_id).await.unwrap();
        assert_eq!(rows[0].status, AiUsageStatus::Succeeded);
        assert_eq!(rows[0].total_tokens, Some(2_000));
        assert_eq!(rows[0].raw_output.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn failure_closes_row_without_cost() {
        let usage = service();
        let interview_id = InterviewId::new(4);
        let handle = usage
            .start_request(Some(interview_id), UsagePurpose::Wiki, "openai", "gpt-4o-mini")
            .await
            .unwrap();

        usage.finish_failure(&handle, None).await.unwrap();

        let rows = usage.list_for_interview(interview_id).await.unwrap();
        assert_eq!(rows[0].status, AiUsageStatus::Failed);
        assert_eq!(rows[0].cost_micro_usd, None);
    }
}

use std::sync::Arc;

use storage::repository::{AiPriceBookEntry, AiPriceBookRepository, StorageError};

use super::TokenUsage;
use crate::config::ModelPrice;

/// Per-model token prices in micro-USD per million tokens.
#[derive(Clone)]
pub struct PriceBook {
    repo: Arc<dyn AiPriceBookRepository>,
}

impl PriceBook {
    #[must_use]
    pub fn new(repo: Arc<dyn AiPriceBookRepository>) -> Self {
        Self { repo }
    }

    /// Store `prices` for `provider` unless an entry already exists.
    ///
    /// Returns how many entries were added; stored prices are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    pub async fn seed_missing(
        &self,
        provider: &str,
        prices: &[ModelPrice],
    ) -> Result<usize, StorageError> {
        let mut added = 0;
        for price in prices {
            if self.repo.get_entry(provider, &price.model).await?.is_some() {
                continue;
            }
            self.repo
                .upsert_entry(&AiPriceBookEntry {
                    provider: provider.to_owned(),
                    model: price.model.clone(),
                    input_micro_usd_per_million: price.input_micro_usd_per_million,
                    output_micro_usd_per_million: price.output_micro_usd_per_million,
                })
                .await?;
            added += 1;
        }
        Ok(added)
    }

    /// Estimate the cost in micro-USD; `None` when the model is not priced.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on persistence failures.
    pub async fn estimate_cost_micro_usd(
        &self,
        provider: &str,
        model: &str,
        usage: TokenUsage,
    ) -> Result<Option<u64>, StorageError> {
        let Some(entry) = self.repo.get_entry(provider, model).await? else {
            return Ok(None);
        };

        Ok(Some(estimate_cost_micro_usd(&entry, usage)))
    }
}

fn estimate_cost_micro_usd(entry: &AiPriceBookEntry, usage: TokenUsage) -> u64 {
    // Workflow runners report only a total; price it as input.
    let (prompt_tokens, completion_tokens) =
        if usage.prompt_tokens == 0 && usage.completion_tokens == 0 {
            (usage.total_tokens, 0)
        } else {
            (usage.prompt_tokens, usage.completion_tokens)
        };
    let prompt_cost = u64::from(prompt_tokens)
        .saturating_mul(entry.input_micro_usd_per_million)
        / 1_000_000;
    let completion_cost = u64::from(completion_tokens)
        .saturating_mul(entry.output_micro_usd_per_million)
        / 1_000_000;
    prompt_cost.saturating_add(completion_cost)
}

#[cfg(test)]
mod tests {
    use storage::repository::InMemoryRepository;

    use super::*;

    fn entry() -> AiPriceBookEntry {
        AiPriceBookEntry {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            input_micro_usd_per_million: 2_500_000,
            output_micro_usd_per_million: 10_000_000,
        }
    }

    #[test]
    fn prices_prompt_and_completion_separately() {
        let usage = TokenUsage {
            prompt_tokens: 1_000,
            completion_tokens: 200,
            total_tokens: 1_200,
        };
        assert_eq!(estimate_cost_micro_usd(&entry(), usage), 2_500 + 2_000);
    }

    #[test]
    fn total_only_usage_is_priced_as_input() {
        let usage = TokenUsage {
            total_tokens: 2_000,
            ..TokenUsage::default()
        };
        assert_eq!(estimate_cost_micro_usd(&entry(), usage), 5_000);
    }

    fn price(model: &str, input: u64) -> ModelPrice {
        ModelPrice {
            model: model.into(),
            input_micro_usd_per_million: input,
            output_micro_usd_per_million: 0,
        }
    }

    #[tokio::test]
    async fn unpriced_models_have_no_cost() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.upsert_entry(&entry()).await.unwrap();
        let book = PriceBook::new(repo);

        let usage = TokenUsage::default();
        assert_eq!(
            book.estimate_cost_micro_usd("openai", "gpt-4o", usage)
                .await
                .unwrap(),
            Some(0)
        );
        assert_eq!(
            book.estimate_cost_micro_usd("openai", "unknown", usage)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn seeding_keeps_stored_prices() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.upsert_entry(&entry()).await.unwrap();
        let book = PriceBook::new(repo.clone());

        let added = book
            .seed_missing("openai", &[price("gpt-4o", 1), price("gpt-4o-mini", 150_000)])
            .await
            .unwrap();

        assert_eq!(added, 1);
        let kept = repo.get_entry("openai", "gpt-4o").await.unwrap().unwrap();
        assert_eq!(kept.input_micro_usd_per_million, 2_500_000);
        let usage = TokenUsage {
            prompt_tokens: 1_000_000,
            ..TokenUsage::default()
        };
        assert_eq!(
            book.estimate_cost_micro_usd("openai", "gpt-4o-mini", usage)
                .await
                .unwrap(),
            Some(150_000)
        );
    }
}

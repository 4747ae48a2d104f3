use async_trait::async_trait;
use interview_core::model::InterviewId;

use crate::repository::{
    AiUsageCompletion, AiUsageRecord, AiUsageRepository, AiUsageStatus, NewAiUsageRecord,
    StorageError,
};

use super::SqliteRepository;
use super::mapping::{id_i64, map_usage_row};

#[async_trait]
impl AiUsageRepository for SqliteRepository {
    async fn insert_started(&self, record: NewAiUsageRecord) -> Result<i64, StorageError> {
        let interview_id = record
            .interview_id
            .map(|id| id_i64("interview_id", id.value()))
            .transpose()?;

        let result = sqlx::query(
            r"
            INSERT INTO ai_usage (interview_id, purpose, provider, model, created_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(interview_id)
        .bind(record.purpose.as_str())
        .bind(record.provider)
        .bind(record.model)
        .bind(record.created_at)
        .bind(AiUsageStatus::Started.as_str())
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn update_completion(
        &self,
        id: i64,
        completion: AiUsageCompletion,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE ai_usage
            SET status = ?1,
                prompt_tokens = ?2,
                completion_tokens = ?3,
                total_tokens = ?4,
                cost_micro_usd = ?5,
                raw_output = ?6
            WHERE id = ?7
            ",
        )
        .bind(completion.status.as_str())
        .bind(completion.prompt_tokens.map(i64::from))
        .bind(completion.completion_tokens.map(i64::from))
        .bind(completion.total_tokens.map(i64::from))
        .bind(
            completion
                .cost_micro_usd
                .map(|val| i64::try_from(val).unwrap_or(i64::MAX)),
        )
        .bind(completion.raw_output)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }

    async fn list_usage(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<AiUsageRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, interview_id, purpose, provider, model, status, total_tokens,
                   cost_micro_usd, raw_output, created_at
            FROM ai_usage
            WHERE interview_id = ?1
            ORDER BY id
            ",
        )
        .bind(id_i64("interview_id", interview_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        rows.iter().map(map_usage_row).collect()
    }
}

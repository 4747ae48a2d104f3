use std::collections::HashMap;

use async_trait::async_trait;
use interview_core::model::{PromptId, select_least_used};
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{conn, i64_to_u64, ser};
use crate::repository::{PromptUsageRepository, StorageError};

async fn load_counts(
    db: &mut SqliteConnection,
    pool: &str,
) -> Result<HashMap<PromptId, u64>, StorageError> {
    let rows = sqlx::query("SELECT prompt_id, use_count FROM prompt_usage WHERE pool = ?1")
        .bind(pool)
        .fetch_all(&mut *db)
        .await
        .map_err(conn)?;

    let mut counts = HashMap::with_capacity(rows.len());
    for row in rows {
        let id: String = row.try_get("prompt_id").map_err(ser)?;
        let count = i64_to_u64("use_count", row.try_get("use_count").map_err(ser)?)?;
        counts.insert(PromptId::new(id), count);
    }
    Ok(counts)
}

#[async_trait]
impl PromptUsageRepository for SqliteRepository {
    async fn take_least_used(
        &self,
        pool: &str,
        candidates: &[PromptId],
        n: usize,
    ) -> Result<Vec<PromptId>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let counts = load_counts(&mut *tx, pool).await?;
        let chosen = select_least_used(candidates, &counts, n);

        for id in &chosen {
            sqlx::query(
                r"
                    INSERT INTO prompt_usage (pool, prompt_id, use_count)
                    VALUES (?1, ?2, 1)
                    ON CONFLICT(pool, prompt_id) DO UPDATE SET use_count = use_count + 1
                ",
            )
            .bind(pool)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(chosen)
    }

    async fn usage_counts(&self, pool: &str) -> Result<HashMap<PromptId, u64>, StorageError> {
        let mut db = self.pool.acquire().await.map_err(conn)?;
        load_counts(&mut db, pool).await
    }
}

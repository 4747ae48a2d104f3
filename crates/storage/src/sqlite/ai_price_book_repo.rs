use async_trait::async_trait;
use sqlx::Row;

use crate::repository::{AiPriceBookEntry, AiPriceBookRepository, StorageError};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser};

fn map_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AiPriceBookEntry, StorageError> {
    let input: i64 = row.try_get("input_micro_usd_per_million").map_err(ser)?;
    let output: i64 = row.try_get("output_micro_usd_per_million").map_err(ser)?;
    Ok(AiPriceBookEntry {
        provider: row.try_get("provider").map_err(ser)?,
        model: row.try_get("model").map_err(ser)?,
        input_micro_usd_per_million: input
            .try_into()
            .map_err(|_| StorageError::Serialization("invalid input price".into()))?,
        output_micro_usd_per_million: output
            .try_into()
            .map_err(|_| StorageError::Serialization("invalid output price".into()))?,
    })
}

#[async_trait]
impl AiPriceBookRepository for SqliteRepository {
    async fn get_entry(
        &self,
        provider: &str,
        model: &str,
    ) -> Result<Option<AiPriceBookEntry>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT provider, model, input_micro_usd_per_million, output_micro_usd_per_million
            FROM ai_price_book
            WHERE provider = ?1 AND model = ?2
            ",
        )
        .bind(provider)
        .bind(model)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_entry).transpose()
    }

    async fn upsert_entry(&self, entry: &AiPriceBookEntry) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO ai_price_book (
                provider, model, input_micro_usd_per_million, output_micro_usd_per_million
            )
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(provider, model) DO UPDATE SET
                input_micro_usd_per_million = excluded.input_micro_usd_per_million,
                output_micro_usd_per_million = excluded.output_micro_usd_per_million
            ",
        )
        .bind(&entry.provider)
        .bind(&entry.model)
        .bind(id_i64("input_micro_usd_per_million", entry.input_micro_usd_per_million)?)
        .bind(id_i64("output_micro_usd_per_million", entry.output_micro_usd_per_million)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}

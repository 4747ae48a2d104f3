use async_trait::async_trait;
use interview_core::model::{
    ADDITIONAL_ORDER_START, AdditionalQuestion, AdditionalQuestionId, AudioRef, InterviewId,
    NewAdditionalQuestion, ResponseId,
};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, i64_to_u32, i64_to_u64, id_i64, map_additional_row, write_err};
use crate::repository::{AdditionalQuestionRepository, StorageError};

const COLUMNS: &str =
    "id, interview_id, text, category, order_seq, triggering_response_id, audio_ref";

#[async_trait]
impl AdditionalQuestionRepository for SqliteRepository {
    async fn insert_additional(
        &self,
        question: NewAdditionalQuestion,
    ) -> Result<AdditionalQuestion, StorageError> {
        let interview_key = id_i64("interview_id", question.interview_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let row = sqlx::query(
            r"
                SELECT COALESCE(MAX(order_seq) + 1, ?2) AS next_order
                FROM additional_questions
                WHERE interview_id = ?1
            ",
        )
        .bind(interview_key)
        .bind(i64::from(ADDITIONAL_ORDER_START))
        .fetch_one(&mut *tx)
        .await
        .map_err(conn)?;
        let order = i64_to_u32("next_order", row.try_get("next_order").map_err(conn)?)?;

        let res = sqlx::query(
            r"
                INSERT INTO additional_questions (
                    interview_id, text, category, order_seq, triggering_response_id
                )
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(interview_key)
        .bind(&question.text)
        .bind(&question.category)
        .bind(i64::from(order))
        .bind(id_i64(
            "triggering_response_id",
            question.triggering_response_id.value(),
        )?)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        tx.commit().await.map_err(conn)?;

        Ok(AdditionalQuestion {
            id: AdditionalQuestionId::new(i64_to_u64("id", res.last_insert_rowid())?),
            interview_id: question.interview_id,
            text: question.text,
            category: question.category,
            order,
            triggering_response_id: question.triggering_response_id,
            audio: None,
        })
    }

    async fn get_additional(
        &self,
        id: AdditionalQuestionId,
    ) -> Result<Option<AdditionalQuestion>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM additional_questions WHERE id = ?1"
        ))
        .bind(id_i64("id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_additional_row).transpose()
    }

    async fn list_additional(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<AdditionalQuestion>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM additional_questions WHERE interview_id = ?1 ORDER BY order_seq"
        ))
        .bind(id_i64("interview_id", interview_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_additional_row).collect()
    }

    async fn list_for_response(
        &self,
        response_id: ResponseId,
    ) -> Result<Vec<AdditionalQuestion>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM additional_questions \
             WHERE triggering_response_id = ?1 ORDER BY order_seq"
        ))
        .bind(id_i64("response_id", response_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_additional_row).collect()
    }

    async fn find_by_text(
        &self,
        interview_id: InterviewId,
        text: &str,
    ) -> Result<Option<AdditionalQuestion>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM additional_questions \
             WHERE interview_id = ?1 AND text = ?2 ORDER BY order_seq LIMIT 1"
        ))
        .bind(id_i64("interview_id", interview_id.value())?)
        .bind(text)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        row.as_ref().map(map_additional_row).transpose()
    }

    async fn set_additional_audio(
        &self,
        id: AdditionalQuestionId,
        audio: &AudioRef,
    ) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE additional_questions SET audio_ref = ?1 WHERE id = ?2")
            .bind(audio.as_str())
            .bind(id_i64("id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

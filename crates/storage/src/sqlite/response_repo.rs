use async_trait::async_trait;
use interview_core::model::{InterviewId, NewResponse, Response, ResponseId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, i64_to_u64, id_i64, map_response_row, question_ref_columns, ser, write_err,
};
use crate::repository::{ResponseRepository, StorageError};

const COLUMNS: &str = "id, interview_id, question_id, additional_question_id, text, audio_ref, \
                       transcript, skipped, by_user, created_at";

#[async_trait]
impl ResponseRepository for SqliteRepository {
    async fn insert_response(&self, response: NewResponse) -> Result<Response, StorageError> {
        let (question_id, additional_id) = question_ref_columns(response.question_ref)?;

        // A partial unique index rejects a second non-skipped answer.
        let res = sqlx::query(
            r"
                INSERT INTO responses (
                    interview_id, question_id, additional_question_id, text, audio_ref,
                    transcript, skipped, by_user, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(id_i64("interview_id", response.interview_id.value())?)
        .bind(question_id)
        .bind(additional_id)
        .bind(&response.text)
        .bind(response.audio.as_ref().map(|a| a.as_str().to_owned()))
        .bind(&response.transcript)
        .bind(i64::from(response.skipped))
        .bind(i64::from(response.by_user))
        .bind(response.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = ResponseId::new(i64_to_u64("id", res.last_insert_rowid())?);
        Ok(Response::from_new(id, response))
    }

    async fn get_response(&self, id: ResponseId) -> Result<Option<Response>, StorageError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM responses WHERE id = ?1"))
            .bind(id_i64("id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_response_row).transpose()
    }

    async fn list_responses(
        &self,
        interview_id: InterviewId,
    ) -> Result<Vec<Response>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM responses WHERE interview_id = ?1 ORDER BY id"
        ))
        .bind(id_i64("interview_id", interview_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_response_row).collect()
    }

    async fn record_analysis(&self, id: ResponseId, raw_output: &str) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE responses SET analysis_output = ?1 WHERE id = ?2")
            .bind(raw_output)
            .bind(id_i64("id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn analysis_output(&self, id: ResponseId) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT analysis_output FROM responses WHERE id = ?1")
            .bind(id_i64("id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        match row {
            Some(row) => row.try_get("analysis_output").map_err(ser),
            None => Ok(None),
        }
    }
}

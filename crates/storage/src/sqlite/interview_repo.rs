use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interview_core::ProgressTracker;
use interview_core::model::{InterviewId, RunningInterview, TemplateId, WikiId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, i64_to_u64, id_i64, ser};
use crate::repository::{InterviewRepository, StorageError};

fn map_interview_row(row: &sqlx::sqlite::SqliteRow) -> Result<RunningInterview, StorageError> {
    let tracker_json: String = row.try_get("tracker_json").map_err(ser)?;
    let tracker: ProgressTracker = serde_json::from_str(&tracker_json).map_err(ser)?;
    let selected: Option<i64> = row.try_get("selected_wiki_id").map_err(ser)?;

    Ok(RunningInterview {
        id: InterviewId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        template_id: TemplateId::new(i64_to_u64(
            "template_id",
            row.try_get("template_id").map_err(ser)?,
        )?),
        title: row.try_get("title").map_err(ser)?,
        selected_wiki: selected
            .map(|v| i64_to_u64("selected_wiki_id", v).map(WikiId::new))
            .transpose()?,
        created_at: row.try_get("created_at").map_err(ser)?,
        tracker,
    })
}

#[async_trait]
impl InterviewRepository for SqliteRepository {
    async fn create_interview(
        &self,
        template_id: TemplateId,
        tracker: &ProgressTracker,
        created_at: DateTime<Utc>,
    ) -> Result<RunningInterview, StorageError> {
        let tracker_json = serde_json::to_string(tracker).map_err(ser)?;
        let res = sqlx::query(
            r"
                INSERT INTO interviews (template_id, state, tracker_json, created_at)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_i64("template_id", template_id.value())?)
        .bind(tracker.state().as_str())
        .bind(tracker_json)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(RunningInterview {
            id: InterviewId::new(i64_to_u64("interview_id", res.last_insert_rowid())?),
            template_id,
            title: None,
            selected_wiki: None,
            created_at,
            tracker: tracker.clone(),
        })
    }

    async fn get_interview(
        &self,
        id: InterviewId,
    ) -> Result<Option<RunningInterview>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, template_id, title, selected_wiki_id, tracker_json, created_at
                FROM interviews
                WHERE id = ?1
            ",
        )
        .bind(id_i64("interview_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_interview_row).transpose()
    }

    async fn save_interview(&self, interview: &RunningInterview) -> Result<(), StorageError> {
        let tracker_json = serde_json::to_string(&interview.tracker).map_err(ser)?;
        let selected = interview
            .selected_wiki
            .map(|id| id_i64("selected_wiki_id", id.value()))
            .transpose()?;

        let res = sqlx::query(
            r"
                UPDATE interviews
                SET title = ?1,
                    selected_wiki_id = ?2,
                    state = ?3,
                    tracker_json = ?4
                WHERE id = ?5
            ",
        )
        .bind(interview.title.as_deref())
        .bind(selected)
        .bind(interview.state().as_str())
        .bind(tracker_json)
        .bind(id_i64("interview_id", interview.id.value())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

use async_trait::async_trait;
use interview_core::model::{InterviewId, NewWiki, Wiki, WikiId};

use super::SqliteRepository;
use super::mapping::{conn, i64_to_u64, id_i64, map_wiki_row, write_err};
use crate::repository::{StorageError, WikiRepository};

const COLUMNS: &str = "id, interview_id, content, version, prompt_id, selected, created_at";

#[async_trait]
impl WikiRepository for SqliteRepository {
    async fn insert_wiki(&self, wiki: NewWiki) -> Result<Wiki, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO wikis (interview_id, content, version, prompt_id, selected, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(id_i64("interview_id", wiki.interview_id.value())?)
        .bind(&wiki.content)
        .bind(i64::from(wiki.version))
        .bind(wiki.prompt_id.as_str())
        .bind(i64::from(wiki.selected))
        .bind(wiki.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(Wiki {
            id: WikiId::new(i64_to_u64("id", res.last_insert_rowid())?),
            interview_id: wiki.interview_id,
            content: wiki.content,
            version: wiki.version,
            prompt_id: wiki.prompt_id,
            selected: wiki.selected,
            created_at: wiki.created_at,
        })
    }

    async fn get_wiki(&self, id: WikiId) -> Result<Option<Wiki>, StorageError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM wikis WHERE id = ?1"))
            .bind(id_i64("id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        row.as_ref().map(map_wiki_row).transpose()
    }

    async fn update_content(&self, id: WikiId, content: &str) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE wikis SET content = ?1 WHERE id = ?2")
            .bind(content)
            .bind(id_i64("id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_wikis(&self, interview_id: InterviewId) -> Result<Vec<Wiki>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM wikis WHERE interview_id = ?1 \
             ORDER BY created_at DESC, version DESC, id DESC"
        ))
        .bind(id_i64("interview_id", interview_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_wiki_row).collect()
    }

    async fn select_wiki(
        &self,
        interview_id: InterviewId,
        wiki_id: WikiId,
    ) -> Result<(), StorageError> {
        let interview_key = id_i64("interview_id", interview_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("UPDATE wikis SET selected = 0 WHERE interview_id = ?1")
            .bind(interview_key)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        let res = sqlx::query("UPDATE wikis SET selected = 1 WHERE id = ?1 AND interview_id = ?2")
            .bind(id_i64("wiki_id", wiki_id.value())?)
            .bind(interview_key)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        if res.rows_affected() == 0 {
            tx.rollback().await.map_err(conn)?;
            return Err(StorageError::NotFound);
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}

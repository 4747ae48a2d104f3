use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interview_core::model::{
    AudioRef, Category, Question, QuestionId, Template, TemplateDraft, TemplateId,
};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{audio_from, conn, i64_to_u32, i64_to_u64, id_i64, ser};
use crate::repository::{StorageError, TemplateRepository};

#[async_trait]
impl TemplateRepository for SqliteRepository {
    async fn create_template(
        &self,
        draft: &TemplateDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Template, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
                INSERT INTO templates (title, business_segment, created_at)
                VALUES (?1, ?2, ?3)
            ",
        )
        .bind(draft.title())
        .bind(draft.business_segment())
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;
        let template_id = TemplateId::new(i64_to_u64("template_id", res.last_insert_rowid())?);
        let template_key = res.last_insert_rowid();

        let mut order = 0_u32;
        let mut categories = Vec::with_capacity(draft.categories().len());
        for (position, (name, texts)) in draft.categories().iter().enumerate() {
            let position = u32::try_from(position).map_err(ser)?;
            sqlx::query(
                r"
                    INSERT INTO template_categories (template_id, position, name)
                    VALUES (?1, ?2, ?3)
                ",
            )
            .bind(template_key)
            .bind(i64::from(position))
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            let mut questions = Vec::with_capacity(texts.len());
            for text in texts {
                order += 1;
                let res = sqlx::query(
                    r"
                        INSERT INTO questions (template_id, category, order_seq, text)
                        VALUES (?1, ?2, ?3, ?4)
                    ",
                )
                .bind(template_key)
                .bind(name)
                .bind(i64::from(order))
                .bind(text)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
                questions.push(Question {
                    id: QuestionId::new(i64_to_u64("question_id", res.last_insert_rowid())?),
                    template_id,
                    text: text.clone(),
                    category: name.clone(),
                    order,
                    audio: None,
                });
            }
            categories.push(Category {
                name: name.clone(),
                position,
                questions,
            });
        }

        tx.commit().await.map_err(conn)?;

        Ok(Template::from_persisted(
            template_id,
            draft.title().map(str::to_owned),
            draft.business_segment().map(str::to_owned),
            categories,
            created_at,
        ))
    }

    async fn get_template(&self, id: TemplateId) -> Result<Option<Template>, StorageError> {
        let key = id_i64("template_id", id.value())?;
        let Some(row) = sqlx::query(
            r"
                SELECT title, business_segment, created_at
                FROM templates
                WHERE id = ?1
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let category_rows = sqlx::query(
            r"
                SELECT position, name
                FROM template_categories
                WHERE template_id = ?1
                ORDER BY position
            ",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut categories = Vec::with_capacity(category_rows.len());
        for row in category_rows {
            categories.push(Category {
                name: row.try_get("name").map_err(ser)?,
                position: i64_to_u32("position", row.try_get("position").map_err(ser)?)?,
                questions: Vec::new(),
            });
        }

        let question_rows = sqlx::query(
            r"
                SELECT id, category, order_seq, text, audio_ref
                FROM questions
                WHERE template_id = ?1
                ORDER BY order_seq
            ",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        for row in question_rows {
            let category: String = row.try_get("category").map_err(ser)?;
            let question = Question {
                id: QuestionId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
                template_id: id,
                text: row.try_get("text").map_err(ser)?,
                category: category.clone(),
                order: i64_to_u32("order_seq", row.try_get("order_seq").map_err(ser)?)?,
                audio: audio_from(row.try_get("audio_ref").map_err(ser)?),
            };
            let slot = categories
                .iter_mut()
                .find(|c| c.name == category)
                .ok_or_else(|| ser(format!("question in unknown category {category}")))?;
            slot.questions.push(question);
        }

        Ok(Some(Template::from_persisted(
            id,
            row.try_get("title").map_err(ser)?,
            row.try_get("business_segment").map_err(ser)?,
            categories,
            row.try_get("created_at").map_err(ser)?,
        )))
    }

    async fn set_question_audio(
        &self,
        question_id: QuestionId,
        audio: &AudioRef,
    ) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE questions SET audio_ref = ?1 WHERE id = ?2")
            .bind(audio.as_str())
            .bind(id_i64("question_id", question_id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

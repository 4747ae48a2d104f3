use async_trait::async_trait;
use interview_core::model::{InterviewId, NewRating, Rating, RatingId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{conn, i64_to_u64, id_i64, ser, write_err};
use crate::repository::{RatingRepository, StorageError};

fn map_rating_row(row: &SqliteRow) -> Result<Rating, StorageError> {
    let score: i64 = row.try_get("score").map_err(ser)?;
    Ok(Rating {
        id: RatingId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        interview_id: InterviewId::new(i64_to_u64(
            "interview_id",
            row.try_get("interview_id").map_err(ser)?,
        )?),
        score: u8::try_from(score)
            .map_err(|_| StorageError::Serialization(format!("invalid score: {score}")))?,
        feedback: row.try_get("feedback").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

#[async_trait]
impl RatingRepository for SqliteRepository {
    async fn insert_rating(&self, rating: NewRating) -> Result<Rating, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO ratings (interview_id, score, feedback, created_at)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_i64("interview_id", rating.interview_id.value())?)
        .bind(i64::from(rating.score))
        .bind(rating.feedback.as_deref())
        .bind(rating.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(Rating {
            id: RatingId::new(i64_to_u64("id", res.last_insert_rowid())?),
            interview_id: rating.interview_id,
            score: rating.score,
            feedback: rating.feedback,
            created_at: rating.created_at,
        })
    }

    async fn list_ratings(&self, interview_id: InterviewId) -> Result<Vec<Rating>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, interview_id, score, feedback, created_at
                FROM ratings
                WHERE interview_id = ?1
                ORDER BY id
            ",
        )
        .bind(id_i64("interview_id", interview_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_rating_row).collect()
    }
}

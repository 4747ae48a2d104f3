use interview_core::model::{
    AdditionalQuestion, AdditionalQuestionId, AudioRef, InterviewId, PromptId, QuestionId,
    QuestionRef, Response, ResponseId, Wiki, WikiId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{AiUsageRecord, AiUsageStatus, StorageError, UsagePurpose};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Maps unique-constraint violations to `Conflict`.
pub(crate) fn write_err(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn audio_from(raw: Option<String>) -> Option<AudioRef> {
    raw.map(AudioRef::new)
}

pub(crate) fn question_ref_columns(
    question_ref: QuestionRef,
) -> Result<(Option<i64>, Option<i64>), StorageError> {
    match question_ref {
        QuestionRef::Mandatory(id) => Ok((Some(id_i64("question_id", id.value())?), None)),
        QuestionRef::Additional(id) => Ok((
            None,
            Some(id_i64("additional_question_id", id.value())?),
        )),
    }
}

fn question_ref_from_row(row: &SqliteRow) -> Result<QuestionRef, StorageError> {
    let mandatory: Option<i64> = row.try_get("question_id").map_err(ser)?;
    let additional: Option<i64> = row.try_get("additional_question_id").map_err(ser)?;
    match (mandatory, additional) {
        (Some(id), None) => Ok(QuestionRef::Mandatory(QuestionId::new(i64_to_u64(
            "question_id",
            id,
        )?))),
        (None, Some(id)) => Ok(QuestionRef::Additional(AdditionalQuestionId::new(
            i64_to_u64("additional_question_id", id)?,
        ))),
        _ => Err(StorageError::Serialization(
            "response must reference exactly one question".into(),
        )),
    }
}

pub(crate) fn map_response_row(row: &SqliteRow) -> Result<Response, StorageError> {
    Ok(Response {
        id: ResponseId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        interview_id: InterviewId::new(i64_to_u64(
            "interview_id",
            row.try_get("interview_id").map_err(ser)?,
        )?),
        question_ref: question_ref_from_row(row)?,
        text: row.try_get("text").map_err(ser)?,
        audio: audio_from(row.try_get("audio_ref").map_err(ser)?),
        transcript: row.try_get("transcript").map_err(ser)?,
        skipped: row.try_get::<i64, _>("skipped").map_err(ser)? != 0,
        by_user: row.try_get::<i64, _>("by_user").map_err(ser)? != 0,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_additional_row(row: &SqliteRow) -> Result<AdditionalQuestion, StorageError> {
    Ok(AdditionalQuestion {
        id: AdditionalQuestionId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        interview_id: InterviewId::new(i64_to_u64(
            "interview_id",
            row.try_get("interview_id").map_err(ser)?,
        )?),
        text: row.try_get("text").map_err(ser)?,
        category: row.try_get("category").map_err(ser)?,
        order: i64_to_u32("order_seq", row.try_get("order_seq").map_err(ser)?)?,
        triggering_response_id: ResponseId::new(i64_to_u64(
            "triggering_response_id",
            row.try_get("triggering_response_id").map_err(ser)?,
        )?),
        audio: audio_from(row.try_get("audio_ref").map_err(ser)?),
    })
}

pub(crate) fn map_wiki_row(row: &SqliteRow) -> Result<Wiki, StorageError> {
    Ok(Wiki {
        id: WikiId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        interview_id: InterviewId::new(i64_to_u64(
            "interview_id",
            row.try_get("interview_id").map_err(ser)?,
        )?),
        content: row.try_get("content").map_err(ser)?,
        version: i64_to_u32("version", row.try_get("version").map_err(ser)?)?,
        prompt_id: PromptId::new(row.try_get::<String, _>("prompt_id").map_err(ser)?),
        selected: row.try_get::<i64, _>("selected").map_err(ser)? != 0,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_usage_row(row: &SqliteRow) -> Result<AiUsageRecord, StorageError> {
    let purpose: String = row.try_get("purpose").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;
    let interview_id: Option<i64> = row.try_get("interview_id").map_err(ser)?;
    let total_tokens: Option<i64> = row.try_get("total_tokens").map_err(ser)?;
    let cost: Option<i64> = row.try_get("cost_micro_usd").map_err(ser)?;

    Ok(AiUsageRecord {
        id: row.try_get("id").map_err(ser)?,
        interview_id: interview_id
            .map(|v| i64_to_u64("interview_id", v).map(InterviewId::new))
            .transpose()?,
        purpose: UsagePurpose::parse(&purpose)
            .ok_or_else(|| StorageError::Serialization(format!("invalid purpose: {purpose}")))?,
        provider: row.try_get("provider").map_err(ser)?,
        model: row.try_get("model").map_err(ser)?,
        status: AiUsageStatus::parse(&status)
            .ok_or_else(|| StorageError::Serialization(format!("invalid status: {status}")))?,
        total_tokens: total_tokens
            .map(|v| i64_to_u32("total_tokens", v))
            .transpose()?,
        cost_micro_usd: cost.map(|v| i64_to_u64("cost_micro_usd", v)).transpose()?,
        raw_output: row.try_get("raw_output").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

use chrono::{DateTime, Utc};
use quiz_core::model::{
    AnswerOption, Category, CategoryId, CategoryScope, OptionId, Question, QuestionId,
    QuestionKind, Session, SessionId, SessionScore, SessionStatus, UserAnswer, UserId, UserStats,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

/// Bind-side conversion for any surrogate id.
pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

// Seeds use the full u64 range, so they are stored bit-for-bit.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn seed_to_i64(seed: u64) -> i64 {
    seed as i64
}

#[allow(clippy::cast_sign_loss)]
pub(crate) fn seed_from_i64(v: i64) -> u64 {
    v as u64
}

pub(crate) fn category_id_from_i64(v: i64) -> Result<CategoryId, StorageError> {
    Ok(CategoryId::new(i64_to_u64("category_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn option_id_from_i64(v: i64) -> Result<OptionId, StorageError> {
    Ok(OptionId::new(i64_to_u64("option_id", v)?))
}

pub(crate) fn session_id_from_i64(v: i64) -> Result<SessionId, StorageError> {
    Ok(SessionId::new(i64_to_u64("session_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn map_category_row(row: &SqliteRow) -> Result<Category, StorageError> {
    let ordering: i64 = row.try_get("ordering").map_err(ser)?;
    Category::new(
        category_id_from_i64(row.try_get("id").map_err(ser)?)?,
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get("description").map_err(ser)?,
        i32::try_from(ordering)
            .map_err(|_| StorageError::Serialization(format!("invalid ordering: {ordering}")))?,
    )
    .map_err(ser)
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let kind: QuestionKind = row
        .try_get::<String, _>("kind")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    Question::from_persisted(
        question_id_from_i64(row.try_get("id").map_err(ser)?)?,
        category_id_from_i64(row.try_get("category_id").map_err(ser)?)?,
        row.try_get("prompt").map_err(ser)?,
        row.try_get("explanation").map_err(ser)?,
        kind,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_option_row(row: &SqliteRow) -> Result<AnswerOption, StorageError> {
    Ok(AnswerOption {
        id: option_id_from_i64(row.try_get("id").map_err(ser)?)?,
        question_id: question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
        text: row.try_get("text").map_err(ser)?,
        is_correct: row.try_get("is_correct").map_err(ser)?,
        ordering: u32_from_i64("ordering", row.try_get("ordering").map_err(ser)?)?,
    })
}

/// Rebuild a session from its row plus the ordered question sequence.
pub(crate) fn map_session_row(
    row: &SqliteRow,
    question_ids: Vec<QuestionId>,
) -> Result<Session, StorageError> {
    let scope = match row
        .try_get::<Option<i64>, _>("scope_category_id")
        .map_err(ser)?
    {
        Some(id) => CategoryScope::Category(category_id_from_i64(id)?),
        None => CategoryScope::Mixed,
    };
    let status: SessionStatus = row
        .try_get::<String, _>("status")
        .map_err(ser)?
        .parse()
        .map_err(ser)?;
    let threshold: i64 = row.try_get("pass_threshold").map_err(ser)?;
    let pass_threshold = u8::try_from(threshold)
        .map_err(|_| StorageError::Serialization(format!("invalid pass_threshold: {threshold}")))?;

    let correct: Option<i64> = row.try_get("score_correct").map_err(ser)?;
    let total: Option<i64> = row.try_get("score_total").map_err(ser)?;
    let score = match (correct, total) {
        (Some(correct), Some(total)) => Some(SessionScore {
            correct: u32_from_i64("score_correct", correct)?,
            total: u32_from_i64("score_total", total)?,
        }),
        (None, None) => None,
        _ => return Err(StorageError::Serialization("partial session score".into())),
    };

    let ended_at: Option<DateTime<Utc>> = row.try_get("ended_at").map_err(ser)?;
    Session::from_persisted(
        session_id_from_i64(row.try_get("id").map_err(ser)?)?,
        user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        scope,
        question_ids,
        seed_from_i64(row.try_get("seed").map_err(ser)?),
        pass_threshold,
        status,
        row.try_get("created_at").map_err(ser)?,
        ended_at,
        score,
    )
    .map_err(ser)
}

pub(crate) fn map_answer_row(row: &SqliteRow) -> Result<UserAnswer, StorageError> {
    Ok(UserAnswer::new(
        session_id_from_i64(row.try_get("session_id").map_err(ser)?)?,
        question_id_from_i64(row.try_get("question_id").map_err(ser)?)?,
        row.try_get::<Option<i64>, _>("selected_option_id")
            .map_err(ser)?
            .map(option_id_from_i64)
            .transpose()?,
        row.try_get("is_correct").map_err(ser)?,
        row.try_get("answered_at").map_err(ser)?,
    ))
}

pub(crate) fn map_stats_row(row: &SqliteRow) -> Result<UserStats, StorageError> {
    let count = |field: &'static str| -> Result<u64, StorageError> {
        i64_to_u64(field, row.try_get(field).map_err(ser)?)
    };
    UserStats::from_persisted(
        user_id_from_i64(row.try_get("user_id").map_err(ser)?)?,
        category_id_from_i64(row.try_get("category_id").map_err(ser)?)?,
        count("attempted")?,
        count("correct")?,
        count("total_sessions")?,
        row.try_get("last_updated").map_err(ser)?,
    )
    .map_err(ser)
}

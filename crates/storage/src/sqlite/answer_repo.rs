use quiz_core::model::{QuestionId, SessionId, UserAnswer};
use sqlx::Row;

use super::mapping::{id_i64, map_answer_row, ser};
use super::{SqliteRepository, conn, write_err};
use crate::repository::{AnswerRepository, StorageError};

#[async_trait::async_trait]
impl AnswerRepository for SqliteRepository {
    async fn upsert_answer(&self, answer: &UserAnswer) -> Result<UserAnswer, StorageError> {
        let session_id = id_i64("session_id", answer.session_id.value())?;
        let question_id = id_i64("question_id", answer.question_id.value())?;
        let option_id = answer
            .selected_option_id
            .map(|id| id_i64("option_id", id.value()))
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Writes only while the session is active; re-submitting the stored
        // choice is a no-op so the row (and its timestamp) stays put.
        sqlx::query(
            r"
            INSERT INTO user_answers (session_id, question_id, selected_option_id, is_correct, answered_at)
            SELECT ?1, ?2, ?3, ?4, ?5
            WHERE EXISTS (SELECT 1 FROM sessions WHERE id = ?1 AND status = 'active')
            ON CONFLICT(session_id, question_id) DO UPDATE SET
                selected_option_id = excluded.selected_option_id,
                is_correct = excluded.is_correct,
                answered_at = excluded.answered_at
            WHERE user_answers.selected_option_id IS NOT excluded.selected_option_id
            ",
        )
        .bind(session_id)
        .bind(question_id)
        .bind(option_id)
        .bind(answer.is_correct)
        .bind(answer.answered_at)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        let status = sqlx::query("SELECT status FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let status: String = status.try_get("status").map_err(ser)?;
        if status != "active" {
            return Err(StorageError::Conflict);
        }

        let row = sqlx::query(
            r"
            SELECT session_id, question_id, selected_option_id, is_correct, answered_at
            FROM user_answers
            WHERE session_id = ?1 AND question_id = ?2
            ",
        )
        .bind(session_id)
        .bind(question_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(conn)?;
        let stored = map_answer_row(&row)?;

        tx.commit().await.map_err(conn)?;
        Ok(stored)
    }

    async fn get_answer(
        &self,
        session_id: SessionId,
        question_id: QuestionId,
    ) -> Result<Option<UserAnswer>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT session_id, question_id, selected_option_id, is_correct, answered_at
            FROM user_answers
            WHERE session_id = ?1 AND question_id = ?2
            ",
        )
        .bind(id_i64("session_id", session_id.value())?)
        .bind(id_i64("question_id", question_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_answer_row).transpose()
    }

    async fn list_answers(&self, session_id: SessionId) -> Result<Vec<UserAnswer>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT session_id, question_id, selected_option_id, is_correct, answered_at
            FROM user_answers
            WHERE session_id = ?1
            ORDER BY question_id ASC
            ",
        )
        .bind(id_i64("session_id", session_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_answer_row).collect()
    }
}

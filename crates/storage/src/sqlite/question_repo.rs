use quiz_core::model::{
    AnswerOption, CategoryScope, OptionId, Question, QuestionId, ValidatedQuestion, same_options,
};
use sqlx::Row;

use super::mapping::{category_id_from_i64, id_i64, map_option_row, map_question_row, ser};
use super::{SqliteRepository, conn, write_err};
use crate::repository::{QuestionRepository, StorageError};

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, validated: &ValidatedQuestion) -> Result<(), StorageError> {
        let question = &validated.question;
        let question_id = id_i64("question_id", question.id().value())?;
        let category_id = id_i64("category_id", question.category_id().value())?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        let category = sqlx::query("SELECT 1 FROM categories WHERE id = ?1")
            .bind(category_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        if category.is_none() {
            return Err(StorageError::NotFound);
        }

        let existing = sqlx::query("SELECT category_id FROM questions WHERE id = ?1")
            .bind(question_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;

        let options_unchanged = if let Some(row) = existing {
            let stored_category = category_id_from_i64(row.try_get("category_id").map_err(ser)?)?;
            let stored_options = sqlx::query(
                r"
                SELECT id, question_id, text, is_correct, ordering
                FROM answer_options WHERE question_id = ?1
                ",
            )
            .bind(question_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(conn)?
            .iter()
            .map(map_option_row)
            .collect::<Result<Vec<_>, _>>()?;

            let same = same_options(&stored_options, &validated.options);
            if !(same && stored_category == question.category_id()) {
                let referenced =
                    sqlx::query("SELECT 1 FROM session_questions WHERE question_id = ?1 LIMIT 1")
                        .bind(question_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(conn)?;
                if referenced.is_some() {
                    return Err(StorageError::Conflict);
                }
            }
            same
        } else {
            false
        };

        // created_at stays from the first insert
        sqlx::query(
            r"
            INSERT INTO questions (id, category_id, prompt, explanation, kind, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                category_id = excluded.category_id,
                prompt = excluded.prompt,
                explanation = excluded.explanation,
                kind = excluded.kind
            ",
        )
        .bind(question_id)
        .bind(category_id)
        .bind(question.prompt())
        .bind(question.explanation())
        .bind(question.kind().as_str())
        .bind(question.created_at())
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        if !options_unchanged {
            sqlx::query("DELETE FROM answer_options WHERE question_id = ?1")
                .bind(question_id)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;

            for option in &validated.options {
                sqlx::query(
                    r"
                    INSERT INTO answer_options (id, question_id, text, is_correct, ordering)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ",
                )
                .bind(id_i64("option_id", option.id.value())?)
                .bind(question_id)
                .bind(option.text.as_str())
                .bind(option.is_correct)
                .bind(i64::from(option.ordering))
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, category_id, prompt, explanation, kind, created_at
            FROM questions WHERE id = ?1
            ",
        )
        .bind(id_i64("question_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_question_row).transpose()
    }

    async fn list_questions(&self, scope: CategoryScope) -> Result<Vec<Question>, StorageError> {
        let category = scope
            .category_id()
            .map(|id| id_i64("category_id", id.value()))
            .transpose()?;

        let rows = sqlx::query(
            r"
            SELECT q.id, q.category_id, q.prompt, q.explanation, q.kind, q.created_at
            FROM questions q
            JOIN categories c ON c.id = q.category_id
            WHERE ?1 IS NULL OR q.category_id = ?1
            ORDER BY c.ordering ASC, c.id ASC, q.id ASC
            ",
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }

    async fn get_options(
        &self,
        question_id: QuestionId,
    ) -> Result<Vec<AnswerOption>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, question_id, text, is_correct, ordering
            FROM answer_options
            WHERE question_id = ?1
            ORDER BY ordering ASC, id ASC
            ",
        )
        .bind(id_i64("question_id", question_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_option_row).collect()
    }

    async fn get_option(&self, id: OptionId) -> Result<Option<AnswerOption>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, question_id, text, is_correct, ordering
            FROM answer_options WHERE id = ?1
            ",
        )
        .bind(id_i64("option_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_option_row).transpose()
    }
}

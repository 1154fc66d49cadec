use chrono::{DateTime, Utc};
use quiz_core::model::{NewSession, QuestionId, Session, SessionId, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::mapping::{id_i64, map_session_row, question_id_from_i64, seed_to_i64, ser};
use super::{SqliteRepository, conn, write_err};
use crate::repository::{SessionRepository, StorageError};

const SESSION_COLUMNS: &str = r"
    id, user_id, scope_category_id, seed, pass_threshold, status,
    created_at, ended_at, score_correct, score_total
";

/// Question sequence of a session in position order.
async fn load_sequence(
    db: &mut SqliteConnection,
    session_id: i64,
) -> Result<Vec<QuestionId>, StorageError> {
    let rows = sqlx::query(
        r"
        SELECT question_id FROM session_questions
        WHERE session_id = ?1
        ORDER BY position ASC
        ",
    )
    .bind(session_id)
    .fetch_all(&mut *db)
    .await
    .map_err(conn)?;

    rows.iter()
        .map(|row| question_id_from_i64(row.try_get("question_id").map_err(ser)?))
        .collect()
}

impl SqliteRepository {
    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<Session>, StorageError> {
        let mut db = self.pool.acquire().await.map_err(conn)?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            let sequence = load_sequence(&mut *db, id).await?;
            sessions.push(map_session_row(&row, sequence)?);
        }
        Ok(sessions)
    }

    async fn fetch_sessions(
        &self,
        filter: &str,
        binds: &[i64],
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Session>, StorageError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions {filter}");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        if let Some(cutoff) = cutoff {
            query = query.bind(cutoff);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;
        self.hydrate(rows).await
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(
        &self,
        session: &NewSession,
        exclusive: bool,
    ) -> Result<Session, StorageError> {
        let user_id = id_i64("user_id", session.user_id.value())?;
        let scope = session
            .scope
            .category_id()
            .map(|id| id_i64("category_id", id.value()))
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // The active-session check and the insert are one statement so two
        // racing starts cannot both pass the check.
        let res = sqlx::query(
            r"
            INSERT INTO sessions (user_id, scope_category_id, seed, pass_threshold, status, created_at)
            SELECT ?1, ?2, ?3, ?4, 'active', ?5
            WHERE ?6 = 0 OR NOT EXISTS (
                SELECT 1 FROM sessions WHERE user_id = ?1 AND status = 'active'
            )
            ",
        )
        .bind(user_id)
        .bind(scope)
        .bind(seed_to_i64(session.seed))
        .bind(i64::from(session.pass_threshold))
        .bind(session.created_at)
        .bind(i64::from(exclusive))
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }
        let raw_id = res.last_insert_rowid();

        for (position, question_id) in session.question_ids.iter().enumerate() {
            let position = i64::try_from(position)
                .map_err(|_| StorageError::Serialization("position overflow".into()))?;
            sqlx::query(
                r"
                INSERT INTO session_questions (session_id, position, question_id)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(raw_id)
            .bind(position)
            .bind(id_i64("question_id", question_id.value())?)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(conn)?;

        let id = SessionId::new(
            u64::try_from(raw_id)
                .map_err(|_| StorageError::Serialization("session_id sign overflow".into()))?,
        );
        Ok(session.clone().assign_id(id))
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let mut sessions = self
            .fetch_sessions("WHERE id = ?1", &[id_i64("session_id", id.value())?], None)
            .await?;
        Ok(sessions.pop())
    }

    async fn list_sessions(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Session>, StorageError> {
        self.fetch_sessions(
            "WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            &[id_i64("user_id", user_id.value())?, i64::from(limit)],
            None,
        )
        .await
    }

    async fn active_sessions(&self, user_id: UserId) -> Result<Vec<Session>, StorageError> {
        self.fetch_sessions(
            "WHERE user_id = ?1 AND status = 'active' ORDER BY created_at ASC, id ASC",
            &[id_i64("user_id", user_id.value())?],
            None,
        )
        .await
    }

    async fn stale_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>, StorageError> {
        self.fetch_sessions(
            "WHERE status = 'active' AND created_at < ?1 ORDER BY created_at ASC, id ASC",
            &[],
            Some(cutoff),
        )
        .await
    }

    async fn abandon_session(
        &self,
        id: SessionId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
            UPDATE sessions
            SET status = 'abandoned', ended_at = ?2
            WHERE id = ?1 AND status = 'active'
            ",
        )
        .bind(id_i64("session_id", id.value())?)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.rows_affected() == 1)
    }

    async fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id_i64("session_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use quiz_core::model::{SessionId, SessionScore, StatsDelta};
use sqlx::Row;

use super::mapping::{id_i64, ser};
use super::stats_repo::add_delta;
use super::{SqliteRepository, conn};
use crate::repository::{CompletionPersistence, StorageError};

#[async_trait::async_trait]
impl CompletionPersistence for SqliteRepository {
    async fn complete_session(
        &self,
        id: SessionId,
        at: DateTime<Utc>,
        score: SessionScore,
        deltas: &[StatsDelta],
    ) -> Result<bool, StorageError> {
        let session_id = id_i64("session_id", id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Only the caller that flips the status gets to touch stats.
        let res = sqlx::query(
            r"
            UPDATE sessions
            SET status = 'completed', ended_at = ?2, score_correct = ?3, score_total = ?4
            WHERE id = ?1 AND status = 'active'
            ",
        )
        .bind(session_id)
        .bind(at)
        .bind(i64::from(score.correct))
        .bind(i64::from(score.total))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Ok(false);
        }

        let user_id: i64 = sqlx::query("SELECT user_id FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(conn)?
            .try_get("user_id")
            .map_err(ser)?;

        for delta in deltas {
            add_delta(&mut *tx, user_id, delta, at).await?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(true)
    }
}

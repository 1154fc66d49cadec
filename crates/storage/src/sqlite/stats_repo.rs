use chrono::{DateTime, Utc};
use quiz_core::model::{CategoryId, StatsDelta, UserId, UserStats};
use sqlx::SqliteConnection;

use super::mapping::{id_i64, map_stats_row};
use super::{SqliteRepository, conn, write_err};
use crate::repository::{StatsRepository, StorageError};

/// Add one delta to a `(user, category)` row, creating it when missing.
pub(super) async fn add_delta(
    db: &mut SqliteConnection,
    user_id: i64,
    delta: &StatsDelta,
    at: DateTime<Utc>,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO user_stats (user_id, category_id, attempted, correct, total_sessions, last_updated)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(user_id, category_id) DO UPDATE SET
            attempted = attempted + excluded.attempted,
            correct = correct + excluded.correct,
            total_sessions = total_sessions + excluded.total_sessions,
            last_updated = excluded.last_updated
        ",
    )
    .bind(user_id)
    .bind(id_i64("category_id", delta.category_id.value())?)
    .bind(i64::from(delta.attempted))
    .bind(i64::from(delta.correct))
    .bind(i64::from(delta.sessions))
    .bind(at)
    .execute(&mut *db)
    .await
    .map_err(write_err)?;

    Ok(())
}

#[async_trait::async_trait]
impl StatsRepository for SqliteRepository {
    async fn apply_deltas(
        &self,
        user_id: UserId,
        deltas: &[StatsDelta],
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let user_id = id_i64("user_id", user_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for delta in deltas {
            add_delta(&mut *tx, user_id, delta, at).await?;
        }
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_stats(
        &self,
        user_id: UserId,
        category_id: CategoryId,
    ) -> Result<Option<UserStats>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT user_id, category_id, attempted, correct, total_sessions, last_updated
            FROM user_stats
            WHERE user_id = ?1 AND category_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("category_id", category_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_stats_row).transpose()
    }

    async fn list_stats(&self, user_id: UserId) -> Result<Vec<UserStats>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT user_id, category_id, attempted, correct, total_sessions, last_updated
            FROM user_stats
            WHERE user_id = ?1
            ORDER BY category_id ASC
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_stats_row).collect()
    }

    async fn reset_stats(
        &self,
        user_id: UserId,
        category_id: Option<CategoryId>,
    ) -> Result<u64, StorageError> {
        let category = category_id
            .map(|id| id_i64("category_id", id.value()))
            .transpose()?;
        let res = sqlx::query(
            r"
            DELETE FROM user_stats
            WHERE user_id = ?1 AND (?2 IS NULL OR category_id = ?2)
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(category)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.rows_affected())
    }
}

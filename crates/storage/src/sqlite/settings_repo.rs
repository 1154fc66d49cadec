use sqlx::Row;

use super::mapping::ser;
use super::{SqliteRepository, conn};
use crate::repository::{SettingsRepository, StorageError};

#[async_trait::async_trait]
impl SettingsRepository for SqliteRepository {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.map(|row| row.try_get("value").map_err(ser)).transpose()
    }

    async fn set_settings(&self, options: &[(String, String)]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for (key, value) in options {
            sqlx::query(
                r"
                INSERT INTO settings (key, value)
                VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                ",
            )
            .bind(key.as_str())
            .bind(value.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn list_settings(&self) -> Result<Vec<(String, String)>, StorageError> {
        let rows = sqlx::query("SELECT key, value FROM settings ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get("key").map_err(ser)?,
                    row.try_get("value").map_err(ser)?,
                ))
            })
            .collect()
    }

    async fn delete_setting(&self, key: &str) -> Result<bool, StorageError> {
        let res = sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        Ok(res.rows_affected() > 0)
    }
}

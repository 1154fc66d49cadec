use quiz_core::model::{Category, CategoryId};

use super::mapping::{id_i64, map_category_row};
use super::{SqliteRepository, conn};
use crate::repository::{CategoryRepository, StorageError};

#[async_trait::async_trait]
impl CategoryRepository for SqliteRepository {
    async fn upsert_category(&self, category: &Category) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO categories (id, name, description, ordering)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                ordering = excluded.ordering
            ",
        )
        .bind(id_i64("category_id", category.id().value())?)
        .bind(category.name())
        .bind(category.description())
        .bind(i64::from(category.ordering()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, name, description, ordering
            FROM categories WHERE id = ?1
            ",
        )
        .bind(id_i64("category_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_category_row).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, name, description, ordering
            FROM categories
            ORDER BY ordering ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_category_row).collect()
    }
}

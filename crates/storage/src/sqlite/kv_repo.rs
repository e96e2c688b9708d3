use chrono::Utc;
use poise_core::model::UserId;
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{KeyValueStore, PersistenceKey, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl KeyValueStore for SqliteRepository {
    async fn load(&self, user: &UserId, key: PersistenceKey) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv_entries WHERE user_id = ?1 AND key = ?2")
            .bind(user.as_str())
            .bind(key.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(conn)?;

        row.map(|row| {
            row.try_get::<String, _>("value")
                .map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn save(
        &self,
        user: &UserId,
        key: PersistenceKey,
        value: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO kv_entries (user_id, key, value, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(user_id, key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(user.as_str())
        .bind(key.as_str())
        .bind(value)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(conn)?;

        Ok(())
    }
}

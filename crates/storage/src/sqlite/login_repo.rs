use chrono::{DateTime, Utc};
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{LoginStampRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait::async_trait]
impl LoginStampRepository for SqliteRepository {
    async fn record_login(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO login_stamp (id, logged_in_at)
                VALUES (1, ?1)
                ON CONFLICT(id) DO UPDATE SET logged_in_at = excluded.logged_in_at
            ",
        )
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn last_login(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("SELECT logged_in_at FROM login_stamp WHERE id = 1")
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| r.try_get::<DateTime<Utc>, _>("logged_in_at").map_err(ser))
            .transpose()
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM login_stamp WHERE id = 1")
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}

use chrono::Utc;
use sqlx::Row;
use std::collections::HashMap;

use super::SqliteRepository;
use crate::repository::{StorageError, TopicCacheRepository};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[async_trait::async_trait]
impl TopicCacheRepository for SqliteRepository {
    async fn get(&self, topic_key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT content FROM topic_cache WHERE topic_key = ?1")
            .bind(topic_key)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| r.try_get::<String, _>("content").map_err(ser))
            .transpose()
    }

    async fn put(&self, topic_key: &str, content: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO topic_cache (topic_key, content, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(topic_key) DO UPDATE SET
                    content = excluded.content,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(topic_key)
        .bind(content)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn entries(&self) -> Result<HashMap<String, String>, StorageError> {
        let rows = sqlx::query("SELECT topic_key, content FROM topic_cache")
            .fetch_all(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.try_get("topic_key").map_err(ser)?;
            let content: String = row.try_get("content").map_err(ser)?;
            out.insert(key, content);
        }
        Ok(out)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM topic_cache")
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}

use chrono::Utc;
use mentor_core::model::{FieldName, SessionContext, SessionId, UserId};
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{SessionContextRepository, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn map_context_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionContext, StorageError> {
    let user_id: String = row.try_get("user_id").map_err(ser)?;
    let field: String = row.try_get("field").map_err(ser)?;
    let session_id: Option<String> = row.try_get("session_id").map_err(ser)?;
    let user_name: Option<String> = row.try_get("user_name").map_err(ser)?;

    let mut context =
        SessionContext::new(UserId::new(user_id), FieldName::new(field)).map_err(ser)?;
    if let Some(sid) = session_id {
        context = context.with_session_id(SessionId::new(sid));
    }
    if let Some(name) = user_name {
        context = context.with_user_name(name);
    }
    Ok(context)
}

#[async_trait::async_trait]
impl SessionContextRepository for SqliteRepository {
    async fn load(&self) -> Result<Option<SessionContext>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT user_id, field, session_id, user_name
                FROM session_context
                WHERE id = 1
            ",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_context_row).transpose()
    }

    async fn save(&self, context: &SessionContext) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO session_context (id, user_id, field, session_id, user_name, updated_at)
                VALUES (1, ?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    field = excluded.field,
                    session_id = excluded.session_id,
                    user_name = excluded.user_name,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(context.user_id().as_str())
        .bind(context.field().as_str())
        .bind(context.session_id().map(SessionId::as_str))
        .bind(context.user_name())
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_context WHERE id = 1")
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}

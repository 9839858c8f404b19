use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mentor_core::model::SessionContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for the singleton session context record.
///
/// The context is written as a whole record every time; there are no
/// field-level updates. Last writer wins.
#[async_trait]
pub trait SessionContextRepository: Send + Sync {
    /// Load the persisted context, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read.
    async fn load(&self) -> Result<Option<SessionContext>, StorageError>;

    /// Replace the persisted context with the given record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save(&self, context: &SessionContext) -> Result<(), StorageError>;

    /// Remove the persisted context (logout).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be removed.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Repository contract for the per-topic content cache.
///
/// Keys are normalized topic keys (`mentor_core::text::normalize_topic_key`);
/// values are the full lesson markdown.
#[async_trait]
pub trait TopicCacheRepository: Send + Sync {
    /// Fetch cached content for a topic key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures; a missing entry is `None`.
    async fn get(&self, topic_key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or replace cached content for a topic key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn put(&self, topic_key: &str, content: &str) -> Result<(), StorageError>;

    /// All cached entries, unordered.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn entries(&self) -> Result<HashMap<String, String>, StorageError>;

    /// Drop every cached entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cache cannot be cleared.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Repository contract for the login timestamp backing the client-side
/// login-expiry policy.
#[async_trait]
pub trait LoginStampRepository: Send + Sync {
    /// Record the moment of a successful login, replacing any prior stamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the stamp cannot be stored.
    async fn record_login(&self, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// The last recorded login time, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn last_login(&self) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Forget the stamp (logout).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the stamp cannot be removed.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    context: Arc<Mutex<Option<SessionContext>>>,
    topic_cache: Arc<Mutex<HashMap<String, String>>>,
    login: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, StorageError> {
        mutex
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl SessionContextRepository for InMemoryRepository {
    async fn load(&self) -> Result<Option<SessionContext>, StorageError> {
        Ok(Self::lock(&self.context)?.clone())
    }

    async fn save(&self, context: &SessionContext) -> Result<(), StorageError> {
        *Self::lock(&self.context)? = Some(context.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *Self::lock(&self.context)? = None;
        Ok(())
    }
}

#[async_trait]
impl TopicCacheRepository for InMemoryRepository {
    async fn get(&self, topic_key: &str) -> Result<Option<String>, StorageError> {
        Ok(Self::lock(&self.topic_cache)?.get(topic_key).cloned())
    }

    async fn put(&self, topic_key: &str, content: &str) -> Result<(), StorageError> {
        Self::lock(&self.topic_cache)?.insert(topic_key.to_string(), content.to_string());
        Ok(())
    }

    async fn entries(&self) -> Result<HashMap<String, String>, StorageError> {
        Ok(Self::lock(&self.topic_cache)?.clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        Self::lock(&self.topic_cache)?.clear();
        Ok(())
    }
}

#[async_trait]
impl LoginStampRepository for InMemoryRepository {
    async fn record_login(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        *Self::lock(&self.login)? = Some(at);
        Ok(())
    }

    async fn last_login(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(*Self::lock(&self.login)?)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *Self::lock(&self.login)? = None;
        Ok(())
    }
}

/// Aggregates the client-state repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub contexts: Arc<dyn SessionContextRepository>,
    pub topic_cache: Arc<dyn TopicCacheRepository>,
    pub login_stamps: Arc<dyn LoginStampRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let contexts: Arc<dyn SessionContextRepository> = Arc::new(repo.clone());
        let topic_cache: Arc<dyn TopicCacheRepository> = Arc::new(repo.clone());
        let login_stamps: Arc<dyn LoginStampRepository> = Arc::new(repo);
        Self {
            contexts,
            topic_cache,
            login_stamps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_core::model::{FieldName, SessionId, UserId};
    use mentor_core::time::fixed_now;

    fn build_context() -> SessionContext {
        SessionContext::new(UserId::new("u1"), FieldName::new("AI"))
            .unwrap()
            .with_session_id(SessionId::new("S1"))
    }

    #[tokio::test]
    async fn context_save_is_whole_record_replacement() {
        let repo = InMemoryRepository::new();
        assert!(repo.load().await.unwrap().is_none());

        let first = build_context();
        repo.save(&first).await.unwrap();

        let second = first.clone().with_user_name("Ada");
        repo.save(&second).await.unwrap();

        assert_eq!(repo.load().await.unwrap(), Some(second));

        SessionContextRepository::clear(&repo).await.unwrap();
        assert!(repo.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn topic_cache_round_trips() {
        let repo = InMemoryRepository::new();
        repo.put("neural_networks", "lesson text").await.unwrap();
        repo.put("neural_networks", "newer text").await.unwrap();

        assert_eq!(
            repo.get("neural_networks").await.unwrap().as_deref(),
            Some("newer text")
        );
        assert_eq!(repo.get("missing").await.unwrap(), None);
        assert_eq!(repo.entries().await.unwrap().len(), 1);

        TopicCacheRepository::clear(&repo).await.unwrap();
        assert!(repo.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_stamp_round_trips() {
        let repo = InMemoryRepository::new();
        assert!(repo.last_login().await.unwrap().is_none());

        let at = fixed_now();
        repo.record_login(at).await.unwrap();
        assert_eq!(repo.last_login().await.unwrap(), Some(at));

        LoginStampRepository::clear(&repo).await.unwrap();
        assert!(repo.last_login().await.unwrap().is_none());
    }
}

//! OTP login, field selection, and the client-side login-expiry policy.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use mentor_core::Clock;
use mentor_core::model::{FieldName, SessionContext, UserId};
use storage::repository::{
    LoginStampRepository, SessionContextRepository, Storage, TopicCacheRepository,
};

use crate::api::{ApiClient, ApiEnvelope, ApiOutcome, VerifiedLogin};
use crate::error::AuthError;

/// Logins expire client-side after this long; route guards re-check on every
/// access.
pub const LOGIN_EXPIRY_HOURS: i64 = 12;

#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
    clock: Clock,
    contexts: Arc<dyn SessionContextRepository>,
    topic_cache: Arc<dyn TopicCacheRepository>,
    login_stamps: Arc<dyn LoginStampRepository>,
}

impl AuthService {
    #[must_use]
    pub fn new(api: ApiClient, storage: &Storage, clock: Clock) -> Self {
        Self {
            api,
            clock,
            contexts: Arc::clone(&storage.contexts),
            topic_cache: Arc::clone(&storage.topic_cache),
            login_stamps: Arc::clone(&storage.login_stamps),
        }
    }

    /// Request an OTP.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` on transport failures.
    pub async fn send_otp(&self, phone: &str) -> Result<ApiOutcome, AuthError> {
        Ok(self.api.send_otp(phone).await?)
    }

    /// Verify an OTP. A successful verification records the login moment for
    /// the expiry policy; the caller proceeds to field selection.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` on transport or storage failures.
    pub async fn verify_otp(
        &self,
        phone: &str,
        otp: &str,
    ) -> Result<ApiEnvelope<VerifiedLogin>, AuthError> {
        let envelope = self.api.verify_otp(phone, otp).await?;
        if envelope.status.is_success() {
            self.login_stamps.record_login(self.clock.now()).await?;
        }
        Ok(envelope)
    }

    /// Bind the logged-in user to a learning field, replacing the whole
    /// session context record. A previously learned session id is dropped;
    /// the stream re-teaches it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the identity is unusable or storage fails.
    pub async fn select_field(
        &self,
        user_id: UserId,
        field: FieldName,
        user_name: Option<String>,
    ) -> Result<SessionContext, AuthError> {
        let mut context = SessionContext::new(user_id, field)?;
        if let Some(name) = user_name {
            context = context.with_user_name(name);
        }
        self.contexts.save(&context).await?;
        Ok(context)
    }

    /// True when the last login is older than [`LOGIN_EXPIRY_HOURS`]. A user
    /// who never logged in is not "expired"; they are simply logged out.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` on storage failures.
    pub async fn is_login_expired(&self) -> Result<bool, AuthError> {
        let Some(logged_in_at) = self.login_stamps.last_login().await? else {
            return Ok(false);
        };
        let elapsed = self.clock.now() - logged_in_at;
        Ok(elapsed >= Duration::hours(LOGIN_EXPIRY_HOURS))
    }

    /// Clear everything the client persisted: context, topic cache, stamp.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` on storage failures.
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.contexts.clear().await?;
        self.topic_cache.clear().await?;
        self.login_stamps.clear().await?;
        debug!("session data cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_core::time::{fixed_clock, fixed_now};
    use storage::repository::Storage;

    fn service(clock: Clock) -> (AuthService, Storage) {
        let storage = Storage::in_memory();
        let api = ApiClient::new(crate::config::BackendConfig::new("http://127.0.0.1:9").unwrap());
        (AuthService::new(api, &storage, clock), storage)
    }

    #[tokio::test]
    async fn login_expiry_boundary_is_twelve_hours() {
        let mut clock = fixed_clock();
        let (auth, storage) = service(clock);
        storage.login_stamps.record_login(fixed_now()).await.unwrap();

        assert!(!auth.is_login_expired().await.unwrap());

        clock.advance(Duration::hours(LOGIN_EXPIRY_HOURS) - Duration::seconds(1));
        let (auth, storage) = service(clock);
        storage.login_stamps.record_login(fixed_now()).await.unwrap();
        assert!(!auth.is_login_expired().await.unwrap());

        clock.advance(Duration::seconds(1));
        let (auth, storage) = service(clock);
        storage.login_stamps.record_login(fixed_now()).await.unwrap();
        assert!(auth.is_login_expired().await.unwrap());
    }

    #[tokio::test]
    async fn never_logged_in_is_not_expired() {
        let (auth, _storage) = service(fixed_clock());
        assert!(!auth.is_login_expired().await.unwrap());
    }

    #[tokio::test]
    async fn select_field_replaces_the_context() {
        let (auth, storage) = service(fixed_clock());
        auth.select_field(UserId::new("u1"), FieldName::new("AI"), Some("Ada".into()))
            .await
            .unwrap();

        let ctx = storage.contexts.load().await.unwrap().unwrap();
        assert_eq!(ctx.field(), &FieldName::new("AI"));
        assert_eq!(ctx.user_name(), Some("Ada"));
        assert_eq!(ctx.session_id(), None);
    }

    #[tokio::test]
    async fn logout_clears_all_persisted_state() {
        let (auth, storage) = service(fixed_clock());
        auth.select_field(UserId::new("u1"), FieldName::new("AI"), None)
            .await
            .unwrap();
        storage.topic_cache.put("basics", "text").await.unwrap();
        storage.login_stamps.record_login(fixed_now()).await.unwrap();

        auth.logout().await.unwrap();

        assert!(storage.contexts.load().await.unwrap().is_none());
        assert!(storage.topic_cache.entries().await.unwrap().is_empty());
        assert!(storage.login_stamps.last_login().await.unwrap().is_none());
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{FieldName, SessionId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContextError {
    #[error("user id cannot be empty")]
    EmptyUserId,

    #[error("field name cannot be empty")]
    EmptyField,
}

/// The singleton record identifying the active learning context.
///
/// Every stream handler checks inbound events against this record before
/// touching any other state; writes always replace the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    user_id: UserId,
    field: FieldName,
    session_id: Option<SessionId>,
    user_name: Option<String>,
}

impl SessionContext {
    /// Create a context for a user and field, with no session learned yet.
    ///
    /// # Errors
    ///
    /// Returns `ContextError` if the user id or field name is empty.
    pub fn new(user_id: UserId, field: FieldName) -> Result<Self, ContextError> {
        if user_id.as_str().trim().is_empty() {
            return Err(ContextError::EmptyUserId);
        }
        if field.as_str().trim().is_empty() {
            return Err(ContextError::EmptyField);
        }
        Ok(Self {
            user_id,
            field,
            session_id: None,
            user_name: None,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn field(&self) -> &FieldName {
        &self.field
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// Replacement record with the given session id learned from the stream.
    #[must_use]
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Replacement record with an updated display name.
    #[must_use]
    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Replacement record retargeted at a different field.
    ///
    /// Switching fields forgets the learned session id; the stream will
    /// re-teach it.
    #[must_use]
    pub fn with_field(mut self, field: FieldName) -> Self {
        self.field = field;
        self.session_id = None;
        self
    }

    // ─── Ownership checks ──────────────────────────────────────────────────

    #[must_use]
    pub fn owns_user(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    #[must_use]
    pub fn owns_field(&self, field: &FieldName) -> bool {
        &self.field == field
    }

    /// True only when the event's session id matches a learned session id.
    ///
    /// A context that has not learned a session yet owns no session-scoped
    /// events.
    #[must_use]
    pub fn owns_session(&self, session_id: &SessionId) -> bool {
        self.session_id.as_ref() == Some(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SessionContext {
        SessionContext::new(UserId::new("u1"), FieldName::new("AI")).unwrap()
    }

    #[test]
    fn rejects_empty_identifiers() {
        let err = SessionContext::new(UserId::new(""), FieldName::new("AI")).unwrap_err();
        assert_eq!(err, ContextError::EmptyUserId);

        let err = SessionContext::new(UserId::new("u1"), FieldName::new("  ")).unwrap_err();
        assert_eq!(err, ContextError::EmptyField);
    }

    #[test]
    fn ownership_checks_match_exactly() {
        let ctx = ctx().with_session_id(SessionId::new("S1"));

        assert!(ctx.owns_user(&UserId::new("u1")));
        assert!(!ctx.owns_user(&UserId::new("u2")));
        assert!(ctx.owns_field(&FieldName::new("AI")));
        assert!(!ctx.owns_field(&FieldName::new("Math")));
        assert!(ctx.owns_session(&SessionId::new("S1")));
        assert!(!ctx.owns_session(&SessionId::new("S2")));
    }

    #[test]
    fn unlearned_session_owns_nothing() {
        assert!(!ctx().owns_session(&SessionId::new("S1")));
    }

    #[test]
    fn switching_fields_forgets_session() {
        let ctx = ctx()
            .with_session_id(SessionId::new("S1"))
            .with_field(FieldName::new("Math"));

        assert_eq!(ctx.field(), &FieldName::new("Math"));
        assert_eq!(ctx.session_id(), None);
    }

    #[test]
    fn context_round_trips_through_json() {
        let ctx = ctx()
            .with_session_id(SessionId::new("S1"))
            .with_user_name("Ada");
        let json = serde_json::to_string(&ctx).unwrap();
        let back: SessionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}

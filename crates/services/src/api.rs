//! Typed client for the tutoring backend's REST surface.
//!
//! Every endpoint answers with a `{status, message?, data?}` envelope where
//! `status` is `success`, `error` or `info`. Non-success statuses are domain
//! outcomes (surfaced to the user as popups), never transport errors.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use mentor_core::model::{FieldName, ProfileField, SessionId, SessionStatus, UserId};

use crate::config::BackendConfig;
use crate::error::ApiError;

//
// ─── ENVELOPE ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Error,
    Info,
}

impl ApiStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, ApiStatus::Success)
    }
}

/// The common response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    pub status: ApiStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Collapse to the user-facing outcome, dropping the payload.
    #[must_use]
    pub fn outcome(&self) -> ApiOutcome {
        ApiOutcome {
            status: self.status,
            message: self.message.clone(),
        }
    }

    /// The payload of a successful response.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::MissingData` when the backend reported success but
    /// sent no payload.
    pub fn into_data(self) -> Result<T, ApiError> {
        self.data.ok_or(ApiError::MissingData)
    }
}

/// Domain-level result of an action: recoverable, popup-worthy, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiOutcome {
    pub status: ApiStatus,
    pub message: Option<String>,
}

//
// ─── PAYLOAD SHAPES ────────────────────────────────────────────────────────────
//

/// Data returned by OTP verification.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedLogin {
    pub user_id: UserId,
    #[serde(default)]
    pub name: Option<String>,
}

/// User profile as stored by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// One scheduled study window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub day: String,
    pub time: String,
}

/// A previously asked doubt with its answer, when available.
#[derive(Debug, Clone, Deserialize)]
pub struct DoubtRecord {
    pub question: String,
    #[serde(default)]
    pub answer: Option<String>,
}

/// Raw shape of the session-status endpoint. Unlike the other endpoints this
/// one reports the traffic light directly, with absent flags meaning idle.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatusInfo {
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub intro_active: bool,
    #[serde(default)]
    pub lesson_active: bool,
}

#[derive(Serialize)]
struct SessionScope<'a> {
    user_id: &'a UserId,
    field: &'a FieldName,
    session_id: &'a SessionId,
}

//
// ─── CLIENT ────────────────────────────────────────────────────────────────────
//

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: BackendConfig,
}

impl ApiClient {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.config.endpoint(path))
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(self.config.endpoint(path))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn post_outcome<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiOutcome, ApiError> {
        let envelope: ApiEnvelope<serde_json::Value> = self.post_json(path, body).await?;
        Ok(envelope.outcome())
    }

    // ─── Auth ──────────────────────────────────────────────────────────────

    /// Request an OTP for the given phone number.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn send_otp(&self, phone: &str) -> Result<ApiOutcome, ApiError> {
        self.post_outcome("api/otp/send", &serde_json::json!({ "phone": phone }))
            .await
    }

    /// Verify an OTP; a successful response carries the user identity.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn verify_otp(
        &self,
        phone: &str,
        otp: &str,
    ) -> Result<ApiEnvelope<VerifiedLogin>, ApiError> {
        self.post_json(
            "api/otp/verify",
            &serde_json::json!({ "phone": phone, "otp": otp }),
        )
        .await
    }

    // ─── Profile ───────────────────────────────────────────────────────────

    /// Fetch the stored user profile.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn fetch_profile(
        &self,
        user_id: &UserId,
    ) -> Result<ApiEnvelope<UserProfile>, ApiError> {
        self.get_json("api/user/profile", &[("user_id", user_id.as_str())])
            .await
    }

    /// Update the stored user profile.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn update_profile(
        &self,
        user_id: &UserId,
        profile: &UserProfile,
    ) -> Result<ApiOutcome, ApiError> {
        #[derive(Serialize)]
        struct Body<'a> {
            user_id: &'a UserId,
            #[serde(flatten)]
            profile: &'a UserProfile,
        }
        self.post_outcome("api/user/profile/update", &Body { user_id, profile })
            .await
    }

    /// Fetch the full per-field profile used to rebuild the learning tree.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn profile_details(
        &self,
        user_id: &UserId,
    ) -> Result<ApiEnvelope<Vec<ProfileField>>, ApiError> {
        self.get_json("leftside/details", &[("user_id", user_id.as_str())])
            .await
    }

    // ─── Sessions ──────────────────────────────────────────────────────────

    /// List topic titles for one session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn session_topics(
        &self,
        user_id: &UserId,
        field: &FieldName,
        session_id: &SessionId,
    ) -> Result<ApiEnvelope<Vec<String>>, ApiError> {
        self.get_json(
            "api/session/topics",
            &[
                ("user_id", user_id.as_str()),
                ("field", field.as_str()),
                ("session_id", session_id.as_str()),
            ],
        )
        .await
    }

    /// Look up the day label for a session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn session_day(
        &self,
        user_id: &UserId,
        field: &FieldName,
        session_id: &SessionId,
    ) -> Result<Option<String>, ApiError> {
        #[derive(Deserialize)]
        struct DayResponse {
            status: ApiStatus,
            #[serde(default)]
            session_day: Option<String>,
        }
        let response: DayResponse = self
            .get_json(
                "get-session-day",
                &[
                    ("user_id", user_id.as_str()),
                    ("field", field.as_str()),
                    ("session_id", session_id.as_str()),
                ],
            )
            .await?;

        Ok(match response.status {
            ApiStatus::Success => response.session_day,
            _ => None,
        })
    }

    /// Fetch the authoritative session status snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn session_status(
        &self,
        user_id: &UserId,
        field: &FieldName,
        session_id: &SessionId,
    ) -> Result<SessionStatusInfo, ApiError> {
        self.get_json(
            "api/session/status",
            &[
                ("user_id", user_id.as_str()),
                ("field", field.as_str()),
                ("session_id", session_id.as_str()),
            ],
        )
        .await
    }

    /// Signal the user is ready to start their session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn start_session(
        &self,
        user_id: &UserId,
        field: &FieldName,
        session_id: &SessionId,
    ) -> Result<ApiOutcome, ApiError> {
        self.post_outcome(
            "api/user/ready",
            &SessionScope {
                user_id,
                field,
                session_id,
            },
        )
        .await
    }

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn end_session(
        &self,
        user_id: &UserId,
        field: &FieldName,
        session_id: &SessionId,
    ) -> Result<ApiOutcome, ApiError> {
        self.post_outcome(
            "api/action/end-session",
            &SessionScope {
                user_id,
                field,
                session_id,
            },
        )
        .await
    }

    /// Mark a topic as viewed to completion.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn lesson_view_completed(
        &self,
        user_id: &UserId,
        field: &FieldName,
        subtopic: &str,
    ) -> Result<ApiOutcome, ApiError> {
        self.post_outcome(
            "api/lesson-view-completed",
            &serde_json::json!({
                "user_id": user_id,
                "field": field,
                "subtopic": subtopic,
            }),
        )
        .await
    }

    // ─── Schedule ──────────────────────────────────────────────────────────

    /// Fetch the study schedule for a field.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn fetch_schedule(
        &self,
        user_id: &UserId,
        field: &FieldName,
    ) -> Result<ApiEnvelope<Vec<ScheduleEntry>>, ApiError> {
        self.get_json(
            "api/schedule",
            &[("user_id", user_id.as_str()), ("field", field.as_str())],
        )
        .await
    }

    /// Replace the study schedule for a field.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn update_schedule(
        &self,
        user_id: &UserId,
        field: &FieldName,
        entries: &[ScheduleEntry],
    ) -> Result<ApiOutcome, ApiError> {
        self.post_outcome(
            "api/schedule/update",
            &serde_json::json!({
                "user_id": user_id,
                "field": field,
                "entries": entries,
            }),
        )
        .await
    }

    // ─── Doubts ────────────────────────────────────────────────────────────

    /// Submit a doubt question for the current session. The answer arrives
    /// later on the stream's `doubt_answer` channel.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn submit_doubt(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        question: &str,
    ) -> Result<ApiOutcome, ApiError> {
        self.post_outcome(
            "api/doubt",
            &serde_json::json!({
                "user_id": user_id,
                "session_id": session_id,
                "question": question,
            }),
        )
        .await
    }

    /// All doubts asked in a session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures.
    pub async fn session_doubts(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<ApiEnvelope<Vec<DoubtRecord>>, ApiError> {
        self.get_json(
            "api/doubts",
            &[
                ("user_id", user_id.as_str()),
                ("session_id", session_id.as_str()),
            ],
        )
        .await
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

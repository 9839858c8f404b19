use serde::Deserialize;

use crate::model::ids::{FieldName, SessionId, UserId};
use crate::model::lifecycle::SessionStatus;

/// Channel names as they appear in the stream envelope.
pub mod channel {
    pub const LESSON_DELIVERED: &str = "LESSON_DELIVERED";
    pub const FIELD_INTRODUCTION_GENERATED: &str = "field_introduction_generated";
    pub const FIELD_ROADMAP_GENERATED: &str = "field_roadmap_generated";
    pub const DOUBT_ANSWER: &str = "doubt_answer";
    pub const SESSION_START: &str = "session_start";
    pub const SESSION_STOP: &str = "session_stop";
    pub const INTRO_SESSION_STOP: &str = "intro_session_stop";
    pub const SESSION_STATUS_UPDATE: &str = "session_status_update";
}

//
// ─── PAYLOADS ──────────────────────────────────────────────────────────────────
//

/// `LESSON_DELIVERED` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LessonDelivered {
    pub user_id: UserId,
    pub field: FieldName,
    pub session_id: SessionId,
    pub topic: String,
    pub lesson: String,
    #[serde(default)]
    pub path: Option<Vec<String>>,
    #[serde(default)]
    pub name: Option<String>,
}

/// `field_introduction_generated` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntroductionGenerated {
    pub user_id: UserId,
    pub field: FieldName,
    pub session_id: SessionId,
    #[serde(default)]
    pub session_day: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    pub introduction: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `field_roadmap_generated` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoadmapGenerated {
    pub user_id: UserId,
    pub field: FieldName,
    pub session_id: SessionId,
    pub roadmap: String,
}

/// `doubt_answer` payload. Session-scoped, unlike the field-scoped channels.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DoubtAnswer {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub question: String,
    pub answer: String,
}

/// `session_start` payload. The field may be omitted, in which case the
/// currently active field is assumed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStart {
    pub user_id: UserId,
    #[serde(default)]
    pub field: Option<FieldName>,
    pub session_id: SessionId,
}

/// `session_stop` / `intro_session_stop` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStop {
    pub user_id: UserId,
}

/// `session_status_update` payload: the authoritative reconciliation shape.
/// Missing flags read as inactive and a missing status reads as red.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStatusUpdate {
    pub user_id: UserId,
    pub field: FieldName,
    #[serde(default)]
    pub session_status: SessionStatus,
    #[serde(default)]
    pub intro_active: bool,
    #[serde(default)]
    pub lesson_active: bool,
}

//
// ─── UNION ─────────────────────────────────────────────────────────────────────
//

/// One decoded stream event, discriminated by channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    LessonDelivered(LessonDelivered),
    IntroductionGenerated(IntroductionGenerated),
    RoadmapGenerated(RoadmapGenerated),
    DoubtAnswer(DoubtAnswer),
    SessionStart(SessionStart),
    SessionStop(SessionStop),
    IntroSessionStop(SessionStop),
    SessionStatusUpdate(SessionStatusUpdate),
}

impl StreamEvent {
    /// The wire channel this event arrived on.
    #[must_use]
    pub fn channel(&self) -> &'static str {
        match self {
            StreamEvent::LessonDelivered(_) => channel::LESSON_DELIVERED,
            StreamEvent::IntroductionGenerated(_) => channel::FIELD_INTRODUCTION_GENERATED,
            StreamEvent::RoadmapGenerated(_) => channel::FIELD_ROADMAP_GENERATED,
            StreamEvent::DoubtAnswer(_) => channel::DOUBT_ANSWER,
            StreamEvent::SessionStart(_) => channel::SESSION_START,
            StreamEvent::SessionStop(_) => channel::SESSION_STOP,
            StreamEvent::IntroSessionStop(_) => channel::INTRO_SESSION_STOP,
            StreamEvent::SessionStatusUpdate(_) => channel::SESSION_STATUS_UPDATE,
        }
    }

    /// The user the event is addressed to. Present on every channel.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        match self {
            StreamEvent::LessonDelivered(p) => &p.user_id,
            StreamEvent::IntroductionGenerated(p) => &p.user_id,
            StreamEvent::RoadmapGenerated(p) => &p.user_id,
            StreamEvent::DoubtAnswer(p) => &p.user_id,
            StreamEvent::SessionStart(p) => &p.user_id,
            StreamEvent::SessionStop(p) | StreamEvent::IntroSessionStop(p) => &p.user_id,
            StreamEvent::SessionStatusUpdate(p) => &p.user_id,
        }
    }
}

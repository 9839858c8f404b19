#![forbid(unsafe_code)]

pub mod api;
pub mod auth;
pub mod config;
mod dispatcher;
pub mod engine;
pub mod error;
pub mod sse;
pub mod typewriter;

pub use mentor_core::Clock;

pub use api::{ApiClient, ApiEnvelope, ApiOutcome, ApiStatus, SessionStatusInfo, VerifiedLogin};
pub use auth::{AuthService, LOGIN_EXPIRY_HOURS};
pub use config::{BackendConfig, DEFAULT_TYPE_SPEED};
pub use engine::{EngineSnapshot, LearnEngine, Popup, PopupKind, RenderedBlock};
pub use error::{ApiError, AuthError, DecodeError, EngineError, SseError};
pub use sse::{RetryPolicy, SseClient, SseSubscription, decode_frame};
pub use typewriter::TypewriterDriver;

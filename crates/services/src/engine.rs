//! The learning-session engine: one mutable home for the learning tree,
//! content blocks, typing queue and lifecycle state, fed by the stream
//! dispatcher and by explicit user actions.
//!
//! Handlers run to completion one event at a time; state is mutated under a
//! single lock that is never held across awaits. Network side effects that
//! must not block dispatch are spawned and log-and-swallow their failures.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use mentor_core::Clock;
use mentor_core::model::{
    ContentBlock, ContentBlocks, DoubtAnswer, FieldName, LearningTree, LifecycleState,
    PendingSession, SessionContext, SessionId,
};
use mentor_core::text::normalize_topic_key;
use mentor_core::typing::{TickOutcome, TypingQueue};
use storage::repository::{SessionContextRepository, Storage, TopicCacheRepository};

use crate::api::{ApiClient, ApiStatus};
use crate::error::EngineError;

//
// ─── NOTIFICATIONS ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupKind {
    Success,
    Info,
    Error,
}

/// A transient, dismissable user notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub kind: PopupKind,
    pub message: String,
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// A content block together with how much of it has been revealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBlock {
    pub block: ContentBlock,
    pub revealed: String,
}

/// Immutable view of the engine state for the rendering layer.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub tree: LearningTree,
    pub blocks: Vec<RenderedBlock>,
    pub lifecycle: LifecycleState,
    pub pending_session: Option<PendingSession>,
    pub active_field: Option<FieldName>,
    pub active_day: Option<String>,
    pub is_typing: bool,
    pub next_loading: bool,
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Default)]
pub(crate) struct EngineState {
    pub(crate) tree: LearningTree,
    pub(crate) blocks: ContentBlocks,
    pub(crate) typing: TypingQueue,
    pub(crate) lifecycle: LifecycleState,
    pub(crate) pending_session: Option<PendingSession>,
    pub(crate) active_field: Option<FieldName>,
    pub(crate) active_day: Option<String>,
    pub(crate) active_topic: Option<String>,
    /// Last session id seen on a content channel; a different id means the
    /// display resets for the new session.
    pub(crate) current_session_id: Option<SessionId>,
    /// Introduction text of the current session, kept so the roadmap job can
    /// resume typing after it instead of retyping.
    pub(crate) intro_text: String,
    pub(crate) next_loading: bool,
}

pub struct LearnEngine {
    pub(crate) api: ApiClient,
    pub(crate) contexts: Arc<dyn SessionContextRepository>,
    pub(crate) topic_cache: Arc<dyn TopicCacheRepository>,
    pub(crate) clock: Clock,
    pub(crate) state: Mutex<EngineState>,
    popups: broadcast::Sender<Popup>,
    doubts: broadcast::Sender<DoubtAnswer>,
}

impl LearnEngine {
    #[must_use]
    pub fn new(api: ApiClient, storage: &Storage, clock: Clock) -> Self {
        let (popups, _) = broadcast::channel(16);
        let (doubts, _) = broadcast::channel(16);
        Self {
            api,
            contexts: Arc::clone(&storage.contexts),
            topic_cache: Arc::clone(&storage.topic_cache),
            clock,
            state: Mutex::new(EngineState::default()),
            popups,
            doubts,
        }
    }

    /// Notifications channel (domain errors, lifecycle messages).
    #[must_use]
    pub fn subscribe_popups(&self) -> broadcast::Receiver<Popup> {
        self.popups.subscribe()
    }

    /// Doubt answers arriving on the stream, scoped to the current session.
    #[must_use]
    pub fn subscribe_doubts(&self) -> broadcast::Receiver<DoubtAnswer> {
        self.doubts.subscribe()
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        // A poisoned lock means a handler panicked; the state itself is still
        // coherent enough to keep serving the stream.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn popup(&self, kind: PopupKind, message: impl Into<String>) {
        let _ = self.popups.send(Popup {
            kind,
            message: message.into(),
        });
    }

    pub(crate) fn send_doubt_answer(&self, answer: DoubtAnswer) {
        let _ = self.doubts.send(answer);
    }

    /// The persisted session context, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failures.
    pub async fn context(&self) -> Result<Option<SessionContext>, EngineError> {
        Ok(self.contexts.load().await?)
    }

    // ─── User actions ──────────────────────────────────────────────────────

    /// Pull the authoritative session status and overwrite lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failures; transport failures are
    /// logged and swallowed, leaving the lifecycle untouched.
    pub async fn fetch_session_status(&self) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        let Some(session_id) = ctx.session_id().cloned() else {
            return Ok(());
        };

        match self
            .api
            .session_status(ctx.user_id(), ctx.field(), &session_id)
            .await
        {
            Ok(info) => {
                let mut state = self.lock_state();
                state
                    .lifecycle
                    .apply_status_update(info.status, info.intro_active, info.lesson_active);
            }
            Err(err) => warn!(error = %err, "session status fetch failed"),
        }
        Ok(())
    }

    /// Tell the backend the user is ready; surface the outcome as a popup
    /// and reconcile status on success.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failures.
    pub async fn start_session(&self) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        let Some(session_id) = ctx.session_id().cloned() else {
            return Ok(());
        };

        match self
            .api
            .start_session(ctx.user_id(), ctx.field(), &session_id)
            .await
        {
            Ok(outcome) => match outcome.status {
                ApiStatus::Error => self.popup(
                    PopupKind::Error,
                    outcome
                        .message
                        .unwrap_or_else(|| "No active session available.".to_string()),
                ),
                ApiStatus::Info => self.popup(
                    PopupKind::Info,
                    outcome.message.unwrap_or_else(|| {
                        "Intro session is active. Please wait for the daily session.".to_string()
                    }),
                ),
                ApiStatus::Success => {
                    self.popup(
                        PopupKind::Success,
                        outcome.message.unwrap_or_else(|| {
                            "Session started! Lessons will appear shortly.".to_string()
                        }),
                    );
                    // The backend knows whether intro or daily became active.
                    self.fetch_session_status().await?;
                }
            },
            Err(err) => {
                warn!(error = %err, "start session request failed");
                self.popup(PopupKind::Error, "Failed to start session. Please try again.");
            }
        }
        Ok(())
    }

    /// End the running session from the client side.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failures.
    pub async fn end_session(&self) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        let Some(session_id) = ctx.session_id().cloned() else {
            return Ok(());
        };

        match self
            .api
            .end_session(ctx.user_id(), ctx.field(), &session_id)
            .await
        {
            Ok(_) => {
                self.popup(PopupKind::Info, "Session ended. Your progress has been saved!");
                self.lock_state().lifecycle.on_end_requested();
            }
            Err(err) => warn!(error = %err, "end session request failed"),
        }
        Ok(())
    }

    /// Accept the pending session announcement: retarget the context, rebuild
    /// the tree from the profile endpoint, and activate the session.
    ///
    /// Returns the field the new session belongs to, or `None` when no
    /// announcement was pending.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failures.
    pub async fn accept_new_session(&self) -> Result<Option<FieldName>, EngineError> {
        let Some(pending) = self.lock_state().pending_session.clone() else {
            return Ok(None);
        };

        let context = match self.contexts.load().await? {
            Some(ctx) => ctx
                .with_field(pending.field.clone())
                .with_session_id(pending.session_id.clone()),
            None => SessionContext::new(pending.user_id.clone(), pending.field.clone())?
                .with_session_id(pending.session_id.clone()),
        };
        self.contexts.save(&context).await?;

        // Rebuild the tree wholesale; tolerate the fetch failing by keeping
        // the current tree and only ensuring the new session node exists.
        let rebuilt = match self.api.profile_details(&pending.user_id).await {
            Ok(envelope) if envelope.status.is_success() => {
                envelope.data.map(|profile| LearningTree::from_profile(&profile))
            }
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "profile details fetch failed");
                None
            }
        };

        {
            let mut state = self.lock_state();
            if let Some(tree) = rebuilt {
                state.tree = tree;
            }
            state.tree = state
                .tree
                .with_placeholder_session(&pending.field, &pending.session_id);
            state.lifecycle.on_session_accepted();
            state.active_field = Some(pending.field.clone());
            state.pending_session = None;
        }

        Ok(Some(pending.field))
    }

    /// Discard the pending session announcement.
    pub fn decline_new_session(&self) {
        let mut state = self.lock_state();
        if state.pending_session.take().is_some() {
            debug!("pending session declined");
        }
    }

    /// The topic the user is currently reading; used when a stop event marks
    /// progress.
    pub fn set_active_topic(&self, topic: Option<String>) {
        self.lock_state().active_topic = topic;
    }

    /// Cached lesson content for a topic, if any.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failures.
    pub async fn cached_topic(&self, topic: &str) -> Result<Option<String>, EngineError> {
        Ok(self.topic_cache.get(&normalize_topic_key(topic)).await?)
    }

    /// Submit a doubt for the current session; the answer arrives on the
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failures.
    pub async fn submit_doubt(&self, question: &str) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        let Some(session_id) = ctx.session_id().cloned() else {
            return Ok(());
        };

        match self.api.submit_doubt(ctx.user_id(), &session_id, question).await {
            Ok(outcome) if !outcome.status.is_success() => {
                self.popup(
                    PopupKind::Error,
                    outcome
                        .message
                        .unwrap_or_else(|| "Could not submit your question.".to_string()),
                );
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "doubt submission failed");
                self.popup(PopupKind::Error, "Could not submit your question.");
            }
        }
        Ok(())
    }

    // ─── Typewriter ────────────────────────────────────────────────────────

    /// Advance the reveal by one token. Called by the typewriter driver.
    pub fn tick_typing(&self) -> TickOutcome {
        self.lock_state().typing.tick()
    }

    // ─── Snapshot ──────────────────────────────────────────────────────────

    /// A coherent view of everything the rendering layer needs.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        let state = self.lock_state();
        let blocks = state
            .blocks
            .blocks()
            .iter()
            .map(|block| RenderedBlock {
                block: block.clone(),
                revealed: state
                    .typing
                    .revealed(block.id())
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();

        EngineSnapshot {
            tree: state.tree.clone(),
            blocks,
            lifecycle: state.lifecycle,
            pending_session: state.pending_session.clone(),
            active_field: state.active_field.clone(),
            active_day: state.active_day.clone(),
            is_typing: state.typing.is_typing(),
            next_loading: state.next_loading,
        }
    }
}

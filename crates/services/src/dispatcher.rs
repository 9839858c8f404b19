//! Stream event handlers.
//!
//! Every handler starts with an ownership check against the persisted
//! session context; events for another user, field or session are silently
//! dropped (expected under multi-tab use, logged at debug only). When a
//! handler touches several pieces of state it does so in a fixed order:
//! session context, learning tree, content blocks, typing queue, lifecycle.

use tracing::{debug, warn};

use mentor_core::model::{
    DoubtAnswer, FactKind, IntroductionGenerated, LessonBlock, LessonDelivered, PendingSession,
    RoadmapGenerated, SessionContext, SessionStart, SessionStatusUpdate, SessionStop, StreamEvent,
    TreeFact, lesson_block_id,
};
use mentor_core::text::{normalize_topic_key, roadmap_to_markdown};
use mentor_core::typing::{BlockKind, TypingJob};
use storage::repository::{SessionContextRepository as _, TopicCacheRepository as _};

use crate::engine::{LearnEngine, PopupKind};
use crate::error::EngineError;

const DEFAULT_INTRO_TOPIC: &str = "Introduction and Roadmap";
const ROADMAP_HEADER: &str = "\n\n---\n\n## Learning Roadmap\n\n";

impl LearnEngine {
    /// Dispatch one decoded stream event.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on storage failures; per-message protocol and
    /// transport problems are logged and swallowed so the stream never dies.
    pub async fn handle_event(&self, event: StreamEvent) -> Result<(), EngineError> {
        match event {
            StreamEvent::LessonDelivered(payload) => self.on_lesson(payload).await,
            StreamEvent::IntroductionGenerated(payload) => self.on_introduction(payload).await,
            StreamEvent::RoadmapGenerated(payload) => self.on_roadmap(payload).await,
            StreamEvent::DoubtAnswer(payload) => self.on_doubt_answer(payload).await,
            StreamEvent::SessionStart(payload) => self.on_session_start(payload).await,
            StreamEvent::SessionStop(payload) => self.on_session_stop(payload).await,
            StreamEvent::IntroSessionStop(payload) => self.on_intro_session_stop(payload).await,
            StreamEvent::SessionStatusUpdate(payload) => self.on_status_update(payload).await,
        }
    }

    /// Mark that the user requested the next lesson; cleared when one lands.
    pub fn set_next_loading(&self, loading: bool) {
        self.lock_state().next_loading = loading;
    }

    async fn on_lesson(&self, payload: LessonDelivered) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        if !ctx.owns_user(&payload.user_id) || !ctx.owns_field(&payload.field) {
            debug!(channel = "LESSON_DELIVERED", "dropping foreign event");
            return Ok(());
        }

        self.persist_context_updates(&ctx, payload.name.as_deref(), &payload.session_id)
            .await?;

        // Mirror the lesson into the per-topic cache.
        let key = normalize_topic_key(&payload.topic);
        if let Err(err) = self.topic_cache.put(&key, &payload.lesson).await {
            warn!(error = %err, "topic cache write failed");
        }

        let now = self.clock.now();
        let mut state = self.lock_state();

        if Self::begins_new_session(&mut state, &payload.session_id) {
            state.blocks.reset();
            state.typing.reset();
        }

        state.tree = state.tree.merge_fact(&TreeFact {
            field: payload.field.clone(),
            session_id: payload.session_id.clone(),
            session_day: None,
            topic: Some(payload.topic.clone()),
            kind: FactKind::Lesson,
        });

        let block_id = lesson_block_id(&payload.session_id, &payload.topic, now);
        let inserted = state.blocks.push_lesson(LessonBlock {
            id: block_id.clone(),
            session_id: payload.session_id.clone(),
            topic: payload.topic.clone(),
            title: payload.topic.clone(),
            content: payload.lesson.clone(),
            path: payload
                .path
                .unwrap_or_else(|| vec![payload.topic.clone()]),
        });

        if inserted {
            state.typing.push(TypingJob {
                block_id,
                text: payload.lesson,
                typed_prefix: String::new(),
                topic: Some(payload.topic.clone()),
                kind: BlockKind::Lesson,
            });
            state.active_topic = Some(payload.topic);
        }
        state.next_loading = false;

        Ok(())
    }

    async fn on_introduction(&self, payload: IntroductionGenerated) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        if !ctx.owns_user(&payload.user_id) || !ctx.owns_field(&payload.field) {
            debug!(channel = "field_introduction_generated", "dropping foreign event");
            return Ok(());
        }

        self.persist_context_updates(&ctx, payload.name.as_deref(), &payload.session_id)
            .await?;

        let topic = payload
            .topic
            .clone()
            .unwrap_or_else(|| DEFAULT_INTRO_TOPIC.to_string());

        let mut state = self.lock_state();

        if Self::begins_new_session(&mut state, &payload.session_id) {
            state.blocks.reset();
            state.typing.reset();
        }

        state.tree = state.tree.merge_fact(&TreeFact {
            field: payload.field.clone(),
            session_id: payload.session_id.clone(),
            session_day: payload.session_day.clone(),
            topic: Some(topic.clone()),
            kind: FactKind::Intro,
        });

        state.active_field = Some(payload.field.clone());
        state.active_day = payload.session_day.clone();
        state.intro_text = payload.introduction.clone();

        let block_id = state.blocks.upsert_intro(
            &payload.session_id,
            payload.session_day.clone(),
            &topic,
            &payload.field,
            &payload.introduction,
        );

        state.typing.push(TypingJob {
            block_id,
            text: payload.introduction,
            typed_prefix: String::new(),
            topic: None,
            kind: BlockKind::Intro,
        });

        Ok(())
    }

    async fn on_roadmap(&self, payload: RoadmapGenerated) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        if !ctx.owns_user(&payload.user_id) || !ctx.owns_field(&payload.field) {
            debug!(channel = "field_roadmap_generated", "dropping foreign event");
            return Ok(());
        }

        let roadmap_markdown = format!("{ROADMAP_HEADER}{}", roadmap_to_markdown(&payload.roadmap));

        let mut state = self.lock_state();

        let block_id = state.blocks.attach_roadmap(
            &payload.session_id,
            &payload.field,
            &payload.roadmap,
            &roadmap_markdown,
        );

        // The roadmap queues behind the introduction and resumes after it:
        // the intro text is the already-typed prefix, only the roadmap
        // section is revealed token by token.
        let typed_prefix = state.intro_text.clone();
        state.typing.push(TypingJob {
            block_id,
            text: roadmap_markdown,
            typed_prefix,
            topic: None,
            kind: BlockKind::Intro,
        });

        Ok(())
    }

    async fn on_doubt_answer(&self, payload: DoubtAnswer) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        if !ctx.owns_user(&payload.user_id) || !ctx.owns_session(&payload.session_id) {
            debug!(channel = "doubt_answer", "dropping foreign event");
            return Ok(());
        }

        self.send_doubt_answer(payload);
        Ok(())
    }

    async fn on_session_start(&self, payload: SessionStart) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        if !ctx.owns_user(&payload.user_id) {
            debug!(channel = "session_start", "dropping foreign event");
            return Ok(());
        }

        // Only surface the prompt; nothing else changes until the user
        // explicitly accepts.
        let field = payload.field.unwrap_or_else(|| ctx.field().clone());
        self.lock_state().pending_session = Some(PendingSession {
            user_id: payload.user_id,
            field,
            session_id: payload.session_id,
        });
        Ok(())
    }

    async fn on_session_stop(&self, payload: SessionStop) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        if !ctx.owns_user(&payload.user_id) {
            debug!(channel = "session_stop", "dropping foreign event");
            return Ok(());
        }

        self.spawn_mark_topic_completed(&ctx);
        self.lock_state().lifecycle.on_daily_stop();
        self.popup(
            PopupKind::Info,
            "Your daily session has ended. Great progress today! See you tomorrow.",
        );
        Ok(())
    }

    async fn on_intro_session_stop(&self, payload: SessionStop) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        if !ctx.owns_user(&payload.user_id) {
            debug!(channel = "intro_session_stop", "dropping foreign event");
            return Ok(());
        }

        self.spawn_mark_topic_completed(&ctx);
        self.lock_state().lifecycle.on_intro_stop();
        self.popup(
            PopupKind::Info,
            "Introduction completed! Your learning journey begins.",
        );
        Ok(())
    }

    async fn on_status_update(&self, payload: SessionStatusUpdate) -> Result<(), EngineError> {
        let Some(ctx) = self.contexts.load().await? else {
            return Ok(());
        };
        if !ctx.owns_user(&payload.user_id) || !ctx.owns_field(&payload.field) {
            debug!(channel = "session_status_update", "dropping foreign event");
            return Ok(());
        }

        self.lock_state().lifecycle.apply_status_update(
            payload.session_status,
            payload.intro_active,
            payload.lesson_active,
        );
        Ok(())
    }

    // ─── Helpers ───────────────────────────────────────────────────────────

    /// Persist a learned user name and/or session id as a whole-record
    /// replacement. No write when nothing changed.
    async fn persist_context_updates(
        &self,
        ctx: &SessionContext,
        name: Option<&str>,
        session_id: &mentor_core::model::SessionId,
    ) -> Result<(), EngineError> {
        let mut updated = ctx.clone();
        if let Some(name) = name {
            updated = updated.with_user_name(name);
        }
        if updated.session_id() != Some(session_id) {
            updated = updated.with_session_id(session_id.clone());
        }
        if &updated != ctx {
            self.contexts.save(&updated).await?;
        }
        Ok(())
    }

    /// A content event for a session other than the tracked one means a new
    /// session took over; the caller resets the display. Updates the tracked
    /// id either way.
    fn begins_new_session(
        state: &mut crate::engine::EngineState,
        session_id: &mentor_core::model::SessionId,
    ) -> bool {
        let is_new = state
            .current_session_id
            .as_ref()
            .is_some_and(|current| current != session_id);
        state.current_session_id = Some(session_id.clone());
        is_new
    }

    /// Fire-and-forget completion marker for the topic being read. Failures
    /// are logged, never surfaced.
    fn spawn_mark_topic_completed(&self, ctx: &SessionContext) {
        let Some(topic) = self.lock_state().active_topic.clone() else {
            debug!("no active topic to mark completed");
            return;
        };
        let api = self.api.clone();
        let user_id = ctx.user_id().clone();
        let field = ctx.field().clone();
        tokio::spawn(async move {
            if let Err(err) = api.lesson_view_completed(&user_id, &field, &topic).await {
                warn!(error = %err, "failed to mark topic completed");
            }
        });
    }
}

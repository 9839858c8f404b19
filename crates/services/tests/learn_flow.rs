//! End-to-end dispatch scenarios: stream events in, reconciled tree, blocks,
//! typing and lifecycle state out.

use mentor_core::model::{
    ContentBlock, DoubtAnswer, FieldName, IntroductionGenerated, LessonDelivered,
    RoadmapGenerated, SessionId, SessionStart, SessionStatus, SessionStatusUpdate, SessionStop,
    StreamEvent, UserId,
};
use mentor_core::time::fixed_clock;
use mentor_core::typing::TickOutcome;
use services::{ApiClient, BackendConfig, LearnEngine};
use storage::repository::{SessionContextRepository, Storage, TopicCacheRepository};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn engine_at(base_url: &str) -> (LearnEngine, Storage) {
    let storage = Storage::in_memory();
    let context =
        mentor_core::model::SessionContext::new(UserId::new("u1"), FieldName::new("AI")).unwrap();
    storage.contexts.save(&context).await.unwrap();

    let api = ApiClient::new(BackendConfig::new(base_url).unwrap());
    let engine = LearnEngine::new(api, &storage, fixed_clock());
    (engine, storage)
}

async fn engine() -> (LearnEngine, Storage) {
    // No test in this group performs HTTP; port 9 is the discard port.
    engine_at("http://127.0.0.1:9").await
}

fn intro_event(session_id: &str, introduction: &str) -> StreamEvent {
    StreamEvent::IntroductionGenerated(IntroductionGenerated {
        user_id: UserId::new("u1"),
        field: FieldName::new("AI"),
        session_id: SessionId::new(session_id),
        session_day: Some("Day_01".to_string()),
        topic: None,
        introduction: introduction.to_string(),
        name: None,
    })
}

fn lesson_event(session_id: &str, topic: &str, lesson: &str) -> StreamEvent {
    StreamEvent::LessonDelivered(LessonDelivered {
        user_id: UserId::new("u1"),
        field: FieldName::new("AI"),
        session_id: SessionId::new(session_id),
        topic: topic.to_string(),
        lesson: lesson.to_string(),
        path: None,
        name: None,
    })
}

fn drain_typing(engine: &LearnEngine) {
    for _ in 0..100_000 {
        if engine.tick_typing() == TickOutcome::Idle {
            return;
        }
    }
    panic!("typing queue did not drain");
}

#[tokio::test]
async fn introduction_builds_block_and_tree() {
    let (engine, _storage) = engine().await;

    engine
        .handle_event(intro_event("S1", "Welcome."))
        .await
        .unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.blocks.len(), 1);
    match &snapshot.blocks[0].block {
        ContentBlock::Intro(intro) => {
            assert_eq!(intro.id, "INTRO_S1");
            assert_eq!(intro.content, "Welcome.");
            assert_eq!(intro.session_day.as_deref(), Some("Day_01"));
        }
        other => panic!("expected intro block, got {other:?}"),
    }

    let fields = snapshot.tree.fields();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].field, FieldName::new("AI"));
    assert_eq!(fields[0].sessions[0].session_id, SessionId::new("S1"));

    drain_typing(&engine);
    assert_eq!(engine.snapshot().blocks[0].revealed, "Welcome.");
}

#[tokio::test]
async fn introduction_persists_learned_session_and_name() {
    let (engine, storage) = engine().await;

    let mut event = match intro_event("S1", "Welcome.") {
        StreamEvent::IntroductionGenerated(p) => p,
        _ => unreachable!(),
    };
    event.name = Some("Ada".to_string());
    engine
        .handle_event(StreamEvent::IntroductionGenerated(event))
        .await
        .unwrap();

    let ctx = storage.contexts.load().await.unwrap().unwrap();
    assert_eq!(ctx.session_id(), Some(&SessionId::new("S1")));
    assert_eq!(ctx.user_name(), Some("Ada"));
}

#[tokio::test]
async fn roadmap_extends_intro_without_retyping() {
    let (engine, _storage) = engine().await;

    engine
        .handle_event(intro_event("S1", "Welcome."))
        .await
        .unwrap();
    drain_typing(&engine);

    engine
        .handle_event(StreamEvent::RoadmapGenerated(RoadmapGenerated {
            user_id: UserId::new("u1"),
            field: FieldName::new("AI"),
            session_id: SessionId::new("S1"),
            roadmap: "1. Basics\n2. Advanced".to_string(),
        }))
        .await
        .unwrap();

    // Immediately after the roadmap arrives, the intro text is still fully
    // shown; nothing was reset to zero.
    let snapshot = engine.snapshot();
    assert!(snapshot.blocks[0].revealed.starts_with("Welcome."));

    match &snapshot.blocks[0].block {
        ContentBlock::Intro(intro) => {
            assert!(intro.content.starts_with("Welcome.\n\n---\n\n## Learning Roadmap"));
            assert!(intro.content.contains("1. Basics"));
            assert_eq!(intro.roadmap.as_deref(), Some("1. Basics\n2. Advanced"));
            assert_eq!(intro.introduction.as_deref(), Some("Welcome."));
        }
        other => panic!("expected intro block, got {other:?}"),
    }

    drain_typing(&engine);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.blocks[0].revealed, snapshot.blocks[0].block.content());
}

#[tokio::test]
async fn lesson_before_intro_still_builds_the_tree() {
    let (engine, _storage) = engine().await;

    engine
        .handle_event(lesson_event("S1", "Basics", "Lesson text."))
        .await
        .unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.blocks.len(), 1);
    match &snapshot.blocks[0].block {
        ContentBlock::Lesson(lesson) => {
            assert!(lesson.id.starts_with("LESSON_S1_Basics_"));
            assert_eq!(lesson.content, "Lesson text.");
            assert_eq!(lesson.path, vec!["Basics".to_string()]);
        }
        other => panic!("expected lesson block, got {other:?}"),
    }

    let fields = snapshot.tree.fields();
    assert_eq!(fields[0].sessions[0].topics[0].title, "Basics");
}

#[tokio::test]
async fn lesson_is_cached_under_normalized_topic_key() {
    let (engine, storage) = engine().await;

    engine
        .handle_event(lesson_event("S1", "Neural Networks", "All about nets."))
        .await
        .unwrap();

    assert_eq!(
        storage.topic_cache.get("neural_networks").await.unwrap().as_deref(),
        Some("All about nets.")
    );
    assert_eq!(
        engine.cached_topic("Neural Networks").await.unwrap().as_deref(),
        Some("All about nets.")
    );
}

#[tokio::test]
async fn duplicate_lesson_is_a_noop() {
    let (engine, _storage) = engine().await;

    engine
        .handle_event(lesson_event("S1", "Basics", "Lesson text."))
        .await
        .unwrap();
    engine
        .handle_event(lesson_event("S1", "Basics", "Lesson text."))
        .await
        .unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.blocks.len(), 1);
    assert_eq!(
        snapshot.tree.fields()[0].sessions[0].topics.len(),
        1,
        "tree merge must be idempotent"
    );
}

#[tokio::test]
async fn foreign_events_change_nothing() {
    let (engine, storage) = engine().await;

    let foreign_user = StreamEvent::IntroductionGenerated(IntroductionGenerated {
        user_id: UserId::new("someone-else"),
        field: FieldName::new("AI"),
        session_id: SessionId::new("S1"),
        session_day: None,
        topic: None,
        introduction: "Not yours.".to_string(),
        name: None,
    });
    engine.handle_event(foreign_user).await.unwrap();

    let foreign_field = StreamEvent::LessonDelivered(LessonDelivered {
        user_id: UserId::new("u1"),
        field: FieldName::new("Math"),
        session_id: SessionId::new("S1"),
        topic: "Algebra".to_string(),
        lesson: "Not your field.".to_string(),
        path: None,
        name: None,
    });
    engine.handle_event(foreign_field).await.unwrap();

    let snapshot = engine.snapshot();
    assert!(snapshot.tree.is_empty());
    assert!(snapshot.blocks.is_empty());
    assert_eq!(snapshot.lifecycle, Default::default());

    // The context must not have learned a session id from foreign traffic.
    let ctx = storage.contexts.load().await.unwrap().unwrap();
    assert_eq!(ctx.session_id(), None);
}

#[tokio::test]
async fn new_session_id_resets_the_display() {
    let (engine, storage) = engine().await;

    engine
        .handle_event(lesson_event("S1", "Basics", "Old content."))
        .await
        .unwrap();
    engine
        .handle_event(lesson_event("S2", "Fresh Topic", "New content."))
        .await
        .unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.blocks.len(), 1, "old session blocks are cleared");
    assert_eq!(snapshot.blocks[0].block.session_id(), &SessionId::new("S2"));

    // The tree keeps both sessions; only the display resets.
    assert_eq!(snapshot.tree.fields()[0].sessions.len(), 2);

    let ctx = storage.contexts.load().await.unwrap().unwrap();
    assert_eq!(ctx.session_id(), Some(&SessionId::new("S2")));
}

#[tokio::test]
async fn status_update_overwrites_lifecycle() {
    let (engine, _storage) = engine().await;

    engine
        .handle_event(StreamEvent::SessionStatusUpdate(SessionStatusUpdate {
            user_id: UserId::new("u1"),
            field: FieldName::new("AI"),
            session_status: SessionStatus::Blue,
            intro_active: true,
            lesson_active: false,
        }))
        .await
        .unwrap();

    let lifecycle = engine.snapshot().lifecycle;
    assert_eq!(lifecycle.status, SessionStatus::Blue);
    assert!(lifecycle.intro_active);
    assert!(!lifecycle.daily_active);
    assert!(lifecycle.is_active());
}

#[tokio::test]
async fn session_stop_marks_exactly_one_topic_completed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/lesson-view-completed"))
        .and(body_json(serde_json::json!({
            "user_id": "u1",
            "field": "AI",
            "subtopic": "Basics",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success"
        })))
        .mount(&server)
        .await;

    let (engine, _storage) = engine_at(&server.uri()).await;

    engine
        .handle_event(StreamEvent::SessionStatusUpdate(SessionStatusUpdate {
            user_id: UserId::new("u1"),
            field: FieldName::new("AI"),
            session_status: SessionStatus::Green,
            intro_active: false,
            lesson_active: true,
        }))
        .await
        .unwrap();
    engine
        .handle_event(lesson_event("S1", "Basics", "Lesson text."))
        .await
        .unwrap();

    engine
        .handle_event(StreamEvent::SessionStop(SessionStop {
            user_id: UserId::new("u1"),
        }))
        .await
        .unwrap();

    let lifecycle = engine.snapshot().lifecycle;
    assert!(!lifecycle.daily_active);
    assert_eq!(lifecycle.status, SessionStatus::Red);

    // The completion marker is fire-and-forget; give it a moment to land.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let hits = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/lesson-view-completed")
        .count();
    assert_eq!(hits, 1);
}

#[tokio::test]
async fn intro_stop_keeps_green_when_daily_is_running() {
    let (engine, _storage) = engine().await;

    engine
        .handle_event(StreamEvent::SessionStatusUpdate(SessionStatusUpdate {
            user_id: UserId::new("u1"),
            field: FieldName::new("AI"),
            session_status: SessionStatus::Blue,
            intro_active: true,
            lesson_active: true,
        }))
        .await
        .unwrap();

    engine
        .handle_event(StreamEvent::IntroSessionStop(SessionStop {
            user_id: UserId::new("u1"),
        }))
        .await
        .unwrap();

    let lifecycle = engine.snapshot().lifecycle;
    assert!(!lifecycle.intro_active);
    assert!(lifecycle.daily_active);
    assert_eq!(lifecycle.status, SessionStatus::Green);
}

#[tokio::test]
async fn doubt_answers_reach_subscribers_for_own_session_only() {
    let (engine, _storage) = engine().await;
    let mut doubts = engine.subscribe_doubts();

    // Teach the context its session id first.
    engine
        .handle_event(lesson_event("S1", "Basics", "Lesson text."))
        .await
        .unwrap();

    // Wrong session: silently dropped.
    engine
        .handle_event(StreamEvent::DoubtAnswer(DoubtAnswer {
            user_id: UserId::new("u1"),
            session_id: SessionId::new("OTHER"),
            question: "?".to_string(),
            answer: "not yours".to_string(),
        }))
        .await
        .unwrap();

    engine
        .handle_event(StreamEvent::DoubtAnswer(DoubtAnswer {
            user_id: UserId::new("u1"),
            session_id: SessionId::new("S1"),
            question: "What is search?".to_string(),
            answer: "Looking for things.".to_string(),
        }))
        .await
        .unwrap();

    let delivered = doubts.recv().await.unwrap();
    assert_eq!(delivered.answer, "Looking for things.");
    assert!(doubts.try_recv().is_err(), "foreign answer must not arrive");
}

#[tokio::test]
async fn session_start_prompts_and_accept_rebuilds_tree() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/leftside/details"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "data": [
                {
                    "field": "AI",
                    "sessions": [
                        { "session_id": "S1", "day": "Day_01", "topics": ["Basics"] }
                    ]
                }
            ]
        })))
        .mount(&server)
        .await;

    let (engine, storage) = engine_at(&server.uri()).await;

    engine
        .handle_event(StreamEvent::SessionStart(SessionStart {
            user_id: UserId::new("u1"),
            field: None,
            session_id: SessionId::new("S2"),
        }))
        .await
        .unwrap();

    let pending = engine.snapshot().pending_session.expect("prompt pending");
    assert_eq!(pending.session_id, SessionId::new("S2"));
    assert_eq!(pending.field, FieldName::new("AI"));

    let field = engine.accept_new_session().await.unwrap();
    assert_eq!(field, Some(FieldName::new("AI")));

    let snapshot = engine.snapshot();
    assert!(snapshot.pending_session.is_none());
    assert!(snapshot.lifecycle.daily_active);
    assert_eq!(snapshot.lifecycle.status, SessionStatus::Green);

    // Rebuilt from the profile plus a loading placeholder for the new session.
    let sessions = &snapshot.tree.fields()[0].sessions;
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].session_id, SessionId::new("S1"));
    assert_eq!(sessions[1].session_id, SessionId::new("S2"));
    assert!(sessions[1].is_loading);

    let ctx = storage.contexts.load().await.unwrap().unwrap();
    assert_eq!(ctx.session_id(), Some(&SessionId::new("S2")));
}

#[tokio::test]
async fn decline_clears_the_prompt_without_side_effects() {
    let (engine, storage) = engine().await;

    engine
        .handle_event(StreamEvent::SessionStart(SessionStart {
            user_id: UserId::new("u1"),
            field: None,
            session_id: SessionId::new("S2"),
        }))
        .await
        .unwrap();

    engine.decline_new_session();

    let snapshot = engine.snapshot();
    assert!(snapshot.pending_session.is_none());
    assert!(!snapshot.lifecycle.is_active());

    let ctx = storage.contexts.load().await.unwrap().unwrap();
    assert_eq!(ctx.session_id(), None, "declining must not adopt the session");
}

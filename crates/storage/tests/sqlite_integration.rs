use mentor_core::model::{FieldName, SessionContext, SessionId, UserId};
use mentor_core::time::fixed_now;
use storage::repository::{
    LoginStampRepository, SessionContextRepository, Storage, TopicCacheRepository,
};
use storage::sqlite::SqliteRepository;

fn build_context() -> SessionContext {
    SessionContext::new(UserId::new("u1"), FieldName::new("AI"))
        .unwrap()
        .with_session_id(SessionId::new("S1"))
        .with_user_name("Ada")
}

#[tokio::test]
async fn sqlite_round_trips_the_whole_client_state() {
    let storage = Storage::sqlite("sqlite:file:memdb_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect + migrate");

    storage.contexts.save(&build_context()).await.unwrap();
    storage
        .topic_cache
        .put("graph_search", "lesson markdown")
        .await
        .unwrap();
    storage.login_stamps.record_login(fixed_now()).await.unwrap();

    let ctx = storage.contexts.load().await.unwrap().expect("context");
    assert_eq!(ctx.user_id(), &UserId::new("u1"));
    assert_eq!(ctx.session_id(), Some(&SessionId::new("S1")));
    assert_eq!(ctx.user_name(), Some("Ada"));

    assert_eq!(
        storage.topic_cache.get("graph_search").await.unwrap().as_deref(),
        Some("lesson markdown")
    );
    assert_eq!(storage.login_stamps.last_login().await.unwrap(), Some(fixed_now()));
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first run");
    repo.migrate().await.expect("second run is a no-op");
}

//! Cross-module contract: the full `Store` bundle (credentials, sessions,
//! users, locks) wired together against one pool, the way `bootstrap`
//! constructs it for the running gateway.

use sa_domain::message::Role as MessageRole;
use sa_store::users::Role as UserRole;
use sa_store::Store;
use sqlx::SqlitePool;

async fn store() -> Store {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    sa_store::migrate::run(&pool).await.unwrap();
    Store::new(pool, [7u8; 32])
}

#[tokio::test]
async fn a_users_credentials_and_session_flow_shares_one_pool() {
    let store = store().await;

    let user = store.users.create("alice", "hunter2", UserRole::User).await.unwrap();
    assert_eq!(user.user_id, "alice");
    assert!(store.users.authenticate("alice", "hunter2").await.unwrap().is_some());

    store.credentials.store(&user.user_id, "provider-a", "sk-test").await.unwrap();
    let key = store.credentials.retrieve(&user.user_id, "provider-a").await.unwrap();
    assert_eq!(key, Some("sk-test".to_string()));

    let session_id = store.sessions.create_session(&user.user_id, Some("first chat")).await.unwrap();
    store
        .sessions
        .append_message(&session_id, &user.user_id, MessageRole::User, "hi", None, None, None)
        .await
        .unwrap();

    let session = store.sessions.get_session(&session_id, &user.user_id).await.unwrap();
    assert_eq!(session.name, "first chat");

    // Ownership is per-user even though every store shares the same pool.
    let err = store.sessions.get_session(&session_id, "bob").await.unwrap_err();
    assert!(matches!(err, sa_domain::error::Error::Forbidden));
}

#[tokio::test]
async fn session_lock_brackets_a_branch_without_blocking_other_sessions() {
    let store = store().await;
    let user_id = "alice";
    store.users.create(user_id, "hunter2", UserRole::User).await.unwrap();

    let session_id = store.sessions.create_session(user_id, None).await.unwrap();
    let other_session_id = store.sessions.create_session(user_id, None).await.unwrap();

    let guard = store.locks.acquire(&session_id).await;

    // A concurrent turn on a different session isn't blocked by the held lock.
    let other_guard = store.locks.acquire(&other_session_id).await;
    assert_eq!(store.locks.session_count(), 2);
    drop(other_guard);

    let m1 = store
        .sessions
        .append_message(&session_id, user_id, MessageRole::User, "m1", None, None, None)
        .await
        .unwrap();
    drop(guard);

    let branch_id = store.sessions.branch_session(&session_id, user_id, m1, Some("branch")).await.unwrap();
    let branch_messages = store.sessions.list_messages(&branch_id, user_id, None, None).await.unwrap();
    assert_eq!(branch_messages.len(), 1);
    assert_eq!(branch_messages[0].content, "m1");
}

//! Concurrent tool calls and per-request sessions.
//!
//! Each call runs in its own task with its own session, as it would under the
//! HTTP transport. Results must never cross between callers.

use pg_schema_mcp::config::{DatabaseSettings, PoolOptions};
use pg_schema_mcp::db::{ConnectionPool, ReadOnlyExecutor};
use pg_schema_mcp::mcp::{SessionFactory, SessionState};
use pg_schema_mcp::tools::query::{QueryInput, QueryToolHandler};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

async fn setup_pool(max_connections: u32) -> (NamedTempFile, Arc<ConnectionPool>) {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let url = format!("sqlite:{}", file.path().display());

    let seed = sqlx::SqlitePool::connect(&url).await.unwrap();
    sqlx::query("CREATE TABLE numbers (n INTEGER PRIMARY KEY)")
        .execute(&seed)
        .await
        .unwrap();
    sqlx::query(
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 100) \
         INSERT INTO numbers SELECT x FROM c",
    )
    .execute(&seed)
    .await
    .unwrap();
    seed.close().await;

    let settings = DatabaseSettings::new(url).with_pool_options(PoolOptions {
        max_connections: Some(max_connections),
        ..Default::default()
    });
    (file, Arc::new(ConnectionPool::from_settings(&settings)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_do_not_cross_talk() {
    let (_file, pool) = setup_pool(4).await;
    let executor = Arc::new(ReadOnlyExecutor::new(Arc::clone(&pool), Duration::from_secs(10)));

    let mut tasks = Vec::new();
    for i in 1..=32i64 {
        let handler = QueryToolHandler::new(Arc::clone(&executor));
        tasks.push(tokio::spawn(async move {
            let result = handler
                .call(QueryInput {
                    sql: format!("SELECT n FROM numbers WHERE n = {}", i),
                })
                .await;
            (i, result)
        }));
    }

    for task in tasks {
        let (i, result) = task.await.unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(
            result.structured_content,
            Some(json!({ "result": [ { "n": i } ] })),
            "call {} received another caller's rows",
            i
        );
    }

    assert_eq!(pool.checked_out(), 0);
    assert_eq!(pool.stats().acquired, 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failures_do_not_affect_concurrent_reads() {
    let (_file, pool) = setup_pool(2).await;
    let executor = Arc::new(ReadOnlyExecutor::new(Arc::clone(&pool), Duration::from_secs(10)));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let handler = QueryToolHandler::new(Arc::clone(&executor));
        tasks.push(tokio::spawn(async move {
            let sql = if i % 2 == 0 {
                "DELETE FROM numbers".to_string()
            } else {
                "SELECT COUNT(*) AS total FROM numbers".to_string()
            };
            (i, handler.call(QueryInput { sql }).await)
        }));
    }

    for task in tasks {
        let (i, result) = task.await.unwrap();
        if i % 2 == 0 {
            assert_eq!(result.is_error, Some(true));
        } else {
            assert_eq!(
                result.structured_content,
                Some(json!({ "result": [ { "total": 100 } ] }))
            );
        }
    }

    assert_eq!(pool.checked_out(), 0);
}

#[tokio::test]
async fn test_each_request_gets_its_own_session() {
    let (_file, pool) = setup_pool(1).await;
    let factory = SessionFactory::new(pool, Duration::from_secs(10));

    let first = factory.create();
    let second = factory.create();
    assert_ne!(first.lifecycle().id(), second.lifecycle().id());
    assert_eq!(first.lifecycle().state(), SessionState::Created);
    assert_eq!(factory.live_sessions(), 2);

    drop(first);
    assert_eq!(factory.live_sessions(), 1);
    drop(second);
    assert_eq!(factory.live_sessions(), 0);
    assert_eq!(factory.sessions_created(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_created_from_many_tasks_all_close() {
    let (_file, pool) = setup_pool(1).await;
    let factory = SessionFactory::new(pool, Duration::from_secs(10));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let factory = factory.clone();
        tasks.push(tokio::spawn(async move {
            let session = factory.create();
            session.lifecycle().bind();
            session.lifecycle().state()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), SessionState::Bound);
    }

    assert_eq!(factory.sessions_created(), 20);
    assert_eq!(factory.live_sessions(), 0);
}

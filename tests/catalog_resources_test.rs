//! Integration tests for the table schema resources.
//!
//! Uses a throwaway SQLite file seeded through a separate writable pool; the
//! server pool itself opens the file read-only.

use pg_schema_mcp::config::DatabaseSettings;
use pg_schema_mcp::db::ConnectionPool;
use pg_schema_mcp::error::DbError;
use pg_schema_mcp::models::ColumnDescriptor;
use pg_schema_mcp::resources::TableSchemaResources;
use pg_schema_mcp::resources::table_schema::to_resource;
use rmcp::model::ResourceContents;
use sqlx::Row;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

/// Helper to create a seeded database and a resource provider over it
async fn setup_resources() -> (NamedTempFile, Arc<ConnectionPool>, TableSchemaResources) {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let url = format!("sqlite:{}", file.path().display());

    let seed = sqlx::SqlitePool::connect(&url).await.unwrap();
    for sql in [
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email VARCHAR(255))",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER, total REAL)",
        "INSERT INTO users (id, name, email) VALUES (1, 'ada', 'ada@example.com')",
    ] {
        sqlx::query(sql).execute(&seed).await.unwrap();
    }
    seed.close().await;

    let pool = Arc::new(ConnectionPool::from_settings(&DatabaseSettings::new(url)));
    let resources = TableSchemaResources::new(Arc::clone(&pool));
    (file, pool, resources)
}

#[tokio::test]
async fn test_list_yields_one_resource_per_table() {
    let (_file, pool, resources) = setup_resources().await;

    let uris: Vec<String> = resources
        .list()
        .await
        .iter()
        .map(to_resource)
        .map(|r| r.uri.clone())
        .collect();

    assert_eq!(uris, vec!["table://orders/schema", "table://users/schema"]);
    assert_eq!(pool.checked_out(), 0);
}

#[tokio::test]
async fn test_listed_resource_metadata() {
    let (_file, _pool, resources) = setup_resources().await;

    let listed = resources.list().await;
    let users = listed
        .iter()
        .map(to_resource)
        .find(|r| r.uri == "table://users/schema")
        .expect("users resource should be listed");

    assert_eq!(users.name, "\"users\" database schema");
    assert_eq!(users.mime_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_read_matches_catalog_column_listing() {
    let (file, pool, resources) = setup_resources().await;

    let columns = assert_ok!(resources.read("table://users/schema").await);
    assert_eq!(
        columns,
        vec![
            ColumnDescriptor::new("id", "INTEGER"),
            ColumnDescriptor::new("name", "TEXT"),
            ColumnDescriptor::new("email", "VARCHAR(255)"),
        ]
    );

    // Same listing straight from the catalog
    let url = format!("sqlite:{}", file.path().display());
    let direct = sqlx::SqlitePool::connect(&url).await.unwrap();
    let rows = sqlx::query("SELECT name FROM pragma_table_info('users') ORDER BY cid")
        .fetch_all(&direct)
        .await
        .unwrap();
    let names: Vec<String> = rows.iter().map(|r| r.get("name")).collect();
    let read_names: Vec<String> = columns.into_iter().map(|c| c.column_name).collect();
    assert_eq!(read_names, names);

    assert_eq!(pool.checked_out(), 0);
}

#[tokio::test]
async fn test_read_contents_is_pretty_json_tagged_with_uri() {
    let (_file, _pool, resources) = setup_resources().await;

    let result = assert_ok!(resources.read_contents("table://orders/schema").await);
    assert_eq!(result.contents.len(), 1);

    let ResourceContents::TextResourceContents {
        uri,
        mime_type,
        text,
        ..
    } = &result.contents[0]
    else {
        panic!("expected text contents");
    };
    assert_eq!(uri, "table://orders/schema");
    assert_eq!(mime_type.as_deref(), Some("application/json"));
    assert!(text.contains('\n'), "schema text should be pretty-printed");

    let parsed: serde_json::Value = serde_json::from_str(text).unwrap();
    assert_eq!(parsed[0]["column_name"], "id");
    assert_eq!(parsed[2]["data_type"], "REAL");
}

#[tokio::test]
async fn test_unknown_table_reads_as_empty_list() {
    let (_file, pool, resources) = setup_resources().await;

    let columns = assert_ok!(resources.read("table://missing/schema").await);
    assert!(columns.is_empty());
    assert_eq!(pool.checked_out(), 0);
}

#[tokio::test]
async fn test_invalid_segment_rejected_without_acquire() {
    let (_file, pool, resources) = setup_resources().await;

    for uri in ["table://users/columns", "table://users", "users/schema"] {
        let err = assert_err!(resources.read(uri).await);
        assert!(
            matches!(err, DbError::InvalidResourceUri { .. }),
            "unexpected error for {}: {}",
            uri,
            err
        );
    }
    assert_eq!(pool.stats().acquired, 0);
}

#[tokio::test]
async fn test_list_degrades_when_database_unreachable() {
    // Nothing listens on port 1
    let settings = DatabaseSettings::new("postgres://u:p@127.0.0.1:1/db")
        .with_pool_options(pg_schema_mcp::config::PoolOptions {
            acquire_timeout_secs: Some(1),
            ..Default::default()
        });
    let pool = Arc::new(ConnectionPool::from_settings(&settings));
    let resources = TableSchemaResources::new(Arc::clone(&pool));

    assert!(resources.list().await.is_empty());
    assert_eq!(pool.checked_out(), 0);
}

#[tokio::test]
async fn test_read_propagates_connect_failure() {
    let pool = Arc::new(ConnectionPool::unconfigured("no database"));
    let resources = TableSchemaResources::new(pool);

    let err = assert_err!(resources.read("table://users/schema").await);
    assert!(matches!(err, DbError::ConnectFailed { .. }));
}

#[tokio::test]
async fn test_tables_with_slash_are_not_listed() {
    let (file, _pool, resources) = setup_resources().await;

    let url = format!("sqlite:{}", file.path().display());
    let seed = sqlx::SqlitePool::connect(&url).await.unwrap();
    sqlx::query("CREATE TABLE \"sales/2024\" (id INTEGER)")
        .execute(&seed)
        .await
        .unwrap();
    seed.close().await;

    let listed = resources.list().await;
    let uris: Vec<String> = listed.iter().map(|t| t.uri()).collect();
    assert_eq!(uris, vec!["table://orders/schema", "table://users/schema"]);

    for uri in &uris {
        assert_ok!(resources.read(uri).await);
    }
}

//! Catalog introspection.
//!
//! Lists the tables of the default schema and describes their columns for
//! SQLite, PostgreSQL and MySQL. Every function works on a leased
//! [`PooledConnection`]; the caller owns acquire and release.
//!
//! # Architecture
//!
//! SQL queries are kept in the `queries` submodule with one constant per
//! database type. Engine-specific row handling lives in the `postgres`,
//! `mysql` and `sqlite` submodules, each exposing the same interface.

use crate::db::pool::{Connection, PooledConnection};
use crate::error::DbResult;
use crate::models::ColumnDescriptor;
use tracing::debug;

/// Schema inspector for catalog introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Base tables of the default schema, ordered by name.
    pub async fn list_tables(conn: &mut PooledConnection) -> DbResult<Vec<String>> {
        let tables = match conn.connection() {
            Connection::Postgres(c) => postgres::list_tables(c).await?,
            Connection::MySql(c) => mysql::list_tables(c).await?,
            Connection::SQLite(c) => sqlite::list_tables(c).await?,
        };
        debug!(count = tables.len(), "Listed catalog tables");
        Ok(tables)
    }

    /// Columns of `table` in ordinal order. An unknown table yields an empty list.
    ///
    /// The identifier is bound as a parameter, never interpolated.
    pub async fn describe_columns(
        conn: &mut PooledConnection,
        table: &str,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let columns = match conn.connection() {
            Connection::Postgres(c) => postgres::describe_columns(c, table).await?,
            Connection::MySql(c) => mysql::describe_columns(c, table).await?,
            Connection::SQLite(c) => sqlite::describe_columns(c, table).await?,
        };
        debug!(table, count = columns.len(), "Described table columns");
        Ok(columns)
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        // information_schema exposes domain types (sql_identifier, character_data)
        // that only decode as text after a cast.
        pub const LIST_TABLES: &str = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                column_name::text AS column_name,
                data_type::text AS data_type
            FROM information_schema.columns
            WHERE table_name = $1
            AND table_schema = 'public'
            ORDER BY ordinal_position
            "#;
    }

    pub mod mysql {
        // MySQL 8 returns upper-case column labels from information_schema
        pub const LIST_TABLES: &str = r#"
            SELECT CAST(TABLE_NAME AS CHAR) AS table_name
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR) AS column_name,
                CAST(DATA_TYPE AS CHAR) AS data_type
            FROM information_schema.COLUMNS
            WHERE TABLE_NAME = ?
            AND TABLE_SCHEMA = DATABASE()
            ORDER BY ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES: &str = r#"
            SELECT name AS table_name
            FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT name AS column_name, type AS data_type
            FROM pragma_table_info(?1)
            ORDER BY cid
            "#;
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgConnection, Row};

    pub async fn list_tables(conn: &mut PgConnection) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .fetch_all(conn)
            .await?;
        rows.iter()
            .map(|row| -> DbResult<String> { Ok(row.try_get("table_name")?) })
            .collect()
    }

    pub async fn describe_columns(
        conn: &mut PgConnection,
        table: &str,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(conn)
            .await?;
        rows.iter()
            .map(|row| -> DbResult<ColumnDescriptor> {
                Ok(ColumnDescriptor::new(
                    row.try_get::<String, _>("column_name")?,
                    row.try_get::<String, _>("data_type")?,
                ))
            })
            .collect()
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlConnection, Row};

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_string(row: &MySqlRow, column: &str) -> String {
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .unwrap_or_default()
    }

    pub async fn list_tables(conn: &mut MySqlConnection) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .fetch_all(conn)
            .await?;
        Ok(rows
            .iter()
            .map(|row| get_string(row, "table_name"))
            .filter(|name| !name.is_empty())
            .collect())
    }

    pub async fn describe_columns(
        conn: &mut MySqlConnection,
        table: &str,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(conn)
            .await?;
        Ok(rows
            .iter()
            .map(|row| ColumnDescriptor::new(get_string(row, "column_name"), get_string(row, "data_type")))
            .collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqliteConnection};

    pub async fn list_tables(conn: &mut SqliteConnection) -> DbResult<Vec<String>> {
        let rows = sqlx::query(queries::sqlite::LIST_TABLES)
            .fetch_all(conn)
            .await?;
        rows.iter()
            .map(|row| -> DbResult<String> { Ok(row.try_get("table_name")?) })
            .collect()
    }

    pub async fn describe_columns(
        conn: &mut SqliteConnection,
        table: &str,
    ) -> DbResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(queries::sqlite::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(conn)
            .await?;
        rows.iter()
            .map(|row| -> DbResult<ColumnDescriptor> {
                // Columns declared without a type report an empty string
                let data_type: Option<String> = row.try_get("data_type")?;
                Ok(ColumnDescriptor::new(
                    row.try_get::<String, _>("column_name")?,
                    data_type.unwrap_or_default(),
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseSettings;
    use crate::db::pool::ConnectionPool;
    use tempfile::NamedTempFile;

    async fn seeded_pool(file: &NamedTempFile) -> ConnectionPool {
        let url = format!("sqlite:{}", file.path().display());
        let seed = sqlx::SqlitePool::connect(&url).await.unwrap();
        sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, joined DATE)")
            .execute(&seed)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE orders (id INTEGER, total NUMERIC)")
            .execute(&seed)
            .await
            .unwrap();
        sqlx::query("CREATE VIEW big_orders AS SELECT * FROM orders WHERE total > 100")
            .execute(&seed)
            .await
            .unwrap();
        seed.close().await;
        ConnectionPool::from_settings(&DatabaseSettings::new(url))
    }

    #[tokio::test]
    async fn test_list_tables_sorted_without_views() {
        let file = NamedTempFile::new().unwrap();
        let pool = seeded_pool(&file).await;
        let mut conn = pool.acquire().await.unwrap();
        let tables = SchemaInspector::list_tables(&mut conn).await.unwrap();
        assert_eq!(tables, vec!["orders".to_string(), "users".to_string()]);
    }

    #[tokio::test]
    async fn test_describe_columns_in_ordinal_order() {
        let file = NamedTempFile::new().unwrap();
        let pool = seeded_pool(&file).await;
        let mut conn = pool.acquire().await.unwrap();
        let columns = SchemaInspector::describe_columns(&mut conn, "users")
            .await
            .unwrap();
        assert_eq!(
            columns,
            vec![
                ColumnDescriptor::new("id", "INTEGER"),
                ColumnDescriptor::new("name", "TEXT"),
                ColumnDescriptor::new("joined", "DATE"),
            ]
        );
    }

    #[tokio::test]
    async fn test_describe_unknown_table_is_empty() {
        let file = NamedTempFile::new().unwrap();
        let pool = seeded_pool(&file).await;
        let mut conn = pool.acquire().await.unwrap();
        let columns = SchemaInspector::describe_columns(&mut conn, "missing")
            .await
            .unwrap();
        assert!(columns.is_empty());
    }

    #[tokio::test]
    async fn test_identifier_is_bound_not_interpolated() {
        let file = NamedTempFile::new().unwrap();
        let pool = seeded_pool(&file).await;
        let mut conn = pool.acquire().await.unwrap();
        let columns = SchemaInspector::describe_columns(&mut conn, "users') --")
            .await
            .unwrap();
        assert!(columns.is_empty());
    }
}

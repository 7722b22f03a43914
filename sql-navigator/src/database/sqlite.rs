//! SQLite database provider implementation

use crate::database::traits::{DatabaseProvider, Execution};
use crate::decoder::SqlValue;
use crate::dialect::{render, DialectKind, SqlTemplates};
use crate::schema::{merge_columns, Column, KeyRole};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column as _, Either, Executor, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;

const DIALECT: DialectKind = DialectKind::Sqlite;

/// SQLite database provider
///
/// Sizing is left to the trait defaults, which report the dialect as
/// unsupported instead of inventing a number.
pub struct SqliteProvider {
    pool: SqlitePool,
}

impl SqliteProvider {
    /// Create a new SQLite provider
    ///
    /// # Arguments
    ///
    /// * `pool` - SQLite connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn templates() -> Result<&'static SqlTemplates> {
        DIALECT.templates()
    }

    fn extract_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
        (0..row.columns().len())
            .map(|index| Self::extract_value(row, index))
            .collect()
    }

    /// Read one cell according to its storage class
    ///
    /// SQLite is dynamically typed, so the value's runtime storage class is
    /// authoritative rather than the column's declared type.
    fn extract_value(row: &SqliteRow, index: usize) -> Result<SqlValue> {
        let raw = row.try_get_raw(index).map_err(Error::execution)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let type_name = raw.type_info().name().to_string();

        let decoded = match type_name.as_str() {
            "INTEGER" => row.try_get_unchecked::<i64, _>(index).map(SqlValue::Int),
            "REAL" => row.try_get_unchecked::<f64, _>(index).map(SqlValue::Float),
            "BOOLEAN" => row.try_get_unchecked::<bool, _>(index).map(SqlValue::Bool),
            "BLOB" => row
                .try_get_unchecked::<Vec<u8>, _>(index)
                .map(SqlValue::Bytes),
            _ => row
                .try_get_unchecked::<String, _>(index)
                .map(SqlValue::Text),
        };

        decoded
            .or_else(|_| {
                row.try_get_unchecked::<Vec<u8>, _>(index)
                    .map(SqlValue::Bytes)
            })
            .map_err(Error::execution)
    }

    async fn count(&self, sql: &str, binds: &[&str]) -> Result<u64> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for value in binds {
            query = query.bind(*value);
        }

        let count = query
            .fetch_one(&self.pool)
            .await
            .map_err(Error::introspection)?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl DatabaseProvider for SqliteProvider {
    fn dialect(&self) -> DialectKind {
        DIALECT
    }

    async fn ping(&self) -> Result<()> {
        self.pool
            .execute(sqlx::raw_sql("SELECT 1"))
            .await
            .map_err(Error::connection)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(Error::connection("connection already closed"));
        }
        self.pool.close().await;
        Ok(())
    }

    /// Names of the attached databases (`main`, `temp`, ...)
    async fn list_schemas(&self) -> Result<Vec<String>> {
        let sql = Self::templates()?.require("show_databases", DIALECT)?;

        sqlx::query_scalar::<_, String>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::introspection)
    }

    async fn list_tables(&self, _schema: &str) -> Result<Vec<String>> {
        let sql = Self::templates()?.require("show_tables", DIALECT)?;

        sqlx::query_scalar::<_, String>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::introspection)
    }

    async fn get_columns(&self, _schema: &str, table: &str) -> Result<Vec<Column>> {
        let sql = Self::templates()?.require("columns_info", DIALECT)?;

        let rows = sqlx::query(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::introspection)?;

        rows.iter()
            .map(|row| {
                let key: String = row.try_get("column_key")?;
                Ok(Column {
                    field: row.try_get("field")?,
                    sql_type: row.try_get("type")?,
                    key: KeyRole::from_catalog(&key),
                    constraint_name: row.try_get("constraint_name")?,
                    referenced_table: row.try_get("referenced_table")?,
                    referenced_column: row.try_get("referenced_column")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::introspection)
            .map(merge_columns)
    }

    async fn column_data_type(&self, _schema: &str, table: &str, column: &str) -> Result<String> {
        let sql = Self::templates()?.require("column_data_type", DIALECT)?;

        sqlx::query_scalar::<_, String>(sql)
            .bind(table)
            .bind(column)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::introspection)?
            .ok_or_else(|| Error::introspection(format!("column {}.{} not found", table, column)))
    }

    async fn count_rows(&self, _schema: &str, table: &str) -> Result<u64> {
        let template = Self::templates()?.require("count_rows", DIALECT)?;
        let sql = render(template, &[("table", &DIALECT.quote_identifier(table))]);
        debug!(%sql, "counting rows");

        self.count(&sql, &[]).await
    }

    async fn count_columns(&self, _schema: &str, table: &str) -> Result<u64> {
        let sql = Self::templates()?.require("count_columns", DIALECT)?;
        self.count(sql, &[table]).await
    }

    async fn run(&self, _schema: &str, sql: &str) -> Result<Execution> {
        debug!(%sql, "running statement");

        let mut execution = Execution::default();
        let mut new_statement = true;
        let mut stream = self.pool.fetch_many(sqlx::raw_sql(sql));

        while let Some(item) = stream.try_next().await.map_err(Error::execution)? {
            match item {
                Either::Left(done) => {
                    execution.affected_rows += done.rows_affected();
                    new_statement = true;
                }
                Either::Right(row) => {
                    let columns = row
                        .columns()
                        .iter()
                        .map(|column| column.name().to_string())
                        .collect();
                    let values = Self::extract_row(&row)?;
                    execution.push_row(columns, values, std::mem::take(&mut new_statement));
                }
            }
        }

        Ok(execution)
    }

    async fn show_create_tables(
        &self,
        _schema: &str,
        tables: &[String],
    ) -> Result<Vec<(String, String)>> {
        let sql = Self::templates()?.require("show_create_table", DIALECT)?;
        let mut definitions = Vec::with_capacity(tables.len());

        for table in tables {
            let row = sqlx::query(sql)
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::export)?
                .ok_or_else(|| Error::export(format!("table {} not found", table)))?;

            let name: String = row.try_get("name").map_err(Error::export)?;
            let ddl: Option<String> = row.try_get("sql").map_err(Error::export)?;
            definitions.push((name, ddl.unwrap_or_default()));
        }

        Ok(definitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn provider() -> SqliteProvider {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::raw_sql(
            r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                score REAL,
                avatar BLOB
            );
            CREATE TABLE posts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER REFERENCES users(id),
                title VARCHAR(200)
            );
            INSERT INTO users (id, name, score, avatar) VALUES (1, 'alice', 9.5, x'6869');
            INSERT INTO users (id, name, score, avatar) VALUES (2, 'bob', NULL, NULL);
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        SqliteProvider::new(pool)
    }

    #[tokio::test]
    async fn test_list_tables_excludes_internal_tables() {
        let provider = provider().await;
        let tables = provider.list_tables("").await.unwrap();
        assert_eq!(tables, vec!["posts".to_string(), "users".to_string()]);
    }

    #[tokio::test]
    async fn test_get_columns_resolves_keys() {
        let provider = provider().await;
        let columns = provider.get_columns("", "posts").await.unwrap();

        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].field, "id");
        assert_eq!(columns[0].key, KeyRole::Primary);
        assert_eq!(columns[1].key, KeyRole::Multiple);
        assert_eq!(columns[1].referenced_table, "users");
        assert_eq!(columns[1].referenced_column, "id");
        assert_eq!(columns[1].constraint_name, "");
        assert_eq!(columns[2].sql_type, "VARCHAR(200)");
        assert_eq!(columns[2].key, KeyRole::None);
    }

    #[tokio::test]
    async fn test_get_columns_lists_each_column_once() {
        let provider = provider().await;
        sqlx::raw_sql(
            r#"
            CREATE TABLE memberships (
                user_id INTEGER PRIMARY KEY,
                note TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (user_id) REFERENCES posts(id)
            );
            "#,
        )
        .execute(&provider.pool)
        .await
        .unwrap();

        let columns = provider.get_columns("", "memberships").await.unwrap();
        let fields: Vec<_> = columns.iter().map(|column| column.field.as_str()).collect();
        assert_eq!(fields, vec!["user_id", "note"]);
        assert_eq!(columns[0].key, KeyRole::Primary);
        assert!(!columns[0].referenced_table.is_empty());
        assert_eq!(
            provider.count_columns("", "memberships").await.unwrap(),
            columns.len() as u64
        );
    }

    #[tokio::test]
    async fn test_column_data_type() {
        let provider = provider().await;
        assert_eq!(
            provider.column_data_type("", "users", "name").await.unwrap(),
            "TEXT"
        );
        let error = provider
            .column_data_type("", "users", "missing")
            .await
            .unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::IntrospectionFailed);
    }

    #[tokio::test]
    async fn test_counts() {
        let provider = provider().await;
        assert_eq!(provider.count_rows("", "users").await.unwrap(), 2);
        assert_eq!(provider.count_rows("", "posts").await.unwrap(), 0);
        assert_eq!(provider.count_columns("", "users").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_run_reads_storage_classes() {
        let provider = provider().await;
        let execution = provider
            .run("", "SELECT id, name, score, avatar FROM users ORDER BY id")
            .await
            .unwrap();

        assert_eq!(execution.result.columns, vec!["id", "name", "score", "avatar"]);
        assert_eq!(
            execution.result.rows[0],
            vec![
                SqlValue::Int(1),
                SqlValue::Text("alice".to_string()),
                SqlValue::Float(9.5),
                SqlValue::Bytes(b"hi".to_vec()),
            ]
        );
        assert!(execution.result.rows[1][2].is_null());
    }

    #[tokio::test]
    async fn test_run_reports_affected_rows() {
        let provider = provider().await;
        let execution = provider
            .run("", "UPDATE users SET score = 1.0")
            .await
            .unwrap();
        assert_eq!(execution.affected_rows, 2);
        assert!(execution.result.is_empty());
    }

    #[tokio::test]
    async fn test_run_multiple_statements_keeps_last_result_set() {
        let provider = provider().await;
        let execution = provider
            .run("", "SELECT 1 AS a; SELECT 2 AS b, 3 AS c")
            .await
            .unwrap();

        assert_eq!(execution.result.columns, vec!["b", "c"]);
        assert_eq!(
            execution.result.rows,
            vec![vec![SqlValue::Int(2), SqlValue::Int(3)]]
        );
    }

    #[tokio::test]
    async fn test_sizes_are_unsupported() {
        let provider = provider().await;
        let error = provider.table_size("", "users").await.unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::UnsupportedDialect);
        assert!(provider.table_sizes("").await.is_err());
        assert!(provider.schema_size("main").await.is_err());
    }

    #[tokio::test]
    async fn test_show_create_tables_reads_stored_sql() {
        let provider = provider().await;
        let definitions = provider
            .show_create_tables("", &["users".to_string()])
            .await
            .unwrap();

        assert_eq!(definitions[0].0, "users");
        assert!(definitions[0].1.starts_with("CREATE TABLE users"));

        let error = provider
            .show_create_tables("", &["ghost".to_string()])
            .await
            .unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::ExportFailed);
    }

    #[tokio::test]
    async fn test_close_twice_fails() {
        let provider = provider().await;
        provider.close().await.unwrap();
        let error = provider.close().await.unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::ConnectionFailed);
    }
}

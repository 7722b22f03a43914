//! MySQL database provider implementation

use crate::database::traits::{DatabaseProvider, Execution};
use crate::decoder::SqlValue;
use crate::dialect::{render, DialectKind, SqlTemplates};
use crate::schema::{merge_columns, Column, KeyRole, SchemaSize, TableSize};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use sqlx::mysql::{MySql, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{Column as _, Either, Executor, MySqlPool, Row, TypeInfo, ValueRef};
use tracing::debug;

const DIALECT: DialectKind = DialectKind::MySql;

/// MySQL database provider
pub struct MySqlProvider {
    pool: MySqlPool,
}

impl MySqlProvider {
    /// Create a new MySQL provider
    ///
    /// # Arguments
    ///
    /// * `pool` - MySQL connection pool
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn templates() -> Result<&'static SqlTemplates> {
        DIALECT.templates()
    }

    /// Acquire a connection with `schema` selected as the default database
    ///
    /// `SHOW TABLES` and unqualified ad-hoc SQL resolve against the default
    /// database, so the `USE` must run on the same connection as the statement.
    async fn scoped_connection(&self, schema: &str) -> Result<PoolConnection<MySql>> {
        let mut connection = self.pool.acquire().await.map_err(Error::connection)?;

        if !schema.is_empty() {
            let statement = format!("USE {}", DIALECT.quote_identifier(schema));
            debug!(sql = %statement, "selecting schema");
            connection
                .execute(sqlx::raw_sql(&statement))
                .await
                .map_err(Error::execution)?;
        }

        Ok(connection)
    }

    fn extract_row(row: &MySqlRow) -> Result<Vec<SqlValue>> {
        (0..row.columns().len())
            .map(|index| Self::extract_value(row, index))
            .collect()
    }

    /// Read one cell as the driver surfaces it
    ///
    /// Numeric and temporal columns decode to their native values; character,
    /// binary and every other column type are read as raw bytes.
    fn extract_value(row: &MySqlRow, index: usize) -> Result<SqlValue> {
        let raw = row.try_get_raw(index).map_err(Error::execution)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let type_name = raw.type_info().name().to_string();

        let decoded = match type_name.as_str() {
            "BOOLEAN" => row.try_get_unchecked::<bool, _>(index).map(SqlValue::Bool),
            name if name.ends_with("UNSIGNED") => row
                .try_get_unchecked::<u64, _>(index)
                .map(SqlValue::UInt),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
                .try_get_unchecked::<i64, _>(index)
                .map(SqlValue::Int),
            "FLOAT" => row
                .try_get_unchecked::<f32, _>(index)
                .map(|value| SqlValue::Float(value as f64)),
            "DOUBLE" => row.try_get_unchecked::<f64, _>(index).map(SqlValue::Float),
            "DECIMAL" => row
                .try_get_unchecked::<Vec<u8>, _>(index)
                .map(|bytes| SqlValue::Decimal(String::from_utf8_lossy(&bytes).into_owned())),
            "DATE" => row.try_get_unchecked::<NaiveDate, _>(index).map(SqlValue::Date),
            "TIME" => row.try_get_unchecked::<NaiveTime, _>(index).map(SqlValue::Time),
            "DATETIME" => row
                .try_get_unchecked::<NaiveDateTime, _>(index)
                .map(SqlValue::DateTime),
            "TIMESTAMP" => row
                .try_get_unchecked::<DateTime<Utc>, _>(index)
                .map(SqlValue::DateTimeUtc),
            "JSON" => row
                .try_get_unchecked::<serde_json::Value, _>(index)
                .map(SqlValue::Json),
            _ => Self::bytes(row, index),
        };

        // Zero dates and out-of-range times do not fit chrono; keep their text
        decoded
            .or_else(|_| Self::bytes(row, index))
            .map_err(Error::execution)
    }

    fn bytes(row: &MySqlRow, index: usize) -> std::result::Result<SqlValue, sqlx::Error> {
        row.try_get_unchecked::<Vec<u8>, _>(index).map(SqlValue::Bytes)
    }

    fn string_column(row: &MySqlRow, column: &str) -> std::result::Result<String, sqlx::Error> {
        row.try_get_unchecked::<Option<String>, _>(column)
            .map(Option::unwrap_or_default)
    }

    fn parse_size(text: &str) -> Result<f64> {
        text.trim()
            .parse()
            .map_err(|_| Error::introspection(format!("invalid size value: {}", text)))
    }

    fn render_qualified(template: &str, schema: &str, table: &str) -> String {
        render(
            template,
            &[
                ("schema", &DIALECT.quote_identifier(schema)),
                ("table", &DIALECT.quote_identifier(table)),
            ],
        )
    }
}

#[async_trait]
impl DatabaseProvider for MySqlProvider {
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

    async fn list_schemas(&self) -> Result<Vec<String>> {
        let sql = Self::templates()?.require("show_databases", DIALECT)?;

        let rows = self
            .pool
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(Error::introspection)?;

        rows.iter()
            .map(|row| row.try_get_unchecked::<String, _>(0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::introspection)
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let sql = Self::templates()?.require("show_tables", DIALECT)?;
        let mut connection = self.scoped_connection(schema).await?;

        let rows = connection
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(Error::introspection)?;

        rows.iter()
            .map(|row| row.try_get_unchecked::<String, _>(0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::introspection)
    }

    async fn get_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let sql = Self::templates()?.require("columns_info", DIALECT)?;

        let rows = sqlx::query(sql)
            .bind(schema)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::introspection)?;

        rows.iter()
            .map(|row| {
                Ok(Column {
                    field: Self::string_column(row, "field")?,
                    sql_type: Self::string_column(row, "type")?,
                    key: KeyRole::from_catalog(&Self::string_column(row, "column_key")?),
                    constraint_name: Self::string_column(row, "constraint_name")?,
                    referenced_table: Self::string_column(row, "referenced_table")?,
                    referenced_column: Self::string_column(row, "referenced_column")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::introspection)
            .map(merge_columns)
    }

    async fn column_data_type(&self, schema: &str, table: &str, column: &str) -> Result<String> {
        let sql = Self::templates()?.require("column_data_type", DIALECT)?;

        let row = sqlx::query(sql)
            .bind(schema)
            .bind(table)
            .bind(column)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::introspection)?
            .ok_or_else(|| {
                Error::introspection(format!("column {}.{} not found", table, column))
            })?;

        row.try_get_unchecked::<String, _>(0)
            .map_err(Error::introspection)
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<u64> {
        let template = Self::templates()?.require("count_rows", DIALECT)?;
        let sql = Self::render_qualified(template, schema, table);
        debug!(%sql, "counting rows");

        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::introspection)?;
        Ok(count.max(0) as u64)
    }

    async fn count_columns(&self, schema: &str, table: &str) -> Result<u64> {
        let sql = Self::templates()?.require("count_columns", DIALECT)?;

        let count: i64 = sqlx::query_scalar(sql)
            .bind(schema)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::introspection)?;
        Ok(count.max(0) as u64)
    }

    async fn schema_size(&self, schema: &str) -> Result<SchemaSize> {
        let sql = Self::templates()?.require("schema_size", DIALECT)?;

        let row = sqlx::query(sql)
            .bind(schema)
            .bind(schema)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::introspection)?;

        Ok(SchemaSize {
            name: Self::string_column(&row, "name").map_err(Error::introspection)?,
            size_mb: Self::parse_size(
                &Self::string_column(&row, "size_mb").map_err(Error::introspection)?,
            )?,
        })
    }

    async fn table_size(&self, schema: &str, table: &str) -> Result<TableSize> {
        let sql = Self::templates()?.require("table_size", DIALECT)?;

        let row = sqlx::query(sql)
            .bind(schema)
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::introspection)?
            .ok_or_else(|| Error::introspection(format!("table {} not found", table)))?;

        Ok(TableSize {
            table_name: Self::string_column(&row, "table_name").map_err(Error::introspection)?,
            size_mb: Self::parse_size(
                &Self::string_column(&row, "size_mb").map_err(Error::introspection)?,
            )?,
        })
    }

    async fn table_sizes(&self, schema: &str) -> Result<Vec<TableSize>> {
        let sql = Self::templates()?.require("table_sizes", DIALECT)?;

        let rows = sqlx::query(sql)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::introspection)?;

        rows.iter()
            .map(|row| {
                Ok(TableSize {
                    table_name: Self::string_column(row, "table_name")
                        .map_err(Error::introspection)?,
                    size_mb: Self::parse_size(
                        &Self::string_column(row, "size_mb").map_err(Error::introspection)?,
                    )?,
                })
            })
            .collect()
    }

    async fn run(&self, schema: &str, sql: &str) -> Result<Execution> {
        let mut connection = self.scoped_connection(schema).await?;
        debug!(%sql, "running statement");

        let mut execution = Execution::default();
        let mut new_statement = true;
        let mut stream = connection.fetch_many(sqlx::raw_sql(sql));

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
        schema: &str,
        tables: &[String],
    ) -> Result<Vec<(String, String)>> {
        let template = Self::templates()?.require("show_create_table", DIALECT)?;
        let mut definitions = Vec::with_capacity(tables.len());

        for table in tables {
            let sql = Self::render_qualified(template, schema, table);
            debug!(%sql, "reading table definition");

            let row = self
                .pool
                .fetch_one(sqlx::raw_sql(&sql))
                .await
                .map_err(Error::export)?;

            let name = row.try_get_unchecked::<String, _>(0).map_err(Error::export)?;
            let ddl = row.try_get_unchecked::<String, _>(1).map_err(Error::export)?;
            definitions.push((name, ddl));
        }

        Ok(definitions)
    }
}

//! PostgreSQL database provider implementation

use crate::database::traits::{DatabaseProvider, Execution};
use crate::decoder::SqlValue;
use crate::dialect::{render, DialectKind, SqlTemplates};
use crate::schema::{merge_columns, Column, KeyRole, SchemaSize, TableSize};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Column as _, Either, Executor, PgPool, Row, TypeInfo, ValueRef};
use tracing::{debug, warn};

const DIALECT: DialectKind = DialectKind::PostgreSql;

/// Session-local function that rebuilds `CREATE TABLE` text from the catalog
///
/// Columns come first, then constraints ranked primary key, unique, foreign
/// key, check, then the table's index definitions. Living in `pg_temp`, it is
/// only visible to the connection that created it.
const CREATE_SHOW_CREATE_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION pg_temp.sql_navigator_show_create_table(
    target_schema varchar,
    target_table varchar
)
RETURNS text
LANGUAGE plpgsql
AS $navigator$
DECLARE
    definition text[] := ARRAY[]::text[];
    statement text;
    item record;
BEGIN
    IF NOT EXISTS (
        SELECT 1
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('r', 'p')
          AND n.nspname = target_schema
          AND c.relname = target_table
    ) THEN
        RAISE EXCEPTION 'table %.% does not exist', target_schema, target_table;
    END IF;

    FOR item IN
        SELECT column_name, data_type, character_maximum_length, is_nullable, column_default
        FROM information_schema.columns
        WHERE table_schema = target_schema
          AND table_name = target_table
        ORDER BY ordinal_position
    LOOP
        definition := definition || (
            '  ' || quote_ident(item.column_name) || ' ' || item.data_type
            || COALESCE('(' || item.character_maximum_length || ')', '')
            || CASE WHEN item.is_nullable = 'NO' THEN ' NOT NULL' ELSE ' NULL' END
            || COALESCE(' DEFAULT ' || item.column_default, '')
        );
    END LOOP;

    FOR item IN
        SELECT con.conname, pg_catalog.pg_get_constraintdef(con.oid) AS condef
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class rel ON rel.oid = con.conrelid
        JOIN pg_catalog.pg_namespace nsp ON nsp.oid = rel.relnamespace
        WHERE nsp.nspname = target_schema
          AND rel.relname = target_table
        ORDER BY
            CASE con.contype
                WHEN 'p' THEN 1
                WHEN 'u' THEN 2
                WHEN 'f' THEN 3
                WHEN 'c' THEN 4
                ELSE 5
            END,
            con.conname
    LOOP
        definition := definition || ('  CONSTRAINT ' || quote_ident(item.conname) || ' ' || item.condef);
    END LOOP;

    statement := 'CREATE TABLE ' || quote_ident(target_schema) || '.' || quote_ident(target_table)
        || E' (\n' || array_to_string(definition, E',\n') || E'\n);\n';

    FOR item IN
        SELECT indexdef
        FROM pg_catalog.pg_indexes
        WHERE schemaname = target_schema
          AND tablename = target_table
        ORDER BY indexname
    LOOP
        statement := statement || item.indexdef || E';\n';
    END LOOP;

    RETURN statement;
END;
$navigator$
"#;

const DROP_SHOW_CREATE_FUNCTION: &str =
    "DROP FUNCTION IF EXISTS pg_temp.sql_navigator_show_create_table(varchar, varchar)";

/// Scoped installation of the reconstruction function
///
/// Holds the connection the function was created on. [`ShowCreateFunction::release`]
/// drops the function and returns the connection to the pool; if the guard is
/// dropped without being released, or the drop statement fails, the connection
/// is detached and closed so the session-local function dies with it.
struct ShowCreateFunction {
    connection: Option<PoolConnection<Postgres>>,
}

impl ShowCreateFunction {
    async fn install(pool: &PgPool) -> Result<Self> {
        let mut connection = pool.acquire().await.map_err(Error::connection)?;
        debug!("installing table reconstruction function");
        connection
            .execute(sqlx::raw_sql(CREATE_SHOW_CREATE_FUNCTION))
            .await
            .map_err(Error::export)?;

        Ok(Self {
            connection: Some(connection),
        })
    }

    async fn show_create(&mut self, schema: &str, table: &str) -> Result<String> {
        let sql = DIALECT
            .templates()?
            .require("show_create_table", DIALECT)?;
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| Error::export("reconstruction function already released"))?;

        sqlx::query_scalar::<_, String>(sql)
            .bind(schema)
            .bind(table)
            .fetch_one(&mut **connection)
            .await
            .map_err(Error::export)
    }

    async fn release(mut self) -> Result<()> {
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        match connection.execute(sqlx::raw_sql(DROP_SHOW_CREATE_FUNCTION)).await {
            Ok(_) => {
                debug!("dropped table reconstruction function");
                Ok(())
            }
            Err(error) => {
                warn!(%error, "failed to drop table reconstruction function; closing its connection");
                drop(connection.detach());
                Err(Error::export(error))
            }
        }
    }
}

impl Drop for ShowCreateFunction {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            warn!("table reconstruction function was not released; closing its connection");
            drop(connection.detach());
        }
    }
}

/// PostgreSQL database provider
pub struct PostgresProvider {
    pool: PgPool,
}

impl PostgresProvider {
    /// Create a new PostgreSQL provider
    ///
    /// # Arguments
    ///
    /// * `pool` - PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn templates() -> Result<&'static SqlTemplates> {
        DIALECT.templates()
    }

    fn extract_row(row: &PgRow) -> Result<Vec<SqlValue>> {
        (0..row.columns().len())
            .map(|index| Self::extract_value(row, index))
            .collect()
    }

    /// Read one cell into its closest native value
    ///
    /// Ad-hoc statements run over the simple query protocol, so every value
    /// arrives in text form and unknown types can always be read as text.
    fn extract_value(row: &PgRow, index: usize) -> Result<SqlValue> {
        let raw = row.try_get_raw(index).map_err(Error::execution)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let type_name = raw.type_info().name().to_string();

        let decoded = match type_name.as_str() {
            "BOOL" => row.try_get::<bool, _>(index).map(SqlValue::Bool),
            "INT2" => row
                .try_get::<i16, _>(index)
                .map(|value| SqlValue::Int(value.into())),
            "INT4" => row
                .try_get::<i32, _>(index)
                .map(|value| SqlValue::Int(value.into())),
            "INT8" => row.try_get::<i64, _>(index).map(SqlValue::Int),
            "FLOAT4" => row
                .try_get::<f32, _>(index)
                .map(|value| SqlValue::Float(value.into())),
            "FLOAT8" => row.try_get::<f64, _>(index).map(SqlValue::Float),
            "NUMERIC" => row
                .try_get_unchecked::<String, _>(index)
                .map(SqlValue::Decimal),
            "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => {
                row.try_get::<String, _>(index).map(SqlValue::Text)
            }
            "BYTEA" => row.try_get::<Vec<u8>, _>(index).map(SqlValue::Bytes),
            "DATE" => row.try_get::<NaiveDate, _>(index).map(SqlValue::Date),
            "TIME" => row.try_get::<NaiveTime, _>(index).map(SqlValue::Time),
            "TIMESTAMP" => row
                .try_get::<NaiveDateTime, _>(index)
                .map(SqlValue::DateTime),
            "TIMESTAMPTZ" => row
                .try_get::<DateTime<Utc>, _>(index)
                .map(SqlValue::DateTimeUtc),
            "JSON" | "JSONB" => row
                .try_get::<serde_json::Value, _>(index)
                .map(SqlValue::Json),
            "UUID" => row
                .try_get::<uuid::Uuid, _>(index)
                .map(|value| SqlValue::Text(value.to_string())),
            _ => row.try_get_unchecked::<String, _>(index).map(SqlValue::Text),
        };

        decoded
            .or_else(|_| row.try_get_unchecked::<String, _>(index).map(SqlValue::Text))
            .map_err(Error::execution)
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
impl DatabaseProvider for PostgresProvider {
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

        sqlx::query_scalar::<_, String>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::introspection)
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let sql = Self::templates()?.require("show_tables", DIALECT)?;

        sqlx::query_scalar::<_, String>(sql)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
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

    async fn column_data_type(&self, schema: &str, table: &str, column: &str) -> Result<String> {
        let sql = Self::templates()?.require("column_data_type", DIALECT)?;

        sqlx::query_scalar::<_, String>(sql)
            .bind(schema)
            .bind(table)
            .bind(column)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::introspection)?
            .ok_or_else(|| Error::introspection(format!("column {}.{} not found", table, column)))
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

    async fn schema_size(&self, _schema: &str) -> Result<SchemaSize> {
        let sql = Self::templates()?.require("schema_size", DIALECT)?;

        let row = sqlx::query(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::introspection)?;

        Ok(SchemaSize {
            name: row.try_get("name").map_err(Error::introspection)?,
            size_mb: row.try_get("size_mb").map_err(Error::introspection)?,
        })
    }

    async fn table_size(&self, schema: &str, table: &str) -> Result<TableSize> {
        let sql = Self::templates()?.require("table_size", DIALECT)?;

        let row = sqlx::query(sql)
            .bind(schema)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::introspection)?;

        Ok(TableSize {
            table_name: row.try_get("table_name").map_err(Error::introspection)?,
            size_mb: row.try_get("size_mb").map_err(Error::introspection)?,
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
                    table_name: row.try_get("table_name")?,
                    size_mb: row.try_get("size_mb")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::introspection)
    }

    /// Unqualified names resolve against `schema` first, then `public`
    async fn run(&self, schema: &str, sql: &str) -> Result<Execution> {
        let mut connection = self.pool.acquire().await.map_err(Error::connection)?;
        if !schema.is_empty() {
            let statement = format!(
                "SET search_path TO {}, public",
                DIALECT.quote_identifier(schema)
            );
            connection
                .execute(sqlx::raw_sql(&statement))
                .await
                .map_err(Error::execution)?;
        }
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

    /// Reconstruct DDL through a temporary server-side function
    ///
    /// The function is dropped whether or not every lookup succeeds. A lookup
    /// error takes precedence over a cleanup error.
    async fn show_create_tables(
        &self,
        schema: &str,
        tables: &[String],
    ) -> Result<Vec<(String, String)>> {
        let mut function = ShowCreateFunction::install(&self.pool).await?;

        let mut definitions = Vec::with_capacity(tables.len());
        let mut lookup = Ok(());
        for table in tables {
            match function.show_create(schema, table).await {
                Ok(ddl) => definitions.push((table.clone(), ddl)),
                Err(error) => {
                    lookup = Err(error);
                    break;
                }
            }
        }

        let released = function.release().await;
        lookup?;
        released?;

        Ok(definitions)
    }
}

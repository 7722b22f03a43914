//! Database provider trait
//!
//! This trait defines the interface that all dialect implementations must provide.
//! A provider is selected once at connect time and owns the connection pool.

use crate::decoder::{RawResultSet, SqlValue};
use crate::dialect::DialectKind;
use crate::schema::{Column, SchemaSize, TableSize};
use crate::{Error, Result};
use async_trait::async_trait;

/// Outcome of running arbitrary SQL
#[derive(Debug, Clone, Default)]
pub struct Execution {
    /// Rows produced by the statement(s), if any
    pub result: RawResultSet,

    /// Rows reported as affected by the driver
    pub affected_rows: u64,
}

impl Execution {
    /// Append a row read from a statement stream
    ///
    /// `new_statement` is set for the first row after a statement finished.
    /// Such a row, or one whose columns differ from the current result set,
    /// starts a new result set. Only the last row-producing result set is kept.
    pub fn push_row(&mut self, columns: Vec<String>, values: Vec<SqlValue>, new_statement: bool) {
        if new_statement || columns != self.result.columns {
            self.result = RawResultSet {
                columns,
                rows: Vec::new(),
            };
        }
        self.result.rows.push(values);
    }
}

/// Database provider trait for introspection and data access
///
/// `schema` arguments name the schema (MySQL database, PostgreSQL schema) the
/// call is scoped to; SQLite ignores them.
#[async_trait]
pub trait DatabaseProvider: Send + Sync + 'static {
    /// The dialect this provider speaks
    fn dialect(&self) -> DialectKind;

    /// Round-trip a `SELECT 1` through the pool
    async fn ping(&self) -> Result<()>;

    /// Close the pool
    ///
    /// Closing an already closed pool fails with [`Error::ConnectionFailed`].
    async fn close(&self) -> Result<()>;

    /// Schema (database) names visible to the connection
    async fn list_schemas(&self) -> Result<Vec<String>>;

    /// Base table names in `schema`, in catalog order
    async fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Column metadata for `table`, including key role and foreign key target
    async fn get_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>>;

    /// Declared data type of a single column
    async fn column_data_type(&self, schema: &str, table: &str, column: &str) -> Result<String>;

    async fn count_rows(&self, schema: &str, table: &str) -> Result<u64>;

    async fn count_columns(&self, schema: &str, table: &str) -> Result<u64>;

    /// Size of the schema in MB
    async fn schema_size(&self, schema: &str) -> Result<SchemaSize> {
        let _ = schema;
        Err(Error::unsupported(self.dialect(), "schema size"))
    }

    /// Size of one table in MB
    async fn table_size(&self, schema: &str, table: &str) -> Result<TableSize> {
        let _ = (schema, table);
        Err(Error::unsupported(self.dialect(), "table size"))
    }

    /// Size of every table in `schema`, largest first
    async fn table_sizes(&self, schema: &str) -> Result<Vec<TableSize>> {
        let _ = schema;
        Err(Error::unsupported(self.dialect(), "table sizes"))
    }

    /// Run arbitrary SQL text scoped to `schema`
    ///
    /// # Security Warning
    ///
    /// This executes any statement the driver accepts, including DDL and DML.
    async fn run(&self, schema: &str, sql: &str) -> Result<Execution>;

    /// Run a row-producing statement and return only its rows
    async fn fetch(&self, schema: &str, sql: &str) -> Result<RawResultSet> {
        Ok(self.run(schema, sql).await?.result)
    }

    /// `CREATE TABLE` text for each of `tables`, in the given order
    async fn show_create_tables(
        &self,
        schema: &str,
        tables: &[String],
    ) -> Result<Vec<(String, String)>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_push_row_keeps_last_result_set() {
        let mut execution = Execution::default();
        execution.push_row(columns(&["a"]), vec![SqlValue::Int(1)], true);
        execution.push_row(
            columns(&["b", "c"]),
            vec![SqlValue::Int(2), SqlValue::Int(3)],
            true,
        );

        assert_eq!(execution.result.columns, columns(&["b", "c"]));
        assert_eq!(execution.result.rows, vec![vec![SqlValue::Int(2), SqlValue::Int(3)]]);
    }

    #[test]
    fn test_push_row_appends_within_result_set() {
        let mut execution = Execution::default();
        execution.push_row(columns(&["id"]), vec![SqlValue::Int(1)], true);
        execution.push_row(columns(&["id"]), vec![SqlValue::Int(2)], false);
        assert_eq!(execution.result.rows.len(), 2);

        // same shape, but a later statement
        execution.push_row(columns(&["id"]), vec![SqlValue::Int(9)], true);
        assert_eq!(execution.result.rows, vec![vec![SqlValue::Int(9)]]);
    }
}

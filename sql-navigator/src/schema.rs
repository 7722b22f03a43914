//! Schema types for dynamic database introspection
//!
//! These types represent schema information and results discovered at runtime.

use crate::decoder::Row;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Role a column plays in the table's keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeyRole {
    #[default]
    #[serde(rename = "")]
    None,

    /// Part of the primary key
    #[serde(rename = "PRI")]
    Primary,

    /// Non-unique key, typically a foreign key
    #[serde(rename = "MUL")]
    Multiple,
}

impl KeyRole {
    /// Parse the catalog's key marker; anything other than `PRI`/`MUL` has no role
    pub fn from_catalog(key: &str) -> Self {
        match key.trim().to_ascii_uppercase().as_str() {
            "PRI" => KeyRole::Primary,
            "MUL" => KeyRole::Multiple,
            _ => KeyRole::None,
        }
    }
}

impl KeyRole {
    fn rank(self) -> u8 {
        match self {
            KeyRole::Primary => 2,
            KeyRole::Multiple => 1,
            KeyRole::None => 0,
        }
    }
}

/// Collapse catalog rows that repeat a column once per constraint
///
/// Keeps first-seen column order. The strongest key role wins (`PRI` over
/// `MUL`), and a foreign key target from any of the rows is kept.
pub fn merge_columns(rows: Vec<Column>) -> Vec<Column> {
    let mut merged: IndexMap<String, Column> = IndexMap::with_capacity(rows.len());

    for column in rows {
        match merged.get_mut(&column.field) {
            None => {
                merged.insert(column.field.clone(), column);
            }
            Some(existing) => {
                if column.key.rank() > existing.key.rank() {
                    existing.key = column.key;
                    existing.constraint_name = column.constraint_name;
                }
                if existing.referenced_table.is_empty() && !column.referenced_table.is_empty() {
                    existing.referenced_table = column.referenced_table;
                    existing.referenced_column = column.referenced_column;
                }
            }
        }
    }

    merged.into_values().collect()
}

/// Information about a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name
    pub field: String,

    /// Declared SQL type (e.g., "int(11)", "character varying", "TEXT")
    #[serde(rename = "type")]
    pub sql_type: String,

    /// Key role of the column
    pub key: KeyRole,

    /// Name of the constraint the column takes part in (empty if none)
    pub constraint_name: String,

    /// Referenced table for foreign keys (empty if none)
    pub referenced_table: String,

    /// Referenced column for foreign keys (empty if none)
    pub referenced_column: String,
}

/// Columns of one table, as returned on connect
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumns {
    pub table_name: String,
    pub columns: Vec<Column>,
}

/// One page of table data
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table name
    pub name: String,

    /// Column metadata
    pub columns: Vec<Column>,

    /// Rows of this page, in result-set order
    pub rows: Vec<Row>,

    /// Number of rows in this page
    pub row_count: usize,

    /// Number of columns
    pub column_count: usize,

    /// Table size in MB; `None` where the dialect has no size statistics
    pub size_mb: Option<f64>,
}

/// A table page together with pagination metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePage {
    pub table: Table,
    pub total_rows: u64,
    pub total_pages: u64,
}

/// Result of a mutating or ad-hoc statement
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Rows affected (or returned, for statements producing rows)
    pub affected_rows: u64,

    /// Execution time in seconds
    pub elapsed_seconds: f64,

    /// Rows returned (empty for statements without a result set)
    pub rows: Vec<Row>,

    /// Human-readable summary
    pub message: String,
}

/// Size of a table in MB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSize {
    pub table_name: String,
    pub size_mb: f64,
}

/// Size of a schema in MB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSize {
    pub name: String,
    pub size_mb: f64,
}

/// What is known about the connected schema
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub name: String,
    pub table_count: usize,
    pub size_mb: Option<f64>,
    pub tables: Vec<TableColumns>,
}

/// Returned by a successful connect
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    /// Display name of the connected schema/database
    pub schema: String,

    /// Every table with its columns
    pub tables: Vec<TableColumns>,
}

/// Request to update a single cell
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpdate {
    pub table: String,
    pub column: String,
    pub new_value: String,
    pub key_column: String,
    pub key_value: String,
}

/// Request to execute a raw SQL query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// SQL query to execute
    #[serde(alias = "query")]
    pub sql: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_role_from_catalog() {
        assert_eq!(KeyRole::from_catalog("PRI"), KeyRole::Primary);
        assert_eq!(KeyRole::from_catalog("mul"), KeyRole::Multiple);
        assert_eq!(KeyRole::from_catalog("UNI"), KeyRole::None);
        assert_eq!(KeyRole::from_catalog(""), KeyRole::None);
    }

    #[test]
    fn test_column_serializes_catalog_markers() {
        let column = Column {
            field: "user_id".to_string(),
            sql_type: "int".to_string(),
            key: KeyRole::Multiple,
            constraint_name: "orders_user_fk".to_string(),
            referenced_table: "users".to_string(),
            referenced_column: "id".to_string(),
        };
        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json["key"], "MUL");
        assert_eq!(json["type"], "int");
        assert_eq!(json["referencedTable"], "users");
    }

    fn column(field: &str, key: KeyRole, constraint: &str, referenced: &str) -> Column {
        Column {
            field: field.to_string(),
            sql_type: "int".to_string(),
            key,
            constraint_name: constraint.to_string(),
            referenced_table: referenced.to_string(),
            referenced_column: if referenced.is_empty() { "" } else { "id" }.to_string(),
        }
    }

    #[test]
    fn test_merge_columns_prefers_primary_key() {
        let merged = merge_columns(vec![
            column("tenant_id", KeyRole::Multiple, "tenant_fk", "tenants"),
            column("tenant_id", KeyRole::Primary, "PRIMARY", ""),
            column("note", KeyRole::None, "", ""),
            column("tenant_id", KeyRole::Multiple, "tenant_again_fk", "tenants"),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].field, "tenant_id");
        assert_eq!(merged[0].key, KeyRole::Primary);
        assert_eq!(merged[0].constraint_name, "PRIMARY");
        assert_eq!(merged[0].referenced_table, "tenants");
        assert_eq!(merged[1].field, "note");
    }

    #[test]
    fn test_merge_columns_keeps_distinct_columns() {
        let rows = vec![
            column("id", KeyRole::Primary, "PRIMARY", ""),
            column("owner_id", KeyRole::Multiple, "owner_fk", "users"),
        ];
        assert_eq!(merge_columns(rows.clone()), rows);
    }

    #[test]
    fn test_query_request_accepts_query_alias() {
        let request: QueryRequest = serde_json::from_str(r#"{"query": "SELECT 1"}"#).unwrap();
        assert_eq!(request.sql, "SELECT 1");
    }
}

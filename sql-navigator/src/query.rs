//! Dialect-aware statement building
//!
//! Builds the paginated SELECT used for table browsing and the UPDATE used for
//! cell edits, plus the pagination arithmetic shared by both.

use crate::dialect::DialectKind;
use crate::schema::{CellUpdate, Column};
use crate::Result;

/// Substrings of type names whose literals must be single-quoted
const STRING_LIKE_TYPES: [&str; 5] = ["char", "text", "date", "time", "year"];

/// Whether a literal of `sql_type` must be single-quoted
///
/// Substring match on the lowercase type name: textual and temporal types
/// (`varchar`, `text`, `datetime`, `year`, ...) are quoted, everything else is
/// substituted bare.
pub fn requires_quoting(sql_type: &str) -> bool {
    let lowercase = sql_type.to_lowercase();
    STRING_LIKE_TYPES
        .iter()
        .any(|substring| lowercase.contains(substring))
}

/// Render `value` as a literal for a column of `sql_type`
pub fn quote_literal(sql_type: &str, value: &str) -> String {
    if requires_quoting(sql_type) {
        format!("'{}'", value.replace('\'', "''"))
    } else {
        value.to_string()
    }
}

/// Build the paginated SELECT for a table
///
/// Emits exactly one identifier per column, quoted for the dialect. Schema and
/// table names are quoted only when they need it; SQLite has no schema qualifier.
pub fn build_select_all(
    columns: &[Column],
    dialect: DialectKind,
    schema: &str,
    table: &str,
    per_page: u64,
    offset: u64,
) -> Result<String> {
    let dialect = dialect.ensure_supported("paginated select")?;

    let column_list = columns
        .iter()
        .map(|column| dialect.quote_identifier(&column.field))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "SELECT {} FROM {} LIMIT {} OFFSET {}",
        column_list,
        qualified_table(dialect, schema, table),
        per_page,
        offset
    ))
}

/// Build the unpaginated SELECT used by exports
pub fn build_select_everything(dialect: DialectKind, schema: &str, table: &str) -> Result<String> {
    let dialect = dialect.ensure_supported("select")?;
    Ok(format!("SELECT * FROM {}", qualified_table(dialect, schema, table)))
}

/// `schema.table`, quoting either part only when it needs it
fn qualified_table(dialect: DialectKind, schema: &str, table: &str) -> String {
    if dialect.is_file_based() || schema.is_empty() {
        dialect.quote_if_needed(table)
    } else {
        format!(
            "{}.{}",
            dialect.quote_if_needed(schema),
            dialect.quote_if_needed(table)
        )
    }
}

/// Build `UPDATE <table> SET <col> = <val> WHERE <keyCol> = <keyVal>`
///
/// `column_type` and `key_column_type` are the looked-up types of the target and
/// key columns; they decide whether each literal is quoted.
pub fn build_update(update: &CellUpdate, column_type: &str, key_column_type: &str) -> String {
    format!(
        "UPDATE {} SET {} = {} WHERE {} = {}",
        update.table,
        update.column,
        quote_literal(column_type, &update.new_value),
        update.key_column,
        quote_literal(key_column_type, &update.key_value)
    )
}

/// Row offset of a 1-based page; pages below 1 are clamped to the first page
pub fn page_offset(page: u64, per_page: u64) -> u64 {
    page.max(1).saturating_sub(1).saturating_mul(per_page)
}

/// Number of pages for `total_rows`
///
/// Rounds to the nearest page count rather than taking the ceiling, and never
/// reports fewer than one page.
pub fn total_pages(total_rows: u64, per_page: u64) -> u64 {
    if per_page == 0 {
        return 1;
    }

    let pages = total_rows as f64 / per_page as f64;
    if pages < 1.0 {
        1
    } else {
        pages.round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::KeyRole;

    fn columns(names: &[&str]) -> Vec<Column> {
        names
            .iter()
            .map(|name| Column {
                field: name.to_string(),
                sql_type: "int".to_string(),
                key: KeyRole::None,
                constraint_name: String::new(),
                referenced_table: String::new(),
                referenced_column: String::new(),
            })
            .collect()
    }

    fn update(new_value: &str, key_value: &str) -> CellUpdate {
        CellUpdate {
            table: "users".to_string(),
            column: "name".to_string(),
            new_value: new_value.to_string(),
            key_column: "id".to_string(),
            key_value: key_value.to_string(),
        }
    }

    #[test]
    fn test_build_select_all_mysql_uses_backticks() {
        let sql = build_select_all(&columns(&["c1", "c2"]), DialectKind::MySql, "schema", "t", 50, 100)
            .unwrap();
        assert_eq!(sql, "SELECT `c1`, `c2` FROM schema.t LIMIT 50 OFFSET 100");
    }

    #[test]
    fn test_build_select_all_postgres_uses_double_quotes() {
        let sql = build_select_all(
            &columns(&["c1", "c2"]),
            DialectKind::PostgreSql,
            "schema",
            "t",
            50,
            100,
        )
        .unwrap();
        assert_eq!(sql, "SELECT \"c1\", \"c2\" FROM schema.t LIMIT 50 OFFSET 100");
    }

    #[test]
    fn test_build_select_all_sqlite_is_unquoted() {
        let sql = build_select_all(&columns(&["c1", "c2"]), DialectKind::Sqlite, "", "t", 50, 100)
            .unwrap();
        assert_eq!(sql, "SELECT c1, c2 FROM t LIMIT 50 OFFSET 100");
    }

    #[test]
    fn test_build_select_all_emits_one_identifier_per_column() {
        let names = ["id", "first name", "email", "created_at"];
        let sql = build_select_all(&columns(&names), DialectKind::MySql, "shop", "users", 10, 0)
            .unwrap();
        let list = sql
            .trim_start_matches("SELECT ")
            .split(" FROM ")
            .next()
            .unwrap();
        assert_eq!(list.split(", ").count(), names.len());
        assert!(list.contains("`first name`"));
    }

    #[test]
    fn test_build_select_all_rejects_unsupported_dialect() {
        let error = build_select_all(&columns(&["a"]), DialectKind::Unsupported, "s", "t", 10, 0)
            .unwrap_err();
        assert_eq!(error.kind(), crate::ErrorKind::UnsupportedDialect);
    }

    #[test]
    fn test_build_select_everything() {
        assert_eq!(
            build_select_everything(DialectKind::PostgreSql, "public", "users").unwrap(),
            "SELECT * FROM public.users"
        );
        assert_eq!(
            build_select_everything(DialectKind::Sqlite, "", "users").unwrap(),
            "SELECT * FROM users"
        );
    }

    #[test]
    fn test_table_names_needing_quotes_are_quoted() {
        assert_eq!(
            build_select_everything(DialectKind::PostgreSql, "public", "UserAccounts").unwrap(),
            "SELECT * FROM public.\"UserAccounts\""
        );

        let sql = build_select_all(&columns(&["id"]), DialectKind::MySql, "Shop", "order items", 10, 0)
            .unwrap();
        assert_eq!(sql, "SELECT `id` FROM `Shop`.`order items` LIMIT 10 OFFSET 0");
    }

    #[test]
    fn test_requires_quoting() {
        for sql_type in ["varchar", "VARCHAR(255)", "text", "char", "date", "datetime", "timestamp", "year", "character varying"] {
            assert!(requires_quoting(sql_type), "{} should be quoted", sql_type);
        }
        for sql_type in ["int", "bigint", "decimal(10,2)", "double precision", "boolean", "INTEGER"] {
            assert!(!requires_quoting(sql_type), "{} should not be quoted", sql_type);
        }
    }

    #[test]
    fn test_build_update_quotes_varchar_literals() {
        let sql = build_update(&update("alice", "a-17"), "varchar", "varchar");
        assert_eq!(sql, "UPDATE users SET name = 'alice' WHERE id = 'a-17'");
    }

    #[test]
    fn test_build_update_leaves_int_literals_bare() {
        let sql = build_update(&update("30", "7"), "int", "int");
        assert_eq!(sql, "UPDATE users SET name = 30 WHERE id = 7");
    }

    #[test]
    fn test_build_update_escapes_single_quotes() {
        let sql = build_update(&update("O'Brien", "7"), "text", "integer");
        assert_eq!(sql, "UPDATE users SET name = 'O''Brien' WHERE id = 7");
    }

    #[test]
    fn test_page_offset_clamps_to_first_page() {
        assert_eq!(page_offset(0, 50), 0);
        assert_eq!(page_offset(1, 50), 0);
        assert_eq!(page_offset(3, 50), 100);
    }

    #[test]
    fn test_total_pages_rounds() {
        assert_eq!(total_pages(0, 50), 1);
        assert_eq!(total_pages(250, 50), 5);
        assert_eq!(total_pages(251, 50), 5);
        assert_eq!(total_pages(275, 50), 6);
        assert_eq!(total_pages(10, 50), 1);
        assert_eq!(total_pages(10, 0), 1);
    }
}

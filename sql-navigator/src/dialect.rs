//! Dialect registry
//!
//! Enumerates the supported SQL engines and maps each one to its identifier
//! quoting rules and its fixed table of catalog/statement templates. Every other
//! component reaches dialect-specific SQL through [`DialectKind::templates`].

use crate::database::connection::ConnectionProfile;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DialectKind {
    MySql,
    PostgreSql,
    Sqlite,
    #[default]
    Unsupported,
}

/// Resolve a user-supplied dialect name (case-insensitive)
///
/// Anything other than `mysql`, `postgresql` or `sqlite` resolves to
/// [`DialectKind::Unsupported`].
pub fn resolve_dialect(name: &str) -> DialectKind {
    match name.trim().to_ascii_lowercase().as_str() {
        "mysql" => DialectKind::MySql,
        "postgresql" => DialectKind::PostgreSql,
        "sqlite" => DialectKind::Sqlite,
        _ => DialectKind::Unsupported,
    }
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::MySql => "MySQL",
            DialectKind::PostgreSql => "PostgreSQL",
            DialectKind::Sqlite => "SQLite",
            DialectKind::Unsupported => "Unsupported",
        }
    }

    /// Whether the dialect connects to a local file instead of a server
    pub fn is_file_based(&self) -> bool {
        matches!(self, DialectKind::Sqlite)
    }

    /// Fail with [`Error::UnsupportedDialect`] unless this is a known dialect
    pub fn ensure_supported(self, operation: &str) -> Result<Self> {
        match self {
            DialectKind::Unsupported => Err(Error::unsupported(self, operation)),
            supported => Ok(supported),
        }
    }

    /// Quote an identifier (table or column name)
    ///
    /// MySQL uses backticks and PostgreSQL double quotes, with embedded quote
    /// characters doubled. SQLite identifiers are emitted as-is.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        match self {
            DialectKind::MySql => format!("`{}`", identifier.replace('`', "``")),
            DialectKind::PostgreSql => format!("\"{}\"", identifier.replace('"', "\"\"")),
            DialectKind::Sqlite | DialectKind::Unsupported => identifier.to_string(),
        }
    }

    /// Quote an identifier only when it would not survive unquoted
    ///
    /// Plain lowercase names (`[a-z_][a-z0-9_]*`) stay bare; anything else,
    /// such as a mixed-case PostgreSQL table, goes through [`Self::quote_identifier`].
    pub fn quote_if_needed(&self, identifier: &str) -> String {
        let mut chars = identifier.chars();
        let plain = chars
            .next()
            .is_some_and(|first| first.is_ascii_lowercase() || first == '_')
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if plain {
            identifier.to_string()
        } else {
            self.quote_identifier(identifier)
        }
    }

    /// The schema queries are scoped to once connected
    ///
    /// MySQL browses the connected database, PostgreSQL the profile's schema
    /// (`public` unless overridden). SQLite has no schema qualifier.
    pub fn default_schema(&self, profile: &ConnectionProfile) -> String {
        match self {
            DialectKind::MySql => profile.database.clone(),
            DialectKind::PostgreSql => profile
                .schema
                .clone()
                .filter(|schema| !schema.trim().is_empty())
                .unwrap_or_else(|| "public".to_string()),
            DialectKind::Sqlite | DialectKind::Unsupported => String::new(),
        }
    }

    /// The dialect's SQL template table
    pub fn templates(&self) -> Result<&'static SqlTemplates> {
        match self {
            DialectKind::MySql => Ok(&MYSQL_TEMPLATES),
            DialectKind::PostgreSql => Ok(&POSTGRES_TEMPLATES),
            DialectKind::Sqlite => Ok(&SQLITE_TEMPLATES),
            DialectKind::Unsupported => Err(Error::unsupported(*self, "SQL templates")),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = Infallible;

    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        Ok(resolve_dialect(name))
    }
}

impl Serialize for DialectKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DialectKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(resolve_dialect(&name))
    }
}

/// Per-dialect SQL templates
///
/// Identifier placeholders (`{schema}`, `{table}`, `{database}`) are substituted
/// with [`render`] after quoting; literal values are always bound as parameters.
/// A `None` entry means the dialect has no equivalent statement.
#[derive(Debug)]
pub struct SqlTemplates {
    pub show_databases: Option<&'static str>,
    pub show_tables: Option<&'static str>,
    pub columns_info: Option<&'static str>,
    pub column_data_type: Option<&'static str>,
    pub count_rows: Option<&'static str>,
    pub count_columns: Option<&'static str>,
    pub schema_size: Option<&'static str>,
    pub table_size: Option<&'static str>,
    pub table_sizes: Option<&'static str>,
    pub show_create_table: Option<&'static str>,
    pub drop_table: Option<&'static str>,
    pub truncate_table: Option<&'static str>,
    pub create_database: Option<&'static str>,
    pub drop_database: Option<&'static str>,
}

impl SqlTemplates {
    /// Select a template by its string key
    pub fn get(&self, key: &str) -> Option<&'static str> {
        match key {
            "show_databases" => self.show_databases,
            "show_tables" => self.show_tables,
            "columns_info" => self.columns_info,
            "column_data_type" => self.column_data_type,
            "count_rows" => self.count_rows,
            "count_columns" => self.count_columns,
            "schema_size" => self.schema_size,
            "table_size" => self.table_size,
            "table_sizes" => self.table_sizes,
            "show_create_table" => self.show_create_table,
            "drop_table" => self.drop_table,
            "truncate_table" => self.truncate_table,
            "create_database" => self.create_database,
            "drop_database" => self.drop_database,
            _ => None,
        }
    }

    /// Like [`SqlTemplates::get`], failing with [`Error::UnsupportedDialect`] when absent
    pub fn require(&self, key: &str, dialect: DialectKind) -> Result<&'static str> {
        self.get(key)
            .ok_or_else(|| Error::unsupported(dialect, key.replace('_', " ")))
    }
}

/// Substitute `{name}` placeholders in a template
pub fn render(template: &str, substitutions: &[(&str, &str)]) -> String {
    substitutions
        .iter()
        .fold(template.to_string(), |sql, (name, value)| {
            sql.replace(&format!("{{{}}}", name), value)
        })
}

static MYSQL_TEMPLATES: SqlTemplates = SqlTemplates {
    show_databases: Some("SHOW DATABASES"),
    show_tables: Some("SHOW TABLES"),
    columns_info: Some(
        r#"
        SELECT
            CAST(c.COLUMN_NAME AS CHAR) AS field,
            CAST(c.COLUMN_TYPE AS CHAR) AS type,
            CAST(c.COLUMN_KEY AS CHAR) AS column_key,
            CAST(COALESCE(k.CONSTRAINT_NAME, '') AS CHAR) AS constraint_name,
            CAST(COALESCE(k.REFERENCED_TABLE_NAME, '') AS CHAR) AS referenced_table,
            CAST(COALESCE(k.REFERENCED_COLUMN_NAME, '') AS CHAR) AS referenced_column
        FROM information_schema.COLUMNS c
        LEFT JOIN information_schema.KEY_COLUMN_USAGE k
          ON c.TABLE_SCHEMA = k.TABLE_SCHEMA
          AND c.TABLE_NAME = k.TABLE_NAME
          AND c.COLUMN_NAME = k.COLUMN_NAME
        WHERE c.TABLE_SCHEMA = ?
          AND c.TABLE_NAME = ?
        ORDER BY c.ORDINAL_POSITION
    "#,
    ),
    column_data_type: Some(
        r#"
        SELECT CAST(DATA_TYPE AS CHAR)
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = ?
          AND TABLE_NAME = ?
          AND COLUMN_NAME = ?
    "#,
    ),
    count_rows: Some("SELECT COUNT(*) FROM {schema}.{table}"),
    count_columns: Some(
        r#"
        SELECT COUNT(*)
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = ?
          AND TABLE_NAME = ?
    "#,
    ),
    schema_size: Some(
        r#"
        SELECT
            CAST(? AS CHAR) AS name,
            CAST(ROUND(COALESCE(SUM(DATA_LENGTH + INDEX_LENGTH), 0) / 1024 / 1024, 2) AS CHAR) AS size_mb
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = ?
    "#,
    ),
    table_size: Some(
        r#"
        SELECT
            CAST(TABLE_NAME AS CHAR) AS table_name,
            CAST(ROUND(COALESCE(DATA_LENGTH + INDEX_LENGTH, 0) / 1024 / 1024, 2) AS CHAR) AS size_mb
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = ?
          AND TABLE_NAME = ?
    "#,
    ),
    table_sizes: Some(
        r#"
        SELECT
            CAST(TABLE_NAME AS CHAR) AS table_name,
            CAST(ROUND(COALESCE(DATA_LENGTH + INDEX_LENGTH, 0) / 1024 / 1024, 2) AS CHAR) AS size_mb
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = ?
        ORDER BY (DATA_LENGTH + INDEX_LENGTH) DESC
    "#,
    ),
    show_create_table: Some("SHOW CREATE TABLE {schema}.{table}"),
    drop_table: Some("DROP TABLE {schema}.{table}"),
    truncate_table: Some("TRUNCATE TABLE {schema}.{table}"),
    create_database: Some("CREATE DATABASE {database}"),
    drop_database: Some("DROP DATABASE {database}"),
};

static POSTGRES_TEMPLATES: SqlTemplates = SqlTemplates {
    show_databases: Some(
        r#"
        SELECT datname::text
        FROM pg_database
        WHERE NOT datistemplate
        ORDER BY datname
    "#,
    ),
    show_tables: Some(
        r#"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = $1
          AND table_type = 'BASE TABLE'
        ORDER BY table_name
    "#,
    ),
    columns_info: Some(
        r#"
        SELECT
            c.column_name::text AS field,
            c.data_type::text AS type,
            CASE
                WHEN tc.constraint_type = 'PRIMARY KEY' THEN 'PRI'
                WHEN tc.constraint_type = 'FOREIGN KEY' THEN 'MUL'
                ELSE ''
            END AS column_key,
            COALESCE(tc.constraint_name::text, '') AS constraint_name,
            CASE
                WHEN tc.constraint_type = 'FOREIGN KEY' THEN COALESCE(ccu.table_name::text, '')
                ELSE ''
            END AS referenced_table,
            CASE
                WHEN tc.constraint_type = 'FOREIGN KEY' THEN COALESCE(ccu.column_name::text, '')
                ELSE ''
            END AS referenced_column
        FROM information_schema.columns c
        LEFT JOIN information_schema.key_column_usage kcu
          ON c.table_schema = kcu.table_schema
          AND c.table_name = kcu.table_name
          AND c.column_name = kcu.column_name
        LEFT JOIN information_schema.table_constraints tc
          ON kcu.constraint_schema = tc.constraint_schema
          AND kcu.constraint_name = tc.constraint_name
        LEFT JOIN information_schema.constraint_column_usage ccu
          ON tc.constraint_schema = ccu.constraint_schema
          AND tc.constraint_name = ccu.constraint_name
        WHERE c.table_schema = $1
          AND c.table_name = $2
        ORDER BY c.ordinal_position
    "#,
    ),
    column_data_type: Some(
        r#"
        SELECT data_type::text
        FROM information_schema.columns
        WHERE table_schema = $1
          AND table_name = $2
          AND column_name = $3
    "#,
    ),
    count_rows: Some("SELECT COUNT(*) FROM {schema}.{table}"),
    count_columns: Some(
        r#"
        SELECT COUNT(column_name)
        FROM information_schema.columns
        WHERE table_schema = $1
          AND table_name = $2
    "#,
    ),
    schema_size: Some(
        r#"
        SELECT
            current_database()::text AS name,
            ROUND(pg_database_size(current_database()) / 1024.0 / 1024.0, 2)::float8 AS size_mb
    "#,
    ),
    table_size: Some(
        r#"
        SELECT
            $2::text AS table_name,
            ROUND(pg_total_relation_size(format('%I.%I', $1::text, $2::text)::regclass) / 1024.0 / 1024.0, 2)::float8 AS size_mb
    "#,
    ),
    table_sizes: Some(
        r#"
        SELECT
            table_name::text AS table_name,
            ROUND(pg_total_relation_size(format('%I.%I', table_schema, table_name)::regclass) / 1024.0 / 1024.0, 2)::float8 AS size_mb
        FROM information_schema.tables
        WHERE table_type = 'BASE TABLE'
          AND table_schema = $1
        ORDER BY size_mb DESC
    "#,
    ),
    show_create_table: Some(
        "SELECT pg_temp.sql_navigator_show_create_table($1::varchar, $2::varchar)",
    ),
    drop_table: Some("DROP TABLE IF EXISTS {schema}.{table}"),
    truncate_table: Some("TRUNCATE TABLE {schema}.{table}"),
    create_database: Some("CREATE DATABASE {database}"),
    drop_database: Some("DROP DATABASE IF EXISTS {database}"),
};

static SQLITE_TEMPLATES: SqlTemplates = SqlTemplates {
    show_databases: Some("SELECT name FROM pragma_database_list ORDER BY seq"),
    show_tables: Some(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    ),
    columns_info: Some(
        r#"
        SELECT
            p.name AS field,
            p.type AS type,
            CASE
                WHEN p.pk > 0 THEN 'PRI'
                WHEN f."from" IS NOT NULL THEN 'MUL'
                ELSE ''
            END AS column_key,
            '' AS constraint_name,
            COALESCE(f."table", '') AS referenced_table,
            COALESCE(f."to", '') AS referenced_column
        FROM pragma_table_info(?1) p
        LEFT JOIN pragma_foreign_key_list(?1) f
          ON f."from" = p.name
        ORDER BY p.cid
    "#,
    ),
    column_data_type: Some("SELECT type FROM pragma_table_info(?1) WHERE name = ?2"),
    count_rows: Some("SELECT COUNT(*) FROM {table}"),
    count_columns: Some("SELECT COUNT(*) FROM pragma_table_info(?1)"),
    // No portable size statistics without the dbstat virtual table
    schema_size: None,
    table_size: None,
    table_sizes: None,
    show_create_table: Some(
        "SELECT name, sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
    ),
    drop_table: Some("DROP TABLE {table}"),
    truncate_table: Some("DELETE FROM {table}"),
    create_database: None,
    drop_database: None,
};

//! # sql-navigator
//!
//! Browse and manipulate MySQL, PostgreSQL and SQLite databases through one uniform API.
//!
//! ## Features
//!
//! - Connection handling with a liveness check per dialect
//! - Schema, table and column introspection (including foreign key targets)
//! - Dialect-aware paginated browsing and type-aware cell updates
//! - Raw SQL execution
//! - JSON / CSV export and `CREATE TABLE` reconstruction
//! - Per-caller sessions, each owning its own connection pool
//!
//! ## Security Warning
//!
//! **This is a development tool only!**
//!
//! - No authentication/authorization built-in
//! - Raw query execution allows full database access (INSERT/UPDATE/DELETE/DROP)
//! - Should never be exposed in production or public networks
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sql_navigator::{ConnectionProfile, DialectKind, SessionId, SessionRegistry};
//!
//! # async fn example() -> sql_navigator::Result<()> {
//! let registry = SessionRegistry::default();
//! let navigator = registry.navigator(&SessionId::default()).await;
//!
//! let profile = ConnectionProfile {
//!     dialect: DialectKind::Sqlite,
//!     file_path: Some("./data/example.db".into()),
//!     ..Default::default()
//! };
//! let connected = navigator.connect(profile).await?;
//! println!("connected to {} ({} tables)", connected.schema, connected.tables.len());
//!
//! let page = navigator.get_table("users", 1, 50).await?;
//! println!("{} of {} rows", page.table.row_count, page.total_rows);
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod api;
pub mod client;
pub mod database;
pub mod decoder;
pub mod dialect;
pub mod exporter;
pub mod layer;
pub mod query;
pub mod schema;
pub mod session;

// Public exports
pub use client::{Client, Navigator, SessionState};
pub use database::connection::{ConnectionProfile, Dsn, PoolSettings};
pub use database::traits::DatabaseProvider;
pub use decoder::{RawResultSet, Row, SqlValue};
pub use dialect::{resolve_dialect, DialectKind, SqlTemplates};
pub use exporter::FileExport;
pub use layer::NavigatorLayer;
pub use schema::{
    CellUpdate, Column, Connected, KeyRole, QueryRequest, QueryResult, SchemaSize,
    SchemaSnapshot, Table, TableColumns, TablePage, TableSize,
};
pub use session::{SessionId, SessionRegistry};

use std::fmt::Display;
use thiserror::Error;

/// Error raised by every core operation
///
/// Each variant carries the human-readable cause; [`Error::kind`] gives the
/// boundary layer a stable discriminant to map onto its own presentation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("{operation} is not supported for dialect {dialect}")]
    UnsupportedDialect {
        dialect: DialectKind,
        operation: String,
    },

    #[error("No active database connection")]
    NoActiveConnection,

    #[error("Introspection failed: {0}")]
    IntrospectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryExecutionFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),
}

/// Discriminant of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectionFailed,
    UnsupportedDialect,
    NoActiveConnection,
    IntrospectionFailed,
    QueryExecutionFailed,
    ExportFailed,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Error::UnsupportedDialect { .. } => ErrorKind::UnsupportedDialect,
            Error::NoActiveConnection => ErrorKind::NoActiveConnection,
            Error::IntrospectionFailed(_) => ErrorKind::IntrospectionFailed,
            Error::QueryExecutionFailed(_) => ErrorKind::QueryExecutionFailed,
            Error::ExportFailed(_) => ErrorKind::ExportFailed,
        }
    }

    pub fn unsupported(dialect: DialectKind, operation: impl Into<String>) -> Self {
        Error::UnsupportedDialect {
            dialect,
            operation: operation.into(),
        }
    }

    pub(crate) fn connection(error: impl Display) -> Self {
        Error::ConnectionFailed(error.to_string())
    }

    pub(crate) fn introspection(error: impl Display) -> Self {
        Error::IntrospectionFailed(error.to_string())
    }

    pub(crate) fn execution(error: impl Display) -> Self {
        Error::QueryExecutionFailed(error.to_string())
    }

    pub(crate) fn export(error: impl Display) -> Self {
        Error::ExportFailed(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::ExportFailed(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_matches_variant() {
        assert_eq!(Error::NoActiveConnection.kind(), ErrorKind::NoActiveConnection);
        assert_eq!(
            Error::unsupported(DialectKind::Sqlite, "table size").kind(),
            ErrorKind::UnsupportedDialect
        );
        assert_eq!(Error::execution("boom").kind(), ErrorKind::QueryExecutionFailed);
    }

    #[test]
    fn test_unsupported_message_names_dialect() {
        let error = Error::unsupported(DialectKind::Sqlite, "table size");
        assert_eq!(error.to_string(), "table size is not supported for dialect SQLite");
    }
}

//! Database abstraction layer
//!
//! This module provides a dialect-agnostic interface for connection handling,
//! schema introspection and statement execution.

pub mod connection;
pub mod traits;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export the main trait
pub use connection::connect;
pub use traits::{DatabaseProvider, Execution};

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` storage for the accident map.
//!
//! One `DuckDB` database holds the accident dataset, its reference tables,
//! and the report cache. The cache lives in two structurally identical
//! tables: `report_cache` (live, read by the serving path) and
//! `report_cache_staging` (owned by the rebuild job). Publishing swaps the
//! staging contents into the live table inside a single exclusive
//! transaction; see [`cache_store::CacheStore::publish`].
//!
//! Every connection handed out by a [`pool::DuckDbPool`] is a clone of one
//! root connection, so all pools opened from the same root see the same
//! database.

pub mod cache_store;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod paths;
pub mod pool;
pub mod schema;

use std::path::Path;

use duckdb::Connection;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Opens (or creates) the accident map database at `path` and ensures the
/// schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the directory, connection, or schema creation
/// fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    paths::ensure_parent_dir(path)?;
    let conn = Connection::open(path)?;
    schema::create_schema(&conn)?;
    log::debug!("Opened accident database at {}", path.display());
    Ok(conn)
}

/// Opens a private in-memory database with the schema applied.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    schema::create_schema(&conn)?;
    Ok(conn)
}

/// Parses a `DuckDB` timestamp rendered with `::TEXT`.
///
/// `DuckDB` omits fractional seconds when they are zero, so both
/// `2024-01-15 10:30:00` and `2024-01-15 10:30:00.123` are accepted.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<chrono::NaiveDateTime> {
    use chrono::NaiveDateTime;

    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }

    log::warn!("Failed to parse timestamp: {s:?}");
    None
}

/// Formats a timestamp the way `CAST(? AS TIMESTAMP)` expects it.
#[must_use]
pub fn format_timestamp(dt: &chrono::NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duckdb_timestamp_text() {
        let plain = parse_timestamp("2020-06-15 08:30:00").unwrap();
        assert_eq!(format_timestamp(&plain), "2020-06-15 08:30:00");

        let fractional = parse_timestamp("2020-06-15 08:30:00.250").unwrap();
        assert_eq!(format_timestamp(&fractional), "2020-06-15 08:30:00");

        assert!(parse_timestamp("yesterday").is_none());
    }
}

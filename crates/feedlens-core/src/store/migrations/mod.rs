//! State store migrations
//!
//! SQL migrations are embedded as strings and executed when the store opens.

use rusqlite::Connection;

use crate::error::Result;

/// State tables SQL (001)
pub const STATE_TABLES_SQL: &str = include_str!("001_state_entries.sql");

/// Run all state store migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(STATE_TABLES_SQL)?;
    Ok(())
}

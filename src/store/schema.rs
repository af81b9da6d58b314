use rusqlite::{params, Connection, OptionalExtension, Result};
use tracing::{debug, info};

/// Store schema version as (major, minor). Any mismatch invalidates the store.
pub const SCHEMA_VERSION: (u32, u32) = (1, 0);

/// Create every table and stamp the current version
pub fn create_schema(conn: &Connection) -> Result<()> {
    info!("Creating cxxd index schema v{}.{}", SCHEMA_VERSION.0, SCHEMA_VERSION.1);

    // Symbol occurrences - one row per (file, usr, line)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS symbol (
            file TEXT NOT NULL,
            line INTEGER NOT NULL,
            column INTEGER NOT NULL,
            usr TEXT NOT NULL,
            context TEXT NOT NULL,
            kind TEXT NOT NULL,
            is_definition INTEGER NOT NULL,
            PRIMARY KEY (file, usr, line)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_symbol_usr
         ON symbol(usr)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_symbol_file
         ON symbol(file)",
        [],
    )?;

    // Compiler diagnostics
    conn.execute(
        "CREATE TABLE IF NOT EXISTS diagnostics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file TEXT NOT NULL,
            line INTEGER NOT NULL,
            column INTEGER NOT NULL,
            message TEXT NOT NULL,
            severity INTEGER NOT NULL,
            UNIQUE (file, line, column, message)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_diagnostics_file
         ON diagnostics(file)",
        [],
    )?;

    // Sub-notes of a diagnostic, removed together with their parent
    conn.execute(
        "CREATE TABLE IF NOT EXISTS diagnostics_details (
            parent_id INTEGER NOT NULL,
            file TEXT NOT NULL,
            line INTEGER NOT NULL,
            column INTEGER NOT NULL,
            message TEXT NOT NULL,
            severity INTEGER NOT NULL,
            FOREIGN KEY (parent_id) REFERENCES diagnostics(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_diagnostics_details_parent
         ON diagnostics_details(parent_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS version (
            major INTEGER NOT NULL,
            minor INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute("DELETE FROM version", [])?;
    conn.execute(
        "INSERT INTO version (major, minor) VALUES (?1, ?2)",
        params![SCHEMA_VERSION.0, SCHEMA_VERSION.1],
    )?;

    Ok(())
}

/// Read the stored version, `None` when the store was never stamped
pub fn read_version(conn: &Connection) -> Result<Option<(u32, u32)>> {
    let has_version_table: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'version'",
        [],
        |row| row.get(0),
    )?;

    if has_version_table == 0 {
        debug!("Store has no version table");
        return Ok(None);
    }

    conn.query_row("SELECT major, minor FROM version LIMIT 1", [], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })
    .optional()
}

use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace};

use super::schema::{self, SCHEMA_VERSION};
use super::{
    Definition, DiagnosticDetail, DiagnosticNote, DiagnosticRecord, NewDiagnostic, SortOrder,
    SymbolRecord,
};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Rows fetched per round trip when paging through a store
const PAGE_SIZE: i64 = 1000;

const SYMBOL_COLUMNS: &str = "file, line, column, usr, context, kind, is_definition";

/// Durable symbol/diagnostics database for one project root (or one worker)
#[derive(Clone)]
pub struct SymbolStore {
    pool: ConnectionPool,
    db_path: PathBuf,
}

impl SymbolStore {
    /// Create (or reuse) a database at `db_path` and stamp the current schema
    pub fn create(db_path: impl AsRef<Path>) -> Result<Self> {
        let store = Self::connect(db_path.as_ref())?;
        store.create_schema()?;
        Ok(store)
    }

    /// Open an existing database without touching its schema
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if !db_path.exists() {
            anyhow::bail!("Symbol store does not exist: {}", db_path.display());
        }
        Self::connect(db_path)
    }

    fn connect(db_path: &Path) -> Result<Self> {
        let db_path = db_path.to_path_buf();

        info!("Opening symbol store at: {}", db_path.display());

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let manager = SqliteConnectionManager::file(&db_path).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(10))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .context("Failed to create connection pool")?;

        Ok(Self { pool, db_path })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().context("Failed to get connection from pool")
    }

    pub fn create_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;
        schema::create_schema(&conn).context("Failed to create schema")
    }

    pub fn schema_version(&self) -> Result<Option<(u32, u32)>> {
        let conn = self.get_conn()?;
        schema::read_version(&conn).context("Failed to read schema version")
    }

    /// True when the stored version differs from the one this build expects
    pub fn is_stale(&self) -> Result<bool> {
        Ok(self.schema_version()? != Some(SCHEMA_VERSION))
    }

    /// Insert symbol occurrences, silently skipping duplicate (file, usr, line) keys.
    ///
    /// Returns the number of rows actually inserted.
    pub fn insert_symbol_batch(&self, records: &[SymbolRecord]) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let inserted = insert_symbols(&tx, records)?;
        tx.commit()?;

        debug!("Inserted {} of {} symbol records", inserted, records.len());
        Ok(inserted)
    }

    /// Insert diagnostics with their notes; an identical diagnostic already
    /// present at the same location is kept as is.
    pub fn insert_diagnostics(&self, diagnostics: &[NewDiagnostic]) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let inserted = insert_diagnostic_rows(&tx, diagnostics)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Replace everything known about `file` in a single transaction
    pub fn replace_file_entries(
        &self,
        file: &str,
        symbols: &[SymbolRecord],
        diagnostics: &[NewDiagnostic],
    ) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        delete_file_rows(&tx, file)?;
        let inserted = insert_symbols(&tx, symbols)?;
        insert_diagnostic_rows(&tx, diagnostics)?;
        tx.commit()?;

        debug!("Stored {} symbols and {} diagnostics for {}", inserted, diagnostics.len(), file);
        Ok(())
    }

    /// Delete symbols and diagnostics recorded for a root-relative path
    pub fn delete_entries_for_file(&self, file: &str) -> Result<()> {
        let conn = self.get_conn()?;
        delete_file_rows(&conn, file)?;
        Ok(())
    }

    /// Clear all data, keeping the schema and version
    pub fn delete_all(&self) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM diagnostics_details", [])?;
        tx.execute("DELETE FROM diagnostics", [])?;
        tx.execute("DELETE FROM symbol", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Every occurrence of `usr`
    pub fn fetch_by_usr(&self, usr: &str) -> Result<Vec<SymbolRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM symbol WHERE usr = ?1 ORDER BY file, line, column",
            SYMBOL_COLUMNS
        ))?;

        let symbols = stmt
            .query_map([usr], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(symbols)
    }

    /// The definition occurrence of `usr`, if one was indexed
    pub fn fetch_definition_by_usr(&self, usr: &str) -> Result<Option<SymbolRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM symbol WHERE usr = ?1 AND is_definition = 1
             ORDER BY file, line LIMIT 1",
            SYMBOL_COLUMNS
        ))?;

        let symbol = stmt.query_row([usr], row_to_symbol).optional()?;
        Ok(symbol)
    }

    /// Every occurrence recorded for one file
    pub fn fetch_symbols_for_file(&self, file: &str) -> Result<Vec<SymbolRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM symbol WHERE file = ?1 ORDER BY line, column, usr",
            SYMBOL_COLUMNS
        ))?;

        let symbols = stmt
            .query_map([file], row_to_symbol)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(symbols)
    }

    pub fn fetch_all_diagnostics(&self, order: SortOrder) -> Result<Vec<DiagnosticRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT id, file, line, column, message, severity FROM diagnostics ORDER BY {}",
            order.order_by()
        ))?;

        let diagnostics = stmt
            .query_map([], |row| {
                Ok(DiagnosticRecord {
                    id: row.get(0)?,
                    file: row.get(1)?,
                    line: row.get(2)?,
                    column: row.get(3)?,
                    message: row.get(4)?,
                    severity: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(diagnostics)
    }

    pub fn fetch_diagnostic_details(&self, diagnostic_id: i64) -> Result<Vec<DiagnosticDetail>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT parent_id, file, line, column, message, severity
             FROM diagnostics_details WHERE parent_id = ?1 ORDER BY rowid",
        )?;

        let details = stmt
            .query_map([diagnostic_id], |row| {
                Ok(DiagnosticDetail {
                    parent_id: row.get(0)?,
                    file: row.get(1)?,
                    line: row.get(2)?,
                    column: row.get(3)?,
                    message: row.get(4)?,
                    severity: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(details)
    }

    /// Lazily stream every definition site.
    ///
    /// Each call starts a fresh, forward-only pass over the store.
    pub fn fetch_all_definitions(&self) -> Result<DefinitionIter> {
        Ok(DefinitionIter {
            conn: self.get_conn()?,
            last_rowid: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    /// Apply every row of `other` through the regular insert paths.
    ///
    /// Returns the number of symbol rows that were new to this store.
    pub fn merge_from(&self, other: &SymbolStore) -> Result<usize> {
        info!("Merging {} into {}", other.path().display(), self.path().display());

        let source = other.get_conn()?;
        let mut merged = 0;
        let mut last_rowid = 0i64;

        loop {
            let mut stmt = source.prepare_cached(&format!(
                "SELECT rowid, {} FROM symbol WHERE rowid > ?1 ORDER BY rowid LIMIT ?2",
                SYMBOL_COLUMNS
            ))?;

            let mut page = Vec::new();
            let mut rows = stmt.query(params![last_rowid, PAGE_SIZE])?;
            while let Some(row) = rows.next()? {
                last_rowid = row.get(0)?;
                page.push(symbol_from_offset(row, 1)?);
            }

            if page.is_empty() {
                break;
            }

            merged += self.insert_symbol_batch(&page)?;

            if (page.len() as i64) < PAGE_SIZE {
                break;
            }
        }

        let mut diagnostics = Vec::new();
        for record in other.fetch_all_diagnostics(SortOrder::Unsorted)? {
            let notes = other
                .fetch_diagnostic_details(record.id)?
                .into_iter()
                .map(|detail| DiagnosticNote {
                    file: detail.file,
                    line: detail.line,
                    column: detail.column,
                    message: detail.message,
                    severity: detail.severity,
                })
                .collect();

            diagnostics.push(NewDiagnostic {
                file: record.file,
                line: record.line,
                column: record.column,
                message: record.message,
                severity: record.severity,
                notes,
            });
        }
        self.insert_diagnostics(&diagnostics)?;

        debug!("Merged {} symbols and {} diagnostics", merged, diagnostics.len());
        Ok(merged)
    }

    /// Get index statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_conn()?;

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            total_symbols: count("SELECT COUNT(*) FROM symbol")?,
            total_definitions: count("SELECT COUNT(*) FROM symbol WHERE is_definition = 1")?,
            total_files: count("SELECT COUNT(DISTINCT file) FROM symbol")?,
            total_diagnostics: count("SELECT COUNT(*) FROM diagnostics")?,
        })
    }
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_symbols: usize,
    pub total_definitions: usize,
    pub total_files: usize,
    pub total_diagnostics: usize,
}

/// Forward-only cursor over definition rows, paged by rowid
pub struct DefinitionIter {
    conn: PooledConnection<SqliteConnectionManager>,
    last_rowid: i64,
    buffer: VecDeque<Definition>,
    exhausted: bool,
}

impl DefinitionIter {
    fn refill(&mut self) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT rowid, file, line, column, context FROM symbol
             WHERE is_definition = 1 AND rowid > ?1
             ORDER BY rowid LIMIT ?2",
        )?;

        let page = stmt
            .query_map(params![self.last_rowid, PAGE_SIZE], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Definition {
                        file: row.get(1)?,
                        line: row.get(2)?,
                        column: row.get(3)?,
                        context: row.get(4)?,
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if (page.len() as i64) < PAGE_SIZE {
            self.exhausted = true;
        }

        for (rowid, definition) in page {
            self.last_rowid = rowid;
            self.buffer.push_back(definition);
        }

        Ok(())
    }
}

impl Iterator for DefinitionIter {
    type Item = Result<Definition>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.refill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}

fn insert_symbols(conn: &Connection, records: &[SymbolRecord]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO symbol (file, line, column, usr, context, kind, is_definition)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    let mut inserted = 0;
    for record in records {
        let changed = stmt.execute(params![
            record.file,
            record.line,
            record.column,
            record.usr,
            record.context,
            record.kind,
            record.is_definition,
        ])?;

        if changed == 0 {
            trace!("Duplicate symbol {} at {}:{}", record.usr, record.file, record.line);
        }
        inserted += changed;
    }

    Ok(inserted)
}

fn insert_diagnostic_rows(conn: &Connection, diagnostics: &[NewDiagnostic]) -> Result<usize> {
    let mut parent_stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO diagnostics (file, line, column, message, severity)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut detail_stmt = conn.prepare_cached(
        "INSERT INTO diagnostics_details (parent_id, file, line, column, message, severity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    let mut inserted = 0;
    for diagnostic in diagnostics {
        let changed = parent_stmt.execute(params![
            diagnostic.file,
            diagnostic.line,
            diagnostic.column,
            diagnostic.message,
            diagnostic.severity,
        ])?;

        if changed == 0 {
            continue;
        }

        let parent_id = conn.last_insert_rowid();
        for note in &diagnostic.notes {
            detail_stmt.execute(params![
                parent_id,
                note.file,
                note.line,
                note.column,
                note.message,
                note.severity,
            ])?;
        }
        inserted += 1;
    }

    Ok(inserted)
}

fn delete_file_rows(conn: &Connection, file: &str) -> Result<()> {
    let symbols = conn.execute("DELETE FROM symbol WHERE file = ?1", [file])?;
    let diagnostics = conn.execute("DELETE FROM diagnostics WHERE file = ?1", [file])?;
    debug!("Deleted {} symbols and {} diagnostics for {}", symbols, diagnostics, file);
    Ok(())
}

/// Convert database row to SymbolRecord
fn row_to_symbol(row: &Row) -> rusqlite::Result<SymbolRecord> {
    symbol_from_offset(row, 0)
}

fn symbol_from_offset(row: &Row, offset: usize) -> rusqlite::Result<SymbolRecord> {
    Ok(SymbolRecord {
        file: row.get(offset)?,
        line: row.get(offset + 1)?,
        column: row.get(offset + 2)?,
        usr: row.get(offset + 3)?,
        context: row.get(offset + 4)?,
        kind: row.get(offset + 5)?,
        is_definition: row.get(offset + 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Severity, SymbolKind};
    use tempfile::tempdir;

    fn symbol(file: &str, line: u32, usr: &str, is_definition: bool) -> SymbolRecord {
        SymbolRecord {
            file: file.to_string(),
            line,
            column: 5,
            usr: usr.to_string(),
            context: format!("line {} of {}", line, file),
            kind: SymbolKind::Function,
            is_definition,
        }
    }

    fn diagnostic(file: &str, line: u32, message: &str, notes: usize) -> NewDiagnostic {
        NewDiagnostic {
            file: file.to_string(),
            line,
            column: 1,
            message: message.to_string(),
            severity: Severity::Error,
            notes: (0..notes)
                .map(|i| DiagnosticNote {
                    file: file.to_string(),
                    line: i as u32 + 1,
                    column: 1,
                    message: format!("note {}", i),
                    severity: Severity::Note,
                })
                .collect(),
        }
    }

    #[test]
    fn test_create_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let store = SymbolStore::create(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.schema_version().unwrap(), Some(SCHEMA_VERSION));
        assert!(!store.is_stale().unwrap());
    }

    #[test]
    fn test_open_missing_store_fails() {
        let dir = tempdir().unwrap();
        assert!(SymbolStore::open(dir.path().join("missing.db")).is_err());
    }

    #[test]
    fn test_insert_and_fetch_by_usr() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("test.db")).unwrap();

        store
            .insert_symbol_batch(&[
                symbol("b.cpp", 10, "c:@F@foo", false),
                symbol("a.cpp", 3, "c:@F@foo", true),
                symbol("a.cpp", 7, "c:@F@bar", true),
            ])
            .unwrap();

        let foo = store.fetch_by_usr("c:@F@foo").unwrap();
        assert_eq!(foo.len(), 2);
        assert_eq!(foo[0].file, "a.cpp");
        assert_eq!(foo[1].file, "b.cpp");

        let definition = store.fetch_definition_by_usr("c:@F@foo").unwrap().unwrap();
        assert_eq!(definition.file, "a.cpp");
        assert_eq!(definition.line, 3);
        assert_eq!(definition.kind, SymbolKind::Function);

        assert!(store.fetch_by_usr("c:@F@missing").unwrap().is_empty());
        assert!(store.fetch_definition_by_usr("c:@F@missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_keys_are_ignored() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("test.db")).unwrap();

        let inserted = store
            .insert_symbol_batch(&[
                symbol("a.cpp", 3, "c:@F@foo", true),
                symbol("a.cpp", 3, "c:@F@foo", true),
                symbol("a.cpp", 4, "c:@F@foo", false),
            ])
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(store.fetch_by_usr("c:@F@foo").unwrap().len(), 2);

        // A later batch repeating the key is still accepted
        let inserted = store
            .insert_symbol_batch(&[symbol("a.cpp", 3, "c:@F@foo", true), symbol("a.cpp", 9, "c:@F@baz", true)])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.stats().unwrap().total_symbols, 3);
    }

    #[test]
    fn test_delete_entries_for_file() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("test.db")).unwrap();

        store
            .insert_symbol_batch(&[symbol("a.cpp", 1, "c:@F@a", true), symbol("b.cpp", 1, "c:@F@b", true)])
            .unwrap();
        store
            .insert_diagnostics(&[diagnostic("a.cpp", 2, "expected ';'", 2), diagnostic("b.cpp", 2, "oops", 0)])
            .unwrap();

        store.delete_entries_for_file("a.cpp").unwrap();

        assert!(store.fetch_symbols_for_file("a.cpp").unwrap().is_empty());
        assert_eq!(store.fetch_symbols_for_file("b.cpp").unwrap().len(), 1);

        let diagnostics = store.fetch_all_diagnostics(SortOrder::Unsorted).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].file, "b.cpp");

        // Details went away with their parent
        let conn = store.get_conn().unwrap();
        let details: i64 = conn
            .query_row("SELECT COUNT(*) FROM diagnostics_details", [], |row| row.get(0))
            .unwrap();
        assert_eq!(details, 0);
    }

    #[test]
    fn test_replace_file_entries_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("test.db")).unwrap();

        let symbols = vec![symbol("a.cpp", 1, "c:@F@a", true), symbol("a.cpp", 5, "c:@F@b", false)];
        let diagnostics = vec![diagnostic("a.cpp", 3, "expected '}'", 1)];

        store.replace_file_entries("a.cpp", &symbols, &diagnostics).unwrap();
        let first = store.fetch_symbols_for_file("a.cpp").unwrap();
        store.replace_file_entries("a.cpp", &symbols, &diagnostics).unwrap();
        let second = store.fetch_symbols_for_file("a.cpp").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.fetch_all_diagnostics(SortOrder::Unsorted).unwrap().len(), 1);
    }

    #[test]
    fn test_diagnostics_sorting_and_details() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("test.db")).unwrap();

        let mut warning = diagnostic("a.cpp", 9, "unused", 0);
        warning.severity = Severity::Warning;
        store
            .insert_diagnostics(&[warning, diagnostic("z.cpp", 1, "fatal-ish", 2), diagnostic("b.cpp", 4, "bad", 0)])
            .unwrap();

        let by_file = store.fetch_all_diagnostics(SortOrder::ByFile).unwrap();
        let files: Vec<_> = by_file.iter().map(|d| d.file.as_str()).collect();
        assert_eq!(files, vec!["a.cpp", "b.cpp", "z.cpp"]);

        let by_severity = store.fetch_all_diagnostics(SortOrder::BySeverity).unwrap();
        assert_eq!(by_severity[0].file, "b.cpp");
        assert_eq!(by_severity[1].file, "z.cpp");
        assert_eq!(by_severity[2].severity, Severity::Warning);

        let z = by_file.iter().find(|d| d.file == "z.cpp").unwrap();
        let details = store.fetch_diagnostic_details(z.id).unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].message, "note 0");
        assert!(details.iter().all(|d| d.parent_id == z.id));
    }

    #[test]
    fn test_fetch_all_definitions_is_lazy_and_restartable() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("test.db")).unwrap();

        let records: Vec<_> = (0..2500)
            .map(|i| symbol("big.cpp", i + 1, &format!("c:@F@f{}", i), i % 2 == 0))
            .collect();
        store.insert_symbol_batch(&records).unwrap();

        let first: Vec<_> = store.fetch_all_definitions().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(first.len(), 1250);
        assert_eq!(first[0].line, 1);

        // A second call starts over from the beginning
        let mut again = store.fetch_all_definitions().unwrap();
        assert_eq!(again.next().unwrap().unwrap(), first[0]);
        assert_eq!(again.count(), 1249);
    }

    #[test]
    fn test_merge_disjoint_stores() {
        let dir = tempdir().unwrap();
        let canonical = SymbolStore::create(dir.path().join("canonical.db")).unwrap();

        let mut expected = 0;
        for worker in 0..3 {
            let partial = SymbolStore::create(dir.path().join(format!("worker-{}.db", worker))).unwrap();
            let records: Vec<_> = (0..(worker + 2))
                .map(|i| symbol(&format!("w{}.cpp", worker), i + 1, "c:@F@shared", true))
                .collect();
            expected += records.len();
            partial.insert_symbol_batch(&records).unwrap();
            partial
                .insert_diagnostics(&[diagnostic(&format!("w{}.cpp", worker), 1, "err", 1)])
                .unwrap();

            canonical.merge_from(&partial).unwrap();
        }

        let stats = canonical.stats().unwrap();
        assert_eq!(stats.total_symbols, expected);
        assert_eq!(stats.total_diagnostics, 3);

        let diagnostics = canonical.fetch_all_diagnostics(SortOrder::ByFile).unwrap();
        assert_eq!(canonical.fetch_diagnostic_details(diagnostics[0].id).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_overlapping_stores_deduplicates() {
        let dir = tempdir().unwrap();
        let canonical = SymbolStore::create(dir.path().join("canonical.db")).unwrap();
        let left = SymbolStore::create(dir.path().join("left.db")).unwrap();
        let right = SymbolStore::create(dir.path().join("right.db")).unwrap();

        left.insert_symbol_batch(&[symbol("h.h", 1, "c:@S@Foo", true), symbol("a.cpp", 2, "c:@S@Foo", false)])
            .unwrap();
        right
            .insert_symbol_batch(&[symbol("h.h", 1, "c:@S@Foo", true), symbol("b.cpp", 2, "c:@S@Foo", false)])
            .unwrap();

        assert_eq!(canonical.merge_from(&left).unwrap(), 2);
        assert_eq!(canonical.merge_from(&right).unwrap(), 1);
        assert_eq!(canonical.fetch_by_usr("c:@S@Foo").unwrap().len(), 3);
    }

    #[test]
    fn test_delete_all_keeps_version() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("test.db")).unwrap();
        store.insert_symbol_batch(&[symbol("a.cpp", 1, "c:@F@a", true)]).unwrap();
        store.insert_diagnostics(&[diagnostic("a.cpp", 1, "x", 1)]).unwrap();

        store.delete_all().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_symbols, 0);
        assert_eq!(stats.total_diagnostics, 0);
        assert_eq!(store.schema_version().unwrap(), Some(SCHEMA_VERSION));
    }
}

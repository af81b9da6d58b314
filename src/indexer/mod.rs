// Indexer façade: owns the store lifecycle and answers requests

pub mod extract;
pub mod scheduler;
pub mod worker;

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::CachePolicy;
use crate::config::Config;
use crate::error::{IndexerError, IndexerResult};
use crate::flags::CompilationDatabase;
use crate::parser::{ParserService, TranslationUnit};
use crate::store::{
    DiagnosticDetail, DiagnosticRecord, SortOrder, StoreStats, SymbolRecord, SymbolStore, INDEX_DB_NAME,
};

pub use scheduler::{ScanReport, WorkerCommand};

/// Requests understood by `Indexer::handle`
#[derive(Debug, Clone)]
pub enum Request {
    RunOnSingleFile(PathBuf),
    RunOnDirectory,
    DropSingleFile(PathBuf),
    DropAll { delete_from_disk: bool },
    FindAllReferences { path: PathBuf, line: u32, column: u32 },
    FindDefinition { path: PathBuf, line: u32, column: u32 },
    FetchAllDiagnostics(SortOrder),
    FetchAllDefinitions { output: Option<PathBuf> },
    Stats,
}

/// Outcome of a request
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub success: bool,
    pub payload: Payload,
}

impl Response {
    fn ok(payload: Payload) -> Self {
        Self { success: true, payload }
    }

    fn failed(error: &IndexerError) -> Self {
        Self {
            success: false,
            payload: Payload::Error(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Empty,
    Scan(ScanReport),
    References(Vec<Location>),
    Definition(Option<Location>),
    Diagnostics(Vec<DiagnosticReport>),
    DefinitionsFile(PathBuf),
    Stats(StoreStats),
    Error(String),
}

/// A symbol occurrence as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: String,
}

impl From<SymbolRecord> for Location {
    fn from(record: SymbolRecord) -> Self {
        Self {
            file: record.file,
            line: record.line,
            column: record.column,
            context: record.context,
        }
    }
}

/// A diagnostic with its detail notes
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    #[serde(flatten)]
    pub diagnostic: DiagnosticRecord,
    pub details: Vec<DiagnosticDetail>,
}

/// Parse one file and replace its rows in `store`.
///
/// A file that cannot be parsed loses its previous rows. Returns the number of
/// symbols stored.
pub(crate) fn index_file(
    parser: &mut ParserService,
    store: &SymbolStore,
    root: &Path,
    flags: &CompilationDatabase,
    path: &Path,
) -> Result<usize> {
    let relative = extract::relative_path(root, path);
    let compile_flags = flags.flags_for(path);

    match parser.parse(path, &compile_flags) {
        Some(tunit) => {
            let (symbols, diagnostics) = extract::extract(&tunit, root);
            store
                .replace_file_entries(&relative, &symbols, &diagnostics)
                .with_context(|| format!("Failed to store entries for {}", relative))?;
            Ok(symbols.len())
        }
        None => {
            warn!("Could not parse {}, dropping its entries", path.display());
            store.delete_entries_for_file(&relative)?;
            Ok(0)
        }
    }
}

/// Symbol indexer for one project root.
///
/// The store is either absent (`NO_STORE`) or present (`READY`); every request
/// that needs the store first drops it when its schema version is outdated.
pub struct Indexer {
    root: PathBuf,
    config: Config,
    db_path: PathBuf,
    store: Option<SymbolStore>,
    flags: CompilationDatabase,
    index_parser: ParserService,
    query_parser: ParserService,
    worker_command: WorkerCommand,
}

impl Indexer {
    /// Indexer for `root`, configured from its `.cxxd_config.toml`
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let config = Config::from_project_dir(root.as_ref());
        Self::with_config(root, config)
    }

    pub fn with_config(root: impl AsRef<Path>, config: Config) -> Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .with_context(|| format!("Project root does not exist: {}", root.as_ref().display()))?;
        let db_path = root.join(INDEX_DB_NAME);

        let store = if db_path.exists() {
            Some(SymbolStore::open(&db_path)?)
        } else {
            None
        };

        let query_policy = config.cache_policy().unwrap_or_else(|e| {
            warn!("{}, falling back to the default cache", e);
            CachePolicy::BoundedFifo { capacity: 20 }
        });

        Ok(Self {
            flags: CompilationDatabase::load(&root, &config),
            index_parser: ParserService::new(CachePolicy::None)?,
            query_parser: ParserService::new(query_policy)?,
            worker_command: WorkerCommand::current_exe()?,
            root,
            config,
            db_path,
            store,
        })
    }

    /// Replace the program launched for directory-wide runs
    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = command;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True in the `READY` state
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&SymbolStore> {
        self.store.as_ref()
    }

    /// Execute a request, turning any failure into a negative response
    pub async fn handle(&mut self, request: Request) -> Response {
        debug!("Handling {:?}", request);

        let result = match request {
            Request::RunOnSingleFile(path) => self.run_on_single_file(&path).map(|_| Payload::Empty),
            Request::RunOnDirectory => self
                .run_on_directory()
                .await
                .map(|report| report.map(Payload::Scan).unwrap_or(Payload::Empty)),
            Request::DropSingleFile(path) => self.drop_single_file(&path).map(|_| Payload::Empty),
            Request::DropAll { delete_from_disk } => self.drop_all(delete_from_disk).map(|_| Payload::Empty),
            Request::FindAllReferences { path, line, column } => {
                self.find_all_references(&path, line, column).map(Payload::References)
            }
            Request::FindDefinition { path, line, column } => {
                self.find_definition(&path, line, column).map(Payload::Definition)
            }
            Request::FetchAllDiagnostics(order) => self.fetch_all_diagnostics(order).map(Payload::Diagnostics),
            Request::FetchAllDefinitions { output } => {
                self.fetch_all_definitions(output).map(Payload::DefinitionsFile)
            }
            Request::Stats => self.stats().map(Payload::Stats),
        };

        match result {
            Ok(payload) => Response::ok(payload),
            Err(e) => {
                error!("Request failed: {}", e);
                Response::failed(&e)
            }
        }
    }

    /// Index every source file under the root with worker processes.
    ///
    /// Returns `None` when a valid store already exists.
    pub async fn run_on_directory(&mut self) -> IndexerResult<Option<ScanReport>> {
        self.refresh_store()?;
        if self.store.is_some() {
            info!("Index already exists at {}", self.db_path.display());
            return Ok(None);
        }

        let store = SymbolStore::create(&self.db_path)?;
        self.store = Some(store.clone());

        let files = scheduler::enumerate_files(&self.root, &self.config);
        let watchdog = Duration::from_secs(self.config.scheduler.watchdog_timeout_secs);
        let scan = scheduler::DirectoryScan::new(&self.root, self.config.worker_count(), watchdog, &self.worker_command);
        let report = scan.run(files, &store).await?;

        Ok(Some(report))
    }

    /// Re-index one file in place
    pub fn run_on_single_file(&mut self, path: &Path) -> IndexerResult<()> {
        let path = self.resolve(path);
        self.check_blacklist(&path)?;
        let store = self.ready_store()?;

        let symbols = index_file(&mut self.index_parser, &store, &self.root, &self.flags, &path)?;
        info!("Indexed {} ({} symbols)", path.display(), symbols);
        Ok(())
    }

    /// Forget everything recorded for one file
    pub fn drop_single_file(&mut self, path: &Path) -> IndexerResult<()> {
        let path = self.resolve(path);
        self.check_blacklist(&path)?;
        let store = self.ready_store()?;

        store.delete_entries_for_file(&extract::relative_path(&self.root, &path))?;
        Ok(())
    }

    /// Remove the store file (`NO_STORE`) or only its rows (empty `READY`)
    pub fn drop_all(&mut self, delete_from_disk: bool) -> IndexerResult<()> {
        if delete_from_disk {
            // Close the pool before the file goes away
            self.store = None;
            remove_store_files(&self.db_path)?;
            info!("Removed index at {}", self.db_path.display());
            return Ok(());
        }

        match &self.store {
            Some(store) => store.delete_all()?,
            None => debug!("No index to clear"),
        }
        Ok(())
    }

    /// Every recorded occurrence of the symbol under (line, column) of `path`
    pub fn find_all_references(&mut self, path: &Path, line: u32, column: u32) -> IndexerResult<Vec<Location>> {
        let store = self.ready_store()?;
        let Some(usr) = self.usr_at(path, line, column) else {
            return Ok(Vec::new());
        };

        let references = store.fetch_by_usr(&usr)?;
        debug!("{} references to {}", references.len(), usr);
        Ok(references.into_iter().map(Location::from).collect())
    }

    /// Recorded definition of the symbol under (line, column) of `path`
    pub fn find_definition(&mut self, path: &Path, line: u32, column: u32) -> IndexerResult<Option<Location>> {
        let store = self.ready_store()?;
        let Some(usr) = self.usr_at(path, line, column) else {
            return Ok(None);
        };

        Ok(store.fetch_definition_by_usr(&usr)?.map(Location::from))
    }

    pub fn fetch_all_diagnostics(&mut self, order: SortOrder) -> IndexerResult<Vec<DiagnosticReport>> {
        let store = self.ready_store()?;

        let mut reports = Vec::new();
        for diagnostic in store.fetch_all_diagnostics(order)? {
            let details = store.fetch_diagnostic_details(diagnostic.id)?;
            reports.push(DiagnosticReport { diagnostic, details });
        }
        Ok(reports)
    }

    /// Write every definition as `file:line:column: context` and return the
    /// path written to
    pub fn fetch_all_definitions(&mut self, output: Option<PathBuf>) -> IndexerResult<PathBuf> {
        let store = self.ready_store()?;
        Ok(write_definitions(&store, &self.root, output)?)
    }

    pub fn stats(&mut self) -> IndexerResult<StoreStats> {
        let store = self.ready_store()?;
        Ok(store.stats()?)
    }

    /// Drop an outdated store and pick up one created by another process
    fn refresh_store(&mut self) -> IndexerResult<()> {
        if self.store.is_none() && self.db_path.exists() {
            self.store = Some(SymbolStore::open(&self.db_path)?);
        }

        let stale = match &self.store {
            Some(store) => store.is_stale().unwrap_or_else(|e| {
                warn!("Cannot read index version: {:#}", e);
                true
            }),
            None => false,
        };

        if stale {
            warn!("Index at {} has an outdated schema, dropping it", self.db_path.display());
            self.drop_all(true)?;
        }
        Ok(())
    }

    fn ready_store(&mut self) -> IndexerResult<SymbolStore> {
        self.refresh_store()?;
        self.store
            .clone()
            .ok_or_else(|| IndexerError::StoreAbsent(self.root.clone()))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        absolute.canonicalize().unwrap_or(absolute)
    }

    fn check_blacklist(&self, path: &Path) -> IndexerResult<()> {
        if self.config.is_blacklisted(&self.root, path) {
            return Err(IndexerError::Blacklisted(path.to_path_buf()));
        }
        Ok(())
    }

    fn parse_for_query(&mut self, path: &Path) -> Option<Arc<TranslationUnit>> {
        let flags = self.flags.flags_for(path);
        self.query_parser.parse(path, &flags)
    }

    fn usr_at(&mut self, path: &Path, line: u32, column: u32) -> Option<String> {
        let path = self.resolve(path);
        let Some(tunit) = self.parse_for_query(&path) else {
            warn!("Could not parse {}", path.display());
            return None;
        };

        let usr = tunit.cursor_at(line, column)?.usr()?.to_string();
        Some(usr)
    }
}

fn remove_store_files(db_path: &Path) -> Result<()> {
    if db_path.exists() {
        std::fs::remove_file(db_path).with_context(|| format!("Failed to remove {}", db_path.display()))?;
    }

    for suffix in ["-journal", "-wal", "-shm"] {
        let mut sidecar = db_path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar).with_context(|| format!("Failed to remove {}", sidecar.display()))?;
        }
    }

    Ok(())
}

fn write_definitions(store: &SymbolStore, root: &Path, output: Option<PathBuf>) -> Result<PathBuf> {
    let (file, path) = match output {
        Some(path) => {
            let file = std::fs::File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
            (file, path)
        }
        None => tempfile::Builder::new()
            .prefix("cxxd_definitions_")
            .suffix(".txt")
            .tempfile()
            .context("Failed to create a definitions file")?
            .keep()
            .context("Failed to keep the definitions file")?,
    };

    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for definition in store.fetch_all_definitions()? {
        let definition = definition?;
        writeln!(
            writer,
            "{}:{}:{}: {}",
            root.join(&definition.file).display(),
            definition.line,
            definition.column,
            definition.context.trim()
        )?;
        written += 1;
    }
    writer.flush()?;

    info!("Wrote {} definitions to {}", written, path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SCHEMA_VERSION;
    use std::fs;
    use tempfile::tempdir;

    fn project() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        (dir, root)
    }

    fn indexer(root: &Path) -> Indexer {
        Indexer::with_config(root, Config::default()).unwrap()
    }

    /// READY without running workers
    fn initialize_store(indexer: &mut Indexer) {
        let store = SymbolStore::create(indexer.db_path()).unwrap();
        indexer.store = Some(store);
    }

    #[test]
    fn test_requests_without_store_fail() {
        let (_dir, root) = project();
        fs::write(root.join("a.cpp"), "int a();\n").unwrap();
        let mut indexer = indexer(&root);

        assert!(!indexer.has_store());
        assert!(matches!(
            indexer.run_on_single_file(Path::new("a.cpp")),
            Err(IndexerError::StoreAbsent(_))
        ));
        assert!(matches!(
            indexer.find_all_references(Path::new("a.cpp"), 1, 5),
            Err(IndexerError::StoreAbsent(_))
        ));
        assert!(indexer.fetch_all_diagnostics(SortOrder::Unsorted).is_err());
        assert!(indexer.fetch_all_definitions(None).is_err());
        // Nothing to drop is fine
        assert!(indexer.drop_all(true).is_ok());
        assert!(indexer.drop_all(false).is_ok());
    }

    #[test]
    fn test_single_file_reindex_is_idempotent() {
        let (_dir, root) = project();
        fs::write(root.join("a.cpp"), "struct Point { int x; };\nint area(Point p) { return p.x; }\n").unwrap();
        let mut indexer = indexer(&root);
        initialize_store(&mut indexer);

        indexer.run_on_single_file(Path::new("a.cpp")).unwrap();
        let first = indexer.store().unwrap().fetch_symbols_for_file("a.cpp").unwrap();
        indexer.run_on_single_file(&root.join("a.cpp")).unwrap();
        let second = indexer.store().unwrap().fetch_symbols_for_file("a.cpp").unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_unparseable_file_drops_entries_and_succeeds() {
        let (_dir, root) = project();
        fs::write(root.join("a.cpp"), "int a() { return 0; }\n").unwrap();
        let mut indexer = indexer(&root);
        initialize_store(&mut indexer);

        indexer.run_on_single_file(Path::new("a.cpp")).unwrap();
        assert!(!indexer.store().unwrap().fetch_symbols_for_file("a.cpp").unwrap().is_empty());

        fs::remove_file(root.join("a.cpp")).unwrap();
        indexer.run_on_single_file(Path::new("a.cpp")).unwrap();
        assert!(indexer.store().unwrap().fetch_symbols_for_file("a.cpp").unwrap().is_empty());
    }

    #[test]
    fn test_blacklisted_file_is_rejected() {
        let (_dir, root) = project();
        fs::create_dir_all(root.join("third_party")).unwrap();
        fs::write(root.join("third_party/lib.cpp"), "int lib();\n").unwrap();

        let mut config = Config::default();
        config.indexing.blacklisted_directories = vec!["third_party".to_string()];
        let mut indexer = Indexer::with_config(&root, config).unwrap();
        initialize_store(&mut indexer);

        assert!(matches!(
            indexer.run_on_single_file(Path::new("third_party/lib.cpp")),
            Err(IndexerError::Blacklisted(_))
        ));
        assert!(matches!(
            indexer.drop_single_file(Path::new("third_party/lib.cpp")),
            Err(IndexerError::Blacklisted(_))
        ));
        assert_eq!(indexer.store().unwrap().stats().unwrap().total_symbols, 0);
    }

    #[test]
    fn test_references_and_definition() {
        let (_dir, root) = project();
        fs::write(root.join("math.h"), "int add(int a, int b);\n").unwrap();
        fs::write(root.join("math.cpp"), "#include \"math.h\"\nint add(int a, int b) { return a + b; }\n").unwrap();
        fs::write(root.join("main.cpp"), "#include \"math.h\"\nint main() { return add(1, 2); }\n").unwrap();
        let mut indexer = indexer(&root);
        initialize_store(&mut indexer);

        for file in ["math.h", "math.cpp", "main.cpp"] {
            indexer.run_on_single_file(Path::new(file)).unwrap();
        }

        let references = indexer.find_all_references(Path::new("main.cpp"), 2, 21).unwrap();
        let sites: Vec<(&str, u32, u32)> = references.iter().map(|r| (r.file.as_str(), r.line, r.column)).collect();
        assert_eq!(sites, vec![("main.cpp", 2, 21), ("math.cpp", 2, 5), ("math.h", 1, 5)]);

        let definition = indexer.find_definition(Path::new("main.cpp"), 2, 21).unwrap().unwrap();
        assert_eq!((definition.file.as_str(), definition.line, definition.column), ("math.cpp", 2, 5));

        // A position that names nothing yields an empty answer, not an error
        assert!(indexer.find_all_references(Path::new("main.cpp"), 2, 14).unwrap().is_empty());
    }

    #[test]
    fn test_drop_single_file_and_drop_all() {
        let (_dir, root) = project();
        fs::write(root.join("a.cpp"), "int a() { return 0; }\n").unwrap();
        fs::write(root.join("b.cpp"), "int b() { return 0; }\n").unwrap();
        let mut indexer = indexer(&root);
        initialize_store(&mut indexer);
        indexer.run_on_single_file(Path::new("a.cpp")).unwrap();
        indexer.run_on_single_file(Path::new("b.cpp")).unwrap();

        indexer.drop_single_file(Path::new("a.cpp")).unwrap();
        let store = indexer.store().unwrap().clone();
        assert!(store.fetch_symbols_for_file("a.cpp").unwrap().is_empty());
        assert_eq!(store.fetch_symbols_for_file("b.cpp").unwrap().len(), 1);
        drop(store);

        indexer.drop_all(false).unwrap();
        assert!(indexer.has_store());
        assert_eq!(indexer.stats().unwrap().total_symbols, 0);

        indexer.drop_all(true).unwrap();
        assert!(!indexer.has_store());
        assert!(!indexer.db_path().exists());
    }

    #[test]
    fn test_stale_store_is_dropped_implicitly() {
        let (_dir, root) = project();
        fs::write(root.join("a.cpp"), "int a() { return 0; }\n").unwrap();
        let mut indexer = indexer(&root);
        initialize_store(&mut indexer);
        indexer.run_on_single_file(Path::new("a.cpp")).unwrap();

        let conn = indexer.store().unwrap().get_conn().unwrap();
        conn.execute("UPDATE version SET major = ?1", [SCHEMA_VERSION.0 + 1]).unwrap();
        drop(conn);

        // The outdated store is deleted, which leaves NO_STORE behind
        assert!(matches!(indexer.stats(), Err(IndexerError::StoreAbsent(_))));
        assert!(!indexer.db_path().exists());
    }

    #[test]
    fn test_diagnostics_and_definitions_file() {
        let (_dir, root) = project();
        fs::write(root.join("good.cpp"), "int good() { return 1; }\n").unwrap();
        fs::write(root.join("bad.cpp"), "int bad() {\n  int x = ;\n}\n").unwrap();
        let mut indexer = indexer(&root);
        initialize_store(&mut indexer);
        indexer.run_on_single_file(Path::new("good.cpp")).unwrap();
        indexer.run_on_single_file(Path::new("bad.cpp")).unwrap();

        let diagnostics = indexer.fetch_all_diagnostics(SortOrder::ByFile).unwrap();
        assert!(!diagnostics.is_empty());
        assert!(diagnostics.iter().all(|d| d.diagnostic.file == "bad.cpp"));

        let output = root.join("definitions.txt");
        let written = indexer.fetch_all_definitions(Some(output.clone())).unwrap();
        assert_eq!(written, output);
        let content = fs::read_to_string(&output).unwrap();
        let expected = format!("{}:1:5: int good() {{ return 1; }}", root.join("good.cpp").display());
        assert!(content.lines().any(|line| line == expected));

        let temp = indexer.fetch_all_definitions(None).unwrap();
        assert!(temp.file_name().unwrap().to_string_lossy().starts_with("cxxd_definitions_"));
        assert_eq!(fs::read_to_string(&temp).unwrap(), content);
        fs::remove_file(temp).unwrap();
    }

    #[test]
    fn test_deeply_nested_expression_on_small_stack() {
        let (_dir, root) = project();
        let mut source = String::from("int sum() { return 0");
        for _ in 0..20_000 {
            source.push_str(" + 1");
        }
        source.push_str("; }\n");
        fs::write(root.join("deep.cpp"), source).unwrap();

        let (stored, found) = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                let mut indexer = indexer(&root);
                initialize_store(&mut indexer);
                indexer.run_on_single_file(Path::new("deep.cpp")).unwrap();
                let found = indexer.find_all_references(Path::new("deep.cpp"), 1, 5).unwrap();
                let stored = indexer.store().unwrap().fetch_symbols_for_file("deep.cpp").unwrap();
                (stored.len(), found.len())
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!((stored, found), (1, 1));
    }

    #[test]
    fn test_latin1_source_is_indexed() {
        let (_dir, root) = project();
        fs::write(
            root.join("legacy.cpp"),
            b"// caf\xe9 latin-1 comment\nint foo() { return 0; }\nint bar() { return 1; }\n",
        )
        .unwrap();
        let mut indexer = indexer(&root);
        initialize_store(&mut indexer);

        indexer.run_on_single_file(Path::new("legacy.cpp")).unwrap();

        let store = indexer.store().unwrap();
        assert_eq!(store.fetch_symbols_for_file("legacy.cpp").unwrap().len(), 2);
        let found = indexer.find_all_references(Path::new("legacy.cpp"), 3, 5).unwrap();
        assert_eq!(
            found.iter().map(|l| (l.file.as_str(), l.line, l.column)).collect::<Vec<_>>(),
            vec![("legacy.cpp", 3, 5)]
        );
    }

    #[tokio::test]
    async fn test_known_symbol_without_stored_rows() {
        let (_dir, root) = project();
        fs::write(root.join("a.cpp"), "int a() { return 0; }\n").unwrap();
        fs::write(root.join("b.cpp"), "int b() { return 0; }\n").unwrap();
        let mut indexer = indexer(&root);
        initialize_store(&mut indexer);
        indexer.run_on_single_file(Path::new("a.cpp")).unwrap();

        let response = indexer
            .handle(Request::FindAllReferences {
                path: PathBuf::from("b.cpp"),
                line: 1,
                column: 5,
            })
            .await;
        assert!(response.success);
        assert!(matches!(response.payload, Payload::References(ref found) if found.is_empty()));

        let response = indexer
            .handle(Request::FindDefinition {
                path: PathBuf::from("b.cpp"),
                line: 1,
                column: 5,
            })
            .await;
        assert!(response.success);
        assert!(matches!(response.payload, Payload::Definition(None)));
    }

    #[tokio::test]
    async fn test_handle_maps_errors_to_failed_responses() {
        let (_dir, root) = project();
        let mut indexer = indexer(&root);

        let response = indexer
            .handle(Request::FindAllReferences {
                path: PathBuf::from("a.cpp"),
                line: 1,
                column: 1,
            })
            .await;
        assert!(!response.success);
        assert!(matches!(response.payload, Payload::Error(_)));

        let response = indexer.handle(Request::DropAll { delete_from_disk: true }).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_directory_run_is_noop_when_ready() {
        let (_dir, root) = project();
        fs::write(root.join("a.cpp"), "int a();\n").unwrap();
        let mut indexer = indexer(&root).with_worker_command(WorkerCommand::new("/nonexistent/worker"));
        initialize_store(&mut indexer);

        let response = indexer.handle(Request::RunOnDirectory).await;
        assert!(response.success);
        assert!(matches!(response.payload, Payload::Empty));
    }
}

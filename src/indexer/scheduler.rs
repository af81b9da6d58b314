// Directory-wide indexing across worker processes
//
// The master enumerates the project's source files, launches a pool of
// worker processes (each with a private store) and hands out one file at a
// time over the worker's stdin. A worker acknowledges a finished file by
// writing `DONE` on its stdout, which is what earns it the next file.
// Once every worker has exited, the private stores are merged into the
// canonical one.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::store::SymbolStore;

/// Line a worker writes after finishing a file
pub const DONE_SENTINEL: &str = "DONE";

type WorkerId = usize;

/// How to launch a worker process.
///
/// The scheduler appends `--root <root> --store <private store>`.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The running executable's hidden `worker` subcommand
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe().context("Cannot locate the cxxd executable")?;
        Ok(Self::new(program).arg("worker"))
    }

    fn command(&self, root: &Path, store: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--root")
            .arg(root)
            .arg("--store")
            .arg(store)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

/// Outcome of a directory-wide run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    pub files_found: usize,
    pub files_dispatched: usize,
    pub files_completed: usize,
    /// Files that were lost to a failing worker or never handed out
    pub files_abandoned: Vec<PathBuf>,
    pub workers_spawned: usize,
    pub workers_failed: usize,
    pub stores_merged: usize,
    pub symbols_merged: usize,
}

/// Source files under `root`, largest first, skipping blacklisted directories
pub fn enumerate_files(root: &Path, config: &Config) -> Vec<PathBuf> {
    let blacklist = config.blacklisted_paths(root);

    let mut files: Vec<(u64, PathBuf)> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !blacklist.iter().any(|dir| entry.path().starts_with(dir)))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && config.has_source_extension(entry.path()))
        .map(|entry| {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            (size, entry.into_path())
        })
        .collect();

    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    files.into_iter().map(|(_, path)| path).collect()
}

enum WorkerEvent {
    Done(WorkerId),
    Closed(WorkerId),
}

struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    store_path: PathBuf,
}

struct Assignment {
    file: PathBuf,
    started: Instant,
}

/// Mutable state of one dispatch loop
#[derive(Default)]
struct Dispatch {
    pending: VecDeque<PathBuf>,
    assignments: HashMap<WorkerId, Assignment>,
    active: HashSet<WorkerId>,
    failed: HashSet<WorkerId>,
}

/// One directory-wide indexing run
pub struct DirectoryScan<'a> {
    root: &'a Path,
    workers: usize,
    watchdog: Duration,
    command: &'a WorkerCommand,
}

impl<'a> DirectoryScan<'a> {
    pub fn new(root: &'a Path, workers: usize, watchdog: Duration, command: &'a WorkerCommand) -> Self {
        Self {
            root,
            workers: workers.max(1),
            watchdog,
            command,
        }
    }

    /// Index `files` with worker processes and merge their stores into
    /// `canonical`. Worker failures are logged, never returned.
    pub async fn run(&self, files: Vec<PathBuf>, canonical: &SymbolStore) -> Result<ScanReport> {
        let mut report = ScanReport {
            files_found: files.len(),
            ..Default::default()
        };

        if files.is_empty() {
            info!("No source files under {}", self.root.display());
            return Ok(report);
        }

        let temp = tempfile::Builder::new()
            .prefix("cxxd-workers-")
            .tempdir()
            .context("Failed to create a directory for worker stores")?;

        let count = self.workers.min(files.len());
        info!("Indexing {} files with {} workers", files.len(), count);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut workers: HashMap<WorkerId, WorkerProcess> = HashMap::new();

        for id in 0..count {
            let store_path = temp.path().join(format!("worker-{}.db", id));
            match self.command.command(self.root, &store_path).spawn() {
                Ok(mut child) => {
                    let stdin = child.stdin.take();
                    if let Some(stdout) = child.stdout.take() {
                        spawn_reader(id, stdout, tx.clone());
                    }
                    debug!("Started worker {} (pid {:?})", id, child.id());
                    workers.insert(id, WorkerProcess { child, stdin, store_path });
                    report.workers_spawned += 1;
                }
                Err(e) => {
                    warn!("Failed to start worker {} ({}): {}", id, self.command.program.display(), e);
                    report.workers_failed += 1;
                }
            }
        }
        drop(tx);

        if workers.is_empty() {
            error!("No indexing worker could be started");
            report.files_abandoned = files;
            return Ok(report);
        }

        let mut dispatch = Dispatch {
            pending: files.into(),
            ..Default::default()
        };

        let mut ids: Vec<WorkerId> = workers.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            dispatch.active.insert(id);
            if let Some(worker) = workers.get_mut(&id) {
                dispatch.next_file(id, worker, &mut report).await;
            }
        }

        while !dispatch.active.is_empty() {
            match tokio::time::timeout(self.watchdog, rx.recv()).await {
                Ok(Some(WorkerEvent::Done(id))) => {
                    if let Some(assignment) = dispatch.assignments.remove(&id) {
                        debug!(
                            "Worker {} finished {} in {:.2}s",
                            id,
                            assignment.file.display(),
                            assignment.started.elapsed().as_secs_f64()
                        );
                        report.files_completed += 1;
                    }
                    if dispatch.active.contains(&id) {
                        if let Some(worker) = workers.get_mut(&id) {
                            dispatch.next_file(id, worker, &mut report).await;
                        }
                    }
                }
                Ok(Some(WorkerEvent::Closed(id))) => {
                    if dispatch.active.remove(&id) {
                        if let Some(assignment) = dispatch.assignments.remove(&id) {
                            warn!(
                                "Worker {} exited while indexing {}, the file is left out of the index",
                                id,
                                assignment.file.display()
                            );
                            report.files_abandoned.push(assignment.file);
                        } else {
                            warn!("Worker {} exited unexpectedly", id);
                        }
                        dispatch.failed.insert(id);
                        report.workers_failed += 1;
                        if let Some(worker) = workers.get_mut(&id) {
                            worker.stdin = None;
                        }
                    }
                }
                Ok(None) => {
                    warn!("Every worker output closed with work outstanding");
                    for (_, assignment) in dispatch.assignments.drain() {
                        report.files_abandoned.push(assignment.file);
                    }
                    break;
                }
                Err(_) => self.report_in_flight(&dispatch.assignments),
            }
        }

        if !dispatch.pending.is_empty() {
            warn!("{} files were never dispatched, no worker left to take them", dispatch.pending.len());
            report.files_abandoned.extend(dispatch.pending.drain(..));
        }

        let mut store_paths = Vec::with_capacity(workers.len());
        let mut ids: Vec<WorkerId> = workers.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let Some(mut worker) = workers.remove(&id) else {
                continue;
            };
            worker.stdin = None;
            if dispatch.failed.contains(&id) {
                let _ = worker.child.start_kill();
            }
            match worker.child.wait().await {
                Ok(status) if !status.success() && !dispatch.failed.contains(&id) => {
                    warn!("Worker {} exited with {}", id, status);
                }
                Ok(_) => trace!("Worker {} exited", id),
                Err(e) => warn!("Failed to wait for worker {}: {}", id, e),
            }
            store_paths.push((id, worker.store_path));
        }

        for (id, store_path) in store_paths {
            if !store_path.exists() {
                debug!("Worker {} left no store behind", id);
                continue;
            }
            match SymbolStore::open(&store_path).and_then(|store| canonical.merge_from(&store)) {
                Ok(merged) => {
                    report.stores_merged += 1;
                    report.symbols_merged += merged;
                }
                Err(e) => warn!("Skipping store of worker {}: {:#}", id, e),
            }
        }

        if let Err(e) = temp.close() {
            warn!("Failed to remove worker stores: {}", e);
        }

        info!(
            "Indexed {}/{} files ({} abandoned), merged {} symbols from {} stores",
            report.files_completed,
            report.files_found,
            report.files_abandoned.len(),
            report.symbols_merged,
            report.stores_merged
        );

        Ok(report)
    }

    fn report_in_flight(&self, assignments: &HashMap<WorkerId, Assignment>) {
        if assignments.is_empty() {
            warn!("No progress from any worker for {}s", self.watchdog.as_secs());
            return;
        }

        for (id, assignment) in assignments {
            warn!(
                "Worker {} still indexing {} after {:.1}s",
                id,
                assignment.file.display(),
                assignment.started.elapsed().as_secs_f64()
            );
        }
    }
}

impl Dispatch {
    /// Hand the next pending file to `id`, or close its stdin when none is left
    async fn next_file(&mut self, id: WorkerId, worker: &mut WorkerProcess, report: &mut ScanReport) {
        let Some(file) = self.pending.pop_front() else {
            trace!("No files left, closing worker {}", id);
            worker.stdin = None;
            self.active.remove(&id);
            return;
        };

        let line = format!("{}\n", file.display());
        let sent = match worker.stdin.as_mut() {
            Some(stdin) => match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            },
            None => Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin already closed")),
        };

        match sent {
            Ok(()) => {
                report.files_dispatched += 1;
                self.assignments.insert(
                    id,
                    Assignment {
                        file,
                        started: Instant::now(),
                    },
                );
            }
            Err(e) => {
                warn!("Worker {} rejected {}: {}", id, file.display(), e);
                report.files_abandoned.push(file);
                report.workers_failed += 1;
                worker.stdin = None;
                self.active.remove(&id);
                self.failed.insert(id);
            }
        }
    }
}

fn spawn_reader(id: WorkerId, stdout: ChildStdout, tx: mpsc::UnboundedSender<WorkerEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim_end() == DONE_SENTINEL => {
                    if tx.send(WorkerEvent::Done(id)).is_err() {
                        break;
                    }
                }
                Ok(Some(line)) => trace!("Worker {} wrote: {}", id, line),
                Ok(None) => {
                    let _ = tx.send(WorkerEvent::Closed(id));
                    break;
                }
                Err(e) => {
                    debug!("Reading from worker {} failed: {}", id, e);
                    let _ = tx.send(WorkerEvent::Closed(id));
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_enumerate_sorted_by_size_and_filtered() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("build/gen")).unwrap();
        fs::write(root.join("src/small.cpp"), "int a;").unwrap();
        fs::write(root.join("src/large.cpp"), "int a; int b; int c; int d;").unwrap();
        fs::write(root.join("src/medium.h"), "int a; int b;").unwrap();
        fs::write(root.join("src/notes.txt"), "not code at all, but quite long").unwrap();
        fs::write(root.join("build/gen/huge.cpp"), "x".repeat(1000)).unwrap();

        let mut config = Config::default();
        config.indexing.blacklisted_directories = vec!["build".to_string()];

        let files = enumerate_files(root, &config);
        assert_eq!(
            files,
            vec![root.join("src/large.cpp"), root.join("src/medium.h"), root.join("src/small.cpp")]
        );
    }

    #[tokio::test]
    async fn test_no_files_spawns_nothing() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("index.db")).unwrap();
        let command = WorkerCommand::new("/nonexistent/cxxd-worker");
        let scan = DirectoryScan::new(dir.path(), 4, Duration::from_secs(1), &command);

        let report = scan.run(Vec::new(), &store).await.unwrap();
        assert_eq!(report.files_found, 0);
        assert_eq!(report.workers_spawned, 0);
    }

    #[tokio::test]
    async fn test_unstartable_worker_abandons_everything() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("index.db")).unwrap();
        let command = WorkerCommand::new("/nonexistent/cxxd-worker");
        let scan = DirectoryScan::new(dir.path(), 2, Duration::from_secs(1), &command);

        let files = vec![dir.path().join("a.cpp"), dir.path().join("b.cpp"), dir.path().join("c.cpp")];
        let report = scan.run(files, &store).await.unwrap();

        assert_eq!(report.workers_spawned, 0);
        assert_eq!(report.workers_failed, 2);
        assert_eq!(report.files_abandoned.len(), 3);
        assert_eq!(store.stats().unwrap().total_symbols, 0);
    }

    /// Worker that acknowledges every file after running `body` on it
    fn script_worker(dir: &Path, body: &str) -> WorkerCommand {
        let script = dir.join("worker.sh");
        fs::write(&script, format!("while read file; do\n{}\necho DONE\ndone\n", body)).unwrap();
        WorkerCommand::new("sh").arg(script)
    }

    #[tokio::test]
    async fn test_worker_dying_mid_file_abandons_only_that_file() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("index.db")).unwrap();
        let command = script_worker(dir.path(), r#"case "$file" in *crash.cpp) exit 1;; esac"#);
        let scan = DirectoryScan::new(dir.path(), 2, Duration::from_secs(5), &command);

        let files: Vec<PathBuf> = ["crash.cpp", "a.cpp", "b.cpp", "c.cpp"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        let report = scan.run(files, &store).await.unwrap();

        assert_eq!(report.workers_spawned, 2);
        assert_eq!(report.workers_failed, 1);
        assert_eq!(report.files_dispatched, 4);
        assert_eq!(report.files_completed, 3);
        assert_eq!(report.files_abandoned, vec![dir.path().join("crash.cpp")]);
    }

    #[tokio::test]
    async fn test_slow_worker_is_waited_for() {
        let dir = tempdir().unwrap();
        let store = SymbolStore::create(dir.path().join("index.db")).unwrap();
        let command = script_worker(dir.path(), "sleep 2");
        let scan = DirectoryScan::new(dir.path(), 2, Duration::from_secs(1), &command);

        let files: Vec<PathBuf> = ["a.cpp", "b.cpp", "c.cpp"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        let report = scan.run(files, &store).await.unwrap();

        assert_eq!(report.workers_failed, 0);
        assert_eq!(report.files_completed, 3);
        assert!(report.files_abandoned.is_empty());
    }
}

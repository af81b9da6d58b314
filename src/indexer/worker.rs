// Worker side of the scheduler control channel
//
// stdin carries one absolute filename per line, stdout carries one DONE line
// per finished file. Logging must stay on stderr.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use super::index_file;
use super::scheduler::DONE_SENTINEL;
use crate::cache::CachePolicy;
use crate::config::Config;
use crate::flags::CompilationDatabase;
use crate::parser::ParserService;
use crate::store::SymbolStore;

/// Index every file named on `input` into `store`, acknowledging each on
/// `output`. Returns the number of files handled once `input` hits EOF.
pub fn serve<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    root: &Path,
    store: &SymbolStore,
    flags: &CompilationDatabase,
) -> Result<usize> {
    let mut parser = ParserService::new(CachePolicy::None)?;
    let mut handled = 0;

    for line in input.lines() {
        let line = line.context("Failed to read from the scheduler")?;
        let file = line.trim_end();
        if file.is_empty() {
            continue;
        }

        match index_file(&mut parser, store, root, flags, Path::new(file)) {
            Ok(symbols) => debug!("Indexed {} ({} symbols)", file, symbols),
            Err(e) => warn!("Failed to index {}: {:#}", file, e),
        }

        writeln!(output, "{}", DONE_SENTINEL).context("Failed to acknowledge to the scheduler")?;
        output.flush()?;
        handled += 1;
    }

    Ok(handled)
}

/// Entry point of the hidden `worker` subcommand
pub fn run_worker(root: &Path, store_path: &Path) -> Result<()> {
    let config = Config::from_project_dir(root);
    let flags = CompilationDatabase::load(root, &config);
    let store = SymbolStore::create(store_path)?;

    info!("Worker {} serving {}", std::process::id(), root.display());

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let handled = serve(stdin.lock(), stdout.lock(), root, &store, &flags)?;

    info!("Worker {} done after {} files", std::process::id(), handled);
    Ok(())
}

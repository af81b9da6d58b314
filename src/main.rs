use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cxxd::config::{Config, LoggingConfig};
use cxxd::indexer::worker;
use cxxd::store::SortOrder;
use cxxd::Request;

mod cli;

#[derive(Parser)]
#[command(name = "cxxd")]
#[command(version)]
#[command(about = "Persistent C/C++ symbol index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every source file of the project (no-op if an index exists)
    Index,

    /// Re-index a single file
    Reindex {
        file: PathBuf,
    },

    /// Remove a single file from the index
    Drop {
        file: PathBuf,
    },

    /// Clear the index
    DropAll {
        /// Delete the index file instead of emptying it
        #[arg(long)]
        delete: bool,
    },

    /// Every occurrence of the symbol at FILE:LINE:COLUMN
    References {
        file: PathBuf,
        line: u32,
        column: u32,
    },

    /// Definition of the symbol at FILE:LINE:COLUMN
    Definition {
        file: PathBuf,
        line: u32,
        column: u32,
    },

    /// List stored diagnostics
    Diagnostics {
        /// none, file or severity
        #[arg(short, long, default_value = "none")]
        sort: String,
    },

    /// Write every definition to a file
    Definitions {
        /// Destination (a temporary file when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show index statistics
    Stats,

    /// Serve filenames from stdin into a private store
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        root: PathBuf,

        #[arg(long)]
        store: PathBuf,
    },
}

/// Logs always go to stderr: a worker's stdout is its control channel
fn init_logging(debug: bool, verbose: bool, config: &LoggingConfig) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match config.format.as_str() {
        "pretty" => builder.pretty().init(),
        "full" => builder.init(),
        _ => builder.compact().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_root = match &cli.command {
        Commands::Worker { root, .. } => root.clone(),
        _ => cli.project.clone(),
    };
    let config = Config::from_project_dir(&config_root);
    init_logging(cli.debug, cli.verbose, &config.logging);

    let request = match cli.command {
        Commands::Worker { root, store } => {
            debug!("Worker {} starting", std::process::id());
            return tokio::task::spawn_blocking(move || worker::run_worker(&root, &store)).await?;
        }
        Commands::Index => Request::RunOnDirectory,
        Commands::Reindex { file } => Request::RunOnSingleFile(file),
        Commands::Drop { file } => Request::DropSingleFile(file),
        Commands::DropAll { delete } => Request::DropAll {
            delete_from_disk: delete,
        },
        Commands::References { file, line, column } => Request::FindAllReferences {
            path: file,
            line,
            column,
        },
        Commands::Definition { file, line, column } => Request::FindDefinition {
            path: file,
            line,
            column,
        },
        Commands::Diagnostics { sort } => Request::FetchAllDiagnostics(SortOrder::from_str(&sort)?),
        Commands::Definitions { output } => Request::FetchAllDefinitions { output },
        Commands::Stats => Request::Stats,
    };

    let success = cli::run(&cli.project, config, request, cli.format).await?;
    if !success {
        std::process::exit(1);
    }

    Ok(())
}

// CLI command implementations

pub mod index;
pub mod query;
pub mod stats;

use anyhow::Result;
use std::path::{Path, PathBuf};

use cxxd::config::Config;
use cxxd::{Indexer, Payload, Request};

use crate::OutputFormat;

/// Run one request against the project at `project` and print its outcome.
///
/// Returns whether the request succeeded.
pub async fn run(project: &Path, config: Config, request: Request, format: OutputFormat) -> Result<bool> {
    let mut indexer = Indexer::with_config(project, config)?;
    let response = indexer.handle(absolutize(request)?).await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(response.success);
    }

    match &response.payload {
        Payload::Empty => println!("OK"),
        Payload::Scan(report) => index::print_report(report),
        Payload::References(locations) => query::print_references(locations),
        Payload::Definition(location) => query::print_definition(location.as_ref()),
        Payload::Diagnostics(reports) => query::print_diagnostics(reports),
        Payload::DefinitionsFile(path) => println!("Definitions written to {}", path.display()),
        Payload::Stats(stats) => stats::print_stats(stats, indexer.db_path()),
        Payload::Error(message) => eprintln!("Error: {}", message),
    }

    Ok(response.success)
}

/// File arguments are given relative to the working directory
fn absolutize(request: Request) -> Result<Request> {
    let cwd = std::env::current_dir()?;
    let resolve = |path: PathBuf| if path.is_absolute() { path } else { cwd.join(path) };

    Ok(match request {
        Request::RunOnSingleFile(path) => Request::RunOnSingleFile(resolve(path)),
        Request::DropSingleFile(path) => Request::DropSingleFile(resolve(path)),
        Request::FindAllReferences { path, line, column } => Request::FindAllReferences {
            path: resolve(path),
            line,
            column,
        },
        Request::FindDefinition { path, line, column } => Request::FindDefinition {
            path: resolve(path),
            line,
            column,
        },
        Request::FetchAllDefinitions { output } => Request::FetchAllDefinitions {
            output: output.map(resolve),
        },
        other => other,
    })
}

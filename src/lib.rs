// cxxd: persistent C/C++ symbol index.
//
// A project root gets one SQLite store holding every symbol occurrence and
// syntax diagnostic of its source files. Directory-wide runs fan out over
// worker processes; single-file runs and queries go through the `Indexer`.

pub mod cache;
pub mod config;
pub mod error;
pub mod flags;
pub mod indexer;
pub mod parser;
pub mod store;

pub use config::Config;
pub use error::{IndexerError, IndexerResult};
pub use indexer::{Indexer, Payload, Request, Response};
pub use store::{SortOrder, SymbolStore};

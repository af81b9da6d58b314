// Error taxonomy for indexer requests

use std::path::PathBuf;

/// Failures that are reported back to the caller as a negative result.
///
/// Everything else (single-file parse failures, crashed workers) is absorbed
/// and logged by the component that hit it.
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("no symbol index exists under {0}; run a directory-wide index first")]
    StoreAbsent(PathBuf),

    #[error("{0} is inside a blacklisted directory")]
    Blacklisted(PathBuf),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type IndexerResult<T> = std::result::Result<T, IndexerError>;

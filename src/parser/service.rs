// Parser front door: parse with a translation-unit cache in front

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{CxxParser, TranslationUnit};
use crate::cache::{CachePolicy, TunitCache};

/// Parses files, reusing a cached unit when neither the flags nor the file's
/// modification time changed since it was parsed
pub struct ParserService {
    parser: CxxParser,
    cache: TunitCache<TranslationUnit>,
}

impl ParserService {
    pub fn new(policy: CachePolicy) -> Result<Self> {
        Ok(Self {
            parser: CxxParser::new()?,
            cache: TunitCache::new(policy),
        })
    }

    pub fn cached_units(&self) -> usize {
        self.cache.len()
    }

    /// Parse `path`, or return the cached unit when it is still valid
    pub fn parse(&mut self, path: &Path, flags: &[String]) -> Option<Arc<TranslationUnit>> {
        let filename = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mtime = match std::fs::metadata(&filename).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!("Cannot stat {}: {}", filename.display(), e);
                return None;
            }
        };

        if let Some(entry) = self.cache.fetch(&filename) {
            if entry.flags == flags && entry.mtime == mtime {
                debug!("Translation unit cache hit for {}", filename.display());
                return Some(entry.handle);
            }
            debug!("Cached unit for {} is outdated", filename.display());
        }

        let tunit = Arc::new(self.parser.parse(&filename, flags)?);
        self.cache.insert(filename, Arc::clone(&tunit), flags.to_vec(), mtime);
        Some(tunit)
    }
}

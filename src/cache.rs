// Translation-unit cache
//
// Maps a canonical source filename to the most recently parsed unit, the
// compiler flags it was parsed with and the file's modification time. The
// retention policy is pluggable: the indexer never caches (it scans each
// file once), interactive queries keep a small FIFO window.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// A cached parse result
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub handle: Arc<T>,
    pub flags: Vec<String>,
    pub mtime: SystemTime,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Arc::clone(&self.handle),
            flags: self.flags.clone(),
            mtime: self.mtime,
        }
    }
}

/// Retention policy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Always miss
    None,
    /// Never evict
    Unbounded,
    /// Evict the oldest-inserted entry once `capacity` is exceeded
    BoundedFifo { capacity: usize },
}

impl CachePolicy {
    pub fn from_config(policy: &str, capacity: usize) -> anyhow::Result<Self> {
        match policy {
            "none" => Ok(CachePolicy::None),
            "unbounded" => Ok(CachePolicy::Unbounded),
            "fifo" => {
                if capacity == 0 {
                    anyhow::bail!("FIFO cache capacity must be greater than 0");
                }
                Ok(CachePolicy::BoundedFifo { capacity })
            }
            _ => anyhow::bail!("Unknown cache policy: {}", policy),
        }
    }
}

/// Storage strategy behind a `TunitCache`
pub trait CacheStrategy<T>: Send {
    fn fetch(&self, key: &Path) -> Option<&CacheEntry<T>>;
    fn insert(&mut self, key: PathBuf, entry: CacheEntry<T>);
    fn len(&self) -> usize;
}

/// Always misses, drops whatever is inserted
pub struct NoCache;

impl<T: Send + Sync> CacheStrategy<T> for NoCache {
    fn fetch(&self, _key: &Path) -> Option<&CacheEntry<T>> {
        None
    }

    fn insert(&mut self, _key: PathBuf, _entry: CacheEntry<T>) {}

    fn len(&self) -> usize {
        0
    }
}

/// Keeps every entry forever
pub struct UnboundedCache<T> {
    entries: HashMap<PathBuf, CacheEntry<T>>,
}

impl<T> UnboundedCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Send + Sync> CacheStrategy<T> for UnboundedCache<T> {
    fn fetch(&self, key: &Path) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: PathBuf, entry: CacheEntry<T>) {
        self.entries.insert(key, entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Bounded cache evicting in insertion order.
///
/// Lookups do not refresh an entry's position, and replacing an existing key
/// keeps its original age.
pub struct FifoCache<T> {
    capacity: usize,
    order: VecDeque<PathBuf>,
    entries: HashMap<PathBuf, CacheEntry<T>>,
}

impl<T> FifoCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }
}

impl<T: Send + Sync> CacheStrategy<T> for FifoCache<T> {
    fn fetch(&self, key: &Path) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: PathBuf, entry: CacheEntry<T>) {
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = entry;
            return;
        }

        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    tracing::trace!("Evicting {} from translation-unit cache", oldest.display());
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, entry);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Translation-unit cache with a policy chosen at construction
pub struct TunitCache<T> {
    strategy: Box<dyn CacheStrategy<T>>,
}

impl<T: Send + Sync + 'static> TunitCache<T> {
    pub fn new(policy: CachePolicy) -> Self {
        let strategy: Box<dyn CacheStrategy<T>> = match policy {
            CachePolicy::None => Box::new(NoCache),
            CachePolicy::Unbounded => Box::new(UnboundedCache::new()),
            CachePolicy::BoundedFifo { capacity } => Box::new(FifoCache::new(capacity)),
        };

        Self { strategy }
    }

    /// Look up a previously inserted unit
    pub fn fetch(&self, filename: &Path) -> Option<CacheEntry<T>> {
        self.strategy.fetch(filename).cloned()
    }

    pub fn insert(&mut self, filename: PathBuf, handle: Arc<T>, flags: Vec<String>, mtime: SystemTime) {
        self.strategy.insert(filename, CacheEntry { handle, flags, mtime });
    }

    pub fn len(&self) -> usize {
        self.strategy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Configuration management for cxxd

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::CachePolicy;

/// Name of the per-project configuration file
pub const CONFIG_FILE_NAME: &str = ".cxxd_config.toml";

/// Extensions recognised as C/C++ sources without any configuration
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cxx", "c++", "h", "hh", "hpp", "hxx", "h++", "inl", "ipp", "tcc",
];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub indexing: IndexingConfig,
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Directories (relative to the project root) that are never indexed
    pub blacklisted_directories: Vec<String>,
    /// Extensions indexed in addition to `DEFAULT_EXTENSIONS`
    pub extra_extensions: Vec<String>,
    /// Flags used when neither a compilation database nor compile_flags.txt exists
    pub compiler_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker process count, 0 means one per CPU
    pub workers: usize,
    /// Seconds of silence before the scheduler reports in-flight files
    pub watchdog_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub policy: String,
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indexing: IndexingConfig::default(),
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            blacklisted_directories: vec![".git".to_string()],
            extra_extensions: vec![],
            compiler_flags: vec![],
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            watchdog_timeout_secs: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: "fifo".to_string(),
            capacity: 20,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory
    /// Looks for .cxxd_config.toml in the project root
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE_NAME, project_dir.as_ref().display());
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Absolute paths of the blacklisted directories under `root`
    pub fn blacklisted_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.indexing
            .blacklisted_directories
            .iter()
            .map(|dir| {
                let dir = Path::new(dir.trim_end_matches('/'));
                if dir.is_absolute() {
                    dir.to_path_buf()
                } else {
                    root.join(dir)
                }
            })
            .collect()
    }

    /// Check whether `path` lives inside a blacklisted directory of `root`
    pub fn is_blacklisted(&self, root: &Path, path: &Path) -> bool {
        self.blacklisted_paths(root)
            .iter()
            .any(|dir| path.starts_with(dir))
    }

    /// Check if a file has a recognised C/C++ extension (built-in or configured)
    pub fn has_source_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };

        DEFAULT_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext))
            || self
                .indexing
                .extra_extensions
                .iter()
                .any(|extra| extra.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// Number of worker processes a directory-wide run should launch
    pub fn worker_count(&self) -> usize {
        if self.scheduler.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.scheduler.workers
        }
    }

    /// Retention policy for the interactive translation-unit cache
    pub fn cache_policy(&self) -> anyhow::Result<CachePolicy> {
        CachePolicy::from_config(&self.cache.policy, self.cache.capacity)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate scheduler settings
        if self.scheduler.watchdog_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Watchdog timeout must be greater than 0"));
        }

        // Validate cache settings
        self.cache_policy()?;

        // Validate extensions
        for ext in &self.indexing.extra_extensions {
            if ext.trim_start_matches('.').is_empty() {
                return Err(anyhow::anyhow!("Empty extra extension in configuration"));
            }
        }

        // Validate logging
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty", "full"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }

        Ok(())
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;

/// Configuration for the resource cache.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root directory for cached resources.
    pub cache_dir: PathBuf,
    /// Max number of parallel downloads.
    pub max_parallel: usize,
}

impl RegistryConfig {
    /// Build a default configuration using [`default_cache_dir`].
    pub fn new() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_parallel: default_parallelism(),
        }
    }

    /// Configuration rooted at `cache_dir`, without probing for the default location.
    pub fn in_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_parallel: default_parallelism(),
        }
    }

    /// Override the cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Override the max number of parallel downloads.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4)
}

/// `~/.fxn/cache`, or the same layout under the system temp directory when the home directory
/// cannot be written to.
pub fn default_cache_dir() -> PathBuf {
    let home = BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .filter(|home| is_writable(home));
    let root = home.unwrap_or_else(|| {
        tracing::warn!("home directory is not writable, caching resources in the temp directory");
        std::env::temp_dir()
    });
    root.join(".fxn").join("cache")
}

/// Probe a directory by creating and deleting a throwaway file.
fn is_writable(dir: &Path) -> bool {
    let probe = dir.join(".fxntest");
    fs::write(&probe, b"fxn").is_ok() && fs::remove_file(&probe).is_ok()
}

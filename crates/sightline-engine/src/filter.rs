//! Decides which source locations belong to the profiled program.
//!
//! The filter runs on every sample, so verdicts are cached per path in a
//! bounded LRU.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::ProfileConfig;

const CACHE_CAPACITY: usize = 128;

/// Predicate over source paths: user program or runtime/profiler internals.
pub struct FileFilter {
    program_path: PathBuf,
    runtime_prefix: Option<PathBuf>,
    shim_file: Option<PathBuf>,
    cache: Mutex<LruCache<String, bool>>,
}

impl FileFilter {
    /// Build the filter for `config.program_path`.
    ///
    /// The program path is made absolute once here so per-sample calls only
    /// absolutize the candidate.
    pub fn new(config: &ProfileConfig) -> Self {
        let program_path =
            std::path::absolute(&config.program_path).unwrap_or_else(|_| config.program_path.clone());
        Self {
            program_path,
            runtime_prefix: config.runtime_prefix.clone(),
            shim_file: config.shim_file.clone(),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("cache capacity is nonzero"),
            )),
        }
    }

    /// Whether samples at `path` should be attributed to the user program.
    pub fn should_trace(&self, path: &str) -> bool {
        if let Some(verdict) = self.cache.lock().get(path) {
            return *verdict;
        }
        let verdict = self.classify(path);
        self.cache.lock().put(path.to_string(), verdict);
        verdict
    }

    fn classify(&self, path: &str) -> bool {
        // Synthetic frames (`<string>` and friends) and installed packages
        // are never part of the user program.
        if path.is_empty() || path.starts_with('<') || path.contains("site-packages") {
            return false;
        }
        let candidate = Path::new(path);
        if let Some(prefix) = &self.runtime_prefix {
            if candidate.starts_with(prefix) {
                return false;
            }
        }
        let absolute = match std::path::absolute(candidate) {
            Ok(p) => p,
            Err(_) => return false,
        };
        if let Some(shim) = &self.shim_file {
            if absolute == *shim || candidate == shim.as_path() {
                return false;
            }
        }
        absolute.starts_with(&self.program_path)
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

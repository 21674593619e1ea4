//! Out-of-band size-sample files written by the sampling allocator.
//!
//! The allocator appends one decimal byte count per line to a well-known
//! per-PID file and raises the matching signal once the write is flushed.
//! Draining reads the whole file, unlinks it, and hands the sizes back in
//! megabytes. The allocator recreates the file on its next write.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Which side of the heap an out-of-band report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    /// Sizes of sampled allocations.
    Malloc,
    /// Sizes of sampled frees.
    Free,
}

/// Reader for the allocator's two signal files.
pub struct AllocationBridge {
    malloc_path: PathBuf,
    free_path: PathBuf,
    parse_error_logged: AtomicBool,
}

impl AllocationBridge {
    /// Bridge for this process, rooted at `/tmp`.
    pub fn new(prefix: &str) -> Self {
        Self::with_root(Path::new("/tmp"), prefix, std::process::id())
    }

    /// Bridge rooted at an arbitrary directory. The file names must stay in
    /// sync with the allocator shim.
    pub fn with_root(root: &Path, prefix: &str, pid: u32) -> Self {
        Self {
            malloc_path: root.join(format!("{prefix}-malloc-signal-{pid}")),
            free_path: root.join(format!("{prefix}-free-signal-{pid}")),
            parse_error_logged: AtomicBool::new(false),
        }
    }

    /// The file the allocator appends `kind` samples to.
    pub fn path(&self, kind: AllocKind) -> &Path {
        match kind {
            AllocKind::Malloc => &self.malloc_path,
            AllocKind::Free => &self.free_path,
        }
    }

    /// Read and unlink `kind`'s file, returning every pending sample in MB.
    ///
    /// A missing file simply yields nothing; the next signal retries. A line
    /// that fails to parse is skipped (reported once per run), never fatal:
    /// an error escaping a signal drain would surface as a spurious failure
    /// in the profiled program.
    pub fn drain(&self, kind: AllocKind) -> Vec<f64> {
        let path = self.path(kind);
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                self.report_once(&format!("failed to read {}: {e}", path.display()));
                return Vec::new();
            }
        };
        let _ = fs::remove_file(path);

        contents
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return None;
                }
                match line.parse::<f64>() {
                    Ok(bytes) => Some(bytes / BYTES_PER_MB),
                    Err(_) => {
                        self.report_once(&format!(
                            "skipping malformed sample line in {}",
                            path.display()
                        ));
                        None
                    }
                }
            })
            .collect()
    }

    fn report_once(&self, message: &str) {
        if !self.parse_error_logged.swap(true, Ordering::Relaxed) {
            eprintln!("sightline: {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_in(dir: &Path) -> AllocationBridge {
        AllocationBridge::with_root(dir, "sightline-test", 4242)
    }

    #[test]
    fn missing_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge_in(dir.path());
        assert!(bridge.drain(AllocKind::Malloc).is_empty());
        assert!(bridge.drain(AllocKind::Free).is_empty());
    }

    #[test]
    fn drains_and_unlinks() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge_in(dir.path());
        let path = bridge.path(AllocKind::Malloc).to_path_buf();
        fs::write(&path, "1048576\n2097152\n").unwrap();

        let samples = bridge.drain(AllocKind::Malloc);
        assert_eq!(samples, vec![1.0, 2.0]);
        assert!(!path.exists());
    }

    #[test]
    fn empty_file_is_removed_without_samples() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge_in(dir.path());
        let path = bridge.path(AllocKind::Free).to_path_buf();
        fs::write(&path, "").unwrap();

        assert!(bridge.drain(AllocKind::Free).is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge_in(dir.path());
        let path = bridge.path(AllocKind::Malloc).to_path_buf();
        fs::write(&path, "1048576\nnot-a-number\n3145728\n").unwrap();

        let samples = bridge.drain(AllocKind::Malloc);
        assert_eq!(samples, vec![1.0, 3.0]);
    }

    #[test]
    fn kinds_use_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = bridge_in(dir.path());
        assert_ne!(bridge.path(AllocKind::Malloc), bridge.path(AllocKind::Free));
        fs::write(bridge.path(AllocKind::Malloc), "1048576\n").unwrap();

        assert!(bridge.drain(AllocKind::Free).is_empty());
        assert_eq!(bridge.drain(AllocKind::Malloc), vec![1.0]);
    }
}

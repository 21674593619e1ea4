//! Engine error types.

/// Errors surfaced by the profiler engine.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Report or bridge-file I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// A profiler is already installed in this process
    #[error("a profiler is already installed in this process")]
    AlreadyInstalled,

    /// Signal-driven sampling is not available on this platform
    #[error("signal-driven sampling is not supported on this platform")]
    UnsupportedPlatform,
}

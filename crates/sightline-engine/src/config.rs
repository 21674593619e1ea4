//! Profiler configuration.

use std::path::PathBuf;

/// Which timer drives CPU sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Sample process CPU time (virtual interval timer).
    Cpu,
    /// Sample wall-clock time (real interval timer).
    Wall,
}

/// Profiler configuration.
///
/// The defaults match the engine's calibrated operating point: a 10 ms mean
/// tick on the virtual timer, reports emitted only at exit.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    /// Timer mode.
    pub mode: TimerMode,
    /// Mean seconds between CPU ticks.
    pub mean_interval_s: f64,
    /// Directory of the program being profiled; only descendants are traced.
    pub program_path: PathBuf,
    /// Runtime standard-library prefix, never traced.
    pub runtime_prefix: Option<PathBuf>,
    /// The profiler's own shim file inside the embedding, never traced.
    pub shim_file: Option<PathBuf>,
    /// Prefix of the allocator bridge files under `/tmp`.
    pub bridge_prefix: String,
    /// Report destination (`None` writes to standard output).
    pub output_path: Option<PathBuf>,
    /// Seconds between periodic report flushes; infinity emits only at exit.
    pub output_interval_s: f64,
}

/// Mean seconds between CPU ticks.
pub const DEFAULT_MEAN_INTERVAL_S: f64 = 0.01;

/// Prefix of the allocator bridge files.
pub const DEFAULT_BRIDGE_PREFIX: &str = "sightline";

impl ProfileConfig {
    /// Configuration for profiling a program rooted at `program_path`.
    pub fn new(program_path: impl Into<PathBuf>) -> Self {
        Self {
            program_path: program_path.into(),
            ..Self::default()
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            mode: TimerMode::Cpu,
            mean_interval_s: DEFAULT_MEAN_INTERVAL_S,
            program_path: PathBuf::new(),
            runtime_prefix: None,
            shim_file: None,
            bridge_prefix: DEFAULT_BRIDGE_PREFIX.to_string(),
            output_path: None,
            output_interval_s: f64::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProfileConfig::default();
        assert_eq!(config.mode, TimerMode::Cpu);
        assert_eq!(config.mean_interval_s, 0.01);
        assert!(config.output_path.is_none());
        assert!(config.output_interval_s.is_infinite());
        assert_eq!(config.bridge_prefix, "sightline");
    }
}

//! Sightline Profiler Engine
//!
//! A statistical profiler that attributes CPU time and heap activity to
//! individual source lines of a program running on a bytecode interpreter.
//! Its distinguishing trick is splitting each CPU tick between interpreter
//! and native execution without instrumenting either: asynchronous signals
//! reach the interpreting thread only at its dispatch boundary, so the
//! delivery latency of the tick *is* the time spent outside the interpreter.
//!
//! Heap activity arrives out of band: a cooperating sampling allocator
//! appends byte counts to two well-known `/tmp` files and raises a signal;
//! the engine drains the files and folds the sizes into whatever source line
//! the interpreter happened to be executing.
//!
//! # Embedding
//!
//! The interpreter implements [`StackProvider`] (from `sightline-sdk`) and
//! calls [`Profiler::poll`] at every dispatch boundary:
//!
//! ```rust,ignore
//! let profiler = Profiler::install(ProfileConfig::new("/path/to/app"))?;
//! profiler.start()?;
//! loop {
//!     profiler.poll(&vm)?; // drains pending profiling signals
//!     vm.dispatch_next();
//! }
//! profiler.stop();
//! profiler.write_report()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Allocation bridge: out-of-band size-sample files from the allocator
pub mod bridge;

/// Profiler configuration
pub mod config;

/// Program driver and command-line surface
pub mod driver;

/// Engine error types
pub mod error;

/// Source-location filtering (user program vs runtime internals)
pub mod filter;

/// Per-line profile rendering
pub mod report;

/// Fixed-capacity uniform sampling over unbounded streams
pub mod reservoir;

/// Unit-height Unicode bar charts
pub mod sparkline;

/// Per-line CPU and heap accumulators
pub mod stats;

/// Cooperative join that keeps sampling alive
pub mod threads;

/// The process-wide profiler root
pub mod profiler;

mod heap;
mod sampler;
mod signals;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{AllocKind, AllocationBridge};
pub use config::{ProfileConfig, TimerMode};
pub use driver::{run, Launcher, Options};
pub use error::ProfileError;
pub use filter::FileFilter;
pub use profiler::Profiler;
pub use reservoir::Reservoir;
pub use sparkline::sparkline;
pub use stats::StatsStore;
pub use threads::sampling_join;

pub use sightline_sdk::{FrameSnapshot, JoinWait, StackProvider};

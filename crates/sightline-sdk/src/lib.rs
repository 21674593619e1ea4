//! Sightline SDK - embedding interface for the sightline profiler
//!
//! This crate provides the minimal types and traits an interpreter needs to
//! implement so the sightline engine can observe it, without depending on the
//! full sightline-engine.
//!
//! The engine never walks interpreter internals itself. At every dispatch
//! boundary the embedding calls `Profiler::poll` (in sightline-engine) with a
//! [`StackProvider`], and the provider answers two questions:
//!
//! - which frame is executing on the interpreting thread right now, and
//! - what is the topmost frame of every other live interpreter thread.
//!
//! [`JoinWait`] abstracts the interpreter's thread-join primitive so the
//! engine can substitute a join that keeps yielding to the sampling timer.

#![warn(missing_docs)]

use std::time::Duration;

// ============================================================================
// Frame snapshots
// ============================================================================

/// A point-in-time view of one interpreter frame.
///
/// Snapshots are plain data: the provider resolves function/line tables up
/// front so the engine never calls back into the interpreter while it holds
/// its own state locked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    /// Source file of the executing code object. May be empty for synthetic
    /// frames (code compiled from strings carries no path).
    pub file: String,
    /// 1-based source line currently executing.
    pub line: u32,
    /// Instruction pointer within the line. Distinguishes allocation sites
    /// that share a source line.
    pub bytecode_offset: u32,
    /// Whether the instruction at `bytecode_offset` is a call-function
    /// opcode. Used to classify time on threads that cannot receive signals.
    pub is_call_instruction: bool,
    /// Source file of the immediate caller, consulted when `file` is empty.
    pub enclosing_file: Option<String>,
}

impl FrameSnapshot {
    /// Snapshot with no caller fallback and a non-call instruction.
    pub fn new(file: impl Into<String>, line: u32, bytecode_offset: u32) -> Self {
        Self {
            file: file.into(),
            line,
            bytecode_offset,
            is_call_instruction: false,
            enclosing_file: None,
        }
    }

    /// The file this frame should be attributed to: `file`, or the enclosing
    /// caller's file when `file` is empty.
    pub fn source_file(&self) -> &str {
        if self.file.is_empty() {
            self.enclosing_file.as_deref().unwrap_or("")
        } else {
            &self.file
        }
    }
}

// ============================================================================
// Stack introspection
// ============================================================================

/// Capability the embedding interpreter must provide: enumerate live frames.
///
/// Both methods are called on the interpreting thread, inside the window
/// where pending profiling events are drained, so implementations may read
/// interpreter state without extra synchronization.
pub trait StackProvider {
    /// The frame executing on the interpreting thread at delivery time
    /// (the "main" frame). `None` when no user frame is live.
    fn interpreting_frame(&self) -> Option<FrameSnapshot>;

    /// Topmost frame of every other live interpreter thread.
    fn thread_frames(&self) -> Vec<FrameSnapshot>;
}

// ============================================================================
// Cooperative join
// ============================================================================

/// A joinable thread-like object, as the interpreter's join primitive sees it.
///
/// The engine's `sampling_join` loops `wait_for` with the interpreter's
/// thread-switch interval instead of blocking indefinitely, so the CPU timer
/// signal keeps being delivered while a join is in progress.
pub trait JoinWait {
    /// Whether the target is still running.
    fn is_alive(&self) -> bool;

    /// Block for at most `timeout` waiting for the target to finish.
    fn wait_for(&self, timeout: Duration);
}

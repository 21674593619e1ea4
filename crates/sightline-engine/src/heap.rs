//! Allocation and free attribution.
//!
//! The allocator raises a signal when its sampling threshold is crossed; by
//! the time the interpreting thread drains it, the bridge file may hold
//! several coalesced sample lines. One drain folds every pending size into
//! the site the interpreter is executing, but bumps that site's event count
//! by at most one, so per-event averages are not inflated by coalescing.

use sightline_sdk::StackProvider;

use crate::bridge::{AllocKind, AllocationBridge};
use crate::filter::FileFilter;
use crate::stats::StatsStore;

/// Handle one allocation or free notification.
///
/// Both bridge files are drained on either signal: the kinds share a
/// delivery window, and a free report arriving while a malloc drain is in
/// flight must not be lost.
pub(crate) fn record_allocation_event(
    stats: &mut StatsStore,
    filter: &FileFilter,
    bridge: &AllocationBridge,
    provider: &dyn StackProvider,
) {
    let Some(frame) = provider.interpreting_frame() else {
        return;
    };
    if !filter.should_trace(&frame.file) {
        return;
    }
    let file = frame.file.as_str();
    let (line, offset) = (frame.line, frame.bytecode_offset);

    stats.record_known_offset(file, line, offset);

    for kind in [AllocKind::Malloc, AllocKind::Free] {
        let samples = bridge.drain(kind);
        if samples.is_empty() {
            continue;
        }
        for &mb in &samples {
            match kind {
                AllocKind::Malloc => stats.add_malloc_sample(file, line, offset, mb),
                AllocKind::Free => stats.add_free_sample(file, line, offset, mb),
            }
        }
        match kind {
            AllocKind::Malloc => stats.bump_malloc_events(file, line, offset),
            AllocKind::Free => stats.bump_free_events(file, line, offset),
        }
    }
}

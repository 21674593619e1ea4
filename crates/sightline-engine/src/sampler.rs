//! CPU-tick attribution.
//!
//! The interval timer is programmed for `mean_interval_s`, but the tick is
//! only acted on when the interpreter reaches a dispatch boundary. The gap
//! between the programmed interval and the observed elapsed time is time the
//! interpreter spent outside its dispatch loop, so each tick splits into an
//! interpreter share (the programmed interval) and a native share (the
//! excess), apportioned across every live frame that belongs to the user
//! program.

use sightline_sdk::{FrameSnapshot, StackProvider};

use crate::filter::FileFilter;
use crate::stats::StatsStore;

/// Sampling scalars carried between ticks.
#[derive(Debug, Clone)]
pub(crate) struct SamplerState {
    /// Mean seconds between ticks, as programmed into the timer.
    pub mean_interval_s: f64,
    /// Interval programmed at the moment the last tick fired.
    pub last_interval_s: f64,
    /// Clock reading at the last tick.
    pub last_tick_time_s: f64,
    /// Seconds between periodic report flushes.
    pub output_interval_s: f64,
    /// Next clock reading at which a flush is due.
    pub next_output_time_s: f64,
}

impl SamplerState {
    pub(crate) fn new(mean_interval_s: f64, output_interval_s: f64) -> Self {
        Self {
            mean_interval_s,
            last_interval_s: mean_interval_s,
            last_tick_time_s: 0.0,
            output_interval_s,
            next_output_time_s: f64::INFINITY,
        }
    }

    /// Reset the tick origin and flush deadline; called when signals are
    /// (re-)enabled.
    pub(crate) fn rearm(&mut self, now: f64) {
        self.last_tick_time_s = now;
        self.next_output_time_s = now + self.output_interval_s;
    }
}

struct RetainedFrame {
    file: String,
    line: u32,
    is_main: bool,
    is_call: bool,
}

/// Handle one CPU tick at clock reading `now`.
///
/// Returns `true` when the periodic report flush deadline has passed; the
/// caller is responsible for disabling signals around the flush and for
/// advancing the deadline.
pub(crate) fn record_tick(
    stats: &mut StatsStore,
    state: &mut SamplerState,
    filter: &FileFilter,
    provider: &dyn StackProvider,
    now: f64,
) -> bool {
    let elapsed = now - state.last_tick_time_s;
    let interp_time = state.last_interval_s;
    // Delivery latency beyond the programmed interval is time spent outside
    // the dispatch loop. Clamped here so stored native counters never go
    // negative from clock granularity.
    let native_time = (elapsed - interp_time).max(0.0);
    let total_time = interp_time + native_time;

    let mut retained: Vec<RetainedFrame> = Vec::new();
    if let Some(frame) = provider.interpreting_frame() {
        push_if_traced(&mut retained, filter, frame, true);
    }
    for frame in provider.thread_frames() {
        push_if_traced(&mut retained, filter, frame, false);
    }

    if !retained.is_empty() {
        let share = retained.len() as f64;
        for frame in &retained {
            if frame.is_main {
                // The signalled frame: the programmed interval was spent in
                // the interpreter, the excess outside it.
                stats.add_interp(&frame.file, frame.line, interp_time / share);
                stats.add_native(&frame.file, frame.line, native_time / share);
            } else if frame.is_call {
                // Other threads never receive the tick, so the latency split
                // does not apply; a frame parked on a call opcode is waiting
                // on native code.
                stats.add_native(&frame.file, frame.line, total_time / share);
            } else {
                stats.add_interp(&frame.file, frame.line, total_time / share);
            }

            // Fold the current per-site heap deltas into this line's
            // footprint series, stamped with the CPU sample total.
            let tick_index = stats.total_cpu_samples();
            for offset in stats.known_offsets_at(&frame.file, frame.line) {
                let delta = stats.site_delta(&frame.file, frame.line, offset);
                stats.offer_line_footprint(&frame.file, frame.line, (tick_index, delta));
            }
        }
    }

    stats.add_total_cpu(total_time);

    // A long pause covers several nominal intervals; replicate the footprint
    // point so the reservoir's time axis is not starved during pauses.
    let replicate = (elapsed / state.last_interval_s).round() as i64;
    let footprint = stats.current_footprint_mb();
    for _ in 0..replicate.max(0) {
        stats.offer_footprint((now, footprint));
    }

    let flush_due = now >= state.next_output_time_s;
    state.last_tick_time_s = now;
    flush_due
}

fn push_if_traced(
    retained: &mut Vec<RetainedFrame>,
    filter: &FileFilter,
    frame: FrameSnapshot,
    is_main: bool,
) {
    // Synthetic eval/compile frames carry no path; fall back to the caller's.
    let file = frame.source_file();
    if file.is_empty() || !filter.should_trace(file) {
        return;
    }
    retained.push(RetainedFrame {
        file: file.to_string(),
        line: frame.line,
        is_main,
        is_call: frame.is_call_instruction,
    });
}

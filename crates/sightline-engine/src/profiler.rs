//! The process-wide profiler root.
//!
//! The profiler observes the whole process, so exactly one instance is
//! installed as a well-known global; raw signal handlers stay trivial and
//! everything stateful happens when the interpreting thread drains pending
//! events through [`Profiler::poll`]. A `Profiler` can also be used
//! standalone (without installing) when an embedding wants to manage the
//! lifetime itself.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use sightline_sdk::StackProvider;

use crate::bridge::AllocationBridge;
use crate::config::ProfileConfig;
use crate::error::ProfileError;
use crate::filter::FileFilter;
use crate::heap;
use crate::report;
use crate::sampler::{self, SamplerState};
use crate::signals::{self, platform};
use crate::stats::StatsStore;

static GLOBAL: Lazy<RwLock<Option<Arc<Profiler>>>> = Lazy::new(|| RwLock::new(None));

/// The sampling and attribution engine.
pub struct Profiler {
    config: ProfileConfig,
    filter: FileFilter,
    bridge: AllocationBridge,
    inner: Mutex<Inner>,
}

struct Inner {
    stats: StatsStore,
    sampler: SamplerState,
    elapsed_origin_s: f64,
    elapsed_s: f64,
}

impl Profiler {
    /// Build a profiler without installing it as the process root.
    pub fn new(config: ProfileConfig) -> Self {
        let filter = FileFilter::new(&config);
        let bridge = AllocationBridge::new(&config.bridge_prefix);
        let inner = Inner {
            stats: StatsStore::new(),
            sampler: SamplerState::new(config.mean_interval_s, config.output_interval_s),
            elapsed_origin_s: 0.0,
            elapsed_s: 0.0,
        };
        Self {
            config,
            filter,
            bridge,
            inner: Mutex::new(inner),
        }
    }

    /// Build and install the process-wide profiler.
    pub fn install(config: ProfileConfig) -> Result<Arc<Profiler>, ProfileError> {
        let mut slot = GLOBAL.write();
        if slot.is_some() {
            return Err(ProfileError::AlreadyInstalled);
        }
        let profiler = Arc::new(Self::new(config));
        *slot = Some(Arc::clone(&profiler));
        Ok(profiler)
    }

    /// The installed profiler, if any.
    pub fn global() -> Option<Arc<Profiler>> {
        GLOBAL.read().clone()
    }

    /// Tear down the process-wide root, returning it to the caller.
    pub fn uninstall() -> Option<Arc<Profiler>> {
        GLOBAL.write().take()
    }

    /// Install signal handlers, arm the tick timer, and start the
    /// elapsed-time clock.
    pub fn start(&self) -> Result<(), ProfileError> {
        let now = platform::now(self.config.mode);
        let interval = {
            let mut inner = self.inner.lock();
            inner.sampler.rearm(now);
            inner.elapsed_origin_s = now;
            inner.elapsed_s = 0.0;
            inner.sampler.mean_interval_s
        };
        // Discard any bit left over from a previous enable window.
        signals::take_pending();
        platform::enable(self.config.mode, interval)
    }

    /// Disarm the timer, ignore further allocation reports, and fix the
    /// elapsed time.
    pub fn stop(&self) {
        platform::disable(self.config.mode);
        let now = platform::now(self.config.mode);
        let mut inner = self.inner.lock();
        inner.elapsed_s = now - inner.elapsed_origin_s;
    }

    /// Drain pending profiling events.
    ///
    /// The embedding interpreter calls this at every dispatch boundary. The
    /// fast path (nothing pending) is one atomic swap. Errors come only from
    /// a due periodic report flush and should abort the run.
    pub fn poll(&self, provider: &dyn StackProvider) -> Result<(), ProfileError> {
        let pending = signals::take_pending();
        if pending == 0 {
            return Ok(());
        }
        if pending & signals::PENDING_CPU != 0 {
            self.cpu_tick(provider)?;
        }
        if pending & (signals::PENDING_MALLOC | signals::PENDING_FREE) != 0 {
            let inner = &mut *self.inner.lock();
            heap::record_allocation_event(&mut inner.stats, &self.filter, &self.bridge, provider);
        }
        Ok(())
    }

    fn cpu_tick(&self, provider: &dyn StackProvider) -> Result<(), ProfileError> {
        let now = platform::now(self.config.mode);
        let flush_due = {
            let inner = &mut *self.inner.lock();
            sampler::record_tick(&mut inner.stats, &mut inner.sampler, &self.filter, provider, now)
        };
        if flush_due {
            self.flush_periodic()?;
        }
        Ok(())
    }

    /// Periodic flush, triggered from inside a tick: signals are disabled for
    /// the duration so no delivery can observe the report mid-iteration.
    fn flush_periodic(&self) -> Result<(), ProfileError> {
        platform::disable(self.config.mode);
        let result = self.write_report();
        let tick_interval = {
            let mut inner = self.inner.lock();
            let output_interval = inner.sampler.output_interval_s;
            inner.sampler.next_output_time_s += output_interval;
            inner.sampler.mean_interval_s
        };
        platform::enable(self.config.mode, tick_interval)?;
        result?;
        Ok(())
    }

    /// Emit the report to the configured destination.
    ///
    /// Returns whether anything was written; a run with no samples at all
    /// emits nothing.
    pub fn write_report(&self) -> Result<bool, ProfileError> {
        let (stats, elapsed_s) = {
            let inner = self.inner.lock();
            let elapsed = if inner.elapsed_s > 0.0 {
                inner.elapsed_s
            } else {
                platform::now(self.config.mode) - inner.elapsed_origin_s
            };
            (inner.stats.clone(), elapsed)
        };
        report::write(&stats, elapsed_s, self.config.output_path.as_deref())
    }

    /// Snapshot of every accumulated statistic.
    pub fn stats(&self) -> StatsStore {
        self.inner.lock().stats.clone()
    }

    /// The configuration this profiler was built with.
    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// The allocator bridge, exposing the per-PID signal-file paths.
    pub fn bridge(&self) -> &AllocationBridge {
        &self.bridge
    }
}

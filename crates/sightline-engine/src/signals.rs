//! Signal and interval-timer plumbing.
//!
//! Raw handlers do one async-signal-safe thing: set a pending bit. The
//! interpreting thread drains the bits at its next dispatch boundary via
//! `Profiler::poll`; the time a bit stays pending is exactly the delivery
//! latency the sampler turns into native time.
//!
//! Each handler is installed with the other two profiling signals in its
//! `sa_mask`, so a free report can never interleave with a malloc drain at
//! the raw-delivery level.

use std::sync::atomic::{AtomicU32, Ordering};

/// A CPU tick is pending.
pub(crate) const PENDING_CPU: u32 = 1 << 0;
/// A malloc report is pending.
pub(crate) const PENDING_MALLOC: u32 = 1 << 1;
/// A free report is pending.
pub(crate) const PENDING_FREE: u32 = 1 << 2;

static PENDING: AtomicU32 = AtomicU32::new(0);

/// Take and clear every pending event bit.
pub(crate) fn take_pending() -> u32 {
    PENDING.swap(0, Ordering::AcqRel)
}

#[cfg(unix)]
pub(crate) mod platform {
    use super::{PENDING, PENDING_CPU, PENDING_FREE, PENDING_MALLOC};
    use std::io;
    use std::sync::atomic::Ordering;

    use crate::config::TimerMode;
    use crate::error::ProfileError;

    /// Signal raised by the allocator after appending malloc samples.
    pub(crate) const MALLOC_SIGNAL: libc::c_int = libc::SIGXCPU;
    /// Signal raised by the allocator after appending free samples.
    pub(crate) const FREE_SIGNAL: libc::c_int = libc::SIGPROF;

    extern "C" fn on_cpu_signal(_sig: libc::c_int) {
        PENDING.fetch_or(PENDING_CPU, Ordering::Relaxed);
    }

    extern "C" fn on_malloc_signal(_sig: libc::c_int) {
        PENDING.fetch_or(PENDING_MALLOC, Ordering::Relaxed);
    }

    extern "C" fn on_free_signal(_sig: libc::c_int) {
        PENDING.fetch_or(PENDING_FREE, Ordering::Relaxed);
    }

    fn cpu_signal(mode: TimerMode) -> libc::c_int {
        match mode {
            TimerMode::Cpu => libc::SIGVTALRM,
            TimerMode::Wall => libc::SIGALRM,
        }
    }

    fn timer_kind(mode: TimerMode) -> libc::c_int {
        match mode {
            TimerMode::Cpu => libc::ITIMER_VIRTUAL,
            TimerMode::Wall => libc::ITIMER_REAL,
        }
    }

    /// Install all three handlers and start the tick timer.
    pub(crate) fn enable(mode: TimerMode, interval_s: f64) -> Result<(), ProfileError> {
        let cpu = cpu_signal(mode);
        install_handler(cpu, on_cpu_signal, &[MALLOC_SIGNAL, FREE_SIGNAL])?;
        install_handler(MALLOC_SIGNAL, on_malloc_signal, &[cpu, FREE_SIGNAL])?;
        install_handler(FREE_SIGNAL, on_free_signal, &[cpu, MALLOC_SIGNAL])?;
        set_timer(mode, interval_s)
    }

    /// Stop the tick timer and ignore further allocation reports.
    pub(crate) fn disable(mode: TimerMode) {
        let _ = set_timer(mode, 0.0);
        unsafe {
            libc::signal(MALLOC_SIGNAL, libc::SIG_IGN);
            libc::signal(FREE_SIGNAL, libc::SIG_IGN);
        }
    }

    fn install_handler(
        signal: libc::c_int,
        handler: extern "C" fn(libc::c_int),
        masked: &[libc::c_int],
    ) -> Result<(), ProfileError> {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            libc::sigemptyset(&mut action.sa_mask);
            for &sig in masked {
                libc::sigaddset(&mut action.sa_mask, sig);
            }
            action.sa_sigaction = handler as libc::sighandler_t;
            action.sa_flags = libc::SA_RESTART;
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                return Err(ProfileError::Io(io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    fn set_timer(mode: TimerMode, interval_s: f64) -> Result<(), ProfileError> {
        let interval = to_timeval(interval_s);
        let timer = libc::itimerval {
            it_interval: interval,
            it_value: interval,
        };
        let rc = unsafe { libc::setitimer(timer_kind(mode), &timer, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(ProfileError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn to_timeval(seconds: f64) -> libc::timeval {
        libc::timeval {
            tv_sec: seconds as libc::time_t,
            tv_usec: ((seconds.fract()) * 1e6) as libc::suseconds_t,
        }
    }

    /// Current clock reading in seconds: process CPU time in CPU mode,
    /// monotonic time in wall mode.
    pub(crate) fn now(mode: TimerMode) -> f64 {
        let clock = match mode {
            TimerMode::Cpu => libc::CLOCK_PROCESS_CPUTIME_ID,
            TimerMode::Wall => libc::CLOCK_MONOTONIC,
        };
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(clock, &mut ts);
        }
        ts.tv_sec as f64 + ts.tv_nsec as f64 * 1e-9
    }
}

#[cfg(not(unix))]
pub(crate) mod platform {
    use crate::config::TimerMode;
    use crate::error::ProfileError;
    use once_cell::sync::Lazy;
    use std::time::Instant;

    pub(crate) fn enable(_mode: TimerMode, _interval_s: f64) -> Result<(), ProfileError> {
        Err(ProfileError::UnsupportedPlatform)
    }

    pub(crate) fn disable(_mode: TimerMode) {}

    static ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

    pub(crate) fn now(_mode: TimerMode) -> f64 {
        ORIGIN.elapsed().as_secs_f64()
    }
}

/// Serializes tests that touch the process-wide pending bits.
#[cfg(test)]
pub(crate) static TEST_PENDING_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

#[cfg(test)]
pub(crate) fn inject_pending(bits: u32) {
    PENDING.fetch_or(bits, Ordering::SeqCst);
}

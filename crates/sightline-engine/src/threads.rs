//! Cooperative join that keeps sampling alive.
//!
//! A join that parks the interpreting thread indefinitely would also park
//! signal delivery, so no tick lands until the joined thread dies. The
//! embedding routes its join primitive through [`sampling_join`], which waits
//! in short slices (the interpreter's thread-switch interval) and keeps
//! returning to the dispatch boundary in between.

use std::time::{Duration, Instant};

use sightline_sdk::JoinWait;

/// Join `target`, yielding every `switch_interval` so pending ticks can be
/// drained.
///
/// Returns `true` once the target has finished, or `false` when `timeout`
/// expires first, mirroring a joined-with-timeout result.
pub fn sampling_join<T: JoinWait + ?Sized>(
    target: &T,
    timeout: Option<Duration>,
    switch_interval: Duration,
) -> bool {
    let start = Instant::now();
    while target.is_alive() {
        target.wait_for(switch_interval);
        if let Some(limit) = timeout {
            if start.elapsed() >= limit {
                return !target.is_alive();
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    struct FinishesAfter {
        waits: AtomicU32,
        remaining: AtomicU32,
    }

    impl FinishesAfter {
        fn new(slices: u32) -> Self {
            Self {
                waits: AtomicU32::new(0),
                remaining: AtomicU32::new(slices),
            }
        }
    }

    impl JoinWait for FinishesAfter {
        fn is_alive(&self) -> bool {
            self.remaining.load(Ordering::SeqCst) > 0
        }

        fn wait_for(&self, _timeout: Duration) {
            self.waits.fetch_add(1, Ordering::SeqCst);
            let remaining = self.remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.remaining.store(remaining - 1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn joins_in_slices_until_target_finishes() {
        let target = FinishesAfter::new(5);
        assert!(sampling_join(&target, None, Duration::from_millis(5)));
        assert_eq!(target.waits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn returns_false_when_timeout_expires() {
        struct NeverDone;
        impl JoinWait for NeverDone {
            fn is_alive(&self) -> bool {
                true
            }
            fn wait_for(&self, timeout: Duration) {
                std::thread::sleep(timeout);
            }
        }
        let joined = sampling_join(
            &NeverDone,
            Some(Duration::from_millis(20)),
            Duration::from_millis(5),
        );
        assert!(!joined);
    }

    #[test]
    fn joins_a_real_thread() {
        struct Flagged(Arc<AtomicBool>);
        impl JoinWait for Flagged {
            fn is_alive(&self) -> bool {
                !self.0.load(Ordering::SeqCst)
            }
            fn wait_for(&self, timeout: Duration) {
                std::thread::sleep(timeout);
            }
        }

        let done = Arc::new(AtomicBool::new(false));
        let worker_done = Arc::clone(&done);
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            worker_done.store(true, Ordering::SeqCst);
        });

        assert!(sampling_join(
            &Flagged(done),
            None,
            Duration::from_millis(5)
        ));
        worker.join().unwrap();
    }
}

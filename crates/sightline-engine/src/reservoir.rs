//! Fixed-capacity uniform sampling over unbounded streams.
//!
//! After `n >= k` offers, every offered item is present with probability
//! `k/n` (algorithm R). The backing storage is preallocated at capacity and
//! the PRNG is a local xorshift, so `offer` neither allocates nor touches
//! global state once the reservoir is full; it is safe to call from the
//! signal-drain path.

/// xorshift64* generator. A few integer ops per draw, no global state.
#[derive(Debug, Clone)]
pub(crate) struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Seed from the process-wide RNG. Done once, at construction, outside
    /// any handler.
    pub(crate) fn seeded() -> Self {
        Self::from_seed(rand::random::<u64>())
    }

    pub(crate) fn from_seed(seed: u64) -> Self {
        // xorshift state must be nonzero
        Self { state: seed | 1 }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform draw in `0..bound`. `bound` must be nonzero.
    pub(crate) fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound
    }
}

/// Fixed-capacity uniform random sample over a stream of unknown length.
#[derive(Debug, Clone)]
pub struct Reservoir<T> {
    items: Vec<T>,
    capacity: usize,
    offered: u64,
    rng: XorShift64,
}

impl<T: Clone> Reservoir<T> {
    /// An empty reservoir holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            offered: 0,
            rng: XorShift64::seeded(),
        }
    }

    #[cfg(test)]
    fn with_seed(capacity: usize, seed: u64) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            offered: 0,
            rng: XorShift64::from_seed(seed),
        }
    }

    /// Offer one item. Stored unconditionally until the reservoir fills;
    /// afterwards it replaces a uniformly chosen slot with probability
    /// `capacity / offers_so_far`.
    pub fn offer(&mut self, item: T) {
        self.offered += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }
        if self.capacity == 0 {
            return;
        }
        let j = self.rng.below(self.offered);
        if (j as usize) < self.capacity {
            self.items[j as usize] = item;
        }
    }

    /// Current contents, in unspecified order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing has been retained yet.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of offers so far.
    pub fn offered(&self) -> u64 {
        self.offered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_up_to_capacity() {
        let mut r = Reservoir::with_seed(5, 7);
        for i in 0..5 {
            r.offer(i);
        }
        let mut got = r.snapshot();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut r = Reservoir::with_seed(47, 3);
        for i in 0..10_000 {
            r.offer(i);
            assert!(r.len() <= 47);
        }
        assert_eq!(r.len(), 47);
        assert_eq!(r.offered(), 10_000);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut r = Reservoir::with_seed(0, 11);
        for i in 0..100 {
            r.offer(i);
        }
        assert!(r.is_empty());
    }

    #[test]
    fn retention_probability_is_k_over_n() {
        // After n offers into a capacity-k reservoir, a fixed item should be
        // present with probability k/n. 10k independent trials put the
        // standard error around 0.005, so a +/-0.03 band is comfortable.
        const K: usize = 47;
        const N: u64 = 100;
        const TRIALS: u64 = 10_000;
        let mut hits = 0u64;
        for trial in 0..TRIALS {
            let mut r = Reservoir::with_seed(K, trial * 2 + 1);
            for i in 0..N {
                r.offer(i);
            }
            if r.snapshot().contains(&0) {
                hits += 1;
            }
        }
        let rate = hits as f64 / TRIALS as f64;
        let expected = K as f64 / N as f64;
        assert!(
            (rate - expected).abs() < 0.03,
            "retention rate {rate} too far from {expected}"
        );
    }

    #[test]
    fn offer_does_not_allocate_after_fill() {
        let mut r = Reservoir::with_seed(10, 5);
        for i in 0..10 {
            r.offer(i);
        }
        let ptr = r.items.as_ptr();
        for i in 10..1000 {
            r.offer(i);
        }
        assert_eq!(ptr, r.items.as_ptr());
    }
}

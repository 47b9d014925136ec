//! Seeded random source.
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// ChaCha8 stream keyed by a 64-bit seed. Counts every draw so callers can
/// observe whether a run consumed randomness at all.
#[derive(Debug, Clone)]
pub struct Random {
    seed: u64,
    rng: ChaCha8Rng,
    draws: u64,
}

impl Random {
    pub fn new(seed: u64) -> Self {
        Self { seed, rng: ChaCha8Rng::seed_from_u64(seed), draws: 0 }
    }

    /// A source with a fresh seed in `[1, i64::MAX]`.
    pub fn with_entropy() -> Self {
        let seed = rand::thread_rng().gen_range(1..=i64::MAX as u64);
        Self::new(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Uniform in `[min, max]`. Returns `min` without drawing when the range
    /// is empty or a single value.
    pub fn long_range(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        self.draws += 1;
        self.rng.gen_range(min..=max)
    }

    pub fn int_range(&mut self, min: i32, max: i32) -> i32 {
        self.long_range(i64::from(min), i64::from(max)) as i32
    }

    pub fn uint_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        self.draws += 1;
        self.rng.gen_range(min..=max)
    }

    pub fn usize_range(&mut self, min: usize, max: usize) -> usize {
        self.uint_range(min as u64, max as u64) as usize
    }

    /// Uniform in `[min, max)`; `min` when the range is empty.
    pub fn double_range(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.draws += 1;
        self.rng.gen_range(min..max)
    }

    /// True with probability `p`. Certain outcomes consume no draw.
    pub fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.draws += 1;
        self.rng.gen_bool(p)
    }

    pub fn upper_char(&mut self) -> char {
        char::from(UPPER[self.usize_range(0, UPPER.len() - 1)])
    }

    pub fn alphabetic_string(&mut self, min_len: usize, max_len: usize) -> String {
        let len = self.usize_range(min_len, max_len);
        (0..len).map(|_| self.upper_char()).collect()
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.usize_range(0, items.len() - 1);
        items.get(index)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.draws += 1;
        self.rng.next_u64()
    }

    /// Long-range draw used to seed the next run of a sequence.
    pub fn next_seed(&mut self) -> u64 {
        self.uint_range(1, i64::MAX as u64)
    }
}

/// The seed that follows `seed` in a sequence of runs.
pub fn derive_seed(seed: u64) -> u64 {
    Random::new(seed).next_seed()
}

//! Randomness used by the physics jitter and the command pipeline.
//!
//! Every draw goes through [`NoiseSource`] so a session can be replayed
//! exactly: [`SeededNoise`] wraps a ChaCha8 stream, [`Quiet`] always
//! yields the lower bound.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub trait NoiseSource: Send {
    /// Uniform sample in `[lo, hi)`. Returns `lo` when the range is empty.
    fn sample(&mut self, lo: f64, hi: f64) -> f64;
}

#[derive(Debug, Clone)]
pub struct SeededNoise {
    rng: ChaCha8Rng,
}

impl SeededNoise {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }
}

impl NoiseSource for SeededNoise {
    fn sample(&mut self, lo: f64, hi: f64) -> f64 {
        if !(hi > lo) {
            return lo;
        }
        self.rng.gen_range(lo..hi)
    }
}

/// Jitter-free source: every draw is the lower bound.
///
/// Under `Quiet` network latency is always the minimum and the outcome draw
/// is 0.0, so any command with a non-zero success probability succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quiet;

impl NoiseSource for Quiet {
    fn sample(&mut self, lo: f64, _hi: f64) -> f64 {
        lo
    }
}

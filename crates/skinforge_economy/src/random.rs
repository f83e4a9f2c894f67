//! # Random Sources
//!
//! Every draw in the engine (container rewards, dice, wheel, reels, coin)
//! goes through a [`RandomSource`]. Production uses ChaCha20 seeded from the
//! OS; tests either fix the seed or script the exact draws.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

/// A source of uniform draws.
pub trait RandomSource: Send {
    /// Uniform value in `[0, 1)`.
    fn next_unit(&mut self) -> f64;

    /// Uniform integer in `[low, high]` (inclusive).
    ///
    /// The default maps [`Self::next_unit`] onto the range, so scripted
    /// sources control integer draws too.
    fn next_in_range(&mut self, low: u32, high: u32) -> u32 {
        debug_assert!(low <= high);
        let span = f64::from(high - low) + 1.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let offset = (self.next_unit() * span) as u32;
        low + offset.min(high - low)
    }
}

/// ChaCha20-backed source.
pub struct SeededSource {
    rng: ChaCha20Rng,
}

impl SeededSource {
    /// Deterministic source for tests and replays.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Source seeded from OS entropy.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
        }
    }
}

impl RandomSource for SeededSource {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn next_in_range(&mut self, low: u32, high: u32) -> u32 {
        self.rng.gen_range(low..=high)
    }
}

/// Replays a fixed list of unit draws, cycling when exhausted.
///
/// ```
/// use skinforge_economy::{RandomSource, ScriptedSource};
///
/// let mut source = ScriptedSource::new([0.3, 0.99]);
/// assert_eq!(source.next_unit(), 0.3);
/// assert_eq!(source.next_in_range(1, 6), 6);
/// assert_eq!(source.next_unit(), 0.3);
/// ```
#[derive(Clone, Debug)]
pub struct ScriptedSource {
    draws: Vec<f64>,
    cursor: usize,
}

impl ScriptedSource {
    /// Creates a source replaying `draws`. Values are clamped into `[0, 1)`.
    #[must_use]
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        let mut draws: Vec<f64> = draws
            .into_iter()
            .map(|d| d.clamp(0.0, 1.0 - f64::EPSILON))
            .collect();
        if draws.is_empty() {
            draws.push(0.0);
        }
        Self { draws, cursor: 0 }
    }

    /// The unit draw that lands on `value` for a range `[low, high]`.
    ///
    /// Handy for scripting dice faces or wheel pockets.
    #[must_use]
    pub fn unit_for(value: u32, low: u32, high: u32) -> f64 {
        let span = f64::from(high - low) + 1.0;
        (f64::from(value - low) + 0.5) / span
    }
}

impl RandomSource for ScriptedSource {
    fn next_unit(&mut self) -> f64 {
        let draw = self.draws[self.cursor % self.draws.len()];
        self.cursor += 1;
        draw
    }
}

/// The engine-wide random source, shared by every service.
#[derive(Clone)]
pub struct SharedRandom {
    inner: Arc<Mutex<Box<dyn RandomSource>>>,
}

impl SharedRandom {
    /// Wraps a source.
    pub fn new(source: impl RandomSource + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(source))),
        }
    }

    /// Runs `f` with exclusive access to the source.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn RandomSource) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut **guard)
    }
}

impl std::fmt::Debug for SharedRandom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedRandom")
    }
}

//! Seeded question selection.
//!
//! The same candidate list and seed always yield the same order, so a
//! persisted seed is enough to explain how a session was built.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, rng};

/// Shuffle `items` deterministically from `seed`.
pub fn shuffle_seeded<T>(items: &mut [T], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
}

/// Shuffle with `seed` (when given) and keep at most `count` items.
pub fn select<T>(mut candidates: Vec<T>, count: usize, seed: Option<u64>) -> Vec<T> {
    if let Some(seed) = seed {
        shuffle_seeded(&mut candidates, seed);
    }
    candidates.truncate(count);
    candidates
}

/// Fresh seed for the per-session strategy.
#[must_use]
pub fn fresh_seed() -> u64 {
    rng().random()
}

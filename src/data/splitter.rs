// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Two ways to carve a validation set out of the samples:
//
//   split_holdout  seeded shuffle, then split. Same seed, same split.
//   split_tail     no shuffle; the last fraction becomes validation,
//                  the way a fit-time `validation_split` works.
//
// Shuffling uses Fisher-Yates via rand::seq::SliceRandom over a
// StdRng seeded from a u64.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle with `seed`, then move `holdout_fraction` of the samples
/// into the second set.
pub fn split_holdout<T>(mut samples: Vec<T>, holdout_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let holdout  = ((total as f64) * holdout_fraction.clamp(0.0, 1.0)).round() as usize;
    let split_at = total - holdout.min(total);
    let val      = samples.split_off(split_at);

    tracing::debug!(
        "Holdout split (seed {}): {} training, {} validation",
        seed, samples.len(), val.len()
    );
    (samples, val)
}

/// Keep order; the trailing `validation_fraction` becomes validation.
pub fn split_tail<T>(mut samples: Vec<T>, validation_fraction: f64) -> (Vec<T>, Vec<T>) {
    let total    = samples.len();
    let split_at = ((total as f64) * (1.0 - validation_fraction.clamp(0.0, 1.0))) as usize;
    let val      = samples.split_off(split_at.min(total));

    tracing::debug!("Tail split: {} training, {} validation", samples.len(), val.len());
    (samples, val)
}

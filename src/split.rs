//! Seeded train/val/test assignment.

use crate::document::Split;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed used by the dataset binaries unless overridden.
pub const DEFAULT_SPLIT_SEED: u64 = 42;

const TEST_ABOVE: f64 = 0.95;
const VAL_ABOVE: f64 = 0.91;

impl Split {
    /// Maps a uniform draw in `[0, 1)` to a split.
    pub fn from_draw(draw: f64) -> Self {
        if draw > TEST_ABOVE {
            Self::Test
        } else if draw > VAL_ABOVE {
            Self::Val
        } else {
            Self::Train
        }
    }
}

/// Draws one split per image from a generator it owns exclusively.
///
/// Assignments are reproducible only when images are visited in the same
/// order with the same seed.
#[derive(Debug, Clone)]
pub struct SplitAssigner {
    rng: StdRng,
}

impl SplitAssigner {
    /// Creates an assigner seeded once.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Assigns the next image.
    pub fn assign(&mut self) -> Split {
        Split::from_draw(self.rng.gen::<f64>())
    }
}

impl Default for SplitAssigner {
    fn default() -> Self {
        Self::new(DEFAULT_SPLIT_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_follow_partition() {
        assert_eq!(Split::from_draw(0.0), Split::Train);
        assert_eq!(Split::from_draw(0.91), Split::Train);
        assert_eq!(Split::from_draw(0.9100001), Split::Val);
        assert_eq!(Split::from_draw(0.95), Split::Val);
        assert_eq!(Split::from_draw(0.9500001), Split::Test);
        assert_eq!(Split::from_draw(0.999), Split::Test);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SplitAssigner::new(7);
        let mut b = SplitAssigner::new(7);
        let first: Vec<Split> = (0..200).map(|_| a.assign()).collect();
        let second: Vec<Split> = (0..200).map(|_| b.assign()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn proportions_are_close_to_partition() {
        let mut assigner = SplitAssigner::new(DEFAULT_SPLIT_SEED);
        let draws = 20_000;
        let (mut val, mut test) = (0usize, 0usize);
        for _ in 0..draws {
            match assigner.assign() {
                Split::Val => val += 1,
                Split::Test => test += 1,
                Split::Train => {}
            }
        }
        let val_share = val as f64 / draws as f64;
        let test_share = test as f64 / draws as f64;
        assert!((0.03..0.05).contains(&val_share), "val share {val_share}");
        assert!((0.04..0.06).contains(&test_share), "test share {test_share}");
    }
}

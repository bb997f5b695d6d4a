//! Bitrate ladder
//!
//! The ladder is the ordered list of bitrates a tile can be requested at,
//! lowest first. It is fixed for the lifetime of a session.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LadderError {
    #[error("bitrate ladder is empty")]
    Empty,

    #[error("bitrates must be strictly increasing ({prev} then {next})")]
    NotIncreasing { prev: u32, next: u32 },

    #[error("bitrate 0 is not allowed")]
    ZeroBitrate,
}

/// Immutable, strictly increasing list of bitrates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitrateLadder {
    rungs: Vec<u32>,
}

impl BitrateLadder {
    /// Create a ladder, rejecting empty, zero or non-increasing input
    pub fn new(rungs: Vec<u32>) -> Result<Self, LadderError> {
        if rungs.is_empty() {
            return Err(LadderError::Empty);
        }
        if rungs.contains(&0) {
            return Err(LadderError::ZeroBitrate);
        }
        if let Some(pair) = rungs.windows(2).find(|w| w[0] >= w[1]) {
            return Err(LadderError::NotIncreasing {
                prev: pair[0],
                next: pair[1],
            });
        }
        Ok(Self { rungs })
    }

    /// Lowest bitrate
    pub fn min(&self) -> u32 {
        self.rungs[0]
    }

    /// Highest bitrate
    pub fn max(&self) -> u32 {
        self.rungs[self.rungs.len() - 1]
    }

    /// Bitrate at a rank (0 = lowest)
    pub fn get(&self, rank: usize) -> Option<u32> {
        self.rungs.get(rank).copied()
    }

    /// Rank of an exact bitrate, if it is on the ladder
    pub fn position(&self, bitrate: u32) -> Option<usize> {
        self.rungs.binary_search(&bitrate).ok()
    }

    pub fn contains(&self, bitrate: u32) -> bool {
        self.position(bitrate).is_some()
    }

    /// Ratio between the rungs at two ranks, as `rungs[num] / rungs[den]`
    pub(crate) fn ratio(&self, num: usize, den: usize) -> f64 {
        self.rungs[num] as f64 / self.rungs[den] as f64
    }

    /// Map a computed bitrate onto the ladder
    ///
    /// Picks the highest rung not exceeding `candidate`, or the lowest rung
    /// when every rung is above it.
    pub fn map_to_ladder(&self, candidate: f64) -> u32 {
        self.rungs
            .iter()
            .rev()
            .find(|&&rung| rung as f64 <= candidate)
            .copied()
            .unwrap_or_else(|| self.min())
    }

    /// Clamp an off-ladder bitrate to the nearest end of the ladder
    ///
    /// Values between two rungs are returned unchanged.
    pub fn clamp(&self, bitrate: u32) -> u32 {
        bitrate.clamp(self.min(), self.max())
    }

    /// Get the number of rungs in the ladder
    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    /// Get all rungs, lowest first
    pub fn rungs(&self) -> &[u32] {
        &self.rungs
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn ladder() -> BitrateLadder {
        BitrateLadder::new(vec![500, 1000, 2000]).unwrap()
    }

    #[test]
    fn test_rejects_bad_ladders() {
        assert_eq!(BitrateLadder::new(vec![]), Err(LadderError::Empty));
        assert_eq!(BitrateLadder::new(vec![0, 100]), Err(LadderError::ZeroBitrate));
        assert_eq!(
            BitrateLadder::new(vec![100, 300, 200]),
            Err(LadderError::NotIncreasing { prev: 300, next: 200 })
        );
        assert!(BitrateLadder::new(vec![100, 100]).is_err());
    }

    #[test]
    fn test_bounds_and_positions() {
        let ladder = ladder();
        assert_eq!(ladder.min(), 500);
        assert_eq!(ladder.max(), 2000);
        assert_eq!(ladder.len(), 3);
        assert_eq!(ladder.position(1000), Some(1));
        assert_eq!(ladder.position(1500), None);
        assert!((ladder.ratio(0, 1) - 0.5).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(100.0, 500)]
    #[case(500.0, 500)]
    #[case(999.9, 500)]
    #[case(1000.0, 1000)]
    #[case(1999.0, 1000)]
    #[case(2000.0, 2000)]
    #[case(1.0e9, 2000)]
    #[case(0.0, 500)]
    fn test_map_to_ladder(#[case] candidate: f64, #[case] expected: u32) {
        assert_eq!(ladder().map_to_ladder(candidate), expected);
    }

    #[test]
    fn test_clamp() {
        let ladder = ladder();
        assert_eq!(ladder.clamp(10), 500);
        assert_eq!(ladder.clamp(9000), 2000);
        assert_eq!(ladder.clamp(1500), 1500);
    }
}

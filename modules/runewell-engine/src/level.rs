//! Flat XP curve: every level costs the same amount of XP.

use serde::Serialize;

pub const XP_PER_LEVEL: u64 = 100;

/// `floor(xp / 100) + 1`. Level 1 starts at 0 XP.
pub fn level(xp: u64) -> u64 {
    xp / XP_PER_LEVEL + 1
}

/// XP earned inside the current level, out of `XP_PER_LEVEL`.
pub fn progress_in_level(xp: u64) -> u64 {
    xp % XP_PER_LEVEL
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: u64,
    pub progress: u64,
    pub per_level: u64,
}

impl LevelProgress {
    pub fn from_xp(xp: u64) -> Self {
        Self {
            level: level(xp),
            progress: progress_in_level(xp),
            per_level: XP_PER_LEVEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_boundaries() {
        assert_eq!(level(0), 1);
        assert_eq!(level(99), 1);
        assert_eq!(level(100), 2);
        assert_eq!(level(210), 3);
    }

    #[test]
    fn level_matches_formula_across_range() {
        for xp in (0..5_000).step_by(7) {
            assert_eq!(level(xp), xp / 100 + 1);
            assert!(progress_in_level(xp) < XP_PER_LEVEL);
        }
    }

    #[test]
    fn zero_xp_is_level_one_with_no_progress() {
        assert_eq!(
            LevelProgress::from_xp(0),
            LevelProgress {
                level: 1,
                progress: 0,
                per_level: 100
            }
        );
    }

    #[test]
    fn max_xp_does_not_overflow() {
        assert_eq!(level(u64::MAX), u64::MAX / 100 + 1);
    }
}

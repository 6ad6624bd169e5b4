//! Leitner box model: promotion rules and the weighted sampling plan.
//!
//! Box 1 holds the weakest recall, box 5 the strongest. Review sessions draw
//! mostly from the low boxes so struggling material comes back often.

use serde::{Deserialize, Serialize};

/// Target share of a review session drawn from each box, 1 through 5.
pub const BOX_SHARES: [f64; 5] = [0.50, 0.25, 0.15, 0.07, 0.03];

/// The only session sizes a learner may request.
pub const VALID_QUESTION_COUNTS: [u32; 4] = [5, 10, 15, 20];

/// Spaced-repetition stage of one question for one student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BoxLevel {
    One,
    Two,
    Three,
    Four,
    Five,
}

impl BoxLevel {
    pub const ALL: [BoxLevel; 5] = [
        BoxLevel::One,
        BoxLevel::Two,
        BoxLevel::Three,
        BoxLevel::Four,
        BoxLevel::Five,
    ];

    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            BoxLevel::One => 1,
            BoxLevel::Two => 2,
            BoxLevel::Three => 3,
            BoxLevel::Four => 4,
            BoxLevel::Five => 5,
        }
    }

    #[must_use]
    pub fn from_value(v: u8) -> Option<Self> {
        match v {
            1 => Some(BoxLevel::One),
            2 => Some(BoxLevel::Two),
            3 => Some(BoxLevel::Three),
            4 => Some(BoxLevel::Four),
            5 => Some(BoxLevel::Five),
            _ => None,
        }
    }

    /// Zero-based index into per-box arrays.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.value()) - 1
    }

    /// One box up, saturating at five.
    #[must_use]
    pub fn promoted(self) -> Self {
        Self::from_value(self.value() + 1).unwrap_or(BoxLevel::Five)
    }
}

/// Box level after one review outcome: correct promotes one box (capped at
/// five), incorrect drops straight back to box one.
#[must_use]
pub fn next_level(level: BoxLevel, correct: bool) -> BoxLevel {
    if correct { level.promoted() } else { BoxLevel::One }
}

/// Counts of box states per level for one (classroom, student) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoxDistribution {
    pub counts: [u64; 5],
}

impl BoxDistribution {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Percentage of the pool in each box; all zeros for an empty pool.
    #[must_use]
    pub fn percentages(&self) -> [f64; 5] {
        let total = self.total();
        if total == 0 {
            return [0.0; 5];
        }
        #[allow(clippy::cast_precision_loss)]
        let total = total as f64;
        #[allow(clippy::cast_precision_loss)]
        self.counts.map(|c| c as f64 / total * 100.0)
    }
}

/// Compute how many questions to draw from each box.
///
/// Two passes, per the target shares in [`BOX_SHARES`]:
///
/// 1. floor each box's target count and clamp it to the box's available
///    pool;
/// 2. redistribute any shortfall proportionally to the shares of boxes that
///    still have headroom (leftover units go largest-share-first), looping
///    until the request is met or the overall pool is exhausted.
///
/// An under-populated box contributes everything it has; empty boxes simply
/// hand their quota to the rest, so the call never comes up short while the
/// pool as a whole can cover the request.
#[must_use]
pub fn sample_plan(available: [usize; 5], requested: usize) -> [usize; 5] {
    let mut plan = [0usize; 5];

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    for i in 0..5 {
        let target = (requested as f64 * BOX_SHARES[i]).floor() as usize;
        plan[i] = target.min(available[i]);
    }

    let mut assigned: usize = plan.iter().sum();
    while assigned < requested {
        let headroom: Vec<usize> = (0..5).filter(|&i| available[i] > plan[i]).collect();
        if headroom.is_empty() {
            break;
        }

        let share_total: f64 = headroom.iter().map(|&i| BOX_SHARES[i]).sum();
        let mut remaining = requested - assigned;
        let mut gave = 0usize;

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        for &i in &headroom {
            if remaining == 0 {
                break;
            }
            let extra = (remaining as f64 * BOX_SHARES[i] / share_total).floor() as usize;
            let extra = extra.min(available[i] - plan[i]).min(remaining);
            plan[i] += extra;
            remaining -= extra;
            gave += extra;
        }

        if gave == 0 {
            // All floors rounded to zero; hand one unit to the
            // largest-share box with headroom (shares decrease with level,
            // so the first headroom index wins).
            let i = headroom[0];
            plan[i] += 1;
            gave = 1;
        }

        assigned += gave;
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_is_capped_at_five() {
        assert_eq!(next_level(BoxLevel::Three, true), BoxLevel::Four);
        assert_eq!(next_level(BoxLevel::Five, true), BoxLevel::Five);
    }

    #[test]
    fn any_failure_drops_to_box_one() {
        for level in BoxLevel::ALL {
            assert_eq!(next_level(level, false), BoxLevel::One);
        }
    }

    #[test]
    fn level_value_roundtrip() {
        for level in BoxLevel::ALL {
            assert_eq!(BoxLevel::from_value(level.value()), Some(level));
        }
        assert_eq!(BoxLevel::from_value(0), None);
        assert_eq!(BoxLevel::from_value(6), None);
    }

    #[test]
    fn empty_boxes_redistribute_their_quota() {
        // Boxes 3-5 are empty; their quota flows to boxes 1 and 2 and the
        // request is still met in full.
        let plan = sample_plan([20, 10, 0, 0, 0], 10);
        assert_eq!(plan.iter().sum::<usize>(), 10);
        assert_eq!(plan[2] + plan[3] + plan[4], 0);
        assert!(plan[0] >= plan[1]);
    }

    #[test]
    fn well_stocked_pool_follows_the_shares() {
        let plan = sample_plan([100, 100, 100, 100, 100], 20);
        assert_eq!(plan.iter().sum::<usize>(), 20);
        // 20 * [0.50, 0.25, 0.15, 0.07, 0.03] floors to [10, 5, 3, 1, 0];
        // the leftover unit goes to the largest share.
        assert_eq!(plan, [11, 5, 3, 1, 0]);
    }

    #[test]
    fn exhausted_pool_returns_everything_available() {
        let plan = sample_plan([2, 1, 0, 0, 0], 10);
        assert_eq!(plan, [2, 1, 0, 0, 0]);
    }

    #[test]
    fn single_box_pool_gets_the_whole_request() {
        let plan = sample_plan([0, 0, 0, 0, 30], 5);
        assert_eq!(plan, [0, 0, 0, 0, 5]);
    }

    #[test]
    fn distribution_percentages_sum_to_hundred() {
        let dist = BoxDistribution {
            counts: [10, 5, 3, 1, 1],
        };
        let pct = dist.percentages();
        let sum: f64 = pct.iter().sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert!((pct[0] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn empty_distribution_is_all_zeros() {
        let dist = BoxDistribution::default();
        assert_eq!(dist.total(), 0);
        assert_eq!(dist.percentages(), [0.0; 5]);
    }
}

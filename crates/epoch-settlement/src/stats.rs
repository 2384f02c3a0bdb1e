//! Binomial significance tests for missed work.
//!
//! Both downtime punishment and the claim coverage check ask the same
//! question: given `total` assignments and `missed` misses, is the miss rate
//! plausibly at or below 10%? The consensus answer comes from a fixed table of
//! critical values (p0 = 0.10, alpha = 0.05) so every node agrees without
//! evaluating a distribution. [`BinomialTailTest`] derives the same thresholds
//! from the exact binomial tail and is used to audit the table.

use crate::error::StatTestError;
use mockall::automock;
use statrs::distribution::{Binomial, DiscreteCDF};

/// Totals above the last table entry fall back to the plain 10% rule.
pub const TABLE_MAX_TOTAL: u64 = 990;

#[automock]
pub trait MissedStatTest {
    /// `Ok(true)` when `missed` out of `total` is acceptable.
    fn missed_stat_test(&self, missed: u64, total: u64) -> Result<bool, StatTestError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub total: u64,
    pub critical_misses: u64,
}

impl Threshold {
    const fn new(total: u64, critical_misses: u64) -> Self {
        Self {
            total,
            critical_misses,
        }
    }
}

const CRITICAL_VALUES: &[Threshold] = &[
    Threshold::new(2, 2),
    Threshold::new(3, 2),
    Threshold::new(4, 2),
    Threshold::new(5, 3),
    Threshold::new(10, 4),
    Threshold::new(20, 5),
    Threshold::new(30, 7),
    Threshold::new(40, 8),
    Threshold::new(50, 10),
    Threshold::new(60, 11),
    Threshold::new(70, 12),
    Threshold::new(80, 14),
    Threshold::new(90, 15),
    Threshold::new(100, 16),
    Threshold::new(110, 17),
    Threshold::new(120, 19),
    Threshold::new(130, 20),
    Threshold::new(140, 21),
    Threshold::new(150, 22),
    Threshold::new(160, 23),
    Threshold::new(170, 25),
    Threshold::new(180, 26),
    Threshold::new(190, 27),
    Threshold::new(200, 28),
    Threshold::new(210, 29),
    Threshold::new(220, 31),
    Threshold::new(230, 32),
    Threshold::new(240, 33),
    Threshold::new(250, 34),
    Threshold::new(260, 35),
    Threshold::new(270, 36),
    Threshold::new(280, 37),
    Threshold::new(290, 39),
    Threshold::new(300, 40),
    Threshold::new(310, 41),
    Threshold::new(320, 42),
    Threshold::new(330, 43),
    Threshold::new(340, 44),
    Threshold::new(350, 45),
    Threshold::new(360, 47),
    Threshold::new(370, 48),
    Threshold::new(380, 49),
    Threshold::new(390, 50),
    Threshold::new(400, 51),
    Threshold::new(410, 52),
    Threshold::new(420, 53),
    Threshold::new(430, 54),
    Threshold::new(440, 56),
    Threshold::new(450, 57),
    Threshold::new(460, 58),
    Threshold::new(470, 59),
    Threshold::new(480, 60),
    Threshold::new(490, 61),
    Threshold::new(500, 62),
    Threshold::new(510, 63),
    Threshold::new(520, 64),
    Threshold::new(530, 66),
    Threshold::new(540, 67),
    Threshold::new(550, 68),
    Threshold::new(560, 69),
    Threshold::new(570, 70),
    Threshold::new(580, 71),
    Threshold::new(590, 72),
    Threshold::new(600, 73),
    Threshold::new(610, 74),
    Threshold::new(620, 76),
    Threshold::new(630, 77),
    Threshold::new(640, 78),
    Threshold::new(650, 79),
    Threshold::new(660, 80),
    Threshold::new(670, 81),
    Threshold::new(680, 82),
    Threshold::new(690, 83),
    Threshold::new(700, 84),
    Threshold::new(710, 85),
    Threshold::new(720, 86),
    Threshold::new(730, 88),
    Threshold::new(740, 89),
    Threshold::new(750, 90),
    Threshold::new(760, 91),
    Threshold::new(770, 92),
    Threshold::new(780, 93),
    Threshold::new(790, 94),
    Threshold::new(800, 95),
    Threshold::new(810, 96),
    Threshold::new(820, 97),
    Threshold::new(830, 98),
    Threshold::new(840, 100),
    Threshold::new(850, 101),
    Threshold::new(860, 102),
    Threshold::new(870, 103),
    Threshold::new(880, 104),
    Threshold::new(890, 105),
    Threshold::new(900, 106),
    Threshold::new(910, 107),
    Threshold::new(920, 108),
    Threshold::new(930, 109),
    Threshold::new(940, 110),
    Threshold::new(950, 111),
    Threshold::new(960, 113),
    Threshold::new(970, 114),
    Threshold::new(980, 115),
    Threshold::new(990, 116),
];

/// Table-driven test used by consensus code.
#[derive(Debug, Clone, Copy, Default)]
pub struct CriticalValueTable;

impl CriticalValueTable {
    pub fn thresholds(&self) -> &'static [Threshold] {
        CRITICAL_VALUES
    }

    /// Critical misses for the largest table total not above `total`.
    pub fn critical_misses(&self, total: u64) -> Option<u64> {
        let idx = CRITICAL_VALUES.partition_point(|t| t.total <= total);
        idx.checked_sub(1).map(|i| CRITICAL_VALUES[i].critical_misses)
    }
}

impl MissedStatTest for CriticalValueTable {
    fn missed_stat_test(&self, missed: u64, total: u64) -> Result<bool, StatTestError> {
        if total == 0 {
            return Ok(true);
        }
        if missed > total {
            return Err(StatTestError::InvalidInput { missed, total });
        }
        if total > TABLE_MAX_TOTAL {
            return Ok(missed.saturating_mul(10) <= total);
        }
        // Below the first entry nothing is significant
        Ok(self
            .critical_misses(total)
            .is_none_or(|critical| missed <= critical))
    }
}

/// Exact binomial-tail variant: the critical value is the smallest `k` with
/// `P(X >= k) <= alpha` under `Binomial(total, p0)`.
#[derive(Debug, Clone, Copy)]
pub struct BinomialTailTest {
    pub p0: f64,
    pub alpha: f64,
}

impl Default for BinomialTailTest {
    fn default() -> Self {
        Self {
            p0: 0.10,
            alpha: 0.05,
        }
    }
}

impl BinomialTailTest {
    pub fn critical_misses(&self, total: u64) -> Result<u64, StatTestError> {
        let dist = Binomial::new(self.p0, total)
            .map_err(|e| StatTestError::Distribution(e.to_string()))?;
        // sf(k - 1) == P(X >= k)
        let critical = (1..=total)
            .find(|&k| dist.sf(k - 1) <= self.alpha)
            .unwrap_or(total);
        Ok(critical)
    }
}

impl MissedStatTest for BinomialTailTest {
    fn missed_stat_test(&self, missed: u64, total: u64) -> Result<bool, StatTestError> {
        if total == 0 {
            return Ok(true);
        }
        if missed > total {
            return Err(StatTestError::InvalidInput { missed, total });
        }
        Ok(missed <= self.critical_misses(total)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_total_passes() {
        assert_eq!(CriticalValueTable.missed_stat_test(0, 0), Ok(true));
    }

    #[test]
    fn test_missed_above_total_is_error() {
        assert_eq!(
            CriticalValueTable.missed_stat_test(15, 10),
            Err(StatTestError::InvalidInput {
                missed: 15,
                total: 10
            })
        );
    }

    #[test]
    fn test_exact_table_lookups() {
        let table = CriticalValueTable;
        assert_eq!(table.missed_stat_test(3, 10), Ok(true));
        assert_eq!(table.missed_stat_test(4, 10), Ok(true));
        assert_eq!(table.missed_stat_test(5, 10), Ok(false));
        assert_eq!(table.missed_stat_test(16, 100), Ok(true));
        assert_eq!(table.missed_stat_test(17, 100), Ok(false));
    }

    #[test]
    fn test_floor_entry_is_used_between_rows() {
        let table = CriticalValueTable;
        // 15 floors to the 10-row (critical 4)
        assert_eq!(table.missed_stat_test(4, 15), Ok(true));
        assert_eq!(table.missed_stat_test(5, 15), Ok(false));
    }

    #[test]
    fn test_below_first_entry_passes() {
        assert_eq!(CriticalValueTable.missed_stat_test(1, 1), Ok(true));
    }

    #[test]
    fn test_large_totals_use_ten_percent_rule() {
        let table = CriticalValueTable;
        assert_eq!(table.missed_stat_test(100, 1000), Ok(true));
        assert_eq!(table.missed_stat_test(101, 1000), Ok(false));
    }

    #[test]
    fn test_table_is_sorted() {
        assert!(
            CRITICAL_VALUES
                .windows(2)
                .all(|w| w[0].total < w[1].total && w[0].critical_misses <= w[1].critical_misses)
        );
        assert_eq!(CRITICAL_VALUES.last().map(|t| t.total), Some(TABLE_MAX_TOTAL));
    }

    #[test]
    fn test_table_matches_binomial_tail() {
        let exact = BinomialTailTest::default();
        for threshold in CRITICAL_VALUES.iter().filter(|t| t.total >= 5) {
            assert_eq!(
                exact.critical_misses(threshold.total).unwrap(),
                threshold.critical_misses,
                "critical value mismatch at total {}",
                threshold.total
            );
        }
    }

    #[test]
    fn test_binomial_tail_small_totals() {
        let exact = BinomialTailTest::default();
        assert_eq!(exact.critical_misses(2).unwrap(), 2);
        assert_eq!(exact.critical_misses(3).unwrap(), 2);
        assert_eq!(exact.missed_stat_test(0, 0), Ok(true));
    }
}

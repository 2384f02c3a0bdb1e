use crate::{
    params::CollateralParams,
    stats::MissedStatTest,
    store::CollateralSlasher,
    types::{CurrentEpochStats, Participant},
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Zeroes rewards of participants whose miss rate fails the stat test.
pub struct DowntimePunisher<'a, T: MissedStatTest + ?Sized> {
    stat_test: &'a T,
}

impl<'a, T: MissedStatTest + ?Sized> DowntimePunisher<'a, T> {
    pub fn new(stat_test: &'a T) -> Self {
        Self { stat_test }
    }

    /// True when the participant's reward must be zeroed for this epoch.
    ///
    /// A participant with no assigned requests cannot be judged, and a test
    /// error leaves the reward untouched.
    pub fn is_punished(&self, address: &str, stats: &CurrentEpochStats) -> bool {
        let total = stats.total_requests();
        if total == 0 {
            return false;
        }
        match self.stat_test.missed_stat_test(stats.missed_requests, total) {
            Ok(true) => false,
            Ok(false) => {
                info!(
                    participant = %address,
                    missed = stats.missed_requests,
                    total,
                    "downtime test failed, reward zeroed"
                );
                true
            }
            Err(e) => {
                warn!(participant = %address, error = %e, "downtime test errored, reward unchanged");
                false
            }
        }
    }
}

/// Collateral consequence of downtime, independent of reward punishment.
pub struct CollateralDowntimeCheck<'a> {
    params: &'a CollateralParams,
}

impl<'a> CollateralDowntimeCheck<'a> {
    pub fn new(params: &'a CollateralParams) -> Self {
        Self { params }
    }

    /// Missed ratio strictly above the threshold triggers a slash.
    pub fn exceeds_threshold(&self, stats: &CurrentEpochStats) -> bool {
        let total = stats.total_requests();
        if total == 0 {
            return false;
        }
        let missed_ratio = Decimal::from(stats.missed_requests) / Decimal::from(total);
        missed_ratio > self.params.downtime_missed_percentage_threshold
    }

    /// Slashes collateral when warranted. Failures are logged only.
    pub fn check<S: CollateralSlasher + ?Sized>(&self, slasher: &mut S, participant: &Participant) -> bool {
        if !self.exceeds_threshold(&participant.current_epoch_stats) {
            return false;
        }
        debug!(
            participant = %participant.address,
            fraction = %self.params.slash_fraction_downtime,
            "slashing collateral for downtime"
        );
        match slasher.slash(&participant.address, self.params.slash_fraction_downtime) {
            Ok(()) => {
                metrics::counter!("epoch_settlement_collateral_slashed").increment(1);
                true
            }
            Err(e) => {
                warn!(participant = %participant.address, error = %e, "collateral slash failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{StatTestError, StoreError},
        stats::{CriticalValueTable, MockMissedStatTest},
        store::MockCollateralSlasher,
        types::ParticipantStatus,
    };
    use mockall::predicate::eq;
    use rust_decimal::dec;

    fn stats(inference_count: u64, missed_requests: u64) -> CurrentEpochStats {
        CurrentEpochStats {
            inference_count,
            missed_requests,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_requests_is_never_punished() {
        let mut stat_test = MockMissedStatTest::new();
        stat_test.expect_missed_stat_test().never();
        let punisher = DowntimePunisher::new(&stat_test);
        assert!(!punisher.is_punished("a", &stats(0, 0)));
    }

    #[test]
    fn test_failed_test_zeroes_reward() {
        let punisher = DowntimePunisher::new(&CriticalValueTable);
        // 50 missed of 100 is far beyond the critical 16
        assert!(punisher.is_punished("a", &stats(50, 50)));
        assert!(!punisher.is_punished("a", &stats(90, 10)));
    }

    #[test]
    fn test_stat_test_error_leaves_reward() {
        let mut stat_test = MockMissedStatTest::new();
        stat_test
            .expect_missed_stat_test()
            .with(eq(3), eq(10))
            .returning(|missed, total| Err(StatTestError::InvalidInput { missed, total }));
        let punisher = DowntimePunisher::new(&stat_test);
        assert!(!punisher.is_punished("a", &stats(7, 3)));
    }

    #[test]
    fn test_collateral_threshold_is_strict() {
        let params = CollateralParams::default();
        let check = CollateralDowntimeCheck::new(&params);
        // exactly 5% does not slash
        assert!(!check.exceeds_threshold(&stats(95, 5)));
        assert!(check.exceeds_threshold(&stats(94, 6)));
        assert!(!check.exceeds_threshold(&stats(0, 0)));
    }

    #[test]
    fn test_collateral_slash_failure_is_not_fatal() {
        let params = CollateralParams::default();
        let check = CollateralDowntimeCheck::new(&params);
        let mut participant = Participant::new("addr", 0, ParticipantStatus::Active);
        participant.current_epoch_stats = stats(10, 10);

        let mut slasher = MockCollateralSlasher::new();
        slasher
            .expect_slash()
            .withf(|address, fraction| address == "addr" && *fraction == dec!(0.10))
            .times(1)
            .returning(|_, _| Err(StoreError::Write("no collateral".to_string())));

        assert!(!check.check(&mut slasher, &participant));
    }
}

//! Aggregate counts, success rate and exit code for a run.

use serde::{Deserialize, Serialize};

use crate::core::record::{CheckStatus, ResultRecord};
use crate::exit_codes;

/// Counts derived from a list of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub total: usize,
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
    pub critical_failed: usize,
}

impl Tally {
    pub fn from_records(records: &[ResultRecord]) -> Self {
        let mut tally = Tally::default();
        for record in records {
            tally.total += 1;
            match record.status {
                CheckStatus::Pass => tally.passed += 1,
                CheckStatus::Warn => tally.warned += 1,
                CheckStatus::Fail => tally.failed += 1,
            }
            if record.is_critical_failure() {
                tally.critical_failed += 1;
            }
        }
        tally
    }

    pub fn success_rate(&self, rounding: RateRounding) -> u32 {
        success_rate(self.passed, self.total, rounding)
    }
}

/// How the success percentage is rounded to an integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateRounding {
    Floor,
    #[default]
    Round,
}

/// `passed / total * 100`, rounded per `rounding`. An empty run has rate 0.
pub fn success_rate(passed: usize, total: usize, rounding: RateRounding) -> u32 {
    if total == 0 {
        return 0;
    }
    let (passed, total) = (passed as u64, total as u64);
    // Integer arithmetic keeps exact fractions such as 29/100 exact.
    let rate = match rounding {
        RateRounding::Floor => passed * 100 / total,
        RateRounding::Round => (passed * 200 + total) / (2 * total),
    };
    u32::try_from(rate).unwrap_or(u32::MAX)
}

/// `OK` iff no critical check failed.
pub fn exit_code(tally: &Tally) -> i32 {
    if tally.critical_failed == 0 {
        exit_codes::OK
    } else {
        exit_codes::CRITICAL_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<ResultRecord> {
        vec![
            ResultRecord::pass("a"),
            ResultRecord::warn("b"),
            ResultRecord::fail("c").critical(false),
        ]
    }

    #[test]
    fn counts_each_status() {
        let tally = Tally::from_records(&records());
        assert_eq!(
            tally,
            Tally {
                total: 3,
                passed: 1,
                warned: 1,
                failed: 1,
                critical_failed: 0,
            }
        );
    }

    #[test]
    fn non_critical_failures_exit_ok() {
        let tally = Tally::from_records(&records());
        assert_eq!(exit_code(&tally), exit_codes::OK);
    }

    #[test]
    fn critical_failure_sets_failure_exit_code() {
        let mut records = records();
        records.push(ResultRecord::fail("d"));
        let tally = Tally::from_records(&records);
        assert_eq!(tally.critical_failed, 1);
        assert_eq!(exit_code(&tally), exit_codes::CRITICAL_FAILED);
    }

    #[test]
    fn rate_rounding_rules_differ_on_fractions() {
        assert_eq!(success_rate(2, 3, RateRounding::Floor), 66);
        assert_eq!(success_rate(2, 3, RateRounding::Round), 67);
        assert_eq!(success_rate(1, 3, RateRounding::Round), 33);
        assert_eq!(success_rate(3, 3, RateRounding::Floor), 100);
        assert_eq!(success_rate(29, 100, RateRounding::Floor), 29);
        assert_eq!(success_rate(29, 50, RateRounding::Floor), 58);
        assert_eq!(success_rate(1, 8, RateRounding::Round), 13);
    }

    #[test]
    fn floor_rate_is_exact_for_every_fraction() {
        for total in 1..=200usize {
            for passed in 0..=total {
                let rate = success_rate(passed, total, RateRounding::Floor) as usize;
                assert!(rate * total <= passed * 100, "{passed}/{total} -> {rate}");
                assert!((rate + 1) * total > passed * 100, "{passed}/{total} -> {rate}");
            }
        }
    }

    #[test]
    fn empty_run_has_zero_rate() {
        assert_eq!(success_rate(0, 0, RateRounding::Round), 0);
        assert_eq!(exit_code(&Tally::default()), exit_codes::OK);
    }
}

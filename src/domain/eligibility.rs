//! Donation eligibility arithmetic.

use chrono::{DateTime, Duration, Utc};

/// Deferral interval applied when none is configured.
pub const DEFAULT_DEFERRAL_DAYS: i64 = 90;

/// Longest deferral interval accepted from configuration.
pub const MAX_DEFERRAL_DAYS: i64 = 3650;

/// Minimum waiting period after a donation before the donor may give again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferralPolicy {
    interval: Duration,
}

impl Default for DeferralPolicy {
    fn default() -> Self {
        Self::from_days(DEFAULT_DEFERRAL_DAYS)
    }
}

impl DeferralPolicy {
    /// Days outside `1..=MAX_DEFERRAL_DAYS` are clamped into range.
    pub fn from_days(days: i64) -> Self {
        Self {
            interval: Duration::days(days.clamp(1, MAX_DEFERRAL_DAYS)),
        }
    }

    /// First instant at which a donor who gave at `last_donation` is eligible again.
    pub fn eligibility_date(&self, last_donation: DateTime<Utc>) -> DateTime<Utc> {
        last_donation
            .checked_add_signed(self.interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// A donor with no eligibility date has never donated and is eligible.
    pub fn is_eligible(&self, eligibility_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match eligibility_date {
            Some(date) => now >= date,
            None => true,
        }
    }

    /// Share of the deferral interval elapsed since the last donation, in `0..=100`.
    pub fn progress_percent(&self, last_donation: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(last) = last_donation else {
            return 100.0;
        };
        let total = self.interval.num_milliseconds();
        if total <= 0 {
            return 100.0;
        }
        let elapsed = (now - last).num_milliseconds() as f64;
        (elapsed / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    /// Whole days left until eligible, rounded up; zero once eligible.
    pub fn days_until_eligible(&self, eligibility_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
        let Some(date) = eligibility_date else {
            return 0;
        };
        let remaining = (date - now).num_milliseconds();
        if remaining <= 0 {
            return 0;
        }
        let day = Duration::days(1).num_milliseconds();
        (remaining + day - 1) / day
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_ineligible_immediately_after_donation() {
        let policy = DeferralPolicy::default();
        let donated = at(1);
        let eligible_at = policy.eligibility_date(donated);

        assert!(eligible_at >= donated);
        assert!(!policy.is_eligible(Some(eligible_at), donated));
        assert!(!policy.is_eligible(Some(eligible_at), eligible_at - Duration::milliseconds(1)));
        assert!(policy.is_eligible(Some(eligible_at), eligible_at));
        assert!(policy.is_eligible(Some(eligible_at), eligible_at + Duration::days(3)));
    }

    #[test]
    fn test_default_interval_is_ninety_days() {
        let policy = DeferralPolicy::default();
        assert_eq!(policy.eligibility_date(at(1)) - at(1), Duration::days(90));
    }

    #[test]
    fn test_out_of_range_days_are_clamped() {
        assert_eq!(
            DeferralPolicy::from_days(200_000_000_000_000),
            DeferralPolicy::from_days(MAX_DEFERRAL_DAYS)
        );
        assert_eq!(DeferralPolicy::from_days(0), DeferralPolicy::from_days(1));

        let policy = DeferralPolicy::from_days(MAX_DEFERRAL_DAYS);
        assert_eq!(policy.eligibility_date(at(1)), at(1) + Duration::days(MAX_DEFERRAL_DAYS));
        assert_eq!(
            policy.eligibility_date(DateTime::<Utc>::MAX_UTC),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_never_donated_is_eligible() {
        let policy = DeferralPolicy::default();
        assert!(policy.is_eligible(None, at(1)));
        assert_eq!(policy.progress_percent(None, at(1)), 100.0);
        assert_eq!(policy.days_until_eligible(None, at(1)), 0);
    }

    #[test]
    fn test_progress_percent_is_clamped() {
        let policy = DeferralPolicy::from_days(10);
        let last = at(1);

        assert_eq!(policy.progress_percent(Some(last), last), 0.0);
        assert!((policy.progress_percent(Some(last), at(6)) - 50.0).abs() < 1e-9);
        assert_eq!(policy.progress_percent(Some(last), at(25)), 100.0);
        // Clock skew: last donation in the future.
        assert_eq!(policy.progress_percent(Some(at(5)), at(1)), 0.0);
    }

    #[test]
    fn test_days_until_eligible_rounds_up() {
        let policy = DeferralPolicy::from_days(56);
        let date = policy.eligibility_date(at(1));

        assert_eq!(policy.days_until_eligible(Some(date), at(1)), 56);
        assert_eq!(
            policy.days_until_eligible(Some(date), at(1) + Duration::hours(1)),
            56
        );
        assert_eq!(policy.days_until_eligible(Some(date), date), 0);
    }
}

//! A single clock abstraction so "today" filters and retention windows are
//! testable without sleeping or mocking `std::time`.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock, used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Today's date in `tz`, derived from `clock`.
pub fn today_in(clock: &dyn Clock, tz: Tz) -> NaiveDate {
    clock.now().with_timezone(&tz).date_naive()
}

/// Local midnight `days_ago` days before today in `tz`, expressed in UTC.
pub fn local_midnight_days_ago(clock: &dyn Clock, tz: Tz, days_ago: i64) -> DateTime<Utc> {
    let today = today_in(clock, tz);
    let target = today - chrono::Duration::days(days_ago);
    tz.from_local_datetime(&target.and_hms_opt(0, 0, 0).expect("valid midnight"))
        .single()
        .unwrap_or_else(|| tz.from_utc_datetime(&target.and_hms_opt(0, 0, 0).unwrap()))
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn fixed_clock_returns_configured_instant() {
        let instant = Utc.with_ymd_and_hms(2026, 7, 31, 12, 0, 0).unwrap();
        let clock = FixedClock(instant);
        assert_eq!(clock.now(), instant);
    }

    #[test]
    fn today_in_respects_timezone_boundary() {
        // 2026-07-31 23:30 UTC is already 2026-08-01 in Zurich (UTC+2 in summer).
        let instant = Utc.with_ymd_and_hms(2026, 7, 31, 23, 30, 0).unwrap();
        let clock = FixedClock(instant);
        let zurich: Tz = "Europe/Zurich".parse().unwrap();
        assert_eq!(
            today_in(&clock, zurich),
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
        );
    }
}

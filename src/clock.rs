//! Clock capability.
//!
//! `spec.md` §9: "the engine takes a clock capability; tests inject a fixed
//! clock so age strings and cache TTLs are deterministic." Production uses
//! the system wall clock; timestamps are formatted RFC 3339.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A source of "now". Swappable so tests don't race real time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub type SharedClock = Arc<dyn Clock>;

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// Human age string per `spec.md` §4.3:
/// `>=1d` -> "{d}d{h}h", `>=1h` -> "{h}h{m}m", `>=1m` -> "{m}m", else "<1m".
pub fn age_string(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(since);
    let total_minutes = delta.num_minutes().max(0);

    if total_minutes >= 24 * 60 {
        let days = total_minutes / (24 * 60);
        let hours = (total_minutes % (24 * 60)) / 60;
        format!("{days}d{hours}h")
    } else if total_minutes >= 60 {
        let hours = total_minutes / 60;
        let minutes = total_minutes % 60;
        format!("{hours}h{minutes}m")
    } else if total_minutes >= 1 {
        format!("{total_minutes}m")
    } else {
        "<1m".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs_from_epoch: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs_from_epoch, 0).unwrap()
    }

    #[test]
    fn age_under_a_minute() {
        let since = at(0);
        let now = at(30);
        assert_eq!(age_string(since, now), "<1m");
    }

    #[test]
    fn age_in_minutes() {
        let since = at(0);
        let now = at(5 * 60);
        assert_eq!(age_string(since, now), "5m");
    }

    #[test]
    fn age_in_hours_and_minutes() {
        let since = at(0);
        let now = at(2 * 3600 + 15 * 60);
        assert_eq!(age_string(since, now), "2h15m");
    }

    #[test]
    fn age_in_days_and_hours() {
        let since = at(0);
        let now = at(3 * 86400 + 4 * 3600);
        assert_eq!(age_string(since, now), "3d4h");
    }

    #[test]
    fn fixed_clock_is_stable() {
        let clock = FixedClock(at(1000));
        assert_eq!(clock.now(), clock.now());
    }
}

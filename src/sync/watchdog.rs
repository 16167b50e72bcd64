//! Inactivity watchdog
//!
//! Raises an admin alert when nobody has joined the group for a whole
//! window, at most once per window.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct InactivityWatchdog {
    window: Duration,
    started_at: DateTime<Utc>,
    last_alert_at: Option<DateTime<Utc>>,
}

impl InactivityWatchdog {
    #[must_use]
    pub fn new(window: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            window,
            started_at,
            last_alert_at: None,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn last_alert_at(&self) -> Option<DateTime<Utc>> {
        self.last_alert_at
    }

    /// Whether an alert is due, given the most recent recorded join.
    /// Joins before process start do not count; the process start itself does.
    #[must_use]
    pub fn should_alert(&self, last_joined_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let reference = last_joined_at.map_or(self.started_at, |joined| joined.max(self.started_at));
        if now - reference < self.window {
            return false;
        }
        self.last_alert_at
            .is_none_or(|alerted| now - alerted >= self.window)
    }

    pub fn record_alert(&mut self, now: DateTime<Utc>) {
        self.last_alert_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_quiet_until_window_elapses_from_start() {
        let dog = InactivityWatchdog::new(Duration::hours(24), start());
        assert!(!dog.should_alert(None, start() + Duration::hours(23)));
        assert!(dog.should_alert(None, start() + Duration::hours(24)));
    }

    #[test]
    fn test_recent_join_suppresses_alert() {
        let dog = InactivityWatchdog::new(Duration::hours(24), start());
        let joined = start() + Duration::hours(20);
        assert!(!dog.should_alert(Some(joined), start() + Duration::hours(30)));
        assert!(dog.should_alert(Some(joined), start() + Duration::hours(44)));
    }

    #[test]
    fn test_join_before_start_counts_from_start() {
        let dog = InactivityWatchdog::new(Duration::hours(24), start());
        let old_join = start() - Duration::days(10);
        assert!(!dog.should_alert(Some(old_join), start() + Duration::hours(1)));
    }

    #[test]
    fn test_alert_cooldown_spans_one_window() {
        let mut dog = InactivityWatchdog::new(Duration::hours(24), start());
        let first = start() + Duration::hours(24);
        assert!(dog.should_alert(None, first));
        dog.record_alert(first);

        assert!(!dog.should_alert(None, first + Duration::minutes(30)));
        assert!(!dog.should_alert(None, first + Duration::hours(23)));
        assert!(dog.should_alert(None, first + Duration::hours(24)));
    }
}

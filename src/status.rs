//! Operator-facing status summary

use crate::enforcement::{MAX_WARNINGS, can_warn};
use crate::store::MemberRecord;
use crate::sync::{CycleReport, StopReason};
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

/// Snapshot of the enforcement state for the `status` command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSummary {
    pub threshold: f64,
    pub tracked: usize,
    pub below_threshold: usize,
    /// Tracked members carrying at least one warning
    pub warned: usize,
    /// Members on their final warning whose cooldown has run out
    pub due_for_removal: usize,
}

impl StatusSummary {
    #[must_use]
    pub fn from_members(members: &[MemberRecord], threshold: f64, now: DateTime<Utc>) -> Self {
        let below: Vec<&MemberRecord> = members
            .iter()
            .filter(|m| m.total_balance() < threshold)
            .collect();

        Self {
            threshold,
            tracked: members.len(),
            below_threshold: below.len(),
            warned: members.iter().filter(|m| m.warn_count > 0).count(),
            due_for_removal: below
                .iter()
                .filter(|m| m.warn_count >= MAX_WARNINGS && can_warn(m, now))
                .count(),
        }
    }
}

fn describe_stop(stop: StopReason) -> &'static str {
    match stop {
        StopReason::ShortPage => "complete",
        StopReason::OffsetCap => "stopped at the offset limit",
        StopReason::FetchError => "failed, stored balances used",
    }
}

/// Helper to format an instant relative to `now`
fn format_elapsed(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 0 {
        "unknown time".to_string()
    } else if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
    } else {
        format!("{} days ago", secs / 86400)
    }
}

/// Render the status message
#[must_use]
pub fn format_status(
    summary: &StatusSummary,
    last_cycle: Option<&CycleReport>,
    now: DateTime<Utc>,
) -> String {
    let mut result = String::new();

    let _ = writeln!(result, "**Threshold**: {}", summary.threshold);
    let _ = writeln!(
        result,
        "**Members**: {} tracked, {} below threshold",
        summary.tracked, summary.below_threshold
    );
    let _ = writeln!(
        result,
        "**Warnings**: {} warned, {} due for removal",
        summary.warned, summary.due_for_removal
    );

    match last_cycle {
        None => {
            let _ = writeln!(result, "**Last Sync**: not run yet");
        }
        Some(cycle) => {
            let _ = writeln!(
                result,
                "**Last Sync**: {} ({} pages, {} balances, refresh {})",
                format_elapsed(cycle.started_at, now),
                cycle.refresh.pages,
                cycle.refresh.records_applied,
                describe_stop(cycle.refresh.stop)
            );
            match cycle.enforcement {
                Some(pass) => {
                    let _ = writeln!(
                        result,
                        "**Last Pass**: {} checked, {} warned, {} removed, {} in cooldown, {} failed",
                        pass.evaluated, pass.warned, pass.kicked, pass.cooldown, pass.failed
                    );
                }
                None => {
                    let _ = writeln!(result, "**Last Pass**: could not run");
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{EnforcementPass, RefreshReport};
    use chrono::Duration;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-05T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn member(user_id: u64, balance: f64, warn_count: u32, hours_ago: i64) -> MemberRecord {
        MemberRecord {
            currency_amount: balance,
            warn_count,
            last_warned_at: (warn_count > 0).then(|| (now() - Duration::hours(hours_ago)).to_rfc3339()),
            ..MemberRecord::joined(user_id, now() - Duration::days(3))
        }
    }

    #[test]
    fn test_summary_counts() {
        let members = vec![
            member(1, 500.0, 0, 0),
            member(2, 10.0, 1, 2),
            member(3, 10.0, 3, 30),
            member(4, 10.0, 3, 1),
        ];
        let summary = StatusSummary::from_members(&members, 100.0, now());
        assert_eq!(summary.tracked, 4);
        assert_eq!(summary.below_threshold, 3);
        assert_eq!(summary.warned, 3);
        assert_eq!(summary.due_for_removal, 1);
    }

    #[test]
    fn test_format_without_cycle() {
        let text = format_status(&StatusSummary::default(), None, now());
        assert!(text.contains("**Last Sync**: not run yet"));
    }

    #[test]
    fn test_format_with_cycle() {
        let cycle = CycleReport {
            id: Uuid::new_v4(),
            started_at: now() - Duration::minutes(12),
            refresh: RefreshReport {
                pages: 3,
                records_applied: 250,
                records_skipped: 40,
                record_failures: 0,
                stop: StopReason::ShortPage,
            },
            enforcement: Some(EnforcementPass {
                evaluated: 40,
                warned: 2,
                kicked: 1,
                ..Default::default()
            }),
            watchdog_alerted: false,
        };
        let text = format_status(&StatusSummary::default(), Some(&cycle), now());
        assert!(text.contains("12 minutes ago (3 pages, 250 balances, refresh complete)"));
        assert!(text.contains("40 checked, 2 warned, 1 removed"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(now(), now()), "just now");
        assert_eq!(format_elapsed(now() - Duration::hours(5), now()), "5 hours ago");
        assert_eq!(format_elapsed(now() - Duration::days(2), now()), "2 days ago");
        assert_eq!(format_elapsed(now() + Duration::hours(1), now()), "unknown time");
    }
}

//! Operator-triggered removal of every member below threshold

use super::{BalancePolicy, EnforcementMode, EnforcementOutcome};
use crate::ENFORCEMENT_TARGET;
use crate::error::StoreResult;
use crate::store::MemberStore;
use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Tally of a manual removal pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReport {
    /// Members below threshold when the pass started
    pub candidates: usize,
    pub kicked: usize,
    pub failed: usize,
}

/// Remove every tracked member whose balance is below the current threshold,
/// ignoring warning history.
///
/// Individual failures are logged and counted; the pass always completes.
///
/// # Errors
///
/// Returns a `StoreError` only if the member list or threshold cannot be loaded.
pub async fn force_kick_below_threshold(
    store: &dyn MemberStore,
    policy: &BalancePolicy,
    now: DateTime<Utc>,
) -> StoreResult<BulkReport> {
    let users = store.joined_users().await?;
    let threshold = store.threshold().await?;
    let mut report = BulkReport::default();

    for user in users.iter().filter(|u| u.total_balance() < threshold) {
        report.candidates += 1;
        match policy
            .enforce_member(user.user_id, threshold, EnforcementMode::ForceKick, now)
            .await
        {
            Ok(Some(EnforcementOutcome::Kicked)) => report.kicked += 1,
            Ok(_) => {}
            Err(e) => {
                report.failed += 1;
                error!(
                    target: ENFORCEMENT_TARGET,
                    user_id = user.user_id,
                    error = %e,
                    "Error kicking user"
                );
            }
        }
    }

    info!(
        target: ENFORCEMENT_TARGET,
        candidates = report.candidates,
        kicked = report.kicked,
        failed = report.failed,
        threshold,
        event = "force_kick_completed",
        "Force kick pass completed"
    );

    Ok(report)
}

//! Enforcement decision engine
//!
//! Decides, for one member at a time, whether to do nothing, warn, wait out
//! a cooldown or remove the member, and applies the decision through the
//! store and the transport.

use crate::ENFORCEMENT_TARGET;
use crate::error::EnforcementResult;
use crate::i18n::{MessageKey, Translator};
use crate::store::{MemberRecord, MemberStore};
use crate::transport::GroupTransport;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Warnings a member receives before removal
pub const MAX_WARNINGS: u32 = 3;

/// Minimum time between two warnings to the same member
pub const WARNING_COOLDOWN_HOURS: i64 = 24;

#[must_use]
pub fn warning_cooldown() -> Duration {
    Duration::hours(WARNING_COOLDOWN_HOURS)
}

/// Whether a member may be warned (or removed after the final warning) at `now`.
/// A missing or unparsable last-warned timestamp counts as never warned.
#[must_use]
pub fn can_warn(member: &MemberRecord, now: DateTime<Utc>) -> bool {
    member
        .last_warned()
        .is_none_or(|last| now - last >= warning_cooldown())
}

/// How below-threshold members are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnforcementMode {
    /// Warn with cooldowns, remove after the final warning
    Graduated,
    /// Remove immediately regardless of warning history
    ForceKick,
}

/// Outcome of a single evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnforcementOutcome {
    /// No action needed, or removal was not possible
    None,
    Warned,
    Kicked,
    /// Below threshold but warned too recently
    Cooldown,
}

impl fmt::Display for EnforcementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Warned => write!(f, "warned"),
            Self::Kicked => write!(f, "kicked"),
            Self::Cooldown => write!(f, "cooldown"),
        }
    }
}

/// The enforcement engine
pub struct BalancePolicy {
    store: Arc<dyn MemberStore>,
    transport: Arc<dyn GroupTransport>,
    translator: Translator,
    lang: String,
    /// Serializes reload-decide-write per member across the timer and manual paths.
    /// An entry lives only while some evaluation holds or waits on it.
    member_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl BalancePolicy {
    pub fn new(
        store: Arc<dyn MemberStore>,
        transport: Arc<dyn GroupTransport>,
        translator: Translator,
        lang: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            translator,
            lang: lang.into(),
            member_locks: DashMap::new(),
        }
    }

    /// Reload a member from the store and evaluate it while holding that member's lock.
    ///
    /// Returns `Ok(None)` when the member no longer exists or was already
    /// removed by a concurrent pass.
    ///
    /// # Errors
    ///
    /// Returns an `EnforcementError` if the store or the removal call fails.
    pub async fn enforce_member(
        &self,
        user_id: u64,
        threshold: f64,
        mode: EnforcementMode,
        now: DateTime<Utc>,
    ) -> EnforcementResult<Option<EnforcementOutcome>> {
        let lock = self.member_locks.entry(user_id).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.reload_and_evaluate(user_id, threshold, mode, now).await
        };

        drop(lock);
        self.member_locks
            .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn reload_and_evaluate(
        &self,
        user_id: u64,
        threshold: f64,
        mode: EnforcementMode,
        now: DateTime<Utc>,
    ) -> EnforcementResult<Option<EnforcementOutcome>> {
        let Some(member) = self.store.user(user_id).await? else {
            return Ok(None);
        };
        if !member.joined {
            return Ok(None);
        }

        self.evaluate(&member, threshold, mode, now).await.map(Some)
    }

    /// Decide and apply the next action for `member`.
    ///
    /// Member notifications are best effort: a failed message is logged and
    /// the already persisted warning or removal stands.
    ///
    /// # Errors
    ///
    /// Returns an `EnforcementError` if a store mutation or the removal call fails.
    pub async fn evaluate(
        &self,
        member: &MemberRecord,
        threshold: f64,
        mode: EnforcementMode,
        now: DateTime<Utc>,
    ) -> EnforcementResult<EnforcementOutcome> {
        let balance = member.total_balance();

        if balance >= threshold {
            if member.has_warning_history() {
                self.store.reset_warnings(member.user_id).await?;
                info!(
                    target: ENFORCEMENT_TARGET,
                    user_id = member.user_id,
                    balance,
                    threshold,
                    event = "warnings_reset",
                    "Member recovered balance, warnings cleared"
                );
            }
            return Ok(EnforcementOutcome::None);
        }

        if mode == EnforcementMode::ForceKick {
            return self.remove(member, now).await;
        }

        let eligible = can_warn(member, now);

        if member.warn_count >= MAX_WARNINGS {
            if !eligible {
                return Ok(EnforcementOutcome::Cooldown);
            }
            return self.remove(member, now).await;
        }

        if !eligible {
            return Ok(EnforcementOutcome::Cooldown);
        }

        self.warn(member, balance, threshold, now).await
    }

    async fn warn(
        &self,
        member: &MemberRecord,
        balance: f64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> EnforcementResult<EnforcementOutcome> {
        let ordinal = member.warn_count + 1;
        self.store.mark_warned(member.user_id, now).await?;

        info!(
            target: ENFORCEMENT_TARGET,
            user_id = member.user_id,
            warning = ordinal,
            balance,
            threshold,
            event = "warned",
            "Member warned for low balance"
        );

        let text = self.translator.translate(
            &self.lang,
            MessageKey::WarningBelowThreshold,
            &[&ordinal, &threshold, &balance],
        );
        self.notify_member(member.user_id, &text).await;

        Ok(EnforcementOutcome::Warned)
    }

    async fn remove(
        &self,
        member: &MemberRecord,
        now: DateTime<Utc>,
    ) -> EnforcementResult<EnforcementOutcome> {
        if !self.transport.remove_member(member.user_id).await? {
            info!(
                target: ENFORCEMENT_TARGET,
                user_id = member.user_id,
                event = "removal_skipped",
                "Member could not be removed"
            );
            return Ok(EnforcementOutcome::None);
        }

        self.store.mark_kicked(member.user_id, now).await?;

        info!(
            target: ENFORCEMENT_TARGET,
            user_id = member.user_id,
            warnings = member.warn_count,
            balance = member.total_balance(),
            event = "kicked",
            "Member removed for low balance"
        );

        let text = self
            .translator
            .translate(&self.lang, MessageKey::KickedDueToBalance, &[]);
        self.notify_member(member.user_id, &text).await;

        Ok(EnforcementOutcome::Kicked)
    }

    async fn notify_member(&self, user_id: u64, text: &str) {
        if let Err(e) = self.transport.send_message(user_id, text).await {
            warn!(
                target: ENFORCEMENT_TARGET,
                user_id,
                error = %e,
                "Could not notify member"
            );
        }
    }
}

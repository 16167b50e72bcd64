//! Periodic balance synchronization
//!
//! Each cycle refreshes stored balances from the external source, runs the
//! graduated enforcement pass over every tracked member and checks the
//! inactivity watchdog. Failures are contained to the smallest unit of work
//! (a page, a record, a member) and the loop itself never stops.

mod watchdog;

pub use watchdog::InactivityWatchdog;

use crate::SYNC_TARGET;
use crate::balance_source::{BalanceRecord, BalanceSource, PAGE_SIZE};
use crate::enforcement::{BalancePolicy, EnforcementMode, EnforcementOutcome};
use crate::error::StoreResult;
use crate::i18n::{MessageKey, Translator};
use crate::notify::AdminNotifier;
use crate::store::{BalanceUpdate, MemberStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Offsets above this are never requested, whatever the source keeps returning
pub const MAX_OFFSET: usize = 10_000;

/// Why the balance refresh stopped paging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A page came back with fewer than `PAGE_SIZE` records
    ShortPage,
    /// The offset passed `MAX_OFFSET`
    OffsetCap,
    /// The source failed; enforcement still runs on stored balances
    FetchError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub pages: usize,
    pub records_applied: usize,
    /// Records for accounts that are not group members
    pub records_skipped: usize,
    pub record_failures: usize,
    pub stop: StopReason,
}

/// Tally of one graduated enforcement pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnforcementPass {
    pub evaluated: usize,
    pub warned: usize,
    pub kicked: usize,
    pub cooldown: usize,
    /// Members that disappeared between listing and reload
    pub skipped: usize,
    pub failed: usize,
}

impl EnforcementPass {
    fn record(&mut self, outcome: Option<EnforcementOutcome>) {
        match outcome {
            None => self.skipped += 1,
            Some(outcome) => {
                self.evaluated += 1;
                match outcome {
                    EnforcementOutcome::Warned => self.warned += 1,
                    EnforcementOutcome::Kicked => self.kicked += 1,
                    EnforcementOutcome::Cooldown => self.cooldown += 1,
                    EnforcementOutcome::None => {}
                }
            }
        }
    }
}

/// Everything one cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub refresh: RefreshReport,
    /// `None` when the pass could not start (member list or threshold unavailable)
    pub enforcement: Option<EnforcementPass>,
    pub watchdog_alerted: bool,
}

/// Latest cycle report, shared with the status command
pub type SharedCycleReport = Arc<RwLock<Option<CycleReport>>>;

fn parse_record(record: &BalanceRecord) -> Result<BalanceUpdate, &'static str> {
    let user_id = record.parsed_member_id().ok_or("member id is not numeric")?;
    let (currency_amount, contract_amount) = record
        .parsed_amounts()
        .ok_or("amount is not a finite number")?;
    Ok(BalanceUpdate {
        user_id,
        currency_amount,
        contract_amount,
    })
}

/// The synchronization loop
pub struct BalanceSync {
    store: Arc<dyn MemberStore>,
    source: Arc<dyn BalanceSource>,
    policy: Arc<BalancePolicy>,
    notifier: Arc<AdminNotifier>,
    translator: Translator,
    lang: String,
    watchdog: InactivityWatchdog,
    interval: std::time::Duration,
    last_report: SharedCycleReport,
}

impl BalanceSync {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn MemberStore>,
        source: Arc<dyn BalanceSource>,
        policy: Arc<BalancePolicy>,
        notifier: Arc<AdminNotifier>,
        translator: Translator,
        lang: impl Into<String>,
        watchdog: InactivityWatchdog,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            source,
            policy,
            notifier,
            translator,
            lang: lang.into(),
            watchdog,
            interval,
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    /// Publish cycle reports into `shared` instead of a private slot
    #[must_use]
    pub fn with_report_slot(mut self, shared: SharedCycleReport) -> Self {
        self.last_report = shared;
        self
    }

    #[must_use]
    pub fn watchdog(&self) -> &InactivityWatchdog {
        &self.watchdog
    }

    /// Run on a background task: one cycle immediately, then one per interval
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run forever. A tick that fires while a cycle is still running waits for it.
    pub async fn run(mut self) {
        info!(
            target: SYNC_TARGET,
            "Balance sync scheduled every {} minutes",
            self.interval.as_secs() / 60
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let report = self.run_cycle(Utc::now()).await;
            *self.last_report.write().await = Some(report);
        }
    }

    /// One full cycle: refresh, enforce, watchdog
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let id = Uuid::new_v4();
        info!(target: SYNC_TARGET, cycle = %id, "Syncing balances...");

        let refresh = self.refresh_balances().await;

        let enforcement = match self.enforce_all(now).await {
            Ok(pass) => Some(pass),
            Err(e) => {
                error!(target: SYNC_TARGET, cycle = %id, error = %e, "Error syncing balances");
                None
            }
        };

        let watchdog_alerted = self.check_inactivity(now).await;

        info!(
            target: SYNC_TARGET,
            cycle = %id,
            pages = refresh.pages,
            records = refresh.records_applied,
            skipped = refresh.records_skipped,
            record_failures = refresh.record_failures,
            stop = ?refresh.stop,
            warned = enforcement.map_or(0, |p| p.warned),
            kicked = enforcement.map_or(0, |p| p.kicked),
            failed = enforcement.map_or(0, |p| p.failed),
            watchdog_alerted,
            event = "cycle_completed",
            "Balance sync completed"
        );

        CycleReport {
            id,
            started_at: now,
            refresh,
            enforcement,
            watchdog_alerted,
        }
    }

    /// Page through the source and store every balance it reports
    pub async fn refresh_balances(&self) -> RefreshReport {
        let mut report = RefreshReport {
            pages: 0,
            records_applied: 0,
            records_skipped: 0,
            record_failures: 0,
            stop: StopReason::OffsetCap,
        };
        let mut offset = 0;

        while offset <= MAX_OFFSET {
            let page = match self.source.fetch_balances(offset).await {
                Ok(page) => page,
                Err(e) => {
                    error!(target: SYNC_TARGET, offset, error = %e, "Balance fetch failed");
                    report.stop = StopReason::FetchError;
                    return report;
                }
            };
            report.pages += 1;

            if page.data.is_empty() {
                info!(target: SYNC_TARGET, offset, "No data returned");
            }

            let mut updates = Vec::with_capacity(page.data.len());
            for record in &page.data {
                match parse_record(record) {
                    Ok(update) => updates.push(update),
                    Err(reason) => {
                        report.record_failures += 1;
                        warn!(
                            target: SYNC_TARGET,
                            member_id = %record.member_id,
                            error = reason,
                            "Error updating balance"
                        );
                    }
                }
            }

            if !updates.is_empty() {
                match self.store.update_balances(&updates).await {
                    Ok(applied) => {
                        report.records_applied += applied;
                        report.records_skipped += updates.len() - applied;
                    }
                    Err(e) => {
                        report.record_failures += updates.len();
                        error!(
                            target: SYNC_TARGET,
                            offset,
                            records = updates.len(),
                            error = %e,
                            "Error storing balance page"
                        );
                    }
                }
            }

            offset += PAGE_SIZE;
            if page.data.len() < PAGE_SIZE {
                report.stop = StopReason::ShortPage;
                return report;
            }
        }

        warn!(target: SYNC_TARGET, offset, "Stopped paging at the offset limit");
        report
    }

    /// Graduated enforcement over every tracked member
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the member list or the threshold cannot be loaded.
    pub async fn enforce_all(&self, now: DateTime<Utc>) -> StoreResult<EnforcementPass> {
        let users = self.store.joined_users().await?;
        let threshold = self.store.threshold().await?;
        let mut pass = EnforcementPass::default();

        for user in &users {
            match self
                .policy
                .enforce_member(user.user_id, threshold, EnforcementMode::Graduated, now)
                .await
            {
                Ok(outcome) => {
                    if outcome == Some(EnforcementOutcome::Kicked) {
                        info!(
                            target: SYNC_TARGET,
                            user_id = user.user_id,
                            "User removed after warning window"
                        );
                    }
                    pass.record(outcome);
                }
                Err(e) => {
                    pass.failed += 1;
                    error!(
                        target: SYNC_TARGET,
                        user_id = user.user_id,
                        error = %e,
                        "Error checking user"
                    );
                }
            }
        }

        Ok(pass)
    }

    /// Alert admins if the group has been without joins for a whole window
    async fn check_inactivity(&mut self, now: DateTime<Utc>) -> bool {
        let last_joined_at = match self.store.last_joined_at().await {
            Ok(at) => at,
            Err(e) => {
                warn!(target: SYNC_TARGET, error = %e, "Could not read last join time");
                return false;
            }
        };

        if !self.watchdog.should_alert(last_joined_at, now) {
            return false;
        }

        let hours = self.watchdog.window().num_hours();
        let text = self
            .translator
            .translate(&self.lang, MessageKey::NoRecentJoins, &[&hours]);
        let report = self.notifier.notify(&text).await;
        self.watchdog.record_alert(now);

        info!(
            target: SYNC_TARGET,
            hours,
            delivered = report.delivered,
            event = "inactivity_alert",
            "No recent joins, admins alerted"
        );
        true
    }
}

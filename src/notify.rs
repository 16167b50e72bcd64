//! Admin notification fan-out

use crate::EVENT_TARGET;
use crate::store::MemberStore;
use crate::transport::GroupTransport;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Delivery tally for one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Broadcasts operational alerts to every administrator
pub struct AdminNotifier {
    static_ids: Vec<u64>,
    store: Arc<dyn MemberStore>,
    transport: Arc<dyn GroupTransport>,
}

impl AdminNotifier {
    pub fn new(
        static_ids: Vec<u64>,
        store: Arc<dyn MemberStore>,
        transport: Arc<dyn GroupTransport>,
    ) -> Self {
        Self {
            static_ids,
            store,
            transport,
        }
    }

    /// Configured admins merged with stored admins, deduplicated.
    /// Recomputed on every call so newly stored admins are picked up immediately.
    pub async fn recipients(&self) -> BTreeSet<u64> {
        let mut ids: BTreeSet<u64> = self.static_ids.iter().copied().collect();

        match self.store.admin_ids().await {
            Ok(stored) => ids.extend(stored),
            Err(e) => error!(target: EVENT_TARGET, error = %e, "Error loading admin IDs"),
        }

        ids
    }

    pub async fn is_admin(&self, user_id: u64) -> bool {
        self.recipients().await.contains(&user_id)
    }

    /// Send `text` to every admin. Each delivery is independent and never retried.
    pub async fn notify(&self, text: &str) -> NotifyReport {
        let mut report = NotifyReport::default();

        for admin_id in self.recipients().await {
            match self.transport.send_message(admin_id, text).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        target: EVENT_TARGET,
                        admin_id,
                        error = %e,
                        "Could not notify admin"
                    );
                }
            }
        }

        info!(
            target: EVENT_TARGET,
            delivered = report.delivered,
            failed = report.failed,
            event = "admin_broadcast",
            "Admin notification sent"
        );

        report
    }
}

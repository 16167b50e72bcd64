//! Membership changes concerning the bot itself

use crate::EVENT_TARGET;
use crate::i18n::{MessageKey, Translator};
use crate::notify::{AdminNotifier, NotifyReport};
use tracing::info;

/// The bot's standing in a group after a membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Member,
    Administrator,
    Left,
    Kicked,
    /// Still present but unable to act
    Restricted,
}

impl MemberStatus {
    /// Whether the bot can no longer enforce anything in the group
    #[must_use]
    pub fn is_deactivated(self) -> bool {
        matches!(self, Self::Left | Self::Kicked | Self::Restricted)
    }
}

/// A change of the bot's own membership in some group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipChange {
    pub group_id: u64,
    pub status: MemberStatus,
}

/// Alert admins when the bot loses its standing in the enforced group.
///
/// Returns the broadcast report, or `None` when the change needs no alert.
pub async fn on_bot_status_change(
    change: MembershipChange,
    group_id: u64,
    notifier: &AdminNotifier,
    translator: &Translator,
    lang: &str,
) -> Option<NotifyReport> {
    if change.group_id != group_id || !change.status.is_deactivated() {
        return None;
    }

    info!(
        target: EVENT_TARGET,
        group_id,
        status = ?change.status,
        event = "bot_deactivated",
        "Bot lost access to the group"
    );

    let text = translator.translate(lang, MessageKey::BotDeactivatedWarning, &[]);
    Some(notifier.notify(&text).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockMemberStore;
    use crate::transport::MockGroupTransport;
    use std::sync::Arc;

    fn notifier(expected_messages: usize) -> AdminNotifier {
        let mut store = MockMemberStore::new();
        store.expect_admin_ids().returning(|| Ok(vec![]));
        let mut transport = MockGroupTransport::new();
        transport
            .expect_send_message()
            .withf(|_, text| text.contains("lost access"))
            .times(expected_messages)
            .returning(|_, _| Ok(()));
        AdminNotifier::new(vec![1, 2], Arc::new(store), Arc::new(transport))
    }

    #[tokio::test]
    async fn test_deactivation_in_group_alerts_admins() {
        let notifier = notifier(2);
        let change = MembershipChange {
            group_id: 77,
            status: MemberStatus::Kicked,
        };
        let report = on_bot_status_change(change, 77, &notifier, &Translator::new(), "en").await;
        assert_eq!(report.map(|r| r.delivered), Some(2));
    }

    #[tokio::test]
    async fn test_other_group_or_active_status_is_ignored() {
        let notifier = notifier(0);
        let translator = Translator::new();

        let elsewhere = MembershipChange {
            group_id: 5,
            status: MemberStatus::Left,
        };
        assert!(on_bot_status_change(elsewhere, 77, &notifier, &translator, "en").await.is_none());

        let promoted = MembershipChange {
            group_id: 77,
            status: MemberStatus::Administrator,
        };
        assert!(on_bot_status_change(promoted, 77, &notifier, &translator, "en").await.is_none());
    }

    #[test]
    fn test_deactivated_statuses() {
        assert!(MemberStatus::Left.is_deactivated());
        assert!(MemberStatus::Kicked.is_deactivated());
        assert!(MemberStatus::Restricted.is_deactivated());
        assert!(!MemberStatus::Member.is_deactivated());
        assert!(!MemberStatus::Administrator.is_deactivated());
    }
}

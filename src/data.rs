use std::{ops::Deref, sync::Arc};

use crate::balance_source::BalanceSource;
use crate::config::Config;
use crate::enforcement::BalancePolicy;
use crate::i18n::Translator;
use crate::notify::AdminNotifier;
use crate::store::MemberStore;
use crate::sync::{BalanceSync, InactivityWatchdog, SharedCycleReport};
use crate::transport::GroupTransport;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("group_id", &self.config.group_id)
            .field("admin_ids", &self.config.admin_ids)
            .field("lang", &self.config.default_lang)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Wire the collaborators together
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<dyn MemberStore>,
        transport: Arc<dyn GroupTransport>,
        source: Arc<dyn BalanceSource>,
    ) -> Self {
        let translator = Translator::new();
        let policy = Arc::new(BalancePolicy::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            translator.clone(),
            config.default_lang.clone(),
        ));
        let notifier = Arc::new(AdminNotifier::new(
            config.admin_ids.clone(),
            Arc::clone(&store),
            transport,
        ));

        Self(Arc::new(DataInner {
            config,
            store,
            source,
            policy,
            notifier,
            translator,
            last_cycle: Arc::new(RwLock::new(None)),
            started_at: Utc::now(),
        }))
    }

    /// Build the sync loop sharing this data's store, engine and report slot
    #[must_use]
    pub fn balance_sync(&self) -> BalanceSync {
        BalanceSync::new(
            Arc::clone(&self.store),
            Arc::clone(&self.source),
            Arc::clone(&self.policy),
            Arc::clone(&self.notifier),
            self.translator.clone(),
            self.config.default_lang.clone(),
            InactivityWatchdog::new(self.config.inactivity_window(), self.started_at),
            self.config.sync_interval(),
        )
        .with_report_slot(Arc::clone(&self.last_cycle))
    }

    /// Render a message in the configured language
    #[must_use]
    pub fn text(&self, key: crate::i18n::MessageKey, args: &[&dyn std::fmt::Display]) -> String {
        self.translator.translate(&self.config.default_lang, key, args)
    }
}

/// Shared state behind `Data`
pub struct DataInner {
    pub config: Config,
    pub store: Arc<dyn MemberStore>,
    pub source: Arc<dyn BalanceSource>,
    pub policy: Arc<BalancePolicy>,
    pub notifier: Arc<AdminNotifier>,
    pub translator: Translator,
    /// Report of the most recent sync cycle
    pub last_cycle: SharedCycleReport,
    pub started_at: DateTime<Utc>,
}

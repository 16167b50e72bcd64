//! Member store
//!
//! This module defines the member record, the store contract used by the
//! enforcement engine and sync loop, and a YAML-backed implementation.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;

const MEMBERS_FILE: &str = "members.yaml";
const SETTINGS_FILE: &str = "settings.yaml";

/// One tracked member of the group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub user_id: u64,
    #[serde(default)]
    pub currency_amount: f64,
    #[serde(default)]
    pub contract_amount: f64,
    #[serde(default)]
    pub warn_count: u32,
    /// RFC3339 timestamp of the last warning
    #[serde(default)]
    pub last_warned_at: Option<String>,
    /// Whether the member is currently tracked as part of the group
    #[serde(default)]
    pub joined: bool,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub kicked: bool,
    #[serde(default)]
    pub kicked_at: Option<DateTime<Utc>>,
}

impl MemberRecord {
    /// Create a freshly joined member with no balance or warning history
    #[must_use]
    pub fn joined(user_id: u64, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            currency_amount: 0.0,
            contract_amount: 0.0,
            warn_count: 0,
            last_warned_at: None,
            joined: true,
            joined_at: Some(joined_at),
            kicked: false,
            kicked_at: None,
        }
    }

    /// Aggregate balance used for threshold comparisons
    #[must_use]
    pub fn total_balance(&self) -> f64 {
        self.currency_amount + self.contract_amount
    }

    /// Parsed last warning instant; `None` if never warned or unparsable
    #[must_use]
    pub fn last_warned(&self) -> Option<DateTime<Utc>> {
        self.last_warned_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    #[must_use]
    pub fn has_warning_history(&self) -> bool {
        self.warn_count > 0 || self.last_warned_at.is_some()
    }
}

/// One balance reading for a member
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceUpdate {
    pub user_id: u64,
    pub currency_amount: f64,
    pub contract_amount: f64,
}

/// Process-wide settings persisted alongside members
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub admin_ids: Vec<u64>,
    #[serde(default)]
    pub last_joined_at: Option<DateTime<Utc>>,
}

/// Persistent store consumed by the enforcement engine and the sync loop.
///
/// Every mutation touching warning state is applied to a single member
/// record at once, so the warning count and its timestamp never diverge.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// All members currently tracked as part of the group
    async fn joined_users(&self) -> StoreResult<Vec<MemberRecord>>;

    async fn threshold(&self) -> StoreResult<f64>;

    async fn set_threshold(&self, threshold: f64) -> StoreResult<()>;

    async fn user(&self, user_id: u64) -> StoreResult<Option<MemberRecord>>;

    /// Replace both balance components of every known member in `updates`.
    ///
    /// Ids the store has never seen are skipped. Returns how many members
    /// were updated.
    async fn update_balances(&self, updates: &[BalanceUpdate]) -> StoreResult<usize>;

    /// Increment the warning count and stamp the warning time together
    async fn mark_warned(&self, user_id: u64, at: DateTime<Utc>) -> StoreResult<()>;

    /// Record a removal and stop tracking the member
    async fn mark_kicked(&self, user_id: u64, at: DateTime<Utc>) -> StoreResult<()>;

    /// Clear the warning count and timestamp together
    async fn reset_warnings(&self, user_id: u64) -> StoreResult<()>;

    async fn admin_ids(&self) -> StoreResult<Vec<u64>>;

    /// Add an administrator to the stored list; adding a known admin is a no-op
    async fn add_admin(&self, user_id: u64) -> StoreResult<()>;

    async fn last_joined_at(&self) -> StoreResult<Option<DateTime<Utc>>>;

    /// Track a member who joined the group.
    /// A member coming back after a removal starts without warnings.
    async fn record_join(&self, user_id: u64, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Store keeping members in memory and writing them back as YAML
pub struct YamlMemberStore {
    members: DashMap<u64, MemberRecord>,
    settings: RwLock<StoreSettings>,
    default_threshold: f64,
    /// Directory holding the data files; `None` keeps everything in memory
    dir: Option<PathBuf>,
    /// Held from snapshot to rename so an older snapshot never lands last
    members_file: Mutex<()>,
    settings_file: Mutex<()>,
}

impl YamlMemberStore {
    /// Create a store that never touches disk
    #[must_use]
    pub fn in_memory(default_threshold: f64) -> Self {
        Self {
            members: DashMap::new(),
            settings: RwLock::new(StoreSettings::default()),
            default_threshold,
            dir: None,
            members_file: Mutex::new(()),
            settings_file: Mutex::new(()),
        }
    }

    /// Load the store from a data directory
    ///
    /// Missing files yield an empty store. Files that exist but do not parse
    /// are reported as errors so a corrupt store is never silently overwritten.
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if a data file cannot be read or parsed.
    pub async fn load(dir: impl AsRef<Path>, default_threshold: f64) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let store = Self {
            dir: Some(dir.clone()),
            ..Self::in_memory(default_threshold)
        };

        if let Some(content) = read_optional(&dir.join(MEMBERS_FILE)).await? {
            let members: Vec<MemberRecord> = serde_yaml::from_str(&content)?;
            for member in members {
                store.members.insert(member.user_id, member);
            }
        }

        if let Some(content) = read_optional(&dir.join(SETTINGS_FILE)).await? {
            let settings: StoreSettings = serde_yaml::from_str(&content)?;
            *write_lock(&store.settings) = settings;
        }

        Ok(store)
    }

    #[cfg(test)]
    pub(crate) fn insert(&self, member: MemberRecord) {
        self.members.insert(member.user_id, member);
    }

    async fn save_members(&self) -> StoreResult<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let _writing = self.members_file.lock().await;
        let mut members: Vec<MemberRecord> = self
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        members.sort_by_key(|m| m.user_id);

        let yaml = serde_yaml::to_string(&members)?;
        write_file(dir, MEMBERS_FILE, yaml).await
    }

    async fn save_settings(&self) -> StoreResult<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let _writing = self.settings_file.lock().await;
        let yaml = serde_yaml::to_string(&*read_lock(&self.settings))?;
        write_file(dir, SETTINGS_FILE, yaml).await
    }

    /// Apply a mutation to an existing member, then persist
    async fn mutate<F>(&self, user_id: u64, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut MemberRecord),
    {
        {
            let mut member = self
                .members
                .get_mut(&user_id)
                .ok_or(StoreError::NotFound(user_id))?;
            apply(member.value_mut());
        }
        self.save_members().await
    }
}

async fn read_optional(path: &Path) -> StoreResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temporary file so a crash never leaves a half-written store
async fn write_file(dir: &Path, name: &str, content: String) -> StoreResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    let tmp = dir.join(format!("{name}.tmp"));
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, dir.join(name)).await?;
    Ok(())
}

// A poisoned lock only means another writer panicked; the settings themselves stay usable.
fn read_lock(lock: &RwLock<StoreSettings>) -> std::sync::RwLockReadGuard<'_, StoreSettings> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock(lock: &RwLock<StoreSettings>) -> std::sync::RwLockWriteGuard<'_, StoreSettings> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl MemberStore for YamlMemberStore {
    async fn joined_users(&self) -> StoreResult<Vec<MemberRecord>> {
        let mut users: Vec<MemberRecord> = self
            .members
            .iter()
            .filter(|entry| entry.value().joined)
            .map(|entry| entry.value().clone())
            .collect();
        users.sort_by_key(|m| m.user_id);
        Ok(users)
    }

    async fn threshold(&self) -> StoreResult<f64> {
        Ok(read_lock(&self.settings)
            .threshold
            .unwrap_or(self.default_threshold))
    }

    async fn set_threshold(&self, threshold: f64) -> StoreResult<()> {
        write_lock(&self.settings).threshold = Some(threshold);
        self.save_settings().await
    }

    async fn user(&self, user_id: u64) -> StoreResult<Option<MemberRecord>> {
        Ok(self.members.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn update_balances(&self, updates: &[BalanceUpdate]) -> StoreResult<usize> {
        let mut applied = 0;
        for update in updates {
            if let Some(mut member) = self.members.get_mut(&update.user_id) {
                member.currency_amount = update.currency_amount;
                member.contract_amount = update.contract_amount;
                applied += 1;
            }
        }
        if applied > 0 {
            self.save_members().await?;
        }
        Ok(applied)
    }

    async fn mark_warned(&self, user_id: u64, at: DateTime<Utc>) -> StoreResult<()> {
        self.mutate(user_id, |member| {
            member.warn_count = member.warn_count.saturating_add(1);
            member.last_warned_at = Some(at.to_rfc3339());
        })
        .await
    }

    async fn mark_kicked(&self, user_id: u64, at: DateTime<Utc>) -> StoreResult<()> {
        self.mutate(user_id, |member| {
            member.kicked = true;
            member.kicked_at = Some(at);
            member.joined = false;
        })
        .await
    }

    async fn reset_warnings(&self, user_id: u64) -> StoreResult<()> {
        self.mutate(user_id, |member| {
            member.warn_count = 0;
            member.last_warned_at = None;
        })
        .await
    }

    async fn admin_ids(&self) -> StoreResult<Vec<u64>> {
        Ok(read_lock(&self.settings).admin_ids.clone())
    }

    async fn add_admin(&self, user_id: u64) -> StoreResult<()> {
        {
            let mut settings = write_lock(&self.settings);
            if !settings.admin_ids.contains(&user_id) {
                settings.admin_ids.push(user_id);
            }
        }
        self.save_settings().await
    }

    async fn last_joined_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(read_lock(&self.settings).last_joined_at)
    }

    async fn record_join(&self, user_id: u64, at: DateTime<Utc>) -> StoreResult<()> {
        {
            let mut member = self
                .members
                .entry(user_id)
                .or_insert_with(|| MemberRecord::joined(user_id, at));
            if member.kicked {
                member.kicked = false;
                member.kicked_at = None;
                member.warn_count = 0;
                member.last_warned_at = None;
            }
            member.joined = true;
            member.joined_at = Some(at);
        }
        write_lock(&self.settings).last_joined_at = Some(at);
        self.save_members().await?;
        self.save_settings().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_record_join_tracks_member() {
        let store = YamlMemberStore::in_memory(10.0);
        let now = Utc::now();
        store.record_join(1, now).await.unwrap();

        let users = store.joined_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, 1);
        assert_eq!(store.last_joined_at().await.unwrap(), Some(now));
    }

    fn balance(user_id: u64, currency_amount: f64, contract_amount: f64) -> BalanceUpdate {
        BalanceUpdate {
            user_id,
            currency_amount,
            contract_amount,
        }
    }

    #[tokio::test]
    async fn test_balances_apply_to_known_members_only() {
        let store = YamlMemberStore::in_memory(10.0);
        store.record_join(5, Utc::now()).await.unwrap();

        let applied = store
            .update_balances(&[balance(5, 3.0, 4.0), balance(6, 100.0, 0.0)])
            .await
            .unwrap();

        assert_eq!(applied, 1);
        let member = store.user(5).await.unwrap().expect("member");
        assert!((member.total_balance() - 7.0).abs() < f64::EPSILON);
        assert!(store.user(6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejoin_after_removal_clears_warnings() {
        let store = YamlMemberStore::in_memory(10.0);
        let now = Utc::now();
        store.record_join(1, now).await.unwrap();
        for hours in [0, 25, 50] {
            store.mark_warned(1, now + Duration::hours(hours)).await.unwrap();
        }
        store.mark_kicked(1, now + Duration::hours(75)).await.unwrap();

        let back = now + Duration::days(5);
        store.record_join(1, back).await.unwrap();

        let member = store.user(1).await.unwrap().unwrap();
        assert!(member.joined);
        assert!(!member.kicked);
        assert_eq!(member.kicked_at, None);
        assert_eq!(member.warn_count, 0);
        assert!(member.last_warned_at.is_none());
        assert_eq!(member.joined_at, Some(back));
    }

    #[tokio::test]
    async fn test_repeated_join_keeps_warnings_of_present_member() {
        let store = YamlMemberStore::in_memory(10.0);
        let now = Utc::now();
        store.record_join(1, now).await.unwrap();
        store.mark_warned(1, now).await.unwrap();
        store.record_join(1, now + Duration::hours(1)).await.unwrap();

        assert_eq!(store.user(1).await.unwrap().unwrap().warn_count, 1);
    }

    #[tokio::test]
    async fn test_warning_state_moves_together() {
        let store = YamlMemberStore::in_memory(10.0);
        let now = Utc::now();
        store.record_join(1, now).await.unwrap();

        store.mark_warned(1, now).await.unwrap();
        store.mark_warned(1, now + Duration::hours(25)).await.unwrap();
        let member = store.user(1).await.unwrap().unwrap();
        assert_eq!(member.warn_count, 2);
        assert_eq!(member.last_warned(), Some(now + Duration::hours(25)));

        store.reset_warnings(1).await.unwrap();
        let member = store.user(1).await.unwrap().unwrap();
        assert_eq!(member.warn_count, 0);
        assert!(member.last_warned_at.is_none());
    }

    #[tokio::test]
    async fn test_mark_kicked_retires_member() {
        let store = YamlMemberStore::in_memory(10.0);
        let now = Utc::now();
        store.record_join(1, now).await.unwrap();
        store.mark_kicked(1, now).await.unwrap();

        assert!(store.joined_users().await.unwrap().is_empty());
        let member = store.user(1).await.unwrap().unwrap();
        assert!(member.kicked);
        assert_eq!(member.kicked_at, Some(now));
    }

    #[tokio::test]
    async fn test_mutating_unknown_member_fails() {
        let store = YamlMemberStore::in_memory(10.0);
        let err = store.mark_warned(99, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(99)));
    }

    #[tokio::test]
    async fn test_threshold_defaults_then_overrides() {
        let store = YamlMemberStore::in_memory(25.0);
        assert!((store.threshold().await.unwrap() - 25.0).abs() < f64::EPSILON);
        store.set_threshold(-5.0).await.unwrap();
        assert!((store.threshold().await.unwrap() + 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unparsable_last_warned_is_never_warned() {
        let mut member = MemberRecord::joined(1, Utc::now());
        member.last_warned_at = Some("yesterday-ish".to_string());
        assert!(member.last_warned().is_none());
        assert!(member.has_warning_history());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("balance-warden-{}", uuid::Uuid::new_v4()));
        let now = Utc::now();
        {
            let store = YamlMemberStore::load(&dir, 1.0).await.unwrap();
            store.record_join(7, now).await.unwrap();
            store.update_balances(&[balance(7, 12.5, 0.5)]).await.unwrap();
            store.set_threshold(50.0).await.unwrap();
            store.add_admin(3).await.unwrap();
        }

        let store = YamlMemberStore::load(&dir, 1.0).await.unwrap();
        let member = store.user(7).await.unwrap().expect("member");
        assert!((member.total_balance() - 13.0).abs() < f64::EPSILON);
        assert!(member.joined);
        assert!((store.threshold().await.unwrap() - 50.0).abs() < f64::EPSILON);
        assert_eq!(store.admin_ids().await.unwrap(), vec![3]);
        assert!(store.last_joined_at().await.unwrap().is_some());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_keep_latest_state_on_disk() {
        let dir = std::env::temp_dir().join(format!("balance-warden-{}", uuid::Uuid::new_v4()));
        let now = Utc::now();
        let store = std::sync::Arc::new(YamlMemberStore::load(&dir, 1.0).await.unwrap());

        let tasks: Vec<_> = (1..=20u64)
            .map(|user_id| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move {
                    store.record_join(user_id, now).await.unwrap();
                    store.mark_warned(user_id, now).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let reloaded = YamlMemberStore::load(&dir, 1.0).await.unwrap();
        let users = reloaded.joined_users().await.unwrap();
        assert_eq!(users.len(), 20);
        assert!(users.iter().all(|m| m.warn_count == 1));
        assert!(!dir.join(format!("{MEMBERS_FILE}.tmp")).exists());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}

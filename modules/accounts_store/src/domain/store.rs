//! Account store - owns accounts, persists them and publishes change events
//!
//! Locking: a coarse lock over the id -> account map, a lock per account over
//! its data, and a per-account async mutex serializing commit/delete. Sync
//! locks are never held across an `.await`.
//!
//! Ids are never handed out twice: the next id is persisted through the storage
//! collaborator before an account's first record is written, and `open` resumes
//! from the larger of that sequence and the highest stored id.

use super::account::{Account, AccountData, AccountEntry};
use super::events::{AccountEvent, Notifier, Subscription, SubscriptionFilter};
use super::providers::ProviderRegistry;
use super::repository::AccountStorage;
use super::resolution::ApplicationOverrides;
use super::validation::{validate_key, validate_name};
use crate::config::Config;
use crate::contract::{AccountFilter, AccountId, AccountState, AccountsError, Result, SettingValue};
use crate::infra::storage::mapper::AccountRecord;
use crate::infra::storage::{FileStorage, InMemoryStorage};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// State shared between the store and every handle it gave out
pub(crate) struct StoreShared {
    pub(crate) config: Config,
    storage: Arc<dyn AccountStorage>,
    pub(crate) providers: Arc<ProviderRegistry>,
    pub(crate) overrides: RwLock<ApplicationOverrides>,
    accounts: RwLock<HashMap<AccountId, Arc<AccountEntry>>>,
    next_id: AtomicU64,
    /// Last sequence value written to storage
    id_sequence: tokio::sync::Mutex<AccountId>,
    notifier: Notifier,
}

/// Run one persistence call under the configured timeout
async fn guarded<T>(
    timeout: Duration,
    operation: &str,
    account_id: Option<AccountId>,
    call: impl Future<Output = anyhow::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(operation, ?account_id, error = %e, "Persistence operation failed");
            Err(AccountsError::persistence(e))
        }
        Err(_) => {
            tracing::warn!(operation, ?account_id, ?timeout, "Persistence operation timed out");
            Err(AccountsError::persistence(anyhow::anyhow!(
                "{} timed out after {:?}",
                operation,
                timeout
            )))
        }
    }
}

impl StoreShared {
    pub(crate) fn validate_key(&self, key: &str) -> Result<()> {
        validate_key(key, self.config.max_key_length)
    }

    async fn persist<T>(
        &self,
        operation: &str,
        account_id: AccountId,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        guarded(self.config.persistence_timeout, operation, Some(account_id), call).await
    }

    /// Make sure the persisted sequence is past every id reserved so far
    async fn persist_id_sequence(&self, account_id: AccountId) -> Result<()> {
        let mut persisted = self.id_sequence.lock().await;
        let next_id = self.next_id.load(Ordering::SeqCst);
        if next_id > *persisted {
            self.persist("save_next_id", account_id, self.storage.save_next_id(next_id))
                .await?;
            *persisted = next_id;
        }
        Ok(())
    }

    /// Write one account; in-memory state is only touched after the save succeeded
    pub(crate) async fn commit_entry(&self, entry: &Arc<AccountEntry>) -> Result<()> {
        let _commit = entry.commit_lock.lock().await;

        let (record, revision, was_new, changed_keys, changed_services) = {
            let data = entry.data.read();
            data.ensure_live(entry.id)?;
            if data.state == AccountState::Saved && !data.is_dirty() {
                return Ok(());
            }
            (
                AccountRecord::from_data(entry.id, &data),
                data.revision,
                data.state == AccountState::Unsaved,
                data.changed_keys.keys().cloned().collect::<Vec<_>>(),
                data.changed_services.keys().cloned().collect::<Vec<_>>(),
            )
        };

        let blob = record.encode()?;
        if was_new {
            self.persist_id_sequence(entry.id).await?;
        }
        self.persist("save", entry.id, self.storage.save(entry.id, &blob))
            .await?;

        // Changes made while the save was in flight stay pending
        entry.data.write().mark_saved(revision);

        let event = if was_new {
            self.accounts.write().insert(entry.id, Arc::clone(entry));
            AccountEvent::created(entry.id, changed_keys, changed_services)
        } else {
            AccountEvent::updated(entry.id, changed_keys, changed_services)
        };
        tracing::debug!(account_id = entry.id, kind = ?event.kind, "Account committed");
        self.notifier.publish(event);
        Ok(())
    }

    pub(crate) async fn delete_entry(&self, entry: &Arc<AccountEntry>) -> Result<()> {
        let _commit = entry.commit_lock.lock().await;

        let state = {
            let data = entry.data.read();
            data.ensure_live(entry.id)?;
            data.state
        };

        if state == AccountState::Saved {
            self.persist("remove", entry.id, self.storage.remove(entry.id))
                .await?;
            self.accounts.write().remove(&entry.id);
        }
        entry.data.write().state = AccountState::Deleted;

        if state == AccountState::Saved {
            tracing::debug!(account_id = entry.id, "Account deleted");
            self.notifier.publish(AccountEvent::deleted(entry.id));
        }
        Ok(())
    }

    fn entry(&self, id: AccountId) -> Option<Arc<AccountEntry>> {
        self.accounts.read().get(&id).cloned()
    }
}

/// Owner of every account in a session
///
/// Build one with `open` (or `from_config`) and tear it down with `shutdown`,
/// which flushes pending writes and drains queued notifications.
pub struct AccountStore {
    shared: Arc<StoreShared>,
}

impl AccountStore {
    /// Load every persisted account and start the notification dispatcher
    pub async fn open(
        config: Config,
        storage: Arc<dyn AccountStorage>,
        providers: ProviderRegistry,
    ) -> Result<Self> {
        providers.validate_keys(config.max_key_length)?;

        let timeout = config.persistence_timeout;
        let mut ids = guarded(timeout, "list", None, storage.list_ids()).await?;
        ids.sort_unstable();

        let mut accounts = HashMap::with_capacity(ids.len());
        for id in &ids {
            let Some(blob) = guarded(timeout, "load", Some(*id), storage.load(*id)).await? else {
                continue;
            };
            let record = AccountRecord::decode(&blob)?;
            if record.id != *id {
                return Err(AccountsError::persistence(anyhow::anyhow!(
                    "record stored under id {} claims id {}",
                    id,
                    record.id
                )));
            }
            let data = record.into_data()?;
            accounts.insert(*id, Arc::new(AccountEntry::new(*id, data)));
        }

        let after_max = match ids.last() {
            Some(max) => max.checked_add(1).ok_or_else(|| {
                AccountsError::persistence(anyhow::anyhow!(
                    "stored account id {} exhausts the id space",
                    max
                ))
            })?,
            None => 1,
        };
        let stored_next = guarded(timeout, "load_next_id", None, storage.load_next_id()).await?;
        let next_id = stored_next.map_or(after_max, |stored| stored.max(after_max));
        tracing::info!(accounts = accounts.len(), next_id, "Account store opened");

        let shared = StoreShared {
            config,
            storage,
            providers: Arc::new(providers),
            overrides: RwLock::new(ApplicationOverrides::default()),
            accounts: RwLock::new(accounts),
            next_id: AtomicU64::new(next_id),
            id_sequence: tokio::sync::Mutex::new(stored_next.unwrap_or(0)),
            notifier: Notifier::start(),
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Open with storage and provider definitions taken from `config`
    ///
    /// Without `storage_dir` the accounts live in memory only.
    pub async fn from_config(config: Config) -> Result<Self> {
        let providers = match &config.providers_file {
            Some(path) => ProviderRegistry::from_file(path)?,
            None => ProviderRegistry::new(),
        };
        let storage: Arc<dyn AccountStorage> = match &config.storage_dir {
            Some(dir) => Arc::new(FileStorage::new(dir.clone())),
            None => Arc::new(InMemoryStorage::new()),
        };
        Self::open(config, storage, providers).await
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.shared.providers
    }

    // ===== Accounts =====

    /// New unsaved account; its id is reserved now and kept on commit
    pub fn create_account(&self, provider: &str) -> Result<Account> {
        validate_name("provider", provider)?;
        let id = self
            .shared
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| AccountsError::validation("account id space exhausted"))?;
        let entry = Arc::new(AccountEntry::new(id, AccountData::new(provider)));
        tracing::debug!(account_id = id, provider, "Account created");
        Ok(Account::new(entry, Arc::clone(&self.shared)))
    }

    /// Committed account with this id, if any
    pub fn get_account(&self, id: AccountId) -> Option<Account> {
        self.shared
            .entry(id)
            .map(|entry| Account::new(entry, Arc::clone(&self.shared)))
    }

    /// Delete a committed account; unknown ids are a no-op
    pub async fn delete_account(&self, id: AccountId) -> Result<()> {
        let Some(entry) = self.shared.entry(id) else {
            return Ok(());
        };
        match self.shared.delete_entry(&entry).await {
            Err(AccountsError::StaleHandle { .. }) => Ok(()),
            other => other,
        }
    }

    /// Committed accounts matching `filter`, ordered by id
    ///
    /// Membership is decided at call time; later edits do not change what the
    /// iterator yields. Handles are built as it advances.
    pub fn list_accounts(&self, filter: AccountFilter) -> impl Iterator<Item = Account> {
        let providers = &self.shared.providers;
        let mut snapshot: Vec<Arc<AccountEntry>> = self
            .shared
            .accounts
            .read()
            .values()
            .filter(|entry| entry.data.read().matches(&filter, providers))
            .cloned()
            .collect();
        snapshot.sort_by_key(|entry| entry.id);

        let store = Arc::clone(&self.shared);
        snapshot
            .into_iter()
            .map(move |entry| Account::new(entry, Arc::clone(&store)))
    }

    /// Persist one account atomically
    pub async fn commit(&self, account: &Account) -> Result<()> {
        if !account.belongs_to(&self.shared) {
            return Err(AccountsError::validation(format!(
                "account {} does not belong to this store",
                account.id()
            )));
        }
        self.shared.commit_entry(account.entry()).await
    }

    /// Commit every dirty account
    pub async fn flush(&self) -> Result<usize> {
        self.flush_cancellable(&CancellationToken::new()).await
    }

    /// Commit every dirty account, stopping before the next write once cancelled
    ///
    /// A write already in progress always runs to completion. Failed accounts stay
    /// dirty for the next flush; the first failure is returned after the others
    /// were attempted.
    pub async fn flush_cancellable(&self, cancel: &CancellationToken) -> Result<usize> {
        let mut dirty: Vec<Arc<AccountEntry>> = self
            .shared
            .accounts
            .read()
            .values()
            .filter(|entry| entry.data.read().is_dirty())
            .cloned()
            .collect();
        dirty.sort_by_key(|entry| entry.id);

        let mut flushed = 0;
        let mut first_error = None;
        for entry in dirty {
            if cancel.is_cancelled() {
                tracing::debug!(flushed, "Flush cancelled");
                return Err(AccountsError::Cancelled);
            }
            match self.shared.commit_entry(&entry).await {
                Ok(()) => flushed += 1,
                Err(AccountsError::StaleHandle { .. }) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::debug!(flushed, failed = first_error.is_some(), "Flush finished");
        match first_error {
            Some(e) => Err(e),
            None => Ok(flushed),
        }
    }

    // ===== Application overrides =====

    /// Force `key` for every account's `service` scope
    pub fn set_application_override(
        &self,
        service: &str,
        key: &str,
        value: impl Into<SettingValue>,
    ) -> Result<()> {
        validate_name("service", service)?;
        self.shared.validate_key(key)?;
        self.shared.overrides.write().set(service, key, value.into())
    }

    pub fn clear_application_override(&self, service: &str, key: &str) -> bool {
        self.shared.overrides.write().remove(service, key)
    }

    // ===== Notifications =====

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AccountEvent) + Send + Sync + 'static,
    {
        self.subscribe_filtered(SubscriptionFilter::default(), callback)
    }

    pub fn subscribe_filtered<F>(&self, filter: SubscriptionFilter, callback: F) -> Subscription
    where
        F: Fn(&AccountEvent) + Send + Sync + 'static,
    {
        self.shared.notifier.subscribe(filter, Arc::new(callback))
    }

    // ===== Lifecycle =====

    /// Flush pending writes (if configured) and drain notifications
    ///
    /// Notifications are delivered even when the flush fails; its error is returned.
    pub async fn shutdown(self) -> Result<()> {
        let flushed = if self.shared.config.flush_on_shutdown {
            self.flush().await
        } else {
            Ok(0)
        };
        self.shared.notifier.close().await;
        tracing::info!(flushed = ?flushed.as_ref().ok(), "Account store shut down");
        flushed.map(|_| ())
    }
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore")
            .field("accounts", &self.shared.accounts.read().len())
            .finish()
    }
}

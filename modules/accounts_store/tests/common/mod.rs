//! Common test utilities: storage doubles and a realistic provider setup
#![allow(dead_code)]

use accounts_store::contract::AccountId;
use accounts_store::{AccountStorage, AccountStore, Config, InMemoryStorage, ProviderRegistry};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Provider definitions shared by the integration tests
///
/// twitter and google providers, a typed `sync` service template for twitter,
/// an `e-mail` typed `mail` template for everyone and one global default.
pub const PROVIDERS_YAML: &str = r#"
defaults:
  language: en
providers:
  twitter:
    display_name: Twitter
    settings:
      max_retries: 3
      auth.method: oauth1
  google:
    display_name: Google
    settings:
      auth.method: oauth2
services:
  sync:
    provider: twitter
    type: sync
    settings:
      poll_interval: 300
      enabled_folders: [inbox]
  mail:
    type: e-mail
"#;

pub fn registry() -> ProviderRegistry {
    ProviderRegistry::from_yaml_str(PROVIDERS_YAML).unwrap()
}

pub async fn open_store(storage: Arc<dyn AccountStorage>) -> AccountStore {
    AccountStore::open(Config::default(), storage, registry())
        .await
        .unwrap()
}

pub async fn memory_store() -> (AccountStore, Arc<InMemoryStorage>) {
    let storage = Arc::new(InMemoryStorage::new());
    let store = open_store(storage.clone()).await;
    (store, storage)
}

pub fn print_test_header(test_name: &str, purpose: &str) {
    println!("\n🧪 TEST: {}", test_name);
    println!("📋 PURPOSE: {}", purpose);
}

/// In-memory storage whose writes can be switched to fail
#[derive(Debug, Default)]
pub struct FlakyStorage {
    inner: InMemoryStorage,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.inner.contains(id)
    }
}

#[async_trait]
impl AccountStorage for FlakyStorage {
    async fn save(&self, account_id: AccountId, record: &[u8]) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.save(account_id, record).await
    }

    async fn load(&self, account_id: AccountId) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.load(account_id).await
    }

    async fn remove(&self, account_id: AccountId) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("read-only filesystem");
        }
        self.inner.remove(account_id).await
    }

    async fn list_ids(&self) -> anyhow::Result<Vec<AccountId>> {
        self.inner.list_ids().await
    }

    async fn load_next_id(&self) -> anyhow::Result<Option<AccountId>> {
        self.inner.load_next_id().await
    }

    async fn save_next_id(&self, next_id: AccountId) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.inner.save_next_id(next_id).await
    }
}

/// Storage whose record writes take `delay`; meant for paused-clock tests
#[derive(Debug)]
pub struct SlowStorage {
    inner: InMemoryStorage,
    delay: Duration,
}

impl SlowStorage {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryStorage::new(),
            delay,
        }
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.inner.contains(id)
    }
}

#[async_trait]
impl AccountStorage for SlowStorage {
    async fn save(&self, account_id: AccountId, record: &[u8]) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.save(account_id, record).await
    }

    async fn load(&self, account_id: AccountId) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.load(account_id).await
    }

    async fn remove(&self, account_id: AccountId) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.remove(account_id).await
    }

    async fn list_ids(&self) -> anyhow::Result<Vec<AccountId>> {
        self.inner.list_ids().await
    }

    async fn load_next_id(&self) -> anyhow::Result<Option<AccountId>> {
        self.inner.load_next_id().await
    }

    async fn save_next_id(&self, next_id: AccountId) -> anyhow::Result<()> {
        self.inner.save_next_id(next_id).await
    }
}

/// Callback recording every delivered event, plus the shared log it writes to
pub fn recorder() -> (
    Arc<parking_lot::Mutex<Vec<accounts_store::AccountEvent>>>,
    impl Fn(&accounts_store::AccountEvent) + Send + Sync + 'static,
) {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, move |event: &accounts_store::AccountEvent| {
        sink.lock().push(event.clone())
    })
}

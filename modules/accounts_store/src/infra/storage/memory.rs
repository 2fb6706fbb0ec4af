//! In-memory account storage

use crate::contract::AccountId;
use crate::domain::repository::AccountStorage;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Records kept in a map; contents are lost with the process
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    records: RwLock<BTreeMap<AccountId, Vec<u8>>>,
    next_id: RwLock<Option<AccountId>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn contains(&self, account_id: AccountId) -> bool {
        self.records.read().contains_key(&account_id)
    }
}

#[async_trait]
impl AccountStorage for InMemoryStorage {
    async fn save(&self, account_id: AccountId, record: &[u8]) -> Result<()> {
        self.records.write().insert(account_id, record.to_vec());
        Ok(())
    }

    async fn load(&self, account_id: AccountId) -> Result<Option<Vec<u8>>> {
        Ok(self.records.read().get(&account_id).cloned())
    }

    async fn remove(&self, account_id: AccountId) -> Result<()> {
        self.records.write().remove(&account_id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<AccountId>> {
        Ok(self.records.read().keys().copied().collect())
    }

    async fn load_next_id(&self) -> Result<Option<AccountId>> {
        Ok(*self.next_id.read())
    }

    async fn save_next_id(&self, next_id: AccountId) -> Result<()> {
        *self.next_id.write() = Some(next_id);
        Ok(())
    }
}

//! Persistence collaborator
//!
//! An opaque blob store keyed by account id, plus the id high-water mark so ids
//! of deleted accounts are never handed out again. The store serializes
//! accounts itself; implementations only move bytes. Implementations are in
//! infra/storage.

use crate::contract::AccountId;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Replace the stored record for an account
    async fn save(&self, account_id: AccountId, record: &[u8]) -> Result<()>;

    /// Stored record, or `None` if nothing was saved under this id
    async fn load(&self, account_id: AccountId) -> Result<Option<Vec<u8>>>;

    /// Remove the record; removing an absent record succeeds
    async fn remove(&self, account_id: AccountId) -> Result<()>;

    /// Ids of every stored record
    async fn list_ids(&self) -> Result<Vec<AccountId>>;

    /// Next id to hand out, or `None` if no sequence was saved yet
    async fn load_next_id(&self) -> Result<Option<AccountId>>;

    /// Persist the id high-water mark; callers only ever raise it
    async fn save_next_id(&self, next_id: AccountId) -> Result<()>;
}

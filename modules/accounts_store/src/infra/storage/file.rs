//! File-based account storage: one `<id>.json` per account and a `next_id`
//! sequence file

use crate::contract::AccountId;
use crate::domain::repository::AccountStorage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

const RECORD_EXTENSION: &str = "json";
const SEQUENCE_FILE: &str = "next_id";

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn record_path(&self, account_id: AccountId) -> PathBuf {
        self.dir.join(format!("{}.{}", account_id, RECORD_EXTENSION))
    }

    /// Write through a temp file and rename, so readers never see a partial file
    async fn replace_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, contents)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))
    }
}

#[async_trait]
impl AccountStorage for FileStorage {
    #[instrument(skip(self, record), fields(bytes = record.len()))]
    async fn save(&self, account_id: AccountId, record: &[u8]) -> Result<()> {
        let path = self.record_path(account_id);
        self.replace_file(&path, record).await?;

        debug!(path = %path.display(), "Account record saved");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, account_id: AccountId) -> Result<Option<Vec<u8>>> {
        let path = self.record_path(account_id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    #[instrument(skip(self))]
    async fn remove(&self, account_id: AccountId) -> Result<()> {
        let path = self.record_path(account_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    #[instrument(skip(self))]
    async fn list_ids(&self) -> Result<Vec<AccountId>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to list {}", self.dir.display()))
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<AccountId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn load_next_id(&self) -> Result<Option<AccountId>> {
        let path = self.dir.join(SEQUENCE_FILE);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let next_id = contents
            .trim()
            .parse::<AccountId>()
            .with_context(|| format!("corrupt id sequence in {}", path.display()))?;
        Ok(Some(next_id))
    }

    #[instrument(skip(self))]
    async fn save_next_id(&self, next_id: AccountId) -> Result<()> {
        let path = self.dir.join(SEQUENCE_FILE);
        self.replace_file(&path, next_id.to_string().as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_storage_crud() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("accounts"));

        // Missing directory reads as empty
        assert!(storage.list_ids().await.unwrap().is_empty());
        assert_eq!(storage.load(1).await.unwrap(), None);

        storage.save(2, b"{\"id\":2}").await.unwrap();
        storage.save(10, b"{\"id\":10}").await.unwrap();
        storage.save(2, b"{\"id\":2,\"v\":2}").await.unwrap();

        assert_eq!(storage.list_ids().await.unwrap(), vec![2, 10]);
        assert_eq!(
            storage.load(2).await.unwrap().as_deref(),
            Some(&b"{\"id\":2,\"v\":2}"[..])
        );

        storage.remove(2).await.unwrap();
        storage.remove(2).await.unwrap();
        assert_eq!(storage.list_ids().await.unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_file_storage_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("abc.json"), "{}").unwrap();
        std::fs::write(dir.path().join("5.json.tmp"), "{}").unwrap();

        let storage = FileStorage::new(dir.path().to_path_buf());
        assert!(storage.list_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_storage_sequence() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("accounts"));
        assert_eq!(storage.load_next_id().await.unwrap(), None);

        storage.save_next_id(3).await.unwrap();
        storage.save_next_id(41).await.unwrap();
        assert_eq!(storage.load_next_id().await.unwrap(), Some(41));
        // The sequence file is not mistaken for a record
        assert!(storage.list_ids().await.unwrap().is_empty());

        std::fs::write(dir.path().join("accounts").join("next_id"), "garbage").unwrap();
        assert!(storage.load_next_id().await.is_err());
    }
}

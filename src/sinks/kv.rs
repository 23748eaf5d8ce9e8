//! Embedded key-value sink for change events, backed by redb.
//!
//! Each change is stored as `object_identifier -> data` in a single table;
//! a later change for the same object overwrites the earlier one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use crate::config::KvSinkConfig;
use crate::error::{ProcessError, ToolkitResult};
use crate::service::{ChangeEvent, ChangesProcessor};

const CHANGES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("main");

struct KvStore {
    db: Database,
    lock: RwLock<()>,
}

impl KvStore {
    fn set(&self, key: &str, value: &str) -> ToolkitResult<()> {
        let _guard = self.lock.write();
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CHANGES_TABLE)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get(&self, key: &str) -> ToolkitResult<Option<String>> {
        let _guard = self.lock.read();
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHANGES_TABLE)?;
        let value = table.get(key)?.map(|stored| stored.value().to_string());
        Ok(value)
    }
}

/// Latest change data per object, persisted in an embedded database file
#[derive(Clone)]
pub struct KvChangesAggregator {
    store: Arc<KvStore>,
    path: PathBuf,
}

impl std::fmt::Debug for KvChangesAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvChangesAggregator")
            .field("path", &self.path)
            .finish()
    }
}

impl KvChangesAggregator {
    pub fn open(config: &KvSinkConfig) -> ToolkitResult<Self> {
        config.validate()?;
        Self::open_path(&config.storage_path)
    }

    /// Open or create the database file and make sure the table exists
    pub fn open_path(path: impl AsRef<Path>) -> ToolkitResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;

        let txn = db.begin_write()?;
        txn.open_table(CHANGES_TABLE)?;
        txn.commit()?;

        info!(path = %path.display(), "Key-value changes store opened");
        Ok(Self {
            store: Arc::new(KvStore {
                db,
                lock: RwLock::new(()),
            }),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set(&self, key: &str, value: &str) -> ToolkitResult<()> {
        self.store.set(key, value)
    }

    pub fn get(&self, key: &str) -> ToolkitResult<Option<String>> {
        self.store.get(key)
    }
}

#[async_trait]
impl ChangesProcessor for KvChangesAggregator {
    async fn process(&self, event: &ChangeEvent) -> Result<(), ProcessError> {
        let store = self.store.clone();
        let key = event.object_identifier.clone();
        let value = event.data.clone();

        tokio::task::spawn_blocking(move || store.set(&key, &value))
            .await
            .map_err(|e| ProcessError::failed(format!("key-value write task failed: {e}")))??;

        debug!(
            object_type = %event.object_type,
            object_identifier = %event.object_identifier,
            "Change stored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(id: &str, data: &str) -> ChangeEvent {
        ChangeEvent {
            object_type: "sku".to_string(),
            object_identifier: id.to_string(),
            event_name: "flags_changed".to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_set_get_and_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = KvChangesAggregator::open_path(dir.path().join("changes.redb")).unwrap();

        assert_eq!(store.get("missing").unwrap(), None);

        store.set("42", "a;b").unwrap();
        store.set("42", "c").unwrap();
        assert_eq!(store.get("42").unwrap().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_process_stores_identifier_to_data() {
        let dir = TempDir::new().unwrap();
        let config = KvSinkConfig {
            storage_path: dir.path().join("changes.redb"),
        };
        let store = KvChangesAggregator::open(&config).unwrap();

        store.process(&event("7", "x;y")).await.unwrap();
        assert_eq!(store.get("7").unwrap().as_deref(), Some("x;y"));
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("changes.redb");
        {
            let store = KvChangesAggregator::open_path(&path).unwrap();
            store.set("1", "persisted").unwrap();
        }

        let reopened = KvChangesAggregator::open_path(&path).unwrap();
        assert_eq!(reopened.get("1").unwrap().as_deref(), Some("persisted"));
    }
}

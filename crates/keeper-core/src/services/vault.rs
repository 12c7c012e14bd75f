//! Owner-scoped record operations on top of a [`RecordStore`].

use std::path::Path;

use crate::db::{Database, LibSqlRecordStore, RecordStore};
use crate::error::{Error, Result};
use crate::models::{HistoryEntry, Record, RecordId, RecordKind};

/// Fields to change on an existing record. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub title: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub metadata: Option<String>,
}

impl RecordUpdate {
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.payload.is_none() && self.metadata.is_none()
    }
}

/// The local vault of one owner. Payloads are kept in plaintext here; the
/// sync layer encrypts copies on the way out.
#[derive(Clone)]
pub struct VaultService<S> {
    store: S,
    owner_id: String,
}

impl<S: RecordStore> VaultService<S> {
    pub fn new(store: S, owner_id: impl Into<String>) -> Self {
        Self {
            store,
            owner_id: owner_id.into(),
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Create a version-1 record.
    pub async fn add(
        &self,
        kind: RecordKind,
        title: &str,
        payload: Vec<u8>,
        metadata: &str,
    ) -> Result<Record> {
        let record = Record::new(&self.owner_id, kind, title.trim(), payload, metadata.trim());
        record.validate()?;

        let saved = self.store.save(&record).await?;
        tracing::debug!(record = %saved.id, kind = %saved.kind, "Record added");
        Ok(saved)
    }

    /// Apply `update` and bump the version past both the local copy and any
    /// newer server copy seen during a conflicted sync.
    ///
    /// An update that changes nothing returns the record untouched.
    pub async fn edit(&self, id: &RecordId, update: RecordUpdate) -> Result<Record> {
        let mut record = self.get(id).await?;
        if update.is_empty() {
            return Ok(record);
        }

        if let Some(title) = update.title {
            record.title = title.trim().to_string();
        }
        if let Some(payload) = update.payload {
            record.payload = payload;
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata.trim().to_string();
        }
        record.validate()?;
        let server_version = self.store.server_version(id).await?;
        record.version = record.version.max(server_version) + 1;

        let saved = self.store.save(&record).await?;
        tracing::debug!(record = %saved.id, version = saved.version, "Record edited");
        Ok(saved)
    }

    /// Soft-delete a record.
    pub async fn remove(&self, id: &RecordId) -> Result<()> {
        self.get(id).await?;
        self.store.soft_delete(id).await
    }

    /// A live record owned by this vault.
    pub async fn get(&self, id: &RecordId) -> Result<Record> {
        let record = self.store.get(id).await?;
        if record.owner_id != self.owner_id || record.is_deleted {
            return Err(Error::NotFound(format!("record {id}")));
        }
        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<Record>> {
        self.store.list(&self.owner_id).await
    }

    /// Past versions, newest first. Available for deleted records too.
    pub async fn history(&self, id: &RecordId) -> Result<Vec<HistoryEntry>> {
        let record = self.store.get(id).await?;
        if record.owner_id != self.owner_id {
            return Err(Error::NotFound(format!("record {id}")));
        }
        self.store.history(id).await
    }
}

impl VaultService<LibSqlRecordStore> {
    /// Open (or create) a local vault database at `path`.
    pub async fn open_path(path: impl AsRef<Path>, owner_id: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(path).await?;
        Ok(Self::new(LibSqlRecordStore::new(db), owner_id))
    }

    /// In-memory vault (primarily for tests).
    pub async fn open_in_memory(owner_id: impl Into<String>) -> Result<Self> {
        Ok(Self::new(LibSqlRecordStore::open_in_memory().await?, owner_id))
    }

    /// Ids of this owner's records starting with `prefix`.
    pub async fn find_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        self.store
            .find_ids_by_prefix(&self.owner_id, prefix, limit)
            .await
    }
}

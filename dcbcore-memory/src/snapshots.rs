//! In-memory snapshot records and blobs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dcbcore::errors::SnapshotResult;
use dcbcore::snapshot::{BlobStorage, SnapshotKey, SnapshotKind, SnapshotRecord, SnapshotStore};
use parking_lot::RwLock;

#[derive(Default)]
struct Records {
    // Key -> (write sequence, record); the sequence orders "most recent"
    entries: BTreeMap<SnapshotKey, (u64, SnapshotRecord)>,
    sequence: u64,
}

/// Snapshot records kept in a map. Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    records: Arc<RwLock<Records>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().entries.len()
    }

    /// `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().entries.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn upsert(&self, record: SnapshotRecord) -> SnapshotResult<()> {
        let mut records = self.records.write();
        records.sequence += 1;
        let sequence = records.sequence;
        records.entries.insert(record.key.clone(), (sequence, record));
        Ok(())
    }

    async fn get(&self, key: &SnapshotKey) -> SnapshotResult<Option<SnapshotRecord>> {
        Ok(self
            .records
            .read()
            .entries
            .get(key)
            .map(|(_, record)| record.clone()))
    }

    async fn latest(
        &self,
        kind: SnapshotKind,
        projector_name: &str,
        subject: Option<&str>,
    ) -> SnapshotResult<Option<SnapshotRecord>> {
        Ok(self
            .records
            .read()
            .entries
            .iter()
            .filter(|(key, _)| {
                key.kind == kind
                    && key.projector_name == projector_name
                    && key.subject.as_deref() == subject
            })
            .max_by_key(|(_, (sequence, _))| *sequence)
            .map(|(_, (_, record))| record.clone()))
    }

    async fn list(&self, kind: Option<SnapshotKind>) -> SnapshotResult<Vec<SnapshotKey>> {
        Ok(self
            .records
            .read()
            .entries
            .keys()
            .filter(|key| kind.is_none_or(|kind| key.kind == kind))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &SnapshotKey) -> SnapshotResult<bool> {
        Ok(self.records.write().entries.remove(key).is_some())
    }
}

/// Blob storage backed by a map. Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryBlobStorage {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryBlobStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of every stored blob, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> SnapshotResult<()> {
        self.blobs.write().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> SnapshotResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> SnapshotResult<()> {
        self.blobs.write().remove(key);
        Ok(())
    }
}

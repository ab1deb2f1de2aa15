//! Snapshot persistence contracts.

use async_trait::async_trait;

use crate::errors::SnapshotResult;
use crate::snapshot::{SnapshotKey, SnapshotKind, SnapshotRecord};

/// Stores snapshot records.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Inserts `record`, replacing any record with the same key.
    async fn upsert(&self, record: SnapshotRecord) -> SnapshotResult<()>;

    /// Reads the record with exactly this key.
    async fn get(&self, key: &SnapshotKey) -> SnapshotResult<Option<SnapshotRecord>>;

    /// Most recently written record for a projector and subject, of any
    /// projector version.
    async fn latest(
        &self,
        kind: SnapshotKind,
        projector_name: &str,
        subject: Option<&str>,
    ) -> SnapshotResult<Option<SnapshotRecord>>;

    /// Keys of every stored record, optionally restricted to one kind.
    async fn list(&self, kind: Option<SnapshotKind>) -> SnapshotResult<Vec<SnapshotKey>>;

    /// Removes a record; returns whether one existed.
    async fn delete(&self, key: &SnapshotKey) -> SnapshotResult<bool>;
}

/// Stores large snapshot bodies outside the record.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Writes `bytes` under `key`, replacing existing content.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> SnapshotResult<()>;

    /// Reads the bytes under `key`.
    async fn get(&self, key: &str) -> SnapshotResult<Option<Vec<u8>>>;

    /// Removes the bytes under `key`.
    async fn delete(&self, key: &str) -> SnapshotResult<()>;
}

//! Snapshot save and load.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::SnapshotConfig;
use crate::domain::{Domain, DomainTypes};
use crate::errors::{SnapshotError, SnapshotResult};
use crate::multi_projection::MultiProjectionState;
use crate::snapshot::{
    compress, decompress, BlobStorage, SnapshotBody, SnapshotKey, SnapshotKind, SnapshotRecord,
    SnapshotStore,
};
use crate::tag::Tag;
use crate::tag_projection::{TagState, EMPTY_TAG_STATE_PAYLOAD};
use crate::types::{SortableUniqueId, TagVersion, Timestamp};

/// A state that can be snapshotted.
pub enum Snapshot<D: Domain> {
    /// One tag under one tag projector
    TagState(TagState<D::TagState>),
    /// One multi projection (its safe view)
    MultiProjection(MultiProjectionState<D::MultiState>),
}

impl<D: Domain> Snapshot<D> {
    /// Kind of the contained state.
    pub const fn kind(&self) -> SnapshotKind {
        match self {
            Self::TagState(_) => SnapshotKind::TagState,
            Self::MultiProjection(_) => SnapshotKind::MultiProjection,
        }
    }
}

struct Encoded {
    key: SnapshotKey,
    payload_type: String,
    bytes: Vec<u8>,
    version: u64,
    events_processed: u64,
    last_sortable_unique_id: Option<SortableUniqueId>,
    safe_window_threshold: Option<SortableUniqueId>,
}

/// Saves and restores snapshots for one domain.
pub struct SnapshotManager<D: Domain> {
    domain: Arc<DomainTypes<D>>,
    store: Arc<dyn SnapshotStore>,
    blobs: Option<Arc<dyn BlobStorage>>,
    config: SnapshotConfig,
}

impl<D: Domain> SnapshotManager<D> {
    /// A manager that keeps every body inline.
    pub fn new(domain: Arc<DomainTypes<D>>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            domain,
            store,
            blobs: None,
            config: SnapshotConfig::default(),
        }
    }

    /// Offloads bodies above the threshold to `blobs`.
    #[must_use]
    pub fn with_blob_storage(mut self, blobs: Arc<dyn BlobStorage>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: SnapshotConfig) -> Self {
        self.config = config;
        self
    }

    fn encode(&self, snapshot: &Snapshot<D>) -> SnapshotResult<Encoded> {
        match snapshot {
            Snapshot::TagState(state) => {
                let (payload_type, bytes) = self.domain.serialize_tag_state(&state.payload)?;
                Ok(Encoded {
                    key: SnapshotKey::tag_state(
                        state.tag(),
                        state.projector_name.clone(),
                        state.projector_version.clone(),
                    ),
                    payload_type: payload_type.to_string(),
                    bytes,
                    version: state.version.into(),
                    events_processed: state.version.into(),
                    last_sortable_unique_id: state.last_sortable_unique_id.clone(),
                    safe_window_threshold: None,
                })
            }
            Snapshot::MultiProjection(state) => {
                let (payload_type, bytes) = self.domain.multi_states().serialize(&state.payload)?;
                Ok(Encoded {
                    key: SnapshotKey::multi_projection(
                        state.projector_name.clone(),
                        state.projector_version.clone(),
                    ),
                    payload_type: payload_type.to_string(),
                    bytes,
                    version: state.version,
                    events_processed: state.events_processed,
                    last_sortable_unique_id: state.last_sortable_unique_id.clone(),
                    safe_window_threshold: Some(state.safe_window_threshold.clone()),
                })
            }
        }
    }

    /// Encodes, compresses and stores `snapshot`.
    #[instrument(skip(self, snapshot), fields(kind = %snapshot.kind()))]
    pub async fn save(&self, snapshot: &Snapshot<D>) -> SnapshotResult<SnapshotRecord> {
        let encoded = self.encode(snapshot)?;
        let original_size_bytes = encoded.bytes.len();
        if let Some(limit) = self.config.max_snapshot_bytes.map(usize::from) {
            if original_size_bytes > limit {
                return Err(SnapshotError::TooLarge {
                    size: original_size_bytes,
                    limit,
                });
            }
        }

        let compressed = compress(&encoded.bytes)?;
        let compressed_size_bytes = compressed.len();
        let threshold = usize::from(self.config.offload_threshold);
        let body = match self.blobs.as_ref() {
            Some(blobs) if compressed_size_bytes > threshold => {
                let key = encoded.key.offload_key();
                blobs.put(&key, compressed).await?;
                debug!(%key, compressed_size_bytes, "snapshot body offloaded");
                SnapshotBody::Offloaded {
                    key,
                    provider: self.config.blob_provider.clone(),
                }
            }
            _ => SnapshotBody::Inline(compressed),
        };

        let record = SnapshotRecord {
            key: encoded.key,
            payload_type: encoded.payload_type,
            version: encoded.version,
            events_processed: encoded.events_processed,
            last_sortable_unique_id: encoded.last_sortable_unique_id,
            safe_window_threshold: encoded.safe_window_threshold,
            original_size_bytes,
            compressed_size_bytes,
            body,
            created_at: Timestamp::now(),
        };
        self.store.upsert(record.clone()).await?;
        debug!(
            projector = %record.key.projector_name,
            version = record.version,
            original_size_bytes,
            compressed_size_bytes,
            "snapshot saved"
        );
        Ok(record)
    }

    fn check_version(record: &SnapshotRecord, current: &str) -> SnapshotResult<()> {
        if record.key.projector_version == current {
            return Ok(());
        }
        warn!(
            projector = %record.key.projector_name,
            stored = %record.key.projector_version,
            current,
            "snapshot written by another projector version; rebuild required"
        );
        Err(SnapshotError::VersionMismatch {
            projector: record.key.projector_name.clone(),
            stored: record.key.projector_version.clone(),
            current: current.to_string(),
        })
    }

    async fn read_body(&self, record: &SnapshotRecord) -> SnapshotResult<Vec<u8>> {
        let compressed = match &record.body {
            SnapshotBody::Inline(bytes) => bytes.clone(),
            SnapshotBody::Offloaded { key, provider } => {
                let missing = || SnapshotError::BlobNotFound {
                    key: key.clone(),
                    provider: provider.clone(),
                };
                if *provider != self.config.blob_provider {
                    return Err(missing());
                }
                let blobs = self.blobs.as_ref().ok_or_else(missing)?;
                blobs.get(key).await?.ok_or_else(missing)?
            }
        };
        if compressed.len() != record.compressed_size_bytes {
            return Err(SnapshotError::Corrupted(format!(
                "compressed body is {} bytes, record says {}",
                compressed.len(),
                record.compressed_size_bytes
            )));
        }
        let limit = self.config.max_snapshot_bytes.map(usize::from);
        let bytes = decompress(&compressed, limit)?;
        if bytes.len() != record.original_size_bytes {
            return Err(SnapshotError::Corrupted(format!(
                "decompressed body is {} bytes, record says {}",
                bytes.len(),
                record.original_size_bytes
            )));
        }
        Ok(bytes)
    }

    /// Restores the latest tag-state snapshot of `tag` under `projector_name`.
    ///
    /// `Ok(None)` if there is none.
    ///
    /// # Errors
    /// `SnapshotError::VersionMismatch` if the snapshot was written by
    /// another version of the projector.
    #[instrument(skip(self, tag), fields(tag = %tag))]
    pub async fn load_tag_state(
        &self,
        tag: &Tag,
        projector_name: &str,
    ) -> SnapshotResult<Option<TagState<D::TagState>>> {
        let projector = self
            .domain
            .tag_projectors()
            .get(projector_name)
            .map_err(|error| SnapshotError::Storage(error.to_string()))?;
        let Some(record) = self
            .store
            .latest(SnapshotKind::TagState, projector_name, Some(&tag.as_string()))
            .await?
        else {
            return Ok(None);
        };
        Self::check_version(&record, projector.version())?;
        if record.payload_type != EMPTY_TAG_STATE_PAYLOAD
            && !self.domain.tag_states().is_registered(&record.payload_type)
        {
            return Err(SnapshotError::PayloadTypeMismatch(record.payload_type));
        }

        let bytes = self.read_body(&record).await?;
        let payload = self
            .domain
            .deserialize_tag_state(&record.payload_type, &bytes)?;
        Ok(Some(TagState {
            payload,
            version: TagVersion::new(record.version),
            last_sortable_unique_id: record.last_sortable_unique_id,
            tag_group: tag.group().to_string(),
            tag_content: tag.content().to_string(),
            projector_name: projector.name().to_string(),
            projector_version: projector.version().to_string(),
        }))
    }

    /// Restores the latest snapshot of the multi projection `projector_name`.
    ///
    /// `Ok(None)` if there is none.
    ///
    /// # Errors
    /// `SnapshotError::VersionMismatch` if the snapshot was written by
    /// another version of the projector.
    #[instrument(skip(self))]
    pub async fn load_multi_projection(
        &self,
        projector_name: &str,
    ) -> SnapshotResult<Option<MultiProjectionState<D::MultiState>>> {
        let current_version = self
            .domain
            .multi_projectors()
            .version_of(projector_name)
            .ok_or_else(|| {
                SnapshotError::Storage(format!("unknown multi projector '{projector_name}'"))
            })?;
        let Some(record) = self
            .store
            .latest(SnapshotKind::MultiProjection, projector_name, None)
            .await?
        else {
            return Ok(None);
        };
        Self::check_version(&record, current_version)?;
        if !self.domain.multi_states().is_registered(&record.payload_type) {
            return Err(SnapshotError::PayloadTypeMismatch(record.payload_type));
        }

        let bytes = self.read_body(&record).await?;
        let payload = self
            .domain
            .multi_states()
            .deserialize(&record.payload_type, &bytes)?;
        let safe_window_threshold = record.safe_window_threshold.ok_or_else(|| {
            SnapshotError::Corrupted(
                "multi-projection snapshot without safe-window marker".to_string(),
            )
        })?;
        Ok(Some(MultiProjectionState {
            projector_name: record.key.projector_name,
            projector_version: record.key.projector_version.clone(),
            payload,
            version: record.version,
            last_sortable_unique_id: record.last_sortable_unique_id,
            last_event_id: None,
            events_processed: record.events_processed,
            safe_window_threshold,
            is_safe_state: true,
            applied_snapshot_version: Some(record.key.projector_version),
        }))
    }

    /// Deletes a snapshot and its offloaded body.
    pub async fn delete(&self, key: &SnapshotKey) -> SnapshotResult<bool> {
        if let (Some(record), Some(blobs)) = (self.store.get(key).await?, self.blobs.as_ref()) {
            if let SnapshotBody::Offloaded { key: blob_key, .. } = &record.body {
                blobs.delete(blob_key).await?;
            }
        }
        self.store.delete(key).await
    }
}

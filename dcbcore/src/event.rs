//! Event records and the tag-index records derived from them.
//!
//! Events are immutable once constructed: the tag list is de-duplicated at
//! construction and never changes afterwards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::RegistryResult;
use crate::metadata::EventMetadata;
use crate::payload::{PayloadTypes, PayloadUnion};
use crate::types::{EventId, SortableUniqueId, TagVersion, Timestamp};

/// A recorded domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<E> {
    id: EventId,
    sortable_unique_id: SortableUniqueId,
    payload: E,
    tags: Vec<String>,
    metadata: EventMetadata,
}

impl<E: PayloadUnion> Event<E> {
    /// Creates an event. Duplicate tags are dropped, first occurrence wins.
    pub fn new(
        id: EventId,
        sortable_unique_id: SortableUniqueId,
        payload: E,
        tags: impl IntoIterator<Item = String>,
        metadata: EventMetadata,
    ) -> Self {
        let mut seen = HashSet::new();
        let tags = tags
            .into_iter()
            .filter(|tag| seen.insert(tag.clone()))
            .collect();
        Self {
            id,
            sortable_unique_id,
            payload,
            tags,
            metadata,
        }
    }

    /// Unique event identifier.
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Total-order key.
    pub const fn sortable_unique_id(&self) -> &SortableUniqueId {
        &self.sortable_unique_id
    }

    /// Registered name of the payload variant.
    pub fn event_type(&self) -> &'static str {
        self.payload.type_name()
    }

    /// Domain payload.
    pub const fn payload(&self) -> &E {
        &self.payload
    }

    /// Tag strings in `Group:Content` form.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// `true` if the event carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }

    /// Causation, correlation and user.
    pub const fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    /// Instant encoded in the sortable id.
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::new(self.sortable_unique_id.timestamp())
    }

    /// Converts to the storage form through the event registry.
    pub fn to_serialized(&self, types: &PayloadTypes<E>) -> RegistryResult<SerializedEvent> {
        let (event_type, payload) = types.serialize(&self.payload)?;
        Ok(SerializedEvent {
            id: self.id,
            sortable_unique_id: self.sortable_unique_id.clone(),
            event_type: event_type.to_string(),
            payload,
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

/// Sorts events by sortable id and removes repeated event ids.
pub fn sort_and_dedup<E>(events: &mut Vec<Event<E>>) {
    events.sort_by(|a, b| a.sortable_unique_id.cmp(&b.sortable_unique_id));
    let mut seen = HashSet::new();
    events.retain(|event| seen.insert(event.id));
}

/// Storage form of an event: payload as bytes plus its type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// Unique event identifier
    pub id: EventId,
    /// Total-order key
    pub sortable_unique_id: SortableUniqueId,
    /// Registered payload type name
    pub event_type: String,
    /// Serialized payload
    pub payload: Vec<u8>,
    /// Tag strings
    pub tags: Vec<String>,
    /// Event metadata
    pub metadata: EventMetadata,
}

impl SerializedEvent {
    /// Rebuilds the typed event. Unregistered type names fail.
    pub fn into_event<E: PayloadUnion>(self, types: &PayloadTypes<E>) -> RegistryResult<Event<E>> {
        let payload = types.deserialize(&self.event_type, &self.payload)?;
        Ok(Event::new(
            self.id,
            self.sortable_unique_id,
            payload,
            self.tags,
            self.metadata,
        ))
    }
}

/// One entry of a tag's index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagStream {
    /// Tag in `Group:Content` form
    pub tag: String,
    /// Indexed event
    pub event_id: EventId,
    /// Sortable id of the indexed event
    pub sortable_unique_id: SortableUniqueId,
}

/// Outcome of a write for one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagWriteResult {
    /// Tag in `Group:Content` form
    pub tag: String,
    /// Tag version after the write
    pub version: TagVersion,
    /// When the write was applied
    pub written_at: Timestamp,
}

/// Summary of one tag's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    /// Tag in `Group:Content` form
    pub tag: String,
    /// Tag group
    pub group: String,
    /// Number of events carrying the tag
    pub event_count: u64,
    /// Earliest event carrying the tag
    pub first_sortable_unique_id: SortableUniqueId,
    /// Latest event carrying the tag
    pub last_sortable_unique_id: SortableUniqueId,
}

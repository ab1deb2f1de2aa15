//! Event store abstraction.
//!
//! This module defines the `EventStore` trait, the only storage contract the
//! kernel depends on. Relational, document and in-memory backends are
//! interchangeable as long as they honour it; `dcbcore-testing` ships a
//! contract suite every backend can run.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::EventStoreResult;
use crate::event::{Event, TagInfo, TagStream, TagWriteResult};
use crate::payload::PayloadUnion;
use crate::tag::Tag;
use crate::types::{EventId, SortableUniqueId, TagVersion};

/// Events to append in one atomic operation, plus the consistency tag
/// versions the write is conditional on.
#[derive(Debug, Clone)]
pub struct WriteBatch<E> {
    /// Events to append
    pub events: Vec<Event<E>>,
    /// Tag string -> version the tag must still have at commit time
    pub expected_versions: BTreeMap<String, TagVersion>,
}

impl<E> WriteBatch<E> {
    /// An unconditional batch.
    pub const fn new(events: Vec<Event<E>>) -> Self {
        Self {
            events,
            expected_versions: BTreeMap::new(),
        }
    }

    /// Requires `tag` to be at `version` when the batch commits.
    #[must_use]
    pub fn expect_version(mut self, tag: impl Into<String>, version: TagVersion) -> Self {
        self.expected_versions.insert(tag.into(), version);
        self
    }
}

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome<E> {
    /// Events as persisted
    pub events: Vec<Event<E>>,
    /// New version of every tag the batch touched
    pub tag_writes: Vec<TagWriteResult>,
}

/// Store-level view of a tag: its version and newest event, without any
/// projected payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestTagState {
    /// Tag in `Group:Content` form
    pub tag: String,
    /// Number of events carrying the tag; 0 if never written
    pub version: TagVersion,
    /// Newest event carrying the tag
    pub last_sortable_unique_id: Option<SortableUniqueId>,
}

impl LatestTagState {
    /// State of a tag that has never been written.
    pub fn unseen(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            version: TagVersion::initial(),
            last_sortable_unique_id: None,
        }
    }
}

/// The storage contract of the kernel.
///
/// Every read returns events ordered by ascending [`SortableUniqueId`]; every
/// `since` bound is exclusive. Expected conditions (missing events, version
/// conflicts) are returned as errors, never panics.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// The event payload union this store handles.
    type Event: PayloadUnion;

    /// Reads the whole log, or the part after `since`, in sortable-id order.
    /// `max_count` caps the number of events returned.
    async fn read_all_events(
        &self,
        since: Option<&SortableUniqueId>,
        max_count: Option<usize>,
    ) -> EventStoreResult<Vec<Event<Self::Event>>>;

    /// Reads the events carrying `tag`, or those after `since`.
    async fn read_events_by_tag(
        &self,
        tag: &Tag,
        since: Option<&SortableUniqueId>,
    ) -> EventStoreResult<Vec<Event<Self::Event>>>;

    /// Reads one event.
    ///
    /// # Errors
    /// `EventStoreError::EventNotFound` if no event has this id.
    async fn read_event(&self, id: EventId) -> EventStoreResult<Event<Self::Event>>;

    /// Appends a batch atomically.
    ///
    /// Either every event and every tag index entry is persisted or none is.
    ///
    /// # Errors
    /// * `EventStoreError::VersionConflict(s)` - an expected tag version no longer holds
    /// * `EventStoreError::DuplicateEventId` - an event id already exists
    async fn write_events(
        &self,
        batch: WriteBatch<Self::Event>,
    ) -> EventStoreResult<WriteOutcome<Self::Event>>;

    /// Reads the index entries of `tag`.
    async fn read_tag_stream(&self, tag: &Tag) -> EventStoreResult<Vec<TagStream>>;

    /// Returns the current version of `tag`; version 0 if unseen.
    async fn get_latest_tag_state(&self, tag: &Tag) -> EventStoreResult<LatestTagState>;

    /// `true` if at least one event carries `tag`.
    async fn tag_exists(&self, tag: &Tag) -> EventStoreResult<bool>;

    /// Number of events in the log, or after `since`.
    async fn get_event_count(&self, since: Option<&SortableUniqueId>) -> EventStoreResult<u64>;

    /// Summaries of every tag, optionally restricted to one group.
    async fn get_all_tags(&self, group: Option<&str>) -> EventStoreResult<Vec<TagInfo>>;
}

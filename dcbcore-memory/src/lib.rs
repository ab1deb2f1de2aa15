//! In-memory backends for the `dcbcore` event sourcing kernel
//!
//! This crate provides an in-memory [`EventStore`], [`SnapshotStore`] and
//! [`BlobStorage`], useful for tests, demos and development scenarios where
//! persistence is not required. Every write takes one lock around the append
//! and the tag index update, which makes batches atomic.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

mod snapshots;

pub use snapshots::{InMemoryBlobStorage, InMemorySnapshotStore};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dcbcore::errors::{EventStoreError, EventStoreResult};
use dcbcore::event::{Event, TagInfo, TagStream, TagWriteResult};
use dcbcore::event_store::{EventStore, LatestTagState, WriteBatch, WriteOutcome};
use dcbcore::payload::PayloadUnion;
use dcbcore::tag::Tag;
use dcbcore::types::{EventId, SortableUniqueId, TagVersion, Timestamp};
use parking_lot::RwLock;
use tracing::{debug, instrument};

type LogKey = (SortableUniqueId, EventId);

struct StoreState<E> {
    // The log, ordered by sortable id
    log: BTreeMap<LogKey, Event<E>>,
    by_id: HashMap<EventId, SortableUniqueId>,
    // Tag string -> index entries ordered by sortable id; the length is the tag version
    tags: HashMap<String, Vec<TagStream>>,
}

impl<E> Default for StoreState<E> {
    fn default() -> Self {
        Self {
            log: BTreeMap::new(),
            by_id: HashMap::new(),
            tags: HashMap::new(),
        }
    }
}

impl<E: PayloadUnion> StoreState<E> {
    fn tag_version(&self, tag: &str) -> TagVersion {
        self.tags
            .get(tag)
            .map_or_else(TagVersion::initial, |entries| {
                TagVersion::initial().advanced_by(entries.len())
            })
    }

    fn check_batch(&self, batch: &WriteBatch<E>) -> EventStoreResult<()> {
        let mut seen = HashSet::new();
        for event in &batch.events {
            if self.by_id.contains_key(&event.id()) || !seen.insert(event.id()) {
                return Err(EventStoreError::DuplicateEventId(event.id()));
            }
        }

        let mut conflicts: Vec<(String, TagVersion, TagVersion)> = batch
            .expected_versions
            .iter()
            .filter_map(|(tag, expected)| {
                let current = self.tag_version(tag);
                (current != *expected).then(|| (tag.clone(), *expected, current))
            })
            .collect();
        match conflicts.len() {
            0 => Ok(()),
            1 => {
                let (tag, expected, current) = conflicts.remove(0);
                Err(EventStoreError::VersionConflict {
                    tag,
                    expected,
                    current,
                })
            }
            _ => Err(EventStoreError::VersionConflicts(
                conflicts.into_iter().map(|(tag, _, _)| tag).collect(),
            )),
        }
    }

    fn index(&mut self, event: &Event<E>) {
        for tag in event.tags() {
            let entries = self.tags.entry(tag.clone()).or_default();
            let position = entries
                .partition_point(|entry| entry.sortable_unique_id <= *event.sortable_unique_id());
            entries.insert(
                position,
                TagStream {
                    tag: tag.clone(),
                    event_id: event.id(),
                    sortable_unique_id: event.sortable_unique_id().clone(),
                },
            );
        }
    }
}

/// Thread-safe in-memory event store.
///
/// Clones share the same storage.
pub struct InMemoryEventStore<E> {
    state: Arc<RwLock<StoreState<E>>>,
}

impl<E> Clone for InMemoryEventStore<E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<E> InMemoryEventStore<E> {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.state.read().log.len()
    }

    /// `true` if no event has been written.
    pub fn is_empty(&self) -> bool {
        self.state.read().log.is_empty()
    }
}

impl<E> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn after<'a>(since: Option<&'a SortableUniqueId>) -> impl Fn(&SortableUniqueId) -> bool + 'a {
    move |id| since.is_none_or(|since| id > since)
}

#[async_trait]
impl<E: PayloadUnion> EventStore for InMemoryEventStore<E> {
    type Event = E;

    async fn read_all_events(
        &self,
        since: Option<&SortableUniqueId>,
        max_count: Option<usize>,
    ) -> EventStoreResult<Vec<Event<E>>> {
        let state = self.state.read();
        let is_after = after(since);
        Ok(state
            .log
            .iter()
            .filter(|((id, _), _)| is_after(id))
            .take(max_count.unwrap_or(usize::MAX))
            .map(|(_, event)| event.clone())
            .collect())
    }

    async fn read_events_by_tag(
        &self,
        tag: &Tag,
        since: Option<&SortableUniqueId>,
    ) -> EventStoreResult<Vec<Event<E>>> {
        let state = self.state.read();
        let Some(entries) = state.tags.get(&tag.as_string()) else {
            return Ok(Vec::new());
        };
        let is_after = after(since);
        entries
            .iter()
            .filter(|entry| is_after(&entry.sortable_unique_id))
            .map(|entry| {
                state
                    .log
                    .get(&(entry.sortable_unique_id.clone(), entry.event_id))
                    .cloned()
                    .ok_or_else(|| {
                        EventStoreError::Internal(format!(
                            "tag index of '{}' points at missing event {}",
                            entry.tag, entry.event_id
                        ))
                    })
            })
            .collect()
    }

    async fn read_event(&self, id: EventId) -> EventStoreResult<Event<E>> {
        let state = self.state.read();
        state
            .by_id
            .get(&id)
            .and_then(|sortable_id| state.log.get(&(sortable_id.clone(), id)))
            .cloned()
            .ok_or(EventStoreError::EventNotFound(id))
    }

    #[instrument(skip(self, batch), fields(events = batch.events.len()))]
    async fn write_events(&self, batch: WriteBatch<E>) -> EventStoreResult<WriteOutcome<E>> {
        let mut state = self.state.write();
        state.check_batch(&batch)?;

        let mut touched: Vec<String> = Vec::new();
        for event in &batch.events {
            for tag in event.tags() {
                if !touched.contains(tag) {
                    touched.push(tag.clone());
                }
            }
            state.index(event);
            state.by_id.insert(event.id(), event.sortable_unique_id().clone());
            state.log.insert(
                (event.sortable_unique_id().clone(), event.id()),
                event.clone(),
            );
        }

        let written_at = Timestamp::now();
        let tag_writes = touched
            .into_iter()
            .map(|tag| TagWriteResult {
                version: state.tag_version(&tag),
                tag,
                written_at,
            })
            .collect();
        debug!(total = state.log.len(), "batch appended");
        Ok(WriteOutcome {
            events: batch.events,
            tag_writes,
        })
    }

    async fn read_tag_stream(&self, tag: &Tag) -> EventStoreResult<Vec<TagStream>> {
        Ok(self
            .state
            .read()
            .tags
            .get(&tag.as_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn get_latest_tag_state(&self, tag: &Tag) -> EventStoreResult<LatestTagState> {
        let key = tag.as_string();
        let state = self.state.read();
        let Some(entries) = state.tags.get(&key) else {
            return Ok(LatestTagState::unseen(key));
        };
        Ok(LatestTagState {
            version: state.tag_version(&key),
            last_sortable_unique_id: entries.last().map(|entry| entry.sortable_unique_id.clone()),
            tag: key,
        })
    }

    async fn tag_exists(&self, tag: &Tag) -> EventStoreResult<bool> {
        Ok(self
            .state
            .read()
            .tags
            .get(&tag.as_string())
            .is_some_and(|entries| !entries.is_empty()))
    }

    async fn get_event_count(&self, since: Option<&SortableUniqueId>) -> EventStoreResult<u64> {
        let state = self.state.read();
        let is_after = after(since);
        let count = state.log.keys().filter(|(id, _)| is_after(id)).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn get_all_tags(&self, group: Option<&str>) -> EventStoreResult<Vec<TagInfo>> {
        let state = self.state.read();
        let mut infos: Vec<TagInfo> = state
            .tags
            .iter()
            .filter_map(|(tag, entries)| {
                let (tag_group, _) = Tag::split(tag);
                if group.is_some_and(|group| group != tag_group) {
                    return None;
                }
                Some(TagInfo {
                    tag: tag.clone(),
                    group: tag_group.to_string(),
                    event_count: u64::try_from(entries.len()).unwrap_or(u64::MAX),
                    first_sortable_unique_id: entries.first()?.sortable_unique_id.clone(),
                    last_sortable_unique_id: entries.last()?.sortable_unique_id.clone(),
                })
            })
            .collect();
        infos.sort_by(|left, right| left.tag.cmp(&right.tag));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use dcbcore::metadata::EventMetadata;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Noted {
        pub text: String,
    }

    dcbcore::payload_union! {
        pub enum NoteEvent {
            Noted,
        }
    }

    fn note(text: &str, second: u32, tags: &[&str]) -> Event<NoteEvent> {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, second).unwrap();
        Event::new(
            EventId::new(),
            SortableUniqueId::generate(at),
            Noted {
                text: text.to_string(),
            }
            .into(),
            tags.iter().map(ToString::to_string),
            EventMetadata::new(),
        )
    }

    fn tag(raw: &str) -> Tag {
        let (group, content) = Tag::split(raw);
        Tag::consistency(group, content).unwrap()
    }

    #[test]
    fn new_store_is_empty() {
        let store: InMemoryEventStore<NoteEvent> = InMemoryEventStore::new();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let store: InMemoryEventStore<NoteEvent> = InMemoryEventStore::new();
        #[allow(clippy::redundant_clone)]
        let other = store.clone();
        store
            .write_events(WriteBatch::new(vec![note("a", 1, &["Page:P1"])]))
            .await
            .unwrap();
        assert_eq!(other.len(), 1);
        assert!(Arc::ptr_eq(&store.state, &other.state));
    }

    #[tokio::test]
    async fn tag_versions_count_tag_stream_entries() {
        let store = InMemoryEventStore::new();
        let outcome = store
            .write_events(WriteBatch::new(vec![
                note("a", 1, &["Page:P1", "Book:B1"]),
                note("b", 2, &["Page:P1"]),
            ]))
            .await
            .unwrap();

        assert_eq!(outcome.tag_writes.len(), 2);
        assert_eq!(outcome.tag_writes[0].tag, "Page:P1");
        assert_eq!(outcome.tag_writes[0].version, TagVersion::new(2));
        assert_eq!(outcome.tag_writes[1].version, TagVersion::new(1));

        let latest = store.get_latest_tag_state(&tag("Page:P1")).await.unwrap();
        assert_eq!(latest.version, TagVersion::new(2));
        assert_eq!(
            latest.last_sortable_unique_id.as_ref(),
            Some(outcome.events[1].sortable_unique_id())
        );
    }

    #[tokio::test]
    async fn stale_expectation_rejects_the_whole_batch() {
        let store = InMemoryEventStore::new();
        store
            .write_events(WriteBatch::new(vec![note("a", 1, &["Page:P1"])]))
            .await
            .unwrap();

        let stale = WriteBatch::new(vec![note("b", 2, &["Page:P1", "Page:P2"])])
            .expect_version("Page:P1", TagVersion::initial())
            .expect_version("Page:P2", TagVersion::initial());
        let result = store.write_events(stale).await;

        assert!(matches!(
            result,
            Err(EventStoreError::VersionConflict { ref tag, current, .. })
                if tag == "Page:P1" && current == TagVersion::new(1)
        ));
        assert_eq!(store.len(), 1);
        assert!(!store.tag_exists(&tag("Page:P2")).await.unwrap());
    }

    #[tokio::test]
    async fn several_stale_tags_are_reported_together() {
        let store = InMemoryEventStore::new();
        store
            .write_events(WriteBatch::new(vec![note("a", 1, &["Page:P1", "Page:P2"])]))
            .await
            .unwrap();

        let stale = WriteBatch::new(vec![note("b", 2, &["Page:P1", "Page:P2"])])
            .expect_version("Page:P1", TagVersion::initial())
            .expect_version("Page:P2", TagVersion::initial());
        match store.write_events(stale).await {
            Err(EventStoreError::VersionConflicts(tags)) => {
                assert_eq!(tags, vec!["Page:P1", "Page:P2"]);
            }
            other => panic!("expected conflicts, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_event_ids_are_rejected() {
        let store = InMemoryEventStore::new();
        let event = note("a", 1, &["Page:P1"]);
        store
            .write_events(WriteBatch::new(vec![event.clone()]))
            .await
            .unwrap();
        let result = store.write_events(WriteBatch::new(vec![event.clone()])).await;
        assert!(matches!(result, Err(EventStoreError::DuplicateEventId(id)) if id == event.id()));
    }

    #[tokio::test]
    async fn late_events_are_indexed_in_sortable_order() {
        let store = InMemoryEventStore::new();
        store
            .write_events(WriteBatch::new(vec![note("late", 5, &["Page:P1"])]))
            .await
            .unwrap();
        store
            .write_events(WriteBatch::new(vec![note("early", 1, &["Page:P1"])]))
            .await
            .unwrap();

        let texts: Vec<String> = store
            .read_events_by_tag(&tag("Page:P1"), None)
            .await
            .unwrap()
            .into_iter()
            .map(|event| match event.payload() {
                NoteEvent::Noted(noted) => noted.text.clone(),
            })
            .collect();
        assert_eq!(texts, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn since_is_exclusive_and_max_count_caps_reads() {
        let store = InMemoryEventStore::new();
        let events: Vec<_> = (1..=5).map(|second| note("n", second, &["Page:P1"])).collect();
        store
            .write_events(WriteBatch::new(events.clone()))
            .await
            .unwrap();

        let since = events[1].sortable_unique_id();
        let rest = store.read_all_events(Some(since), None).await.unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].id(), events[2].id());

        let page = store.read_all_events(None, Some(2)).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(store.get_event_count(Some(since)).await.unwrap(), 3);
        assert_eq!(
            store
                .read_events_by_tag(&tag("Page:P1"), Some(since))
                .await
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn reading_a_missing_event_is_an_error() {
        let store: InMemoryEventStore<NoteEvent> = InMemoryEventStore::new();
        let id = EventId::new();
        assert!(matches!(
            store.read_event(id).await,
            Err(EventStoreError::EventNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn tag_summaries_filter_by_group() {
        let store = InMemoryEventStore::new();
        store
            .write_events(WriteBatch::new(vec![
                note("a", 1, &["Page:P1", "Book:B1"]),
                note("b", 2, &["Page:P2"]),
                note("c", 3, &["Page:P1"]),
            ]))
            .await
            .unwrap();

        let pages = store.get_all_tags(Some("Page")).await.unwrap();
        let summary: Vec<_> = pages
            .iter()
            .map(|info| (info.tag.as_str(), info.event_count))
            .collect();
        assert_eq!(summary, vec![("Page:P1", 2), ("Page:P2", 1)]);
        assert_eq!(store.get_all_tags(None).await.unwrap().len(), 3);
    }
}

//! Assertions for event log invariants.

use std::collections::HashMap;

use crate::event::{Event, TagStream};
use crate::payload::PayloadUnion;

/// Asserts that events are strictly ordered by sortable id.
///
/// # Panics
/// Panics if two neighbouring events are out of order or share an id.
pub fn assert_events_ordered<E: PayloadUnion>(events: &[Event<E>]) {
    for window in events.windows(2) {
        assert!(
            window[0].sortable_unique_id() < window[1].sortable_unique_id(),
            "Events are not ordered: {} should come before {}",
            window[0].sortable_unique_id(),
            window[1].sortable_unique_id()
        );
    }
}

/// Asserts that every event carries at least one tag.
///
/// # Panics
/// Panics on the first untagged event.
pub fn assert_events_tagged<E: PayloadUnion>(events: &[Event<E>]) {
    for event in events {
        assert!(!event.tags().is_empty(), "Event {} carries no tags", event.id());
    }
}

/// Asserts that the entries of each tag are strictly ordered by sortable id.
///
/// # Panics
/// Panics on the first entry that does not sort after its predecessor.
pub fn assert_tag_streams_ordered(entries: &[TagStream]) {
    let mut last: HashMap<&str, &TagStream> = HashMap::new();
    for entry in entries {
        if let Some(previous) = last.get(entry.tag.as_str()) {
            assert!(
                previous.sortable_unique_id < entry.sortable_unique_id,
                "Tag stream {} is not ordered: {} should come before {}",
                entry.tag,
                previous.sortable_unique_id,
                entry.sortable_unique_id
            );
        }
        last.insert(&entry.tag, entry);
    }
}

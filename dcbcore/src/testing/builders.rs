//! Builders for test events.

use chrono::{DateTime, Utc};

use crate::event::Event;
use crate::metadata::{CorrelationId, EventMetadata, UserId};
use crate::payload::PayloadUnion;
use crate::types::{EventId, SortableUniqueId};

/// Builder for [`Event`] instances.
///
/// # Example
/// ```rust,ignore
/// use dcbcore::testing::builders::EventBuilder;
///
/// let event = EventBuilder::new(StudentCreated { student_id: "S1".into(), name: "Ann".into(), max_class_count: 2 })
///     .tag("Student:S1")
///     .at(instant)
///     .build();
/// ```
pub struct EventBuilder<E> {
    payload: E,
    tags: Vec<String>,
    metadata: EventMetadata,
    event_id: Option<EventId>,
    sortable_unique_id: Option<SortableUniqueId>,
}

impl<E: PayloadUnion> EventBuilder<E> {
    /// Starts an event with `payload` and no tags.
    pub fn new(payload: impl Into<E>) -> Self {
        Self {
            payload: payload.into(),
            tags: Vec::new(),
            metadata: EventMetadata::new(),
            event_id: None,
            sortable_unique_id: None,
        }
    }

    /// Adds a tag in `Group:Content` form.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Adds several tags.
    #[must_use]
    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets a specific event id. A fresh one is generated otherwise.
    #[must_use]
    pub const fn with_event_id(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    /// Sets the exact sortable id.
    #[must_use]
    pub fn with_sortable_unique_id(mut self, id: SortableUniqueId) -> Self {
        self.sortable_unique_id = Some(id);
        self
    }

    /// Generates the sortable id from `at`.
    #[must_use]
    pub fn at(self, at: DateTime<Utc>) -> Self {
        self.with_sortable_unique_id(SortableUniqueId::generate(at))
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn correlated_by(mut self, correlation_id: CorrelationId) -> Self {
        self.metadata.correlation_id = Some(correlation_id);
        self
    }

    /// Sets the executing user.
    #[must_use]
    pub fn by_user(mut self, user: UserId) -> Self {
        self.metadata.executed_user = Some(user);
        self
    }

    /// Builds the event. Unset ids are generated from the current clock.
    pub fn build(self) -> Event<E> {
        Event::new(
            self.event_id.unwrap_or_else(EventId::new),
            self.sortable_unique_id
                .unwrap_or_else(SortableUniqueId::generate_now),
            self.payload,
            self.tags,
            self.metadata,
        )
    }
}

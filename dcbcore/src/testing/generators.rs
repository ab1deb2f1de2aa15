//! Property test generators for kernel value types.
//!
//! Every generator only produces values that pass the validation of the type
//! it generates.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use crate::metadata::{CausationId, CorrelationId, EventMetadata, UserId};
use crate::tag::Tag;
use crate::types::{EventId, SortableUniqueId, TagVersion, Timestamp};

/// Generates valid tag groups: one capitalised word.
pub fn arb_tag_group() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z]{0,15}"
}

/// Generates valid tag contents. Contents may contain the separator.
pub fn arb_tag_content() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9:_-]{0,31}"
}

/// Generates consistency tags.
///
/// # Example
/// ```rust,ignore
/// proptest! {
///     #[test]
///     fn consistency_tags_validate(tag in arb_consistency_tag()) {
///         prop_assert!(tag.validate().is_ok());
///     }
/// }
/// ```
pub fn arb_consistency_tag() -> impl Strategy<Value = Tag> {
    (arb_tag_group(), arb_tag_content()).prop_filter_map("Invalid Tag", |(group, content)| {
        Tag::consistency(group, content).ok()
    })
}

/// Generates index-only tags.
pub fn arb_index_only_tag() -> impl Strategy<Value = Tag> {
    (arb_tag_group(), arb_tag_content()).prop_filter_map("Invalid Tag", |(group, content)| {
        Tag::index_only(group, content).ok()
    })
}

/// Generates tags of either kind.
pub fn arb_tag() -> impl Strategy<Value = Tag> {
    prop_oneof![arb_consistency_tag(), arb_index_only_tag()]
}

/// Generates a non-empty tag set as an event would carry it.
pub fn arb_tag_set(
    size: impl Into<prop::collection::SizeRange>,
) -> impl Strategy<Value = Vec<Tag>> {
    prop::collection::vec(arb_tag(), size).prop_filter("at least one tag", |tags| !tags.is_empty())
}

/// Generates instants between 2000-01-01 and 2100-01-01 with 100ns precision.
pub fn arb_datetime() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800i64..4_102_444_800i64, 0u32..10_000_000u32).prop_filter_map(
        "Invalid instant",
        |(secs, hundreds_of_nanos)| Utc.timestamp_opt(secs, hundreds_of_nanos * 100).single(),
    )
}

/// Generates valid `Timestamp` values.
pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
    arb_datetime().prop_map(Timestamp::new)
}

/// Generates `SortableUniqueId` values with random timestamps and suffixes.
pub fn arb_sortable_unique_id() -> impl Strategy<Value = SortableUniqueId> {
    arb_datetime().prop_map(SortableUniqueId::generate)
}

/// Generates `n` strictly increasing `SortableUniqueId` values.
pub fn arb_ordered_sortable_unique_ids(n: usize) -> impl Strategy<Value = Vec<SortableUniqueId>> {
    arb_sortable_unique_id().prop_map(move |first| {
        std::iter::successors(Some(first), |id| Some(id.successor()))
            .take(n)
            .collect()
    })
}

/// Generates valid `EventId` values (`UUIDv7`).
pub fn arb_event_id() -> impl Strategy<Value = EventId> {
    any::<()>().prop_map(|()| EventId::new())
}

/// Generates small `TagVersion` values.
pub fn arb_tag_version() -> impl Strategy<Value = TagVersion> {
    (0u64..=1000u64).prop_map(TagVersion::new)
}

/// Generates valid `CorrelationId` values.
pub fn arb_correlation_id() -> impl Strategy<Value = CorrelationId> {
    "[a-z0-9-]{1,36}".prop_filter_map("Invalid CorrelationId", |s| CorrelationId::try_new(s).ok())
}

/// Generates valid `CausationId` values.
pub fn arb_causation_id() -> impl Strategy<Value = CausationId> {
    "[a-z0-9-]{1,36}".prop_filter_map("Invalid CausationId", |s| CausationId::try_new(s).ok())
}

/// Generates valid `UserId` values.
pub fn arb_user_id() -> impl Strategy<Value = UserId> {
    "[a-zA-Z0-9][a-zA-Z0-9._@-]{0,63}"
        .prop_filter_map("Invalid UserId", |s| UserId::try_new(s).ok())
}

/// Generates `EventMetadata` with any combination of fields populated.
pub fn arb_event_metadata() -> impl Strategy<Value = EventMetadata> {
    (
        prop::option::of(arb_causation_id()),
        prop::option::of(arb_correlation_id()),
        prop::option::of(arb_user_id()),
    )
        .prop_map(|(causation_id, correlation_id, executed_user)| EventMetadata {
            causation_id,
            correlation_id,
            executed_user,
        })
}

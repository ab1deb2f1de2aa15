//! Behaviour every [`EventStore`] backend must show.
//!
//! Each scenario takes a store factory and returns a [`ContractTestResult`]
//! describing the first violated expectation. Tags carry a fresh UUID so the
//! scenarios can run in parallel against one shared database.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use dcbcore::{
    Event, EventId, EventMetadata, EventStore, EventStoreError, SortableUniqueId, Tag, TagVersion,
    WriteBatch,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A violated contract expectation.
#[derive(Debug)]
pub struct ContractTestFailure {
    scenario: &'static str,
    detail: String,
}

impl ContractTestFailure {
    fn new(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scenario,
            detail: detail.into(),
        }
    }

    fn store_error(
        scenario: &'static str,
        operation: &'static str,
        error: EventStoreError,
    ) -> Self {
        Self::new(
            scenario,
            format!("{operation} operation returned unexpected error: {error}"),
        )
    }
}

impl fmt::Display for ContractTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.detail)
    }
}

impl std::error::Error for ContractTestFailure {}

/// Outcome of one contract scenario.
pub type ContractTestResult = Result<(), ContractTestFailure>;

/// Payload written by the contract scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractNoted {
    /// Free text, used to identify events in assertions
    pub label: String,
}

dcbcore::payload_union! {
    /// The only event type of the contract scenarios.
    pub enum ContractEvent {
        ContractNoted,
    }
}

fn contract_tag(scenario: &'static str, label: &str) -> Result<Tag, ContractTestFailure> {
    Tag::consistency("Contract", format!("{scenario}-{label}-{}", Uuid::now_v7())).map_err(
        |error| ContractTestFailure::new(scenario, format!("unable to construct tag: {error}")),
    )
}

fn contract_event(label: &str, at: DateTime<Utc>, tags: &[&Tag]) -> Event<ContractEvent> {
    Event::new(
        EventId::new(),
        SortableUniqueId::generate(at),
        ContractNoted {
            label: label.to_string(),
        }
        .into(),
        tags.iter().map(|tag| tag.as_string()),
        EventMetadata::new(),
    )
}

fn labels(events: &[Event<ContractEvent>]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event.payload() {
            ContractEvent::ContractNoted(noted) => noted.label.clone(),
        })
        .collect()
}

async fn write<S>(
    scenario: &'static str,
    store: &S,
    batch: WriteBatch<ContractEvent>,
) -> ContractTestResult
where
    S: EventStore<Event = ContractEvent>,
{
    store
        .write_events(batch)
        .await
        .map(|_| ())
        .map_err(|error| ContractTestFailure::store_error(scenario, "write_events", error))
}

async fn version_of<S>(
    scenario: &'static str,
    store: &S,
    tag: &Tag,
) -> Result<TagVersion, ContractTestFailure>
where
    S: EventStore<Event = ContractEvent>,
{
    store
        .get_latest_tag_state(tag)
        .await
        .map(|state| state.version)
        .map_err(|error| ContractTestFailure::store_error(scenario, "get_latest_tag_state", error))
}

/// A written event can be read back by id, by tag and from the full log.
pub async fn test_basic_read_write<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: EventStore<Event = ContractEvent>,
{
    const SCENARIO: &str = "basic_read_write";

    let store = make_store();
    let tag = contract_tag(SCENARIO, "single")?;
    let event = contract_event("first", Utc::now(), &[&tag]);
    write(SCENARIO, &store, WriteBatch::new(vec![event.clone()])).await?;

    let by_id = store
        .read_event(event.id())
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "read_event", error))?;
    if by_id != event {
        return Err(ContractTestFailure::new(
            SCENARIO,
            "event read by id differs from the written event",
        ));
    }

    let by_tag = store
        .read_events_by_tag(&tag, None)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "read_events_by_tag", error))?;
    if labels(&by_tag) != ["first"] {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!(
                "expected exactly the written event under its tag, observed {:?}",
                labels(&by_tag)
            ),
        ));
    }

    let all = store
        .read_all_events(None, None)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "read_all_events", error))?;
    if !all.iter().any(|candidate| candidate.id() == event.id()) {
        return Err(ContractTestFailure::new(SCENARIO, "written event missing from the full log"));
    }

    Ok(())
}

/// Unseen tags report version 0 and no events.
pub async fn test_missing_tag_reads<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: EventStore<Event = ContractEvent>,
{
    const SCENARIO: &str = "missing_tag_reads";

    let store = make_store();
    let tag = contract_tag(SCENARIO, "ghost")?;

    if version_of(SCENARIO, &store, &tag).await? != TagVersion::initial() {
        return Err(ContractTestFailure::new(SCENARIO, "unseen tag must have version 0"));
    }
    let exists = store
        .tag_exists(&tag)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "tag_exists", error))?;
    if exists {
        return Err(ContractTestFailure::new(SCENARIO, "unseen tag reported as existing"));
    }
    match store.read_event(EventId::new()).await {
        Err(EventStoreError::EventNotFound(_)) => Ok(()),
        Err(error) => Err(ContractTestFailure::store_error(SCENARIO, "read_event", error)),
        Ok(_) => Err(ContractTestFailure::new(
            SCENARIO,
            "read_event found an event that was never written",
        )),
    }
}

/// A batch conditional on a stale tag version fails with a conflict.
pub async fn test_concurrent_version_conflicts<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: EventStore<Event = ContractEvent>,
{
    const SCENARIO: &str = "concurrent_version_conflicts";

    let store = make_store();
    let tag = contract_tag(SCENARIO, "shared")?;
    write(
        SCENARIO,
        &store,
        WriteBatch::new(vec![contract_event("winner", Utc::now(), &[&tag])])
            .expect_version(tag.as_string(), TagVersion::initial()),
    )
    .await?;

    let loser = WriteBatch::new(vec![contract_event("loser", Utc::now(), &[&tag])])
        .expect_version(tag.as_string(), TagVersion::initial());
    match store.write_events(loser).await {
        Err(EventStoreError::VersionConflict { .. } | EventStoreError::VersionConflicts(_)) => {}
        Err(error) => return Err(ContractTestFailure::store_error(SCENARIO, "write_events", error)),
        Ok(_) => {
            return Err(ContractTestFailure::new(
                SCENARIO,
                "expected version conflict but write succeeded",
            ))
        }
    }

    if version_of(SCENARIO, &store, &tag).await? != TagVersion::new(1) {
        return Err(ContractTestFailure::new(SCENARIO, "rejected write advanced the tag version"));
    }
    Ok(())
}

/// A conflict on one tag leaves every other tag of the batch untouched.
pub async fn test_conflict_preserves_atomicity<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: EventStore<Event = ContractEvent>,
{
    const SCENARIO: &str = "conflict_preserves_atomicity";

    let store = make_store();
    let left = contract_tag(SCENARIO, "left")?;
    let right = contract_tag(SCENARIO, "right")?;
    write(
        SCENARIO,
        &store,
        WriteBatch::new(vec![contract_event("seed", Utc::now(), &[&left])]),
    )
    .await?;

    let stale = WriteBatch::new(vec![
        contract_event("a", Utc::now(), &[&left, &right]),
        contract_event("b", Utc::now(), &[&right]),
    ])
    .expect_version(left.as_string(), TagVersion::initial())
    .expect_version(right.as_string(), TagVersion::initial());
    if store.write_events(stale).await.is_ok() {
        return Err(ContractTestFailure::new(SCENARIO, "stale batch was committed"));
    }

    if version_of(SCENARIO, &store, &left).await? != TagVersion::new(1)
        || version_of(SCENARIO, &store, &right).await? != TagVersion::initial()
    {
        return Err(ContractTestFailure::new(
            SCENARIO,
            "a rejected batch partially advanced tag versions",
        ));
    }
    Ok(())
}

/// Multi-tag writes advance every tag, and tag reads are ordered by sortable
/// id even when older ids are written later.
pub async fn test_tag_streams_are_ordered<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S,
    S: EventStore<Event = ContractEvent>,
{
    const SCENARIO: &str = "tag_streams_are_ordered";

    let store = make_store();
    let shared = contract_tag(SCENARIO, "shared")?;
    let other = contract_tag(SCENARIO, "other")?;
    let now = Utc::now();
    write(
        SCENARIO,
        &store,
        WriteBatch::new(vec![contract_event("second", now, &[&shared, &other])]),
    )
    .await?;
    write(
        SCENARIO,
        &store,
        WriteBatch::new(vec![contract_event("first", now - Duration::seconds(1), &[&shared])]),
    )
    .await?;

    let events = store
        .read_events_by_tag(&shared, None)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "read_events_by_tag", error))?;
    if labels(&events) != ["first", "second"] {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("tag events out of order: {:?}", labels(&events)),
        ));
    }

    let entries = store
        .read_tag_stream(&shared)
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "read_tag_stream", error))?;
    let version = version_of(SCENARIO, &store, &shared).await?;
    if TagVersion::initial().advanced_by(entries.len()) != version
        || version != TagVersion::new(2)
    {
        return Err(ContractTestFailure::new(
            SCENARIO,
            format!("tag version {version} does not match {} stream entries", entries.len()),
        ));
    }
    if version_of(SCENARIO, &store, &other).await? != TagVersion::new(1) {
        return Err(ContractTestFailure::new(SCENARIO, "second tag of the event was not advanced"));
    }

    let since = events[0].sortable_unique_id().clone();
    let newer = store
        .read_events_by_tag(&shared, Some(&since))
        .await
        .map_err(|error| ContractTestFailure::store_error(SCENARIO, "read_events_by_tag", error))?;
    if labels(&newer) != ["second"] {
        return Err(ContractTestFailure::new(SCENARIO, "`since` bound is not exclusive"));
    }
    Ok(())
}

/// Instantiates the contract suite as `#[tokio::test]`s for one backend.
///
/// ```rust,ignore
/// dcbcore_testing::event_store_contract_tests! {
///     suite = in_memory,
///     make_store = InMemoryEventStore::<ContractEvent>::new,
/// }
/// ```
#[macro_export]
macro_rules! event_store_contract_tests {
    (suite = $suite:ident, make_store = $make_store:expr $(,)?) => {
        #[allow(non_snake_case)]
        mod $suite {
            #[allow(unused_imports)]
            use super::*;
            use $crate::contract::{
                test_basic_read_write, test_concurrent_version_conflicts,
                test_conflict_preserves_atomicity, test_missing_tag_reads,
                test_tag_streams_are_ordered,
            };

            #[tokio::test(flavor = "multi_thread")]
            async fn basic_read_write_contract() {
                test_basic_read_write($make_store)
                    .await
                    .expect("event store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn missing_tag_reads_contract() {
                test_missing_tag_reads($make_store)
                    .await
                    .expect("event store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn concurrent_version_conflicts_contract() {
                test_concurrent_version_conflicts($make_store)
                    .await
                    .expect("event store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn conflict_preserves_atomicity_contract() {
                test_conflict_preserves_atomicity($make_store)
                    .await
                    .expect("event store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn tag_streams_are_ordered_contract() {
                test_tag_streams_are_ordered($make_store)
                    .await
                    .expect("event store contract failed");
            }
        }
    };
}

pub use event_store_contract_tests;

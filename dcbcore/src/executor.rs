//! Command execution.
//!
//! [`CommandExecutor`] runs the full write protocol for one command:
//!
//! 0. `validate` the command input,
//! 1. Reserve and 2. Decide by running the handler against a fresh
//!    [`CommandContext`],
//! 3. Validate every tag of the produced events and collect the versions the
//!    handler reserved for their consistency tags,
//! 4. Commit all produced events in one [`WriteBatch`] conditional on those
//!    versions.
//!
//! The store checks every expected version under one lock or transaction, so
//! either all events and tag versions advance or none do. A moved version is
//! reported as [`CommandError::ConcurrencyConflict`]; the caller (or
//! [`CommandExecutor::execute_with_retry`] for idempotent commands) may re-run
//! the whole cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::command::{
    CommandContext, CommandHandler, EventOrNone, ExecutionContext, ExecutionResult,
};
use crate::config::ExecutorConfig;
use crate::domain::{Domain, DomainTypes};
use crate::errors::{CommandError, CommandResult, ProjectionResult, RegistryError, ValidationError};
use crate::event::Event;
use crate::event_store::{EventStore, WriteBatch};
use crate::payload::PayloadUnion;
use crate::tag::Tag;
use crate::tag_projection::{TagState, TagStateCache, TagStateLoader};
use crate::types::{EventId, SortableUniqueIdGenerator};

/// Runs commands against an event store.
///
/// # Example
///
/// ```rust,ignore
/// let executor = CommandExecutor::new(store, Arc::new(domain_types()))
///     .with_tag_cache(Arc::new(TagStateCache::new()));
///
/// let result = executor.execute(&CreateStudent::new("S1", "Ann", 2)).await?;
/// assert_eq!(result.tag_version("Student:S1"), Some(TagVersion::new(1)));
/// ```
pub struct CommandExecutor<D: Domain, S> {
    store: S,
    domain: Arc<DomainTypes<D>>,
    config: ExecutorConfig,
    cache: Option<Arc<TagStateCache<D>>>,
    ids: SortableUniqueIdGenerator,
}

impl<D, S> CommandExecutor<D, S>
where
    D: Domain,
    S: EventStore<Event = D::Event>,
{
    /// Creates an executor with the default configuration and no cache.
    pub fn new(store: S, domain: Arc<DomainTypes<D>>) -> Self {
        Self {
            store,
            domain,
            config: ExecutorConfig::default(),
            cache: None,
            ids: SortableUniqueIdGenerator::new(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub const fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Reads tag states through `cache`.
    #[must_use]
    pub fn with_tag_cache(mut self, cache: Arc<TagStateCache<D>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The domain registries.
    pub fn domain(&self) -> &DomainTypes<D> {
        &self.domain
    }

    /// Executes `command` under a fresh [`ExecutionContext`].
    pub async fn execute<C>(&self, command: &C) -> CommandResult<ExecutionResult<D::Event>>
    where
        C: CommandHandler<D> + ?Sized,
    {
        self.execute_with_context(command, &ExecutionContext::new()).await
    }

    /// Executes `command` once.
    ///
    /// # Errors
    ///
    /// * `ValidationFailed` - the command input is invalid
    /// * `InvalidTag` - an event has no tags or a malformed one
    /// * `BusinessRuleViolation` - the handler rejected the command
    /// * `ConcurrencyConflict` - a reserved consistency tag moved before commit
    /// * `Registry` / `Projection` / `EventStore` - infrastructure failures
    #[instrument(skip(self, command, context), fields(command = command.command_name()))]
    pub async fn execute_with_context<C>(
        &self,
        command: &C,
        context: &ExecutionContext,
    ) -> CommandResult<ExecutionResult<D::Event>>
    where
        C: CommandHandler<D> + ?Sized,
    {
        let started = Instant::now();
        command.validate()?;

        let mut ctx = CommandContext::new(&self.store, &self.domain, self.cache.as_deref());
        let decision = command.handle(&mut ctx).await?;
        let (reserved, mut pending) = ctx.into_parts();
        if let EventOrNone::Event(event) = decision {
            pending.push(event);
        }

        if pending.is_empty() {
            debug!("command produced no event");
            return Ok(ExecutionResult {
                events: Vec::new(),
                tag_writes: Vec::new(),
                duration: started.elapsed(),
            });
        }

        let metadata = context.event_metadata();
        let mut expected_versions = BTreeMap::new();
        let mut events = Vec::with_capacity(pending.len());
        for pending_event in pending {
            self.check_registered(&pending_event.payload)?;
            check_tags(&pending_event.tags)?;
            for tag in pending_event.tags.iter().filter(|tag| tag.is_consistency_tag()) {
                let key = tag.as_string();
                if let Some(version) = reserved.get(&key) {
                    expected_versions.insert(key, *version);
                }
            }
            events.push(Event::new(
                EventId::new(),
                self.ids.next_id(),
                pending_event.payload,
                pending_event.tags.iter().map(Tag::as_string),
                metadata.clone(),
            ));
        }

        let batch = WriteBatch {
            events,
            expected_versions,
        };
        let outcome = match self.store.write_events(batch).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let error = CommandError::from(error);
                if let CommandError::ConcurrencyConflict { tags } = &error {
                    debug!(?tags, "reserved tag versions moved before commit");
                }
                return Err(error);
            }
        };

        info!(
            events = outcome.events.len(),
            tags = outcome.tag_writes.len(),
            "command committed"
        );
        Ok(ExecutionResult {
            events: outcome.events,
            tag_writes: outcome.tag_writes,
            duration: started.elapsed(),
        })
    }

    /// Executes `command`, re-running the whole cycle on conflicts when the
    /// command declares itself idempotent.
    ///
    /// Non-idempotent commands run exactly once. Delays follow the configured
    /// exponential backoff with jitter.
    pub async fn execute_with_retry<C>(
        &self,
        command: &C,
        context: &ExecutionContext,
    ) -> CommandResult<ExecutionResult<D::Event>>
    where
        C: CommandHandler<D> + ?Sized,
    {
        if !command.is_idempotent() {
            return self.execute_with_context(command, context).await;
        }

        let max_attempts = u32::from(self.config.retry.max_attempts);
        let mut attempt = 0;
        loop {
            match self.execute_with_context(command, context).await {
                Err(error) if error.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(
                        command = command.command_name(),
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "retrying after concurrency conflict"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Projects `tag` with the named projector, outside any command.
    pub async fn get_tag_state(
        &self,
        tag: &Tag,
        projector_name: &str,
    ) -> ProjectionResult<TagState<D::TagState>> {
        let loader = TagStateLoader::new(&self.store, &self.domain);
        match self.cache.as_deref() {
            Some(cache) => loader.with_cache(cache).load(tag, projector_name).await,
            None => loader.load(tag, projector_name).await,
        }
    }

    fn check_registered(&self, payload: &D::Event) -> CommandResult<()> {
        let type_name = payload.type_name();
        if self.domain.events().is_registered(type_name) {
            Ok(())
        } else {
            Err(RegistryError::UnknownType {
                registry: "event",
                name: type_name.to_string(),
            }
            .into())
        }
    }
}

fn check_tags(tags: &[Tag]) -> CommandResult<()> {
    if tags.is_empty() {
        return Err(ValidationError::EmptyField {
            field: "tags".to_string(),
        }
        .into());
    }
    for tag in tags {
        tag.validate()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MaxRetryAttempts, RetryBaseDelayMs, RetryConfig};
    use crate::errors::{EventStoreError, EventStoreResult};
    use crate::event::{TagInfo, TagStream, TagWriteResult};
    use crate::event_store::{LatestTagState, WriteOutcome};
    use crate::metadata::UserId;
    use crate::tag_projection::{TagProjector, TagStatePayload};
    use crate::types::{SortableUniqueId, TagVersion, Timestamp};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct BookLent {
        pub reader: String,
    }

    crate::payload_union! {
        pub enum LibraryEvent {
            BookLent,
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Loans {
        pub count: u32,
    }

    crate::payload_union! {
        pub enum LibraryState {
            Loans,
        }
    }

    pub struct Library;

    impl Domain for Library {
        type Event = LibraryEvent;
        type TagState = LibraryState;
        type MultiState = LibraryState;
    }

    pub struct BookProjector;

    impl TagProjector<Library> for BookProjector {
        const NAME: &'static str = "BookProjector";
        const VERSION: &'static str = "1";

        fn project(
            current: TagStatePayload<LibraryState>,
            _event: &Event<LibraryEvent>,
        ) -> TagStatePayload<LibraryState> {
            let count = match current {
                TagStatePayload::State(LibraryState::Loans(loans)) => loans.count,
                TagStatePayload::Empty => 0,
            };
            TagStatePayload::State(Loans { count: count + 1 }.into())
        }
    }

    /// Records batches; reports the first `conflicts` writes as conflicts.
    #[derive(Default)]
    struct ScriptedStore {
        versions: HashMap<String, u64>,
        batches: Mutex<Vec<WriteBatch<LibraryEvent>>>,
        conflicts: AtomicUsize,
    }

    impl ScriptedStore {
        fn with_version(mut self, tag: &str, version: u64) -> Self {
            self.versions.insert(tag.to_string(), version);
            self
        }

        fn conflicting(self, times: usize) -> Self {
            self.conflicts.store(times, Ordering::SeqCst);
            self
        }
    }

    #[async_trait]
    impl EventStore for ScriptedStore {
        type Event = LibraryEvent;

        async fn read_all_events(
            &self,
            _since: Option<&SortableUniqueId>,
            _max_count: Option<usize>,
        ) -> EventStoreResult<Vec<Event<LibraryEvent>>> {
            Ok(Vec::new())
        }

        async fn read_events_by_tag(
            &self,
            _tag: &Tag,
            _since: Option<&SortableUniqueId>,
        ) -> EventStoreResult<Vec<Event<LibraryEvent>>> {
            Ok(Vec::new())
        }

        async fn read_event(&self, id: EventId) -> EventStoreResult<Event<LibraryEvent>> {
            Err(EventStoreError::EventNotFound(id))
        }

        async fn write_events(
            &self,
            batch: WriteBatch<LibraryEvent>,
        ) -> EventStoreResult<WriteOutcome<LibraryEvent>> {
            let pending = self.conflicts.load(Ordering::SeqCst);
            if pending > 0 {
                self.conflicts.store(pending - 1, Ordering::SeqCst);
                return Err(EventStoreError::VersionConflicts(
                    batch.expected_versions.keys().cloned().collect(),
                ));
            }
            let tag_writes = batch
                .events
                .iter()
                .flat_map(|event| event.tags().to_vec())
                .map(|tag| TagWriteResult {
                    version: TagVersion::new(self.versions.get(&tag).copied().unwrap_or(0) + 1),
                    tag,
                    written_at: Timestamp::now(),
                })
                .collect();
            let events = batch.events.clone();
            self.batches.lock().push(batch);
            Ok(WriteOutcome { events, tag_writes })
        }

        async fn read_tag_stream(&self, _tag: &Tag) -> EventStoreResult<Vec<TagStream>> {
            Ok(Vec::new())
        }

        async fn get_latest_tag_state(&self, tag: &Tag) -> EventStoreResult<LatestTagState> {
            let mut latest = LatestTagState::unseen(tag.as_string());
            latest.version = TagVersion::new(self.versions.get(&tag.as_string()).copied().unwrap_or(0));
            Ok(latest)
        }

        async fn tag_exists(&self, tag: &Tag) -> EventStoreResult<bool> {
            Ok(self.versions.contains_key(&tag.as_string()))
        }

        async fn get_event_count(&self, _since: Option<&SortableUniqueId>) -> EventStoreResult<u64> {
            Ok(0)
        }

        async fn get_all_tags(&self, _group: Option<&str>) -> EventStoreResult<Vec<TagInfo>> {
            Ok(Vec::new())
        }
    }

    struct LendBook {
        book: &'static str,
        reader: &'static str,
        idempotent: bool,
    }

    #[async_trait]
    impl CommandHandler<Library> for LendBook {
        fn command_name(&self) -> &'static str {
            "LendBook"
        }

        fn validate(&self) -> CommandResult<()> {
            if self.reader.is_empty() {
                return Err(CommandError::ValidationFailed("reader is required".to_string()));
            }
            Ok(())
        }

        fn is_idempotent(&self) -> bool {
            self.idempotent
        }

        async fn handle(
            &self,
            ctx: &mut CommandContext<'_, Library>,
        ) -> CommandResult<EventOrNone<LibraryEvent>> {
            let book = Tag::consistency("Book", self.book)?;
            let reader = Tag::consistency("Reader", self.reader)?;
            crate::require!(ctx.tag_exists(&book).await?, "unknown book");
            Ok(EventOrNone::event(
                BookLent {
                    reader: self.reader.to_string(),
                },
                [book, reader, Tag::index_only("Shelf", "A")?],
            ))
        }
    }

    struct Browse;

    #[async_trait]
    impl CommandHandler<Library> for Browse {
        async fn handle(
            &self,
            _ctx: &mut CommandContext<'_, Library>,
        ) -> CommandResult<EventOrNone<LibraryEvent>> {
            Ok(EventOrNone::none())
        }
    }

    struct LendTwice;

    #[async_trait]
    impl CommandHandler<Library> for LendTwice {
        async fn handle(
            &self,
            ctx: &mut CommandContext<'_, Library>,
        ) -> CommandResult<EventOrNone<LibraryEvent>> {
            let first = Tag::consistency("Book", "B1")?;
            let second = Tag::consistency("Book", "B2")?;
            ctx.get_tag_state::<BookProjector>(&first).await?;
            ctx.get_tag_state::<BookProjector>(&second).await?;
            ctx.append_event(crate::command::EventWithTags::new(
                BookLent {
                    reader: "R1".to_string(),
                },
                [first],
            ));
            Ok(EventOrNone::event(
                BookLent {
                    reader: "R1".to_string(),
                },
                [second],
            ))
        }
    }

    fn domain() -> Arc<DomainTypes<Library>> {
        Arc::new(
            DomainTypes::builder()
                .event::<BookLent>()
                .tag_projector::<BookProjector>()
                .tag_state::<Loans>()
                .build()
                .unwrap(),
        )
    }

    fn lend(book: &'static str, reader: &'static str) -> LendBook {
        LendBook {
            book,
            reader,
            idempotent: false,
        }
    }

    fn fast_retries() -> ExecutorConfig {
        ExecutorConfig {
            retry: RetryConfig {
                max_attempts: MaxRetryAttempts::try_new(3).unwrap(),
                base_delay: RetryBaseDelayMs::try_new(1).unwrap(),
                ..RetryConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn commit_expects_only_reserved_consistency_tags() {
        let executor = CommandExecutor::new(ScriptedStore::default().with_version("Book:B1", 4), domain());

        let result = executor.execute(&lend("B1", "R1")).await.unwrap();

        assert_eq!(result.events.len(), 1);
        assert_eq!(result.tag_version("Book:B1"), Some(TagVersion::new(5)));
        let batches = executor.store().batches.lock();
        let expected: Vec<_> = batches[0].expected_versions.iter().collect();
        assert_eq!(expected, vec![(&"Book:B1".to_string(), &TagVersion::new(4))]);
        assert_eq!(batches[0].events[0].tags(), ["Book:B1", "Reader:R1", "Shelf:A"]);
    }

    #[tokio::test]
    async fn validation_runs_before_the_handler() {
        let executor = CommandExecutor::new(ScriptedStore::default(), domain());
        let result = executor.execute(&lend("B1", "")).await;
        assert!(matches!(result, Err(CommandError::ValidationFailed(_))));
        assert!(executor.store().batches.lock().is_empty());
    }

    #[tokio::test]
    async fn business_rule_violation_writes_nothing() {
        let executor = CommandExecutor::new(ScriptedStore::default(), domain());
        let result = executor.execute(&lend("B404", "R1")).await;
        assert!(matches!(result, Err(CommandError::BusinessRuleViolation(ref reason)) if reason == "unknown book"));
        assert!(executor.store().batches.lock().is_empty());
    }

    #[tokio::test]
    async fn no_event_is_a_successful_no_op() {
        let executor = CommandExecutor::new(ScriptedStore::default(), domain());
        let result = executor.execute(&Browse).await.unwrap();
        assert!(result.is_no_op());
        assert!(executor.store().batches.lock().is_empty());
    }

    #[tokio::test]
    async fn appended_events_commit_in_one_batch() {
        let executor = CommandExecutor::new(ScriptedStore::default(), domain());
        let result = executor.execute(&LendTwice).await.unwrap();

        assert_eq!(result.events.len(), 2);
        let batches = executor.store().batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].expected_versions.len(), 2);
        assert!(batches[0].events[0].sortable_unique_id() < batches[0].events[1].sortable_unique_id());
    }

    #[tokio::test]
    async fn store_conflicts_surface_as_concurrency_conflicts() {
        let store = ScriptedStore::default().with_version("Book:B1", 1).conflicting(1);
        let executor = CommandExecutor::new(store, domain()).with_config(fast_retries());

        let result = executor
            .execute_with_retry(&lend("B1", "R1"), &ExecutionContext::new())
            .await;

        match result {
            Err(CommandError::ConcurrencyConflict { tags }) => assert_eq!(tags, vec!["Book:B1"]),
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn idempotent_commands_are_retried_on_conflict() {
        let store = ScriptedStore::default().with_version("Book:B1", 1).conflicting(2);
        let executor = CommandExecutor::new(store, domain()).with_config(fast_retries());
        let command = LendBook {
            idempotent: true,
            ..lend("B1", "R1")
        };

        let result = executor
            .execute_with_retry(&command, &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(result.events.len(), 1);
        assert!(logs_contain("retrying after concurrency conflict"));
        assert!(logs_contain("command committed"));
    }

    #[tokio::test]
    async fn execution_context_is_recorded_in_metadata() {
        let executor = CommandExecutor::new(ScriptedStore::default().with_version("Book:B1", 1), domain());
        let context = ExecutionContext::new().with_user(UserId::try_new("librarian").unwrap());

        let result = executor
            .execute_with_context(&lend("B1", "R1"), &context)
            .await
            .unwrap();

        let metadata = result.event().unwrap().metadata();
        assert_eq!(metadata.executed_user, context.user);
        assert_eq!(metadata.correlation_id, context.correlation_id);
    }

    #[tokio::test]
    async fn events_without_tags_are_rejected() {
        struct Untagged;

        #[async_trait]
        impl CommandHandler<Library> for Untagged {
            async fn handle(
                &self,
                _ctx: &mut CommandContext<'_, Library>,
            ) -> CommandResult<EventOrNone<LibraryEvent>> {
                Ok(EventOrNone::event(
                    BookLent {
                        reader: "R1".to_string(),
                    },
                    Vec::<Tag>::new(),
                ))
            }
        }

        let executor = CommandExecutor::new(ScriptedStore::default(), domain());
        assert!(matches!(
            executor.execute(&Untagged).await,
            Err(CommandError::InvalidTag(ValidationError::EmptyField { .. }))
        ));
    }
}

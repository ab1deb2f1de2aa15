//! Command handlers and the context they run in.
//!
//! A command handler implements the Reserve and Decide steps of the write
//! protocol. While handling, it reads tag states and tag existence through a
//! [`CommandContext`]; every read records the version the tag had at that
//! moment. The handler then returns either no event or one event with the tags
//! it must be written under. The executor validates the recorded versions of
//! the event's consistency tags when it commits.
//!
//! # Example
//!
//! ```rust,ignore
//! struct CreateStudent {
//!     student_id: String,
//!     name: String,
//! }
//!
//! #[async_trait]
//! impl CommandHandler<ClassRoomDomain> for CreateStudent {
//!     fn command_name(&self) -> &'static str {
//!         "CreateStudent"
//!     }
//!
//!     async fn handle(
//!         &self,
//!         ctx: &mut CommandContext<'_, ClassRoomDomain>,
//!     ) -> CommandResult<EventOrNone<ClassRoomEvent>> {
//!         let tag = StudentTag::new(&self.student_id).to_tag();
//!         require!(!ctx.tag_exists(&tag).await?, "student already exists");
//!         Ok(EventOrNone::event(
//!             StudentCreated { student_id: self.student_id.clone(), name: self.name.clone() },
//!             [tag],
//!         ))
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Domain, DomainTypes};
use crate::errors::CommandResult;
use crate::event::{Event, TagWriteResult};
use crate::event_store::{EventStore, LatestTagState};
use crate::metadata::{CausationId, CorrelationId, EventMetadata, UserId};
use crate::tag::Tag;
use crate::tag_projection::{TagProjector, TagState, TagStateCache, TagStateLoader};
use crate::types::TagVersion;

/// An event payload together with the tags it is written under.
#[derive(Debug, Clone, PartialEq)]
pub struct EventWithTags<E> {
    /// The payload
    pub payload: E,
    /// Consistency and index-only tags
    pub tags: Vec<Tag>,
}

impl<E> EventWithTags<E> {
    /// Pairs a payload with its tags.
    pub fn new(payload: impl Into<E>, tags: impl IntoIterator<Item = Tag>) -> Self {
        Self {
            payload: payload.into(),
            tags: tags.into_iter().collect(),
        }
    }
}

/// The outcome of the Decide step.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOrNone<E> {
    /// Write this event
    Event(EventWithTags<E>),
    /// Nothing to write; the command still succeeds
    None,
}

impl<E> EventOrNone<E> {
    /// Decides to write `payload` under `tags`.
    pub fn event(payload: impl Into<E>, tags: impl IntoIterator<Item = Tag>) -> Self {
        Self::Event(EventWithTags::new(payload, tags))
    }

    /// Decides to write nothing.
    pub const fn none() -> Self {
        Self::None
    }
}

/// A command: reads tag states, applies business rules, returns at most one
/// event.
///
/// Handlers must not write to the store themselves; additional events go
/// through [`CommandContext::append_event`] so they commit in the same atomic
/// batch.
#[async_trait]
pub trait CommandHandler<D: Domain>: Send + Sync {
    /// Name used in logs and errors.
    fn command_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Input validation run before any state is read.
    fn validate(&self) -> CommandResult<()> {
        Ok(())
    }

    /// `true` if running the command twice has the same effect as once.
    ///
    /// Only idempotent commands are re-run automatically on conflicts.
    fn is_idempotent(&self) -> bool {
        false
    }

    /// Reserve and Decide.
    async fn handle(&self, ctx: &mut CommandContext<'_, D>) -> CommandResult<EventOrNone<D::Event>>;
}

/// What a command handler can see and do while it runs.
pub struct CommandContext<'a, D: Domain> {
    store: &'a dyn EventStore<Event = D::Event>,
    domain: &'a DomainTypes<D>,
    loader: TagStateLoader<'a, D>,
    accessed: BTreeMap<String, TagVersion>,
    appended: Vec<EventWithTags<D::Event>>,
}

impl<'a, D: Domain> CommandContext<'a, D> {
    /// A context reading from `store`, optionally through `cache`.
    pub fn new(
        store: &'a dyn EventStore<Event = D::Event>,
        domain: &'a DomainTypes<D>,
        cache: Option<&'a TagStateCache<D>>,
    ) -> Self {
        let loader = TagStateLoader::new(store, domain);
        let loader = match cache {
            Some(cache) => loader.with_cache(cache),
            None => loader,
        };
        Self {
            store,
            domain,
            loader,
            accessed: BTreeMap::new(),
            appended: Vec::new(),
        }
    }

    /// The domain registries.
    pub const fn domain(&self) -> &DomainTypes<D> {
        self.domain
    }

    fn reserve(&mut self, tag: &Tag, version: TagVersion) {
        self.accessed.entry(tag.as_string()).or_insert(version);
    }

    /// Projects `tag` with projector `P` and reserves its version.
    pub async fn get_tag_state<P: TagProjector<D>>(
        &mut self,
        tag: &Tag,
    ) -> CommandResult<TagState<D::TagState>> {
        self.get_tag_state_by_name(tag, P::NAME).await
    }

    /// Projects `tag` with the named projector and reserves its version.
    pub async fn get_tag_state_by_name(
        &mut self,
        tag: &Tag,
        projector_name: &str,
    ) -> CommandResult<TagState<D::TagState>> {
        let state = self.loader.load(tag, projector_name).await?;
        self.reserve(tag, state.version);
        Ok(state)
    }

    /// Projects `tag` with the projector its group resolves to by convention.
    pub async fn get_tag_state_by_convention(
        &mut self,
        tag: &Tag,
    ) -> CommandResult<TagState<D::TagState>> {
        let state = self.loader.load_by_convention(tag).await?;
        self.reserve(tag, state.version);
        Ok(state)
    }

    /// Reads the store-level version of `tag` and reserves it.
    pub async fn get_latest_tag_state(&mut self, tag: &Tag) -> CommandResult<LatestTagState> {
        let latest = self.store.get_latest_tag_state(tag).await?;
        self.reserve(tag, latest.version);
        Ok(latest)
    }

    /// `true` if any event carries `tag`; reserves the tag's version.
    pub async fn tag_exists(&mut self, tag: &Tag) -> CommandResult<bool> {
        let latest = self.get_latest_tag_state(tag).await?;
        Ok(latest.version > TagVersion::initial())
    }

    /// Adds an event to the batch committed with the handler's result.
    pub fn append_event(&mut self, event: EventWithTags<D::Event>) {
        self.appended.push(event);
    }

    /// Versions reserved so far, keyed by tag string.
    pub const fn reserved_versions(&self) -> &BTreeMap<String, TagVersion> {
        &self.accessed
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<String, TagVersion>, Vec<EventWithTags<D::Event>>) {
        (self.accessed, self.appended)
    }
}

/// Correlation data attached to every event a command writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Workflow the command belongs to
    pub correlation_id: Option<CorrelationId>,
    /// What caused the command
    pub causation_id: Option<CausationId>,
    /// Who executes the command
    pub user: Option<UserId>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            correlation_id: CorrelationId::try_new(Uuid::now_v7().to_string()).ok(),
            causation_id: None,
            user: None,
        }
    }
}

impl ExecutionContext {
    /// A context with a fresh correlation id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continues an existing workflow.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Records what caused the command.
    #[must_use]
    pub fn with_causation_id(mut self, causation_id: CausationId) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Records who executes the command.
    #[must_use]
    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    /// Metadata for the events written under this context.
    pub fn event_metadata(&self) -> EventMetadata {
        EventMetadata {
            causation_id: self.causation_id.clone(),
            correlation_id: self.correlation_id.clone(),
            executed_user: self.user.clone(),
        }
    }
}

/// What a successful command produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult<E> {
    /// Events as written; empty when the handler decided on no event
    pub events: Vec<Event<E>>,
    /// New version of every tag the write touched
    pub tag_writes: Vec<TagWriteResult>,
    /// Wall time of the whole cycle
    pub duration: Duration,
}

impl<E> ExecutionResult<E> {
    /// The first (for single-event commands, the only) written event.
    pub fn event(&self) -> Option<&Event<E>> {
        self.events.first()
    }

    /// `true` if nothing was written.
    pub fn is_no_op(&self) -> bool {
        self.events.is_empty()
    }

    /// New version of `tag`, if the write touched it.
    pub fn tag_version(&self, tag: &str) -> Option<TagVersion> {
        self.tag_writes
            .iter()
            .find(|write| write.tag == tag)
            .map(|write| write.version)
    }
}

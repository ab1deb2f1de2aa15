//! Tag projector engine.
//!
//! A tag projector folds the events of one tag, in ascending sortable-id
//! order, into a [`TagStatePayload`]. Projection is a pure function of the
//! ordered event list: the engine sorts and de-duplicates its input before
//! folding, so the same set of events always yields the same payload.
//!
//! [`TagStateLoader`] reconstructs states from an [`EventStore`], optionally
//! through a [`TagStateCache`] that is advanced incrementally instead of
//! replayed from the start.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tracing::{debug, instrument};

use crate::domain::{Domain, DomainTypes};
use crate::errors::{ProjectionError, ProjectionResult, RegistryError, RegistryResult};
use crate::event::{sort_and_dedup, Event};
use crate::event_store::{EventStore, LatestTagState};
use crate::payload::PayloadUnion;
use crate::tag::Tag;
use crate::types::{SortableUniqueId, TagVersion};

/// Type name of the universal initial tag-state payload.
pub const EMPTY_TAG_STATE_PAYLOAD: &str = "EmptyTagStatePayload";

/// A tag-state payload: either the universal empty state or a domain state.
#[derive(Debug, Clone, PartialEq)]
pub enum TagStatePayload<S> {
    /// No event has been folded yet (or the projector reset the state).
    Empty,
    /// A domain-specific state.
    State(S),
}

impl<S: PayloadUnion> TagStatePayload<S> {
    /// Registered type name; [`EMPTY_TAG_STATE_PAYLOAD`] for the empty state.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => EMPTY_TAG_STATE_PAYLOAD,
            Self::State(state) => state.type_name(),
        }
    }

    /// `true` for the empty state.
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The domain state, if any.
    pub const fn as_state(&self) -> Option<&S> {
        match self {
            Self::Empty => None,
            Self::State(state) => Some(state),
        }
    }
}

impl<S> Default for TagStatePayload<S> {
    fn default() -> Self {
        Self::Empty
    }
}

/// The projection of one tag under one projector.
#[derive(Debug, Clone, PartialEq)]
pub struct TagState<S> {
    /// Folded payload
    pub payload: TagStatePayload<S>,
    /// Number of events folded into `payload`
    pub version: TagVersion,
    /// Newest folded event
    pub last_sortable_unique_id: Option<SortableUniqueId>,
    /// Group of the projected tag
    pub tag_group: String,
    /// Content of the projected tag
    pub tag_content: String,
    /// Projector that produced the payload
    pub projector_name: String,
    /// Version of that projector
    pub projector_version: String,
}

impl<S: PayloadUnion> TagState<S> {
    /// Initial state of `tag` under a projector.
    pub fn empty(tag: &Tag, projector_name: &str, projector_version: &str) -> Self {
        Self {
            payload: TagStatePayload::Empty,
            version: TagVersion::initial(),
            last_sortable_unique_id: None,
            tag_group: tag.group().to_string(),
            tag_content: tag.content().to_string(),
            projector_name: projector_name.to_string(),
            projector_version: projector_version.to_string(),
        }
    }

    /// `Group:Content` of the projected tag.
    pub fn tag(&self) -> String {
        format!("{}:{}", self.tag_group, self.tag_content)
    }

    /// `true` once at least one event has been folded.
    pub fn exists(&self) -> bool {
        self.version > TagVersion::initial()
    }
}

/// A pure fold from a tag's events to its state payload.
///
/// Implementations must not read the clock or perform I/O: replaying the same
/// ordered events through the same `VERSION` must always produce the same
/// payload. Bump `VERSION` whenever the fold changes so cached and snapshotted
/// states are rebuilt.
pub trait TagProjector<D: Domain>: Send + Sync + 'static {
    /// Registered projector name, conventionally `"{Group}Projector"`.
    const NAME: &'static str;

    /// Version string of the fold logic.
    const VERSION: &'static str;

    /// Applies one event.
    fn project(
        current: TagStatePayload<D::TagState>,
        event: &Event<D::Event>,
    ) -> TagStatePayload<D::TagState>;
}

type ProjectFn<D> = fn(
    TagStatePayload<<D as Domain>::TagState>,
    &Event<<D as Domain>::Event>,
) -> TagStatePayload<<D as Domain>::TagState>;

/// A registered tag projector.
pub struct TagProjectorEntry<D: Domain> {
    name: &'static str,
    version: &'static str,
    type_id: TypeId,
    project: ProjectFn<D>,
}

impl<D: Domain> Clone for TagProjectorEntry<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            version: self.version,
            type_id: self.type_id,
            project: self.project,
        }
    }
}

impl<D: Domain> TagProjectorEntry<D> {
    /// Projector name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Projector version.
    pub const fn version(&self) -> &'static str {
        self.version
    }

    /// Folds `events` onto `state`.
    ///
    /// Events are sorted by sortable id and de-duplicated by event id first;
    /// events at or before the state's last folded id are skipped.
    pub fn fold(
        &self,
        mut state: TagState<D::TagState>,
        mut events: Vec<Event<D::Event>>,
    ) -> TagState<D::TagState> {
        sort_and_dedup(&mut events);
        for event in &events {
            if state
                .last_sortable_unique_id
                .as_ref()
                .is_some_and(|last| event.sortable_unique_id() <= last)
            {
                continue;
            }
            state.payload = (self.project)(state.payload, event);
            state.version = state.version.next();
            state.last_sortable_unique_id = Some(event.sortable_unique_id().clone());
        }
        state
    }

    /// Projects `tag` from scratch.
    pub fn project_from_empty(
        &self,
        tag: &Tag,
        events: Vec<Event<D::Event>>,
    ) -> TagState<D::TagState> {
        self.fold(TagState::empty(tag, self.name, self.version), events)
    }
}

/// Registry of tag projectors, keyed by name.
pub struct TagProjectorTypes<D: Domain> {
    projectors: BTreeMap<&'static str, TagProjectorEntry<D>>,
}

impl<D: Domain> Default for TagProjectorTypes<D> {
    fn default() -> Self {
        Self {
            projectors: BTreeMap::new(),
        }
    }
}

impl<D: Domain> TagProjectorTypes<D> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers projector `P`.
    pub fn register<P: TagProjector<D>>(&mut self) -> RegistryResult<()> {
        let type_id = TypeId::of::<P>();
        if let Some(existing) = self.projectors.get(P::NAME) {
            return if existing.type_id == type_id {
                Ok(())
            } else {
                Err(RegistryError::TypeNameConflict {
                    registry: "tag projector",
                    name: P::NAME.to_string(),
                })
            };
        }
        self.projectors.insert(
            P::NAME,
            TagProjectorEntry {
                name: P::NAME,
                version: P::VERSION,
                type_id,
                project: P::project,
            },
        );
        Ok(())
    }

    /// Looks up a projector by exact name.
    pub fn get(&self, name: &str) -> ProjectionResult<&TagProjectorEntry<D>> {
        self.projectors
            .get(name)
            .ok_or_else(|| ProjectionError::UnknownProjector(name.to_string()))
    }

    /// Every registered projector name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.projectors.keys().map(ToString::to_string).collect()
    }

    /// Finds the projector for a tag group by naming convention.
    ///
    /// Tries, in order: the exact name `"{group}Projector"`, a case-insensitive
    /// match of that name, then the first projector whose name starts with the
    /// group (case-insensitively). This is a lookup convenience only; callers
    /// that know the projector should name it.
    pub fn resolve_for_group(&self, group: &str) -> RegistryResult<&TagProjectorEntry<D>> {
        let conventional = format!("{group}Projector");
        if let Some(entry) = self.projectors.get(conventional.as_str()) {
            return Ok(entry);
        }
        let lowered = conventional.to_lowercase();
        if let Some(entry) = self
            .projectors
            .values()
            .find(|entry| entry.name.to_lowercase() == lowered)
        {
            return Ok(entry);
        }
        let prefix = group.to_lowercase();
        if let Some(entry) = self
            .projectors
            .values()
            .find(|entry| !prefix.is_empty() && entry.name.to_lowercase().starts_with(&prefix))
        {
            return Ok(entry);
        }
        Err(RegistryError::ProjectorNotFound {
            group: group.to_string(),
            available: self.names(),
        })
    }
}

type CacheKey = (String, String);

/// Process-local cache of projected tag states.
///
/// Entries are keyed by tag and projector name; the projector version stored
/// in the entry decides whether it may be advanced or must be rebuilt.
pub struct TagStateCache<D: Domain> {
    states: RwLock<HashMap<CacheKey, TagState<D::TagState>>>,
}

impl<D: Domain> Default for TagStateCache<D> {
    fn default() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }
}

impl<D: Domain> TagStateCache<D> {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached state of `tag` under `projector_name`.
    pub fn get(&self, tag: &str, projector_name: &str) -> Option<TagState<D::TagState>> {
        self.states
            .read()
            .get(&(tag.to_string(), projector_name.to_string()))
            .cloned()
    }

    /// Stores `state`, replacing an older entry.
    ///
    /// An entry with a higher version for the same projector version is kept.
    pub fn put(&self, state: TagState<D::TagState>) {
        let key = (state.tag(), state.projector_name.clone());
        let mut states = self.states.write();
        let keep_existing = states.get(&key).is_some_and(|existing| {
            existing.projector_version == state.projector_version
                && existing.version > state.version
        });
        if !keep_existing {
            states.insert(key, state);
        }
    }

    /// Drops every entry for `tag`.
    pub fn invalidate(&self, tag: &str) {
        self.states.write().retain(|(cached_tag, _), _| cached_tag != tag);
    }

    /// Number of cached states.
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    /// `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reconstructs tag states from an event store.
pub struct TagStateLoader<'a, D: Domain> {
    store: &'a dyn EventStore<Event = D::Event>,
    domain: &'a DomainTypes<D>,
    cache: Option<&'a TagStateCache<D>>,
}

impl<'a, D: Domain> TagStateLoader<'a, D> {
    /// A loader that always replays from the store.
    pub const fn new(
        store: &'a dyn EventStore<Event = D::Event>,
        domain: &'a DomainTypes<D>,
    ) -> Self {
        Self {
            store,
            domain,
            cache: None,
        }
    }

    /// Uses `cache` for incremental catch-up.
    #[must_use]
    pub const fn with_cache(mut self, cache: &'a TagStateCache<D>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Projects `tag` with the projector named `projector_name`.
    #[instrument(skip(self, tag), fields(tag = %tag))]
    pub async fn load(
        &self,
        tag: &Tag,
        projector_name: &str,
    ) -> ProjectionResult<TagState<D::TagState>> {
        let projector = self.domain.tag_projectors().get(projector_name)?;
        let latest = self.store.get_latest_tag_state(tag).await?;

        if let Some(state) = self.try_incremental(tag, projector, &latest).await? {
            return Ok(state);
        }

        let events = self.store.read_events_by_tag(tag, None).await?;
        let state = projector.project_from_empty(tag, events);
        debug!(version = %state.version, "tag state rebuilt from event log");
        if let Some(cache) = self.cache {
            cache.put(state.clone());
        }
        Ok(state)
    }

    /// Projects `tag` with the projector its group resolves to by convention.
    pub async fn load_by_convention(&self, tag: &Tag) -> ProjectionResult<TagState<D::TagState>> {
        let name = self.domain.tag_projectors().resolve_for_group(tag.group())?.name();
        self.load(tag, name).await
    }

    async fn try_incremental(
        &self,
        tag: &Tag,
        projector: &TagProjectorEntry<D>,
        latest: &LatestTagState,
    ) -> ProjectionResult<Option<TagState<D::TagState>>> {
        let Some(cache) = self.cache else {
            return Ok(None);
        };
        let Some(cached) = cache.get(&tag.as_string(), projector.name()) else {
            return Ok(None);
        };
        if cached.projector_version != projector.version() {
            debug!(
                cached = %cached.projector_version,
                current = projector.version(),
                "projector version changed; discarding cached tag state"
            );
            return Ok(None);
        }
        if cached.version == latest.version
            && cached.last_sortable_unique_id == latest.last_sortable_unique_id
        {
            return Ok(Some(cached));
        }

        let newer = self
            .store
            .read_events_by_tag(tag, cached.last_sortable_unique_id.as_ref())
            .await?;
        if cached.version.advanced_by(newer.len()) != latest.version {
            debug!("cached tag state diverged from the tag stream; rebuilding");
            return Ok(None);
        }
        let state = projector.fold(cached, newer);
        cache.put(state.clone());
        Ok(Some(state))
    }
}

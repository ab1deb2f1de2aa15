//! A multi projection holding the tag state of every tag in one group.
//!
//! [`GenericTagMultiProjector`] reuses the group's [`TagProjector`]: each
//! event is folded into the state of every tag of the group it carries, the
//! way a single tag would be projected on its own. Running it under a
//! [`MultiProjectionActor`](crate::MultiProjectionActor) therefore yields a
//! safe and an unsafe view of all tag states of the group at once.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::domain::{Domain, DomainTypes};
use crate::errors::{ProjectionError, ProjectionResult};
use crate::event::Event;
use crate::multi_projection::{MultiProjectionState, MultiProjector};
use crate::payload::PayloadUnion;
use crate::tag::{Tag, TagType};
use crate::tag_projection::{TagProjector, TagState, TagStatePayload};
use crate::types::{SortableUniqueId, TagVersion};

/// Projected state of one tag inside a [`TagGroupStates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagGroupItem<S> {
    /// Folded payload
    pub payload: S,
    /// Number of events folded into `payload`
    pub version: TagVersion,
    /// Newest folded event
    pub last_sortable_unique_id: SortableUniqueId,
}

/// Tag states of one group, keyed by tag content.
///
/// Tags whose projector returned the empty payload are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagGroupStates<S> {
    items: BTreeMap<String, TagGroupItem<S>>,
}

impl<S> Default for TagGroupStates<S> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<S> TagGroupStates<S> {
    /// The item of the tag with `content`.
    pub fn get(&self, content: &str) -> Option<&TagGroupItem<S>> {
        self.items.get(content)
    }

    /// Items ordered by tag content.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagGroupItem<S>)> {
        self.items
            .iter()
            .map(|(content, item)| (content.as_str(), item))
    }

    /// Number of tags with a non-empty state.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if no tag has a state.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<S: PayloadUnion> TagGroupStates<S> {
    fn apply<D, P>(&mut self, content: &str, event: &Event<D::Event>)
    where
        D: Domain<TagState = S>,
        P: TagProjector<D>,
    {
        let (current, version) = match self.items.remove(content) {
            Some(item) => (TagStatePayload::State(item.payload), item.version),
            None => (TagStatePayload::Empty, TagVersion::initial()),
        };
        if let TagStatePayload::State(payload) = P::project(current, event) {
            self.items.insert(
                content.to_string(),
                TagGroupItem {
                    payload,
                    version: version.next(),
                    last_sortable_unique_id: event.sortable_unique_id().clone(),
                },
            );
        }
    }

    /// Every item as a [`TagState`] of `group` under `projector`.
    pub fn tag_states(
        &self,
        group: &str,
        projector_name: &str,
        projector_version: &str,
    ) -> Vec<TagState<S>> {
        self.items
            .iter()
            .map(|(content, item)| TagState {
                payload: TagStatePayload::State(item.payload.clone()),
                version: item.version,
                last_sortable_unique_id: Some(item.last_sortable_unique_id.clone()),
                tag_group: group.to_string(),
                tag_content: content.clone(),
                projector_name: projector_name.to_string(),
                projector_version: projector_version.to_string(),
            })
            .collect()
    }
}

/// Binds a tag projector and a tag group to a slot of the domain's
/// multi-projection payload.
///
/// The conventional name is
/// `GenericTagMultiProjector_{TagProjectorName}_{TagGroup}`, see
/// [`generic_tag_projector_name`].
pub trait TagGroupProjection<D: Domain>: Send + Sync + 'static {
    /// Registered multi projector name.
    const NAME: &'static str;

    /// Tag projector applied to each tag of the group.
    type Projector: TagProjector<D>;

    /// Tag type naming the group.
    type Tag: TagType;

    /// Tag groups the projection consumes.
    const TAG_GROUPS: &'static [&'static str] = &[<Self::Tag as TagType>::GROUP];

    /// Wraps the tag states into the domain payload.
    fn wrap(states: TagGroupStates<D::TagState>) -> D::MultiState;

    /// Takes the tag states out of the domain payload, or hands the payload
    /// back if it holds something else.
    fn unwrap(payload: D::MultiState) -> Result<TagGroupStates<D::TagState>, D::MultiState>;

    /// Borrows the tag states held by `payload`.
    fn states(payload: &D::MultiState) -> Option<&TagGroupStates<D::TagState>>;
}

/// `GenericTagMultiProjector_{projector}_{group}`.
pub fn generic_tag_projector_name(projector: &str, group: &str) -> String {
    format!("GenericTagMultiProjector_{projector}_{group}")
}

/// Multi projector folding every tag of `G`'s group with `G`'s tag projector.
///
/// Its version is the tag projector's version, so changing the fold rebuilds
/// the stored snapshots too.
pub struct GenericTagMultiProjector<G>(PhantomData<G>);

impl<D, G> MultiProjector<D> for GenericTagMultiProjector<G>
where
    D: Domain,
    G: TagGroupProjection<D>,
{
    const NAME: &'static str = G::NAME;
    const VERSION: &'static str = <G::Projector as TagProjector<D>>::VERSION;

    fn initial_payload() -> D::MultiState {
        G::wrap(TagGroupStates::default())
    }

    fn project(
        payload: D::MultiState,
        event: &Event<D::Event>,
        tags: &[Tag],
        _domain: &DomainTypes<D>,
        _safe_window_threshold: &SortableUniqueId,
    ) -> ProjectionResult<D::MultiState> {
        let mut states = G::unwrap(payload).map_err(|other| ProjectionError::PayloadMismatch {
            projector: G::NAME.to_string(),
            payload_type: other.type_name().to_string(),
        })?;
        let group = <G::Tag as TagType>::GROUP;
        for tag in tags.iter().filter(|tag| tag.group() == group) {
            states.apply::<D, G::Projector>(tag.content(), event);
        }
        Ok(G::wrap(states))
    }

    fn tag_groups() -> &'static [&'static str] {
        G::TAG_GROUPS
    }
}

impl<G> GenericTagMultiProjector<G> {
    /// Tag states held by a state of this projector.
    ///
    /// # Errors
    /// [`ProjectionError::PayloadMismatch`] if the state belongs to another
    /// projector.
    pub fn tag_states<D>(
        state: &MultiProjectionState<D::MultiState>,
    ) -> ProjectionResult<Vec<TagState<D::TagState>>>
    where
        D: Domain,
        G: TagGroupProjection<D>,
    {
        let states = G::states(&state.payload).ok_or_else(|| ProjectionError::PayloadMismatch {
            projector: G::NAME.to_string(),
            payload_type: state.payload.type_name().to_string(),
        })?;
        Ok(states.tag_states(
            <G::Tag as TagType>::GROUP,
            <G::Projector as TagProjector<D>>::NAME,
            <G::Projector as TagProjector<D>>::VERSION,
        ))
    }
}

//! Multi projector trait and registry.

use std::any::TypeId;
use std::collections::BTreeMap;

use crate::domain::{Domain, DomainTypes};
use crate::errors::{ProjectionError, ProjectionResult, RegistryError, RegistryResult};
use crate::event::Event;
use crate::tag::Tag;
use crate::types::SortableUniqueId;

/// A pure fold from the global event stream to a cross-entity read model.
///
/// `project` receives the event, its resolved tags, the domain registries and
/// the safe-window threshold the fold runs under. Like tag projectors it must
/// not read the clock or perform I/O.
pub trait MultiProjector<D: Domain>: Send + Sync + 'static {
    /// Registered projector name.
    const NAME: &'static str;

    /// Version string of the fold logic.
    const VERSION: &'static str;

    /// Payload before any event.
    fn initial_payload() -> D::MultiState;

    /// Applies one event.
    fn project(
        payload: D::MultiState,
        event: &Event<D::Event>,
        tags: &[Tag],
        domain: &DomainTypes<D>,
        safe_window_threshold: &SortableUniqueId,
    ) -> ProjectionResult<D::MultiState>;

    /// Tag groups this projector consumes; empty means every event.
    fn tag_groups() -> &'static [&'static str] {
        &[]
    }
}

type InitialFn<D> = fn() -> <D as Domain>::MultiState;

type ProjectFn<D> = fn(
    <D as Domain>::MultiState,
    &Event<<D as Domain>::Event>,
    &[Tag],
    &DomainTypes<D>,
    &SortableUniqueId,
) -> ProjectionResult<<D as Domain>::MultiState>;

/// A registered multi projector.
pub struct MultiProjectorEntry<D: Domain> {
    name: &'static str,
    version: &'static str,
    type_id: TypeId,
    tag_groups: &'static [&'static str],
    initial: InitialFn<D>,
    project: ProjectFn<D>,
}

impl<D: Domain> Clone for MultiProjectorEntry<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            version: self.version,
            type_id: self.type_id,
            tag_groups: self.tag_groups,
            initial: self.initial,
            project: self.project,
        }
    }
}

impl<D: Domain> MultiProjectorEntry<D> {
    /// Projector name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Projector version.
    pub const fn version(&self) -> &'static str {
        self.version
    }

    /// Fresh initial payload.
    pub fn initial_payload(&self) -> D::MultiState {
        (self.initial)()
    }

    /// `true` if the projector consumes `tags`.
    pub fn is_interested(&self, tags: &[Tag]) -> bool {
        self.tag_groups.is_empty()
            || tags
                .iter()
                .any(|tag| self.tag_groups.contains(&tag.group()))
    }

    /// Applies `event` if the projector is interested in it.
    pub fn apply(
        &self,
        payload: D::MultiState,
        event: &Event<D::Event>,
        domain: &DomainTypes<D>,
        safe_window_threshold: &SortableUniqueId,
    ) -> ProjectionResult<D::MultiState> {
        let tags: Vec<Tag> = event
            .tags()
            .iter()
            .map(|raw| domain.tags().get_tag(raw))
            .collect();
        if !self.is_interested(&tags) {
            return Ok(payload);
        }
        (self.project)(payload, event, &tags, domain, safe_window_threshold)
    }
}

/// Registry of multi projectors, keyed by name.
pub struct MultiProjectorTypes<D: Domain> {
    projectors: BTreeMap<&'static str, MultiProjectorEntry<D>>,
}

impl<D: Domain> Default for MultiProjectorTypes<D> {
    fn default() -> Self {
        Self {
            projectors: BTreeMap::new(),
        }
    }
}

impl<D: Domain> MultiProjectorTypes<D> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers projector `P`.
    pub fn register<P: MultiProjector<D>>(&mut self) -> RegistryResult<()> {
        let type_id = TypeId::of::<P>();
        if let Some(existing) = self.projectors.get(P::NAME) {
            return if existing.type_id == type_id {
                Ok(())
            } else {
                Err(RegistryError::TypeNameConflict {
                    registry: "multi projector",
                    name: P::NAME.to_string(),
                })
            };
        }
        self.projectors.insert(
            P::NAME,
            MultiProjectorEntry {
                name: P::NAME,
                version: P::VERSION,
                type_id,
                tag_groups: P::tag_groups(),
                initial: P::initial_payload,
                project: P::project,
            },
        );
        Ok(())
    }

    /// Looks up a projector by name.
    pub fn get(&self, name: &str) -> ProjectionResult<&MultiProjectorEntry<D>> {
        self.projectors
            .get(name)
            .ok_or_else(|| ProjectionError::UnknownProjector(name.to_string()))
    }

    /// Version of the named projector.
    pub fn version_of(&self, name: &str) -> Option<&'static str> {
        self.projectors.get(name).map(|entry| entry.version)
    }

    /// Every registered projector name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.projectors.keys().map(ToString::to_string).collect()
    }
}

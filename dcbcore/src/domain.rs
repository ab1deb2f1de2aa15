//! Domain type bundle.
//!
//! A [`Domain`] names the three payload unions an application stores. A
//! [`DomainTypes`] holds every registry the kernel consults for that domain;
//! it is assembled once at startup with [`DomainTypesBuilder`] and then shared
//! read-only (typically behind an `Arc`).

use std::fmt;

use crate::errors::{RegistryError, RegistryResult};
use crate::multi_projection::{MultiProjector, MultiProjectorTypes};
use crate::payload::{PayloadTypes, PayloadUnion, PayloadVariant};
use crate::tag::{TagType, TagTypes};
use crate::tag_projection::{
    TagProjector, TagProjectorTypes, TagStatePayload, EMPTY_TAG_STATE_PAYLOAD,
};

/// The payload families of an application.
pub trait Domain: Send + Sync + 'static {
    /// Union of every event payload.
    type Event: PayloadUnion;
    /// Union of every tag-state payload.
    type TagState: PayloadUnion;
    /// Union of every multi-projection payload.
    type MultiState: PayloadUnion;
}

/// Every registry of one domain.
pub struct DomainTypes<D: Domain> {
    events: PayloadTypes<D::Event>,
    tags: TagTypes,
    tag_projectors: TagProjectorTypes<D>,
    tag_states: PayloadTypes<D::TagState>,
    multi_projectors: MultiProjectorTypes<D>,
    multi_states: PayloadTypes<D::MultiState>,
}

impl<D: Domain> fmt::Debug for DomainTypes<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainTypes")
            .field("events", &self.events)
            .field("tags", &self.tags.groups())
            .field("tag_projectors", &self.tag_projectors.names())
            .field("tag_states", &self.tag_states)
            .field("multi_projectors", &self.multi_projectors.names())
            .field("multi_states", &self.multi_states)
            .finish()
    }
}

impl<D: Domain> DomainTypes<D> {
    /// Starts a builder.
    pub fn builder() -> DomainTypesBuilder<D> {
        DomainTypesBuilder {
            types: Self {
                events: PayloadTypes::new("event"),
                tags: TagTypes::new(),
                tag_projectors: TagProjectorTypes::new(),
                tag_states: PayloadTypes::new("tag state"),
                multi_projectors: MultiProjectorTypes::new(),
                multi_states: PayloadTypes::new("multi projection"),
            },
            errors: Vec::new(),
        }
    }

    /// Event payload registry.
    pub const fn events(&self) -> &PayloadTypes<D::Event> {
        &self.events
    }

    /// Tag group registry.
    pub const fn tags(&self) -> &TagTypes {
        &self.tags
    }

    /// Tag projector registry.
    pub const fn tag_projectors(&self) -> &TagProjectorTypes<D> {
        &self.tag_projectors
    }

    /// Tag-state payload registry.
    pub const fn tag_states(&self) -> &PayloadTypes<D::TagState> {
        &self.tag_states
    }

    /// Multi projector registry.
    pub const fn multi_projectors(&self) -> &MultiProjectorTypes<D> {
        &self.multi_projectors
    }

    /// Multi-projection payload registry.
    pub const fn multi_states(&self) -> &PayloadTypes<D::MultiState> {
        &self.multi_states
    }

    /// Serializes a tag-state payload, including the empty payload.
    pub fn serialize_tag_state(
        &self,
        payload: &TagStatePayload<D::TagState>,
    ) -> RegistryResult<(&'static str, Vec<u8>)> {
        match payload {
            TagStatePayload::Empty => Ok((EMPTY_TAG_STATE_PAYLOAD, b"{}".to_vec())),
            TagStatePayload::State(state) => self.tag_states.serialize(state),
        }
    }

    /// Rebuilds a tag-state payload serialized by [`Self::serialize_tag_state`].
    pub fn deserialize_tag_state(
        &self,
        type_name: &str,
        bytes: &[u8],
    ) -> RegistryResult<TagStatePayload<D::TagState>> {
        if type_name == EMPTY_TAG_STATE_PAYLOAD {
            return Ok(TagStatePayload::Empty);
        }
        self.tag_states
            .deserialize(type_name, bytes)
            .map(TagStatePayload::State)
    }
}

/// Fluent builder for [`DomainTypes`].
///
/// Registration errors are collected and reported together by [`Self::build`].
pub struct DomainTypesBuilder<D: Domain> {
    types: DomainTypes<D>,
    errors: Vec<RegistryError>,
}

impl<D: Domain> DomainTypesBuilder<D> {
    fn record(mut self, result: RegistryResult<()>) -> Self {
        if let Err(error) = result {
            self.errors.push(error);
        }
        self
    }

    /// Registers an event payload type.
    #[must_use]
    pub fn event<T: PayloadVariant + Into<D::Event>>(mut self) -> Self {
        let result = self.types.events.register::<T>();
        self.record(result)
    }

    /// Registers a tag group.
    #[must_use]
    pub fn tag<T: TagType>(mut self) -> Self {
        let result = self.types.tags.register::<T>();
        self.record(result)
    }

    /// Registers a tag projector.
    #[must_use]
    pub fn tag_projector<P: TagProjector<D>>(mut self) -> Self {
        let result = self.types.tag_projectors.register::<P>();
        self.record(result)
    }

    /// Registers a tag-state payload type.
    #[must_use]
    pub fn tag_state<T: PayloadVariant + Into<D::TagState>>(mut self) -> Self {
        let result = self.types.tag_states.register::<T>();
        self.record(result)
    }

    /// Registers a multi projector.
    #[must_use]
    pub fn multi_projector<P: MultiProjector<D>>(mut self) -> Self {
        let result = self.types.multi_projectors.register::<P>();
        self.record(result)
    }

    /// Registers a multi-projection payload type.
    #[must_use]
    pub fn multi_state<T: PayloadVariant + Into<D::MultiState>>(mut self) -> Self {
        let result = self.types.multi_states.register::<T>();
        self.record(result)
    }

    /// Finishes registration.
    pub fn build(mut self) -> RegistryResult<DomainTypes<D>> {
        match self.errors.len() {
            0 => Ok(self.types),
            1 => Err(self.errors.remove(0)),
            _ => Err(RegistryError::Registration(self.errors)),
        }
    }
}

//! Multi projections.
//!
//! A multi projection folds the global event stream into one cross-entity read
//! model. Events arrive out of order in a distributed system, so the engine
//! keeps two views of every projection:
//!
//! * the **safe** view, which only contains events whose sortable id is at or
//!   before the safe-window threshold and is therefore final, and
//! * the **unsafe** view, which also contains the buffered recent events and is
//!   rebuilt whenever a late arrival changes their order.
//!
//! [`MultiProjectionActor`] drives a [`DualStateProjection`] for one projector,
//! computes the threshold from its [`MultiProjectionConfig`] and supports
//! snapshot save and restore. [`GenericTagMultiProjector`] keeps the tag
//! states of a whole tag group as one such projection.
//!
//! [`MultiProjectionConfig`]: crate::config::MultiProjectionConfig

mod actor;
mod dual_state;
mod projector;
mod safe_window;
mod tag_group;

pub use actor::{EventSource, MultiProjectionActor};
pub use dual_state::DualStateProjection;
pub use projector::{MultiProjector, MultiProjectorEntry, MultiProjectorTypes};
pub use safe_window::{safe_window_threshold, LagTracker};
pub use tag_group::{
    generic_tag_projector_name, GenericTagMultiProjector, TagGroupItem, TagGroupProjection,
    TagGroupStates,
};

use crate::types::{EventId, SortableUniqueId};

/// A point-in-time view of a multi projection.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiProjectionState<M> {
    /// Projector that produced the payload
    pub projector_name: String,
    /// Version of that projector
    pub projector_version: String,
    /// Folded payload
    pub payload: M,
    /// Number of events folded into `payload`
    pub version: u64,
    /// Newest folded event
    pub last_sortable_unique_id: Option<SortableUniqueId>,
    /// Id of the newest folded event
    pub last_event_id: Option<EventId>,
    /// Events folded into this view; the safe view never counts buffered ones
    pub events_processed: u64,
    /// Threshold the safe view was last advanced to
    pub safe_window_threshold: SortableUniqueId,
    /// `true` for the safe view
    pub is_safe_state: bool,
    /// Projector version of the snapshot this projection was restored from
    pub applied_snapshot_version: Option<String>,
}

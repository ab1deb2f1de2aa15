//! `dcbcore` - Dynamic consistency boundary event sourcing kernel
//!
//! Instead of aggregates, every event carries a set of tags (`Group:Content`).
//! A command reads the states of the tags it cares about, decides on at most
//! one event and commits it on the condition that none of the consistency
//! tags it read has moved in the meantime. The consistency boundary of a
//! command is therefore exactly the set of tags it touched.
//!
//! The kernel is split into:
//!
//! - [`tag`], [`types`], [`metadata`] and [`payload`]: the value types every
//!   event is made of
//! - [`event_store`]: the only storage contract, implemented by
//!   `dcbcore-memory` and checked by the contract suite in `dcbcore-testing`
//! - [`command`] and [`executor`]: the Reserve / Decide / Commit protocol
//! - [`tag_projection`]: pure per-tag folds with an optional state cache
//! - [`multi_projection`]: cross-tag read models with a safe view and an
//!   unsafe view separated by a safe-window threshold
//! - [`snapshot`]: compressed, versioned snapshots of both kinds of state
//!
//! # Example
//!
//! ```rust,ignore
//! use dcbcore::{CommandExecutor, ExecutionContext};
//! use dcbcore_memory::InMemoryEventStore;
//!
//! let executor = CommandExecutor::new(InMemoryEventStore::new(), Arc::new(domain_types()));
//! let result = executor
//!     .execute_with_context(&CreateStudent::new("S1", "Ann", 2), &ExecutionContext::new())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod macros;

pub mod command;
pub mod config;
pub mod domain;
pub mod errors;
pub mod event;
pub mod event_store;
pub mod executor;
pub mod metadata;
pub mod multi_projection;
pub mod payload;
pub mod snapshot;
pub mod tag;
pub mod tag_projection;
pub mod types;

#[cfg(feature = "testing")]
pub mod testing;

pub use command::{
    CommandContext, CommandHandler, EventOrNone, EventWithTags, ExecutionContext, ExecutionResult,
};
pub use config::{
    DynamicSafeWindowConfig, ExecutorConfig, MultiProjectionConfig, RetryConfig, SafeWindowMs,
    SnapshotConfig,
};
pub use domain::{Domain, DomainTypes, DomainTypesBuilder};
pub use errors::{
    CommandError, CommandResult, EventStoreError, EventStoreResult, ProjectionError,
    ProjectionResult, RegistryError, RegistryResult, SnapshotError, SnapshotResult,
    ValidationError,
};
pub use event::{Event, SerializedEvent, TagInfo, TagStream, TagWriteResult};
pub use event_store::{EventStore, LatestTagState, WriteBatch, WriteOutcome};
pub use executor::CommandExecutor;
pub use metadata::{CausationId, CorrelationId, EventMetadata, UserId};
pub use multi_projection::{
    EventSource, GenericTagMultiProjector, MultiProjectionActor, MultiProjectionState,
    MultiProjector, TagGroupProjection, TagGroupStates,
};
pub use payload::{PayloadTypes, PayloadUnion, PayloadVariant};
pub use snapshot::{BlobStorage, Snapshot, SnapshotManager, SnapshotStore};
pub use tag::{Tag, TagType};
pub use tag_projection::{TagProjector, TagState, TagStateCache, TagStatePayload};
pub use types::{EventId, SortableUniqueId, TagVersion, Timestamp};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}

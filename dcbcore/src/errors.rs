//! Error types for `dcbcore`.
//!
//! Each subsystem has its own error enum so callers can tell failure modes
//! apart, and errors convert upward (store -> projection -> command) with `?`.
//!
//! # Error Categories
//!
//! - **`CommandError`**: command validation, business rules, optimistic conflicts
//! - **`EventStoreError`**: storage and persistence layer failures
//! - **`RegistryError`**: unknown or conflicting type names and projector lookups
//! - **`ProjectionError`**: tag-state and multi-projection processing failures
//! - **`SnapshotError`**: snapshot encoding, offload and version checks
//! - **`ValidationError`**: input validation at construction boundaries
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use dcbcore::errors::CommandError;
//!
//! match executor.execute(&command).await {
//!     Ok(result) => println!("wrote {} events", result.events.len()),
//!     Err(CommandError::ConcurrencyConflict { tags }) => {
//!         // re-read the tag states and try again
//!     }
//!     Err(CommandError::BusinessRuleViolation(reason)) => eprintln!("{reason}"),
//!     Err(other) => return Err(other.into()),
//! }
//! ```

use crate::types::{EventId, TagVersion};
use thiserror::Error;

/// Errors that can occur during command execution.
///
/// - **ValidationFailed**: retry with corrected input
/// - **BusinessRuleViolation**: surface the message to the caller
/// - **ConcurrencyConflict**: retryable; re-run the whole cycle with fresh state
/// - **InvalidTag**: the handler emitted a malformed tag
/// - **EventStore** / **Registry** / **Projection**: infrastructure failures
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command input validation failed.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A business rule was violated during command execution.
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),

    /// A consistency tag advanced between Reserve and Commit.
    #[error("Concurrency conflict on tags: {tags:?}")]
    ConcurrencyConflict {
        /// The consistency tags whose versions moved
        tags: Vec<String>,
    },

    /// An event carried a tag that failed validation.
    #[error("Invalid tag: {0}")]
    InvalidTag(#[from] ValidationError),

    /// A type name or projector could not be resolved.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Tag state projection failed while the handler read state.
    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    /// An error occurred in the event store while executing the command.
    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// `true` for failures a caller may resolve by re-running the command.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// No event with this id exists.
    #[error("Event '{0}' not found")]
    EventNotFound(EventId),

    /// A tag's version did not match the expectation of a write batch.
    #[error("Version conflict on tag '{tag}': expected {expected}, but current is {current}")]
    VersionConflict {
        /// The tag with the conflict
        tag: String,
        /// The expected version
        expected: TagVersion,
        /// The actual current version
        current: TagVersion,
    },

    /// Multiple version conflicts detected in a single batch.
    #[error("Version conflicts on tags: {0:?}")]
    VersionConflicts(Vec<String>),

    /// Attempted to write an event with an ID that already exists.
    #[error("Duplicate event ID: {0}")]
    DuplicateEventId(EventId),

    /// Failed to serialize an event for storage.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize an event from storage.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Failed to establish or maintain connection to the store.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A batch could not be committed and was rolled back.
    #[error("Transaction rolled back: {0}")]
    TransactionRollback(String),

    /// The event store is temporarily unavailable.
    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EventStoreError {
    /// Tags named by a version conflict, empty for every other variant.
    pub fn conflicting_tags(&self) -> Vec<String> {
        match self {
            Self::VersionConflict { tag, .. } => vec![tag.clone()],
            Self::VersionConflicts(tags) => tags.clone(),
            _ => Vec::new(),
        }
    }
}

impl From<EventStoreError> for CommandError {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::VersionConflict { .. } | EventStoreError::VersionConflicts(_) => {
                Self::ConcurrencyConflict {
                    tags: error.conflicting_tags(),
                }
            }
            other => Self::EventStore(other),
        }
    }
}

/// Errors raised by the type and projector registries.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A name was looked up that was never registered.
    #[error("Unknown {registry} type '{name}'")]
    UnknownType {
        /// Which registry was consulted
        registry: &'static str,
        /// The unresolved name
        name: String,
    },

    /// Two different types were registered under one name.
    #[error("Type name '{name}' is already registered in {registry} for a different type")]
    TypeNameConflict {
        /// Which registry rejected the registration
        registry: &'static str,
        /// The contested name
        name: String,
    },

    /// No projector matches a tag group.
    #[error("No tag projector found for group '{group}'; registered projectors: {available:?}")]
    ProjectorNotFound {
        /// The tag group that needed a projector
        group: String,
        /// Every registered projector name
        available: Vec<String>,
    },

    /// Several registrations failed while building a domain.
    #[error("Domain registration failed: {0:?}")]
    Registration(Vec<RegistryError>),

    /// A payload could not be serialized.
    #[error("Failed to serialize '{type_name}': {message}")]
    Serialization {
        /// Registered type name
        type_name: String,
        /// Underlying serializer message
        message: String,
    },

    /// Stored bytes could not be turned back into the named payload.
    #[error("Failed to deserialize '{type_name}': {message}")]
    Deserialization {
        /// Registered type name
        type_name: String,
        /// Underlying deserializer message
        message: String,
    },
}

/// Errors that can occur while building tag states or multi projections.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A projector rejected an event.
    #[error("Event processing failed for projector '{projector}': {message}")]
    EventProcessingFailed {
        /// Projector name
        projector: String,
        /// What went wrong
        message: String,
    },

    /// The projector name is not registered.
    #[error("Unknown projector '{0}'")]
    UnknownProjector(String),

    /// A projector received a payload of a shape it does not handle.
    #[error("Projector '{projector}' cannot handle payload '{payload_type}'")]
    PayloadMismatch {
        /// Projector name
        projector: String,
        /// Type name of the offending payload
        payload_type: String,
    },

    /// A registry lookup failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Reading events for the projection failed.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),
}

/// Errors raised when saving or restoring snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot was produced by a different projector version.
    #[error("Snapshot of '{projector}' has version '{stored}' but the registered version is '{current}'")]
    VersionMismatch {
        /// Projector name
        projector: String,
        /// Version recorded in the snapshot
        stored: String,
        /// Version currently registered
        current: String,
    },

    /// The snapshot payload type is not known to the domain.
    #[error("Snapshot payload type '{0}' is not registered")]
    PayloadTypeMismatch(String),

    /// Gzip encoding or decoding failed.
    #[error("Compression failed: {0}")]
    Compression(#[from] std::io::Error),

    /// Decoded content does not match the recorded metadata.
    #[error("Snapshot corrupted: {0}")]
    Corrupted(String),

    /// The serialized snapshot exceeds the configured limit.
    #[error("Snapshot of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Serialized size
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// An offloaded body could not be found.
    #[error("Offloaded snapshot body '{key}' not found in provider '{provider}'")]
    BlobNotFound {
        /// Offload key
        key: String,
        /// Blob provider name
        provider: String,
    },

    /// The snapshot store failed.
    #[error("Snapshot storage failed: {0}")]
    Storage(String),

    /// Encoding or decoding the payload through the registry failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was empty.
    #[error("Field '{field}' cannot be empty")]
    EmptyField {
        /// Field name
        field: String,
    },

    /// A value did not have the expected format.
    #[error("Invalid format for '{field}': expected {expected}, got '{actual}'")]
    InvalidFormat {
        /// Field name
        field: String,
        /// Expected format description
        expected: String,
        /// Actual value
        actual: String,
    },

    /// A value exceeded a length limit.
    #[error("Value for '{field}' is too long: {length} > {max}")]
    TooLong {
        /// Field name
        field: String,
        /// Actual length
        length: usize,
        /// Maximum permitted length
        max: usize,
    },
}

/// Result alias for command operations.
pub type CommandResult<T> = Result<T, CommandError>;

/// Result alias for event store operations.
pub type EventStoreResult<T> = Result<T, EventStoreError>;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result alias for projection operations.
pub type ProjectionResult<T> = Result<T, ProjectionError>;

/// Result alias for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

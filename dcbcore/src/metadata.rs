//! Event metadata: causation, correlation and the acting user.
//!
//! Identifiers are free-form strings supplied by the caller (request ids,
//! command names, upstream event ids) but are validated to be non-empty and of
//! bounded length at construction.

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Links events in the same logical workflow or request.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CorrelationId(String);

/// Names what directly caused an event (a command name or an upstream event id).
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CausationId(String);

/// Identifies the user or system actor that executed the command.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct UserId(String);

/// Metadata recorded with every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// What caused the event
    pub causation_id: Option<CausationId>,
    /// Workflow the event belongs to
    pub correlation_id: Option<CorrelationId>,
    /// Who executed the command that produced the event
    pub executed_user: Option<UserId>,
}

impl EventMetadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the causation id.
    #[must_use]
    pub fn with_causation_id(mut self, causation_id: CausationId) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Sets the executing user.
    #[must_use]
    pub fn with_executed_user(mut self, user: UserId) -> Self {
        self.executed_user = Some(user);
        self
    }
}

//! Tags: the unit of consistency and indexing.
//!
//! A tag is `Group:Content`. Every event carries one or more tags; tags whose
//! group is declared a consistency group take part in optimistic concurrency,
//! all others only index the event for reads.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::errors::{RegistryError, RegistryResult, ValidationError};

/// Separator between tag group and tag content.
pub const TAG_SEPARATOR: char = ':';

/// Longest accepted `Group:Content` string.
pub const MAX_TAG_LENGTH: usize = 255;

/// A tag attached to an event.
///
/// Two tags are equal when their group and content are equal; the consistency
/// flag is a property of the group and does not take part in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    group: String,
    content: String,
    consistency: bool,
}

impl Tag {
    /// Creates a validated tag.
    pub fn new(
        group: impl Into<String>,
        content: impl Into<String>,
        consistency: bool,
    ) -> Result<Self, ValidationError> {
        let tag = Self::from_parts(group, content, consistency);
        tag.validate()?;
        Ok(tag)
    }

    /// Creates a tag that participates in optimistic concurrency.
    pub fn consistency(
        group: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::new(group, content, true)
    }

    /// Creates a tag used only for indexing and queries.
    pub fn index_only(
        group: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::new(group, content, false)
    }

    /// Builds a tag without validating it.
    ///
    /// Tags built this way are validated when an event carrying them is written.
    pub fn from_parts(
        group: impl Into<String>,
        content: impl Into<String>,
        consistency: bool,
    ) -> Self {
        Self {
            group: group.into(),
            content: content.into(),
            consistency,
        }
    }

    /// Splits `raw` on the first separator. Text without a separator becomes a
    /// group with empty content.
    pub fn split(raw: &str) -> (&str, &str) {
        raw.split_once(TAG_SEPARATOR).unwrap_or((raw, ""))
    }

    /// Tag group.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Tag content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// `true` if writes carrying this tag are version checked.
    pub const fn is_consistency_tag(&self) -> bool {
        self.consistency
    }

    /// Canonical `Group:Content` form.
    pub fn as_string(&self) -> String {
        format!("{}{TAG_SEPARATOR}{}", self.group, self.content)
    }

    /// Checks the structural rules every stored tag must satisfy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.group.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "tag group".to_string(),
            });
        }
        if self.content.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "tag content".to_string(),
            });
        }
        if self.group.contains(TAG_SEPARATOR) || self.group.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidFormat {
                field: "tag group".to_string(),
                expected: "a group name without ':' or whitespace".to_string(),
                actual: self.group.clone(),
            });
        }
        let length = self.group.chars().count() + 1 + self.content.chars().count();
        if length > MAX_TAG_LENGTH {
            return Err(ValidationError::TooLong {
                field: "tag".to_string(),
                length,
                max: MAX_TAG_LENGTH,
            });
        }
        Ok(())
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group && self.content == other.content
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group.hash(state);
        self.content.hash(state);
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.group, &self.content).cmp(&(&other.group, &other.content))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{TAG_SEPARATOR}{}", self.group, self.content)
    }
}

/// A strongly typed domain tag.
///
/// ```rust,ignore
/// struct StudentTag(String);
///
/// impl TagType for StudentTag {
///     const GROUP: &'static str = "Student";
///     fn content(&self) -> String { self.0.clone() }
/// }
/// ```
pub trait TagType: Send + Sync + 'static {
    /// Group name shared by every tag of this type.
    const GROUP: &'static str;

    /// Whether tags of this type take part in optimistic concurrency.
    const IS_CONSISTENCY_TAG: bool = true;

    /// The content portion of this tag.
    fn content(&self) -> String;

    /// Erases the type into a [`Tag`].
    fn to_tag(&self) -> Tag {
        Tag::from_parts(Self::GROUP, self.content(), Self::IS_CONSISTENCY_TAG)
    }
}

#[derive(Debug, Clone, Copy)]
struct TagGroupEntry {
    type_id: TypeId,
    consistency: bool,
}

/// Registry resolving `Group:Content` strings to typed tag groups.
///
/// Unknown groups resolve to a fallback tag that preserves group and content
/// and is index-only.
#[derive(Debug, Clone, Default)]
pub struct TagTypes {
    groups: HashMap<String, TagGroupEntry>,
}

impl TagTypes {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers tag type `T` under its group name.
    ///
    /// Registering the same type twice is accepted; registering a different
    /// type under an existing group is a conflict.
    pub fn register<T: TagType>(&mut self) -> RegistryResult<()> {
        let entry = TagGroupEntry {
            type_id: TypeId::of::<T>(),
            consistency: T::IS_CONSISTENCY_TAG,
        };
        match self.groups.get(T::GROUP) {
            Some(existing) if existing.type_id == entry.type_id => Ok(()),
            Some(_) => Err(RegistryError::TypeNameConflict {
                registry: "tag",
                name: T::GROUP.to_string(),
            }),
            None => {
                self.groups.insert(T::GROUP.to_string(), entry);
                Ok(())
            }
        }
    }

    /// Resolves a raw tag string, falling back to an index-only tag for groups
    /// that were never registered.
    pub fn get_tag(&self, raw: &str) -> Tag {
        let (group, content) = Tag::split(raw);
        let consistency = self
            .groups
            .get(group)
            .is_some_and(|entry| entry.consistency);
        Tag::from_parts(group, content, consistency)
    }

    /// `true` if `group` has a registered tag type.
    pub fn is_registered(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Every registered group name, sorted.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.groups.keys().cloned().collect();
        groups.sort();
        groups
    }
}

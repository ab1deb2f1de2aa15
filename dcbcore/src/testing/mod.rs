//! Testing utilities for `dcbcore` domains and event store backends.
//!
//! Enabled with the `testing` feature.
//!
//! - [`generators`]: `proptest` strategies for tags, ids and metadata
//! - [`builders`]: a fluent [`EventBuilder`](builders::EventBuilder)
//! - [`assertions`]: checks for ordering and tag-version invariants
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use dcbcore::testing::prelude::*;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn tags_round_trip(tag in arb_consistency_tag()) {
//!         let (group, content) = Tag::split(&tag.as_string());
//!         prop_assert_eq!(group, tag.group());
//!         prop_assert_eq!(content, tag.content());
//!     }
//! }
//! ```

pub mod assertions;
pub mod builders;
pub mod generators;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::assertions::*;
    pub use super::builders::*;
    pub use super::generators::*;
}

//! Core value types for the `dcbcore` kernel.
//!
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle. The central type is
//! [`SortableUniqueId`], the string key that totally orders every event in the
//! store and that the safe window is expressed in.

use chrono::{DateTime, Utc};
use nutype::nutype;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of 100 ns ticks in one second.
const TICKS_PER_SECOND: i128 = 10_000_000;
/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
const UNIX_EPOCH_TICKS: i128 = 621_355_968_000_000_000;
const TICK_DIGITS: usize = 19;
const SUFFIX_DIGITS: usize = 11;
const SUFFIX_MODULUS: u64 = 100_000_000_000;
const MAX_TICKS: u64 = 9_999_999_999_999_999_999;

/// Total-order key of an event.
///
/// The textual form is 30 ASCII digits: 19 zero-padded ticks (100 ns units
/// since 0001-01-01 UTC) followed by an 11 digit decorrelating suffix. Ordinal
/// string comparison therefore equals chronological order, and two ids created
/// in the same tick are still distinct.
#[nutype(
    validate(predicate = |raw: &str| raw.len() == TICK_DIGITS + SUFFIX_DIGITS && raw.bytes().all(|b| b.is_ascii_digit())),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct SortableUniqueId(String);

impl SortableUniqueId {
    /// Generates an id for `at` with a random suffix.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix = rand::rng().random_range(0..SUFFIX_MODULUS);
        Self::from_parts(ticks_of(at), suffix)
    }

    /// Generates an id for the current instant.
    pub fn generate_now() -> Self {
        Self::generate(Utc::now())
    }

    /// The smallest possible id; sorts before every generated id.
    pub fn zero() -> Self {
        Self::from_parts(0, 0)
    }

    /// The smallest id that can carry timestamp `at`.
    ///
    /// Used as the safe-window threshold: an event is safe iff its id compares
    /// less than or equal to the threshold id.
    pub fn min_for(at: DateTime<Utc>) -> Self {
        Self::from_parts(ticks_of(at), 0)
    }

    /// The largest id that can carry timestamp `at`.
    pub fn max_for(at: DateTime<Utc>) -> Self {
        Self::from_parts(ticks_of(at), SUFFIX_MODULUS - 1)
    }

    fn from_parts(ticks: u64, suffix: u64) -> Self {
        let raw = format!(
            "{:0tw$}{:0sw$}",
            ticks.min(MAX_TICKS),
            suffix % SUFFIX_MODULUS,
            tw = TICK_DIGITS,
            sw = SUFFIX_DIGITS
        );
        Self::try_new(raw).expect("formatted ids always have 30 digits")
    }

    /// Borrows the textual form.
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }

    fn ticks(&self) -> u64 {
        self.as_str()[..TICK_DIGITS].parse().unwrap_or(0)
    }

    fn suffix(&self) -> u64 {
        self.as_str()[TICK_DIGITS..].parse().unwrap_or(0)
    }

    /// Parses the timestamp portion back into a UTC instant.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let since_epoch = i128::from(self.ticks()) - UNIX_EPOCH_TICKS;
        let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
        let sub_ticks = since_epoch.rem_euclid(TICKS_PER_SECOND);
        i64::try_from(secs)
            .ok()
            .and_then(|secs| {
                let nanos = u32::try_from(sub_ticks * 100).ok()?;
                DateTime::from_timestamp(secs, nanos)
            })
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// The immediately following id in the total order.
    #[must_use]
    pub fn successor(&self) -> Self {
        let suffix = self.suffix();
        if suffix + 1 < SUFFIX_MODULUS {
            Self::from_parts(self.ticks(), suffix + 1)
        } else {
            Self::from_parts(self.ticks().saturating_add(1), 0)
        }
    }

    /// `true` if this id sorts at or before `other`.
    pub fn is_earlier_than_or_equal(&self, other: &Self) -> bool {
        self <= other
    }
}

fn ticks_of(at: DateTime<Utc>) -> u64 {
    let ticks = UNIX_EPOCH_TICKS
        + i128::from(at.timestamp()) * TICKS_PER_SECOND
        + i128::from(at.timestamp_subsec_nanos() / 100);
    u64::try_from(ticks.max(0)).unwrap_or(MAX_TICKS)
}

/// Issues strictly increasing [`SortableUniqueId`]s within one process.
///
/// Ids are time based; when the clock does not advance (or steps back) the
/// generator continues from the successor of the previously issued id.
#[derive(Debug, Default)]
pub struct SortableUniqueIdGenerator {
    last: Mutex<Option<SortableUniqueId>>,
}

impl SortableUniqueIdGenerator {
    /// Creates a generator with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next id using the current clock.
    pub fn next_id(&self) -> SortableUniqueId {
        self.next_id_at(Utc::now())
    }

    /// Issues the next id for the instant `at`.
    pub fn next_id_at(&self, at: DateTime<Utc>) -> SortableUniqueId {
        let mut last = self.last.lock();
        let mut candidate = SortableUniqueId::generate(at);
        if let Some(previous) = last.as_ref() {
            if candidate <= *previous {
                candidate = previous.successor();
            }
        }
        *last = Some(candidate.clone());
        candidate
    }
}

/// A globally unique event identifier using UUIDv7 format.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new `EventId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of events recorded against one tag.
///
/// The version of a tag equals the length of its tag stream; version 0 means
/// the tag has never been written.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct TagVersion(u64);

impl TagVersion {
    /// Version of a tag that has no events.
    pub fn initial() -> Self {
        Self::new(0)
    }

    /// Returns the next version after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self::new(self.into_inner() + 1)
    }

    /// Advances the version by `count` events.
    #[must_use]
    pub fn advanced_by(self, count: usize) -> Self {
        Self::new(self.into_inner() + count as u64)
    }
}

/// A timestamp for when an event was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Converts the timestamp into the underlying `DateTime`.
    pub const fn into_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.into_datetime()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

//! Closed payload sums and the name-keyed registry that (de)serializes them.
//!
//! Every family of payloads the kernel stores (events, tag-state payloads,
//! multi-projection payloads) is a domain-defined enum implementing
//! [`PayloadUnion`]. Each variant wraps a struct implementing
//! [`PayloadVariant`], whose `TYPE_NAME` is the discriminator written to
//! storage. [`PayloadTypes`] maps those names back to decoders.
//!
//! The [`payload_union!`](crate::payload_union) macro generates all three
//! pieces from a list of variant types.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{RegistryError, RegistryResult};

/// A closed sum of payload types.
pub trait PayloadUnion: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Registered name of the active variant.
    fn type_name(&self) -> &'static str;

    /// Serializes the active variant (without any envelope).
    fn encode(&self) -> Result<Vec<u8>, serde_json::Error>;
}

/// One concrete payload struct inside a [`PayloadUnion`].
pub trait PayloadVariant: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Discriminator stored next to the serialized bytes.
    const TYPE_NAME: &'static str;
}

type Decoder<U> = fn(&[u8]) -> Result<U, serde_json::Error>;

struct PayloadEntry<U> {
    type_id: TypeId,
    decode: Decoder<U>,
}

impl<U> Clone for PayloadEntry<U> {
    fn clone(&self) -> Self {
        Self {
            type_id: self.type_id,
            decode: self.decode,
        }
    }
}

fn decode_variant<T, U>(bytes: &[u8]) -> Result<U, serde_json::Error>
where
    T: PayloadVariant + Into<U>,
{
    serde_json::from_slice::<T>(bytes).map(Into::into)
}

/// Name-keyed registry of the variants of one payload union.
pub struct PayloadTypes<U> {
    registry: &'static str,
    entries: HashMap<&'static str, PayloadEntry<U>>,
}

impl<U> Clone for PayloadTypes<U> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry,
            entries: self.entries.clone(),
        }
    }
}

impl<U> fmt::Debug for PayloadTypes<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&&str> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("PayloadTypes")
            .field("registry", &self.registry)
            .field("types", &names)
            .finish()
    }
}

impl<U: PayloadUnion> PayloadTypes<U> {
    /// Creates an empty registry. `registry` names it in error messages.
    pub fn new(registry: &'static str) -> Self {
        Self {
            registry,
            entries: HashMap::new(),
        }
    }

    /// Registers variant `T`.
    ///
    /// Re-registering the same type is a no-op; a different type under an
    /// already registered name is rejected.
    pub fn register<T>(&mut self) -> RegistryResult<()>
    where
        T: PayloadVariant + Into<U>,
    {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.entries.get(T::TYPE_NAME) {
            return if existing.type_id == type_id {
                Ok(())
            } else {
                Err(RegistryError::TypeNameConflict {
                    registry: self.registry,
                    name: T::TYPE_NAME.to_string(),
                })
            };
        }
        self.entries.insert(
            T::TYPE_NAME,
            PayloadEntry {
                type_id,
                decode: decode_variant::<T, U>,
            },
        );
        Ok(())
    }

    /// `true` if `type_name` is registered.
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// Every registered name, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Serializes `payload`, returning its type name and bytes.
    ///
    /// Fails for variants that were never registered so that nothing is
    /// written which could not be read back.
    pub fn serialize(&self, payload: &U) -> RegistryResult<(&'static str, Vec<u8>)> {
        let type_name = payload.type_name();
        if !self.is_registered(type_name) {
            return Err(self.unknown(type_name));
        }
        let bytes = payload
            .encode()
            .map_err(|error| RegistryError::Serialization {
                type_name: type_name.to_string(),
                message: error.to_string(),
            })?;
        Ok((type_name, bytes))
    }

    /// Rebuilds a payload from its type name and bytes.
    pub fn deserialize(&self, type_name: &str, bytes: &[u8]) -> RegistryResult<U> {
        let entry = self
            .entries
            .get(type_name)
            .ok_or_else(|| self.unknown(type_name))?;
        (entry.decode)(bytes).map_err(|error| RegistryError::Deserialization {
            type_name: type_name.to_string(),
            message: error.to_string(),
        })
    }

    fn unknown(&self, type_name: &str) -> RegistryError {
        RegistryError::UnknownType {
            registry: self.registry,
            name: type_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Opened {
        pub id: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Closed {
        pub id: String,
        pub reason: String,
    }

    crate::payload_union! {
        pub enum DoorEvent {
            Opened,
            Closed,
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Renamed {
        pub id: String,
    }

    impl From<Renamed> for DoorEvent {
        fn from(renamed: Renamed) -> Self {
            Self::Opened(Opened { id: renamed.id })
        }
    }

    impl PayloadVariant for Renamed {
        const TYPE_NAME: &'static str = "Opened";
    }

    fn registry() -> PayloadTypes<DoorEvent> {
        let mut types = PayloadTypes::new("event");
        types.register::<Opened>().unwrap();
        types.register::<Closed>().unwrap();
        types
    }

    #[test]
    fn serialize_then_deserialize_by_name() {
        let types = registry();
        let event = DoorEvent::from(Closed {
            id: "d1".to_string(),
            reason: "wind".to_string(),
        });
        let (name, bytes) = types.serialize(&event).unwrap();
        assert_eq!(name, "Closed");
        assert_eq!(types.deserialize(name, &bytes).unwrap(), event);
    }

    #[test]
    fn unknown_names_fail_loudly() {
        let types = registry();
        let err = types.deserialize("Slammed", b"{}").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType { ref name, .. } if name == "Slammed"));
    }

    #[test]
    fn unregistered_variant_cannot_be_serialized() {
        let mut types = PayloadTypes::<DoorEvent>::new("event");
        types.register::<Opened>().unwrap();
        let event = DoorEvent::from(Closed {
            id: "d1".to_string(),
            reason: "x".to_string(),
        });
        assert!(types.serialize(&event).is_err());
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let mut types = registry();
        types.register::<Opened>().unwrap();
        let err = types.register::<Renamed>().unwrap_err();
        assert!(matches!(err, RegistryError::TypeNameConflict { .. }));
    }

    #[test]
    fn malformed_bytes_report_the_type_name() {
        let err = registry().deserialize("Closed", b"{\"id\":1}").unwrap_err();
        assert!(err.to_string().contains("Closed"));
    }

    #[test]
    fn type_names_are_sorted() {
        assert_eq!(registry().type_names(), vec!["Closed", "Opened"]);
    }
}

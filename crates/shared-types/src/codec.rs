//! Binary codec used for persisted entities and signing payloads.

use crate::errors::{EntityError, EntityResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value with bincode.
pub fn encode<T: Serialize>(value: &T) -> EntityResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| EntityError::Codec(e.to_string()))
}

/// Decode a bincode-encoded value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> EntityResult<T> {
    bincode::deserialize(bytes).map_err(|e| EntityError::Codec(e.to_string()))
}

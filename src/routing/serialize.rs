//! JSON encoding used for handler results and request bodies.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::server::Error;

/// How a context renders the JSON its handlers reply with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonFormat {
    #[default]
    Compact,
    Pretty,
}

/// Serialize a handler result to compact JSON bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    encode_with(value, JsonFormat::Compact)
}

/// Serialize `value` in the given format.
pub fn encode_with<T: Serialize + ?Sized>(value: &T, format: JsonFormat) -> Result<Vec<u8>, Error> {
    let bytes = match format {
        JsonFormat::Compact => serde_json::to_vec(value)?,
        JsonFormat::Pretty => serde_json::to_vec_pretty(value)?,
    };
    Ok(bytes)
}

/// Deserialize JSON bytes into `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Error> {
    Ok(serde_json::from_slice(bytes)?)
}

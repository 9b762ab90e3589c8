use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

use bincode::config::{self, Configuration};
use serde::{de::DeserializeOwned, Serialize};

fn bincoder() -> Configuration {
    config::standard()
}

/// Serializes a value for an extension field or a key file.
pub(crate) fn serialize_value(value: &impl Serialize) -> Result<Vec<u8>, String> {
    bincode::serde::encode_to_vec(value, bincoder()).map_err(|err| format!("Failed to serialize: {err:?}"))
}

/// Deserializes a value, rejecting trailing bytes.
pub(crate) fn deserialize_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, String> {
    let (value, consumed) = bincode::serde::decode_from_slice(bytes, bincoder()).map_err(|err| err.to_string())?;
    if consumed != bytes.len() {
        return Err(format!("{} trailing bytes", bytes.len() - consumed));
    }
    Ok(value)
}

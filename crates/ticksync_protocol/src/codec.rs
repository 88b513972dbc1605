//! CBOR encoding for wire messages.

use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR.
///
/// # Errors
///
/// Returns `Encode` if serialization fails.
pub fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| ProtocolError::Encode {
        message: e.to_string(),
    })?;
    Ok(bytes)
}

/// Decodes a value from CBOR.
///
/// # Errors
///
/// Returns `Decode` if the bytes are not a valid encoding of `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode {
        message: e.to_string(),
    })
}

/// A message that travels as a CBOR body.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Encodes to CBOR.
    ///
    /// # Errors
    ///
    /// Returns `Encode` if serialization fails.
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        to_cbor(self)
    }

    /// Decodes from CBOR.
    ///
    /// # Errors
    ///
    /// Returns `Decode` if the bytes are malformed.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_fails_to_decode() {
        let result: ProtocolResult<Vec<String>> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::Decode { .. })));
    }
}

//! # EntiWork Codec
//!
//! Property values and deterministic CBOR encoding.
//!
//! The unit-of-work engine treats entity properties as opaque [`Value`]s. This
//! crate gives those values a serde representation and turns any serializable
//! type into CBOR bytes for storage backends that are not plain in-memory
//! maps.
//!
//! Encoding is deterministic:
//! - maps are `BTreeMap`s, so keys are always written in sorted order
//! - integers use the shortest CBOR form
//! - floats are not representable as [`Value`]s
//!
//! ```
//! use entiwork_codec::{from_cbor, to_cbor, Value};
//!
//! let origin = Value::from("HONGKONG");
//! let bytes = to_cbor(&origin).unwrap();
//! let decoded: Value = from_cbor(&bytes).unwrap();
//! assert_eq!(decoded, origin);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod value;

pub use error::{CodecError, CodecResult};
pub use value::Value;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes `value` to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a `T` from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not valid CBOR or
/// do not describe a `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

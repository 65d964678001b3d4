//! Serialization and deserialization for the `MentorLink` wire protocol.
//!
//! Messages travel as JSON text inside WebSocket text frames, so the codec
//! is a thin layer over `serde_json`: frame boundaries are preserved by the
//! transport and no length prefix is needed.

use serde::{Serialize, de::DeserializeOwned};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a message as a JSON string.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a message from a JSON string.
///
/// The input is trimmed before parsing so stray whitespace or trailing
/// newlines are tolerated.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the text is not a valid message.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text.trim()).map_err(|e| CodecError::Serialization(e.to_string()))
}

//! Versioned JSON encoding for persisted channel and chat state.
//!
//! Every blob written here is a JSON object carrying an integer `version`.
//! Decoding checks the version before binding the rest of the document, so a
//! future or foreign schema fails with a precise [`AgentChatError::Deserialization`]
//! instead of a best-effort coercion.

use crate::error::AgentChatError;
use crate::error::Result;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Largest blob accepted by default (16 MiB).
pub const DEFAULT_MAX_STATE_BYTES: usize = 16 * 1024 * 1024;

/// Options threaded explicitly into every serialize/restore call.
///
/// A chat owns one value of this type; there is no process-wide default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerializerOptions {
    /// Pretty-print written JSON.
    pub pretty: bool,
    /// Refuse to parse blobs larger than this many bytes.
    pub max_state_bytes: usize,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            max_state_bytes: DEFAULT_MAX_STATE_BYTES,
        }
    }
}

impl SerializerOptions {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        encoded.map_err(|e| AgentChatError::Serialization(e.to_string()))
    }

    /// Decodes `state` as a `what` document of schema `expected_version`.
    pub fn decode_versioned<T: DeserializeOwned>(
        &self,
        state: &str,
        expected_version: u32,
        what: &str,
    ) -> Result<T> {
        if state.len() > self.max_state_bytes {
            return Err(AgentChatError::Deserialization(format!(
                "{what} is {} bytes, limit is {}",
                state.len(),
                self.max_state_bytes
            )));
        }

        let value: serde_json::Value = serde_json::from_str(state)
            .map_err(|e| AgentChatError::Deserialization(format!("{what} is not valid JSON: {e}")))?;

        let version = value
            .as_object()
            .ok_or_else(|| {
                AgentChatError::Deserialization(format!("{what} must be a JSON object"))
            })?
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                AgentChatError::Deserialization(format!("{what} has no integer `version` field"))
            })?;

        if version != u64::from(expected_version) {
            return Err(AgentChatError::Deserialization(format!(
                "unsupported {what} version {version}, expected {expected_version}"
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| AgentChatError::Deserialization(format!("malformed {what}: {e}")))
    }
}

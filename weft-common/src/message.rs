//! The persisted message record.
//!
//! A [`Message`] is what a channel writes to its failure store when a run
//! fails, and what the replay machinery reads back. Two processes sharing a
//! store must agree on this shape, so the serde field names are part of the
//! wire contract and unknown top-level fields are preserved on round-trip.

use std::collections::BTreeSet;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::MessageId;

/// Reserved metadata key holding the names of destinations that have already
/// succeeded for this message. Maintained by the channel executor and
/// strictly append-only across replays.
pub const SKIP_DESTINATIONS_KEY: &str = "skipDestinations";

/// Error details captured when a channel run fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Human-readable summary of the failure
    pub message: String,
    /// Per-handler error descriptions, keyed by handler name
    #[serde(default)]
    pub causes: AHashMap<String, String>,
}

impl ErrorInfo {
    /// Create error info with an empty cause map
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: AHashMap::new(),
        }
    }

    /// Record the error description for a named handler
    #[must_use]
    pub fn with_cause(mut self, handler: impl Into<String>, description: impl Into<String>) -> Self {
        self.causes.insert(handler.into(), description.into());
        self
    }
}

/// A message as persisted to a store for later replay.
///
/// `metadata` carries the reserved [`SKIP_DESTINATIONS_KEY`] entry; everything
/// else in `metadata` and `properties` is free-form. Top-level fields this
/// version does not know about survive a round-trip via `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: Value,
    #[serde(default)]
    pub metadata: AHashMap<String, Value>,
    #[serde(default)]
    pub properties: AHashMap<String, Value>,
    #[serde(rename = "errorInfo", default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ErrorInfo>,
    #[serde(flatten)]
    pub extra: AHashMap<String, Value>,
}

impl Message {
    /// Create a fresh message with an empty skip set
    #[must_use]
    pub fn new(id: MessageId, content: Value) -> Self {
        let mut metadata = AHashMap::new();
        metadata.insert(SKIP_DESTINATIONS_KEY.to_string(), Value::Array(Vec::new()));
        Self {
            id,
            content,
            metadata,
            properties: AHashMap::new(),
            error_info: None,
            extra: AHashMap::new(),
        }
    }

    /// The destinations that have already succeeded for this message
    #[must_use]
    pub fn skip_destinations(&self) -> BTreeSet<String> {
        skip_set(&self.metadata)
    }
}

/// Parse the reserved skip-destination entry out of a metadata map.
///
/// Non-array values and non-string elements are ignored rather than erroring;
/// a foreign process writing a malformed entry must not poison replay.
pub(crate) fn skip_set(metadata: &AHashMap<String, Value>) -> BTreeSet<String> {
    metadata
        .get(SKIP_DESTINATIONS_KEY)
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

//! Mutable per-run message state.
//!
//! A [`MessageContext`] wraps one message for the duration of a single
//! pipeline run. Processors mutate it freely; the executor clones it to
//! snapshot pre-call state and exports it as a [`Message`] when a failure
//! needs to be persisted. It is owned by its run and never shared across
//! concurrent runs.

use std::collections::BTreeSet;

use ahash::AHashMap;
use serde_json::Value;
use tracing::warn;

use crate::{
    id::MessageId,
    message::{skip_set, ErrorInfo, Message, SKIP_DESTINATIONS_KEY},
};

#[derive(Debug, Clone)]
pub struct MessageContext {
    id: MessageId,
    content: Value,
    metadata: AHashMap<String, Value>,
    properties: AHashMap<String, Value>,
    error_info: Option<ErrorInfo>,
    extra: AHashMap<String, Value>,
}

impl MessageContext {
    /// Create a context for a fresh run, seeding the skip set with the
    /// destinations that must not be invoked.
    #[must_use]
    pub fn new(id: MessageId, content: Value, skips: impl IntoIterator<Item = String>) -> Self {
        let skip_names: BTreeSet<String> = skips.into_iter().collect();
        let mut metadata = AHashMap::new();
        metadata.insert(
            SKIP_DESTINATIONS_KEY.to_string(),
            Value::Array(skip_names.into_iter().map(Value::from).collect()),
        );
        Self {
            id,
            content,
            metadata,
            properties: AHashMap::new(),
            error_info: None,
            extra: AHashMap::new(),
        }
    }

    /// Rebuild a context from a persisted message, preserving its id,
    /// metadata (including the skip set), properties, and error info.
    #[must_use]
    pub fn from_message(message: Message) -> Self {
        Self {
            id: message.id,
            content: message.content,
            metadata: message.metadata,
            properties: message.properties,
            error_info: message.error_info,
            extra: message.extra,
        }
    }

    /// Export this context as a persistable [`Message`]
    #[must_use]
    pub fn to_message(&self) -> Message {
        self.clone().into_message()
    }

    /// Consume this context into a persistable [`Message`]
    #[must_use]
    pub fn into_message(self) -> Message {
        Message {
            id: self.id,
            content: self.content,
            metadata: self.metadata,
            properties: self.properties,
            error_info: self.error_info,
            extra: self.extra,
        }
    }

    pub const fn id(&self) -> &MessageId {
        &self.id
    }

    pub const fn content(&self) -> &Value {
        &self.content
    }

    pub const fn content_mut(&mut self) -> &mut Value {
        &mut self.content
    }

    /// Replace the message content (the transformer operation)
    pub fn set_content(&mut self, content: Value) {
        self.content = content;
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    pub const fn properties(&self) -> &AHashMap<String, Value> {
        &self.properties
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Set a metadata entry.
    ///
    /// The reserved skip-destination entry is managed exclusively through
    /// [`Self::add_skip_destination`]; attempts to overwrite it are dropped.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if key == SKIP_DESTINATIONS_KEY {
            warn!(id = %self.id, "ignoring direct write to reserved metadata key {SKIP_DESTINATIONS_KEY}");
            return;
        }
        self.metadata.insert(key, value);
    }

    /// The destinations that have already succeeded for this message
    #[must_use]
    pub fn skip_destinations(&self) -> BTreeSet<String> {
        skip_set(&self.metadata)
    }

    /// Whether the named destination must be bypassed this run
    #[must_use]
    pub fn is_skipped(&self, name: &str) -> bool {
        self.metadata
            .get(SKIP_DESTINATIONS_KEY)
            .and_then(Value::as_array)
            .is_some_and(|names| names.iter().filter_map(Value::as_str).any(|n| n == name))
    }

    /// Record that a destination succeeded. The skip set is append-only:
    /// names are never removed, and re-adding is a no-op.
    pub fn add_skip_destination(&mut self, name: &str) {
        if self.is_skipped(name) {
            return;
        }
        match self.metadata.get_mut(SKIP_DESTINATIONS_KEY) {
            Some(Value::Array(names)) => names.push(Value::from(name)),
            _ => {
                self.metadata.insert(
                    SKIP_DESTINATIONS_KEY.to_string(),
                    Value::Array(vec![Value::from(name)]),
                );
            }
        }
    }

    pub const fn error_info(&self) -> Option<&ErrorInfo> {
        self.error_info.as_ref()
    }

    pub fn set_error_info(&mut self, info: ErrorInfo) {
        self.error_info = Some(info);
    }

    /// Clear error state from a previous run while preserving the skip set,
    /// so a replay starts clean but still bypasses finished destinations.
    pub fn clean_error_info_for_replay(&mut self) {
        self.error_info = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> MessageContext {
        MessageContext::new(MessageId::generate(), Value::from("payload"), Vec::new())
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut ctx = context();
        let snapshot = ctx.clone();

        ctx.set_content(Value::from("mutated"));
        ctx.set_property("key", Value::from(1));
        ctx.add_skip_destination("sink");

        assert_eq!(snapshot.content(), &Value::from("payload"));
        assert!(snapshot.property("key").is_none());
        assert!(!snapshot.is_skipped("sink"));
    }

    #[test]
    fn test_skip_set_is_append_only() {
        let mut ctx = context();
        ctx.add_skip_destination("a");
        ctx.add_skip_destination("b");
        ctx.add_skip_destination("a");

        assert_eq!(
            ctx.skip_destinations(),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );

        // Direct writes to the reserved key are ignored
        ctx.set_metadata(SKIP_DESTINATIONS_KEY, Value::Array(Vec::new()));
        assert!(ctx.is_skipped("a"));
    }

    #[test]
    fn test_seeded_skips_are_honored() {
        let ctx = MessageContext::new(
            MessageId::generate(),
            Value::Null,
            vec!["done".to_string()],
        );
        assert!(ctx.is_skipped("done"));
        assert!(!ctx.is_skipped("pending"));
    }

    #[test]
    fn test_clean_error_info_preserves_skips() {
        let mut ctx = context();
        ctx.add_skip_destination("a");
        ctx.set_error_info(ErrorInfo::new("boom").with_cause("b", "failed"));

        ctx.clean_error_info_for_replay();
        assert!(ctx.error_info().is_none());
        assert!(ctx.is_skipped("a"));
    }

    #[test]
    fn test_message_round_trip() {
        let mut ctx = context();
        ctx.add_skip_destination("a");
        ctx.set_property("count", Value::from(2));
        ctx.set_metadata("origin", Value::from("edge"));

        let id = ctx.id().clone();
        let message = ctx.to_message();
        let restored = MessageContext::from_message(message);

        assert_eq!(restored.id(), &id);
        assert_eq!(restored.content(), &Value::from("payload"));
        assert!(restored.is_skipped("a"));
        assert_eq!(restored.property("count"), Some(&Value::from(2)));
        assert_eq!(restored.metadata("origin"), Some(&Value::from("edge")));
    }
}

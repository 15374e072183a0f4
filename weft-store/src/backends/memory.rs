use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::{Result, StoreError},
    store::{Handle, MessageStore, Retrieved},
};

/// Retrieval ordering for [`InMemoryStore`], fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetrievalOrder {
    /// Oldest entry first
    #[default]
    Fifo,
    /// Newest entry first
    Lifo,
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    content: Value,
    reserved: bool,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<Entry>,
    next_seq: u64,
}

/// In-memory message store.
///
/// Entries live in an ordered sequence guarded by a single mutex. `retrieve`
/// reserves an entry rather than removing it, so interleaved retrievals from
/// concurrent callers always see distinct entries, and a negative
/// acknowledgement releases exactly the reserved entry back into rotation.
///
/// Primarily intended for testing and transient wiring, but safe as a real
/// (non-durable) store.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
    order: RetrievalOrder,
}

impl InMemoryStore {
    /// Create a FIFO store
    #[must_use]
    pub fn new() -> Self {
        Self::with_order(RetrievalOrder::Fifo)
    }

    /// Create a store with the given retrieval order
    #[must_use]
    pub fn with_order(order: RetrievalOrder) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            order,
        }
    }

    /// Get the configured retrieval order
    #[must_use]
    pub const fn order(&self) -> RetrievalOrder {
        self.order
    }

    /// Number of entries currently held (reserved entries included)
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the
    /// underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entries
            .len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn store(&self, value: &Value) -> Result<()> {
        let mut inner = self.inner.lock()?;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push(Entry {
            seq,
            content: value.clone(),
            reserved: false,
        });
        Ok(())
    }

    async fn retrieve(&self) -> Result<Option<Retrieved>> {
        let mut inner = self.inner.lock()?;

        let candidate = match self.order {
            RetrievalOrder::Fifo => inner.entries.iter_mut().find(|e| !e.reserved),
            RetrievalOrder::Lifo => inner.entries.iter_mut().rev().find(|e| !e.reserved),
        };

        Ok(candidate.map(|entry| {
            entry.reserved = true;
            Retrieved {
                handle: Handle::new(entry.seq.to_string()),
                content: entry.content.clone(),
            }
        }))
    }

    async fn acknowledge(&self, handle: &Handle, success: bool) -> Result<()> {
        let seq: u64 = handle
            .as_str()
            .parse()
            .map_err(|_| StoreError::UnknownHandle(handle.clone()))?;

        let mut inner = self.inner.lock()?;
        let position = inner
            .entries
            .iter()
            .position(|e| e.seq == seq && e.reserved)
            .ok_or_else(|| StoreError::UnknownHandle(handle.clone()))?;

        if success {
            // Remove the specific entry bound to the handle, not the head;
            // other entries may be reserved by interleaved retrievals.
            inner.entries.remove(position);
        } else {
            inner.entries[position].reserved = false;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    async fn seed(store: &InMemoryStore, values: &[&str]) {
        for value in values {
            store.store(&Value::from(*value)).await.expect("store");
        }
    }

    #[tokio::test]
    async fn test_fifo_retrieval_order() {
        let store = InMemoryStore::new();
        seed(&store, &["first", "second", "third"]).await;

        for expected in ["first", "second", "third"] {
            let retrieved = store.retrieve().await.expect("retrieve").expect("entry");
            assert_eq!(retrieved.content, Value::from(expected));
            store
                .acknowledge(&retrieved.handle, true)
                .await
                .expect("ack");
        }
        assert!(store.retrieve().await.expect("retrieve").is_none());
    }

    #[tokio::test]
    async fn test_lifo_retrieval_order() {
        let store = InMemoryStore::with_order(RetrievalOrder::Lifo);
        seed(&store, &["first", "second", "third"]).await;

        for expected in ["third", "second", "first"] {
            let retrieved = store.retrieve().await.expect("retrieve").expect("entry");
            assert_eq!(retrieved.content, Value::from(expected));
            store
                .acknowledge(&retrieved.handle, true)
                .await
                .expect("ack");
        }
        assert!(store.retrieve().await.expect("retrieve").is_none());
    }

    #[tokio::test]
    async fn test_retrieve_does_not_remove() {
        let store = InMemoryStore::new();
        seed(&store, &["only"]).await;

        let _retrieved = store.retrieve().await.expect("retrieve").expect("entry");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_negative_ack_round_trip() {
        let store = InMemoryStore::new();
        seed(&store, &["payload"]).await;

        let first = store.retrieve().await.expect("retrieve").expect("entry");
        store.acknowledge(&first.handle, false).await.expect("nack");

        let second = store.retrieve().await.expect("retrieve").expect("entry");
        assert_eq!(second.content, Value::from("payload"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_ack_settles_handle_exactly_once() {
        let store = InMemoryStore::new();
        seed(&store, &["payload"]).await;

        let retrieved = store.retrieve().await.expect("retrieve").expect("entry");
        store
            .acknowledge(&retrieved.handle, true)
            .await
            .expect("first ack");

        let second = store.acknowledge(&retrieved.handle, true).await;
        assert!(matches!(second, Err(StoreError::UnknownHandle(_))));
    }

    #[tokio::test]
    async fn test_unreserved_entry_cannot_be_acknowledged() {
        let store = InMemoryStore::new();
        seed(&store, &["payload"]).await;

        // Entry 0 exists but was never retrieved
        let result = store.acknowledge(&Handle::new("0"), true).await;
        assert!(matches!(result, Err(StoreError::UnknownHandle(_))));
    }

    #[tokio::test]
    async fn test_garbage_handle_is_unknown() {
        let store = InMemoryStore::new();
        let result = store.acknowledge(&Handle::new("not-a-seq"), false).await;
        assert!(matches!(result, Err(StoreError::UnknownHandle(_))));
    }

    #[tokio::test]
    async fn test_concurrent_retrievals_get_distinct_handles() {
        let store = InMemoryStore::new();
        seed(&store, &["a", "b", "c"]).await;

        let mut handles = HashSet::new();
        for _ in 0..3 {
            let retrieved = store.retrieve().await.expect("retrieve").expect("entry");
            assert!(handles.insert(retrieved.handle));
        }
        assert!(store.retrieve().await.expect("retrieve").is_none());
    }

    #[tokio::test]
    async fn test_ack_removes_specific_entry_under_interleaving() {
        let store = InMemoryStore::new();
        seed(&store, &["a", "b"]).await;

        let first = store.retrieve().await.expect("retrieve").expect("entry");
        let second = store.retrieve().await.expect("retrieve").expect("entry");
        assert_eq!(first.content, Value::from("a"));
        assert_eq!(second.content, Value::from("b"));

        // Settle the second retrieval first; "a" must survive.
        store
            .acknowledge(&second.handle, true)
            .await
            .expect("ack b");
        store.acknowledge(&first.handle, false).await.expect("nack a");

        let remaining = store.retrieve().await.expect("retrieve").expect("entry");
        assert_eq!(remaining.content, Value::from("a"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_stored_values_are_deep_copied() {
        let store = InMemoryStore::new();
        let mut value = serde_json::json!({ "nested": { "n": 1 } });
        store.store(&value).await.expect("store");

        // Mutating the caller's value must not affect the stored entry
        value["nested"]["n"] = Value::from(99);

        let retrieved = store.retrieve().await.expect("retrieve").expect("entry");
        assert_eq!(retrieved.content["nested"]["n"], Value::from(1));
    }
}

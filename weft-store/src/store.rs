//! The message-store contract.
//!
//! A store is a durable ordered holding area with an explicit
//! retrieve/acknowledge protocol: `retrieve` hands out an entry *without*
//! removing it, bound to an opaque [`Handle`]; the caller must settle every
//! handle exactly once via [`MessageStore::acknowledge`]. Values are
//! deep-copied across the store boundary in both directions, so stores never
//! share mutable structure with their callers.

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Opaque token binding one retrieved entry to its acknowledgement.
///
/// Handles are store-internal bookkeeping, distinct from any message id the
/// stored content may carry. Concurrent retrievals on the same store always
/// observe distinct handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(String);

impl Handle {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry handed out by [`MessageStore::retrieve`]
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub handle: Handle,
    pub content: Value,
}

/// Trait for durable message holding areas.
///
/// Implementations must be safe under concurrent callers and must keep an
/// internal association from each outstanding handle to its entry until the
/// handle is settled.
#[async_trait]
pub trait MessageStore: Send + Sync + Debug {
    /// Append a value to the store. The value is deep-copied.
    ///
    /// # Errors
    /// If the backing medium rejects the write
    async fn store(&self, value: &Value) -> Result<()>;

    /// Return the next entry per the store's ordering without removing it,
    /// or `None` iff the store is empty at the instant of the call.
    ///
    /// # Errors
    /// If the backing medium cannot be read
    async fn retrieve(&self) -> Result<Option<Retrieved>>;

    /// Settle a handle: on `success` the entry is permanently removed,
    /// otherwise it is released so a later `retrieve` can return it again.
    ///
    /// # Errors
    /// If the handle is unknown or already settled, or the backing medium
    /// rejects the operation
    async fn acknowledge(&self, handle: &Handle, success: bool) -> Result<()>;
}

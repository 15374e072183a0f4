//! Error types for the weft-listener crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListenerError {
    /// Listener configuration failed validation.
    #[error("Listener configuration error: {0}")]
    Config(String),

    /// A handler is already attached; detach it first.
    #[error("a handler is already attached to this listener")]
    HandlerAlreadyAttached,

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for ListenerError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

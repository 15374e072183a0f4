//! Backend store implementations
//!
//! This module contains the built-in message stores:
//! - `memory`: ordered in-memory storage with FIFO/LIFO retrieval
//! - `directory`: one JSON file per message in a local directory
//! - `amqp`: a named queue on an AMQP broker with manual acknowledgement

pub mod amqp;
pub mod directory;
pub mod memory;

pub use amqp::{AmqpConfig, AmqpStore};
pub use directory::DirectoryStore;
pub use memory::{InMemoryStore, RetrievalOrder};

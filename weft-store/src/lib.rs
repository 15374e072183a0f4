#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod backends;
pub mod error;
pub mod store;

pub use backends::{AmqpConfig, AmqpStore, DirectoryStore, InMemoryStore, RetrievalOrder};
pub use error::{Result, StoreError};
pub use store::{Handle, MessageStore, Retrieved};

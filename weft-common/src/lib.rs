#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod context;
pub mod id;
pub mod logging;
pub mod message;

pub use context::MessageContext;
pub use id::MessageId;
pub use message::{ErrorInfo, Message, SKIP_DESTINATIONS_KEY};

pub use tracing;

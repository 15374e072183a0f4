#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod channel;
pub mod error;
mod executor;
pub mod handler;
pub mod registry;
mod replay;

pub use channel::{Channel, ChannelBuilder, FailureConfig, ReplayConfig};
pub use error::{ChannelError, ExecutionError};
pub use executor::ExecutionResult;
pub use handler::{Destination, DestinationsFlow, Processor};

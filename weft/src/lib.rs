//! weft: a reliable message-processing fabric.
//!
//! A channel is a pipeline of sequential source processors feeding one or
//! more parallel destinations, with durable failure capture, automatic
//! replay, and dead-lettering over pluggable message stores. This crate
//! re-exports the public API of the underlying crates.

#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub use weft_channel::{
    Channel, ChannelBuilder, ChannelError, Destination, DestinationsFlow, ExecutionError,
    ExecutionResult, FailureConfig, Processor, ReplayConfig, registry,
};
pub use weft_common::{ErrorInfo, Message, MessageContext, MessageId, logging};
pub use weft_listener::{Handler, HandlerFn, ListenerConfig, ListenerError, StoreListener};
pub use weft_store::{
    AmqpConfig, AmqpStore, DirectoryStore, Handle, InMemoryStore, MessageStore, RetrievalOrder,
    Retrieved, StoreError,
};

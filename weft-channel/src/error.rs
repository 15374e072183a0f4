//! Error types for the weft-channel crate.
//!
//! Construction problems surface as [`ChannelError`]; a pipeline run always
//! returns `Result<ExecutionResult, ExecutionError>` and never panics. Every
//! [`ExecutionError`] variant carries the [`Message`] to persist and replay.

use std::collections::BTreeMap;

use thiserror::Error;
use weft_common::Message;
use weft_listener::ListenerError;

/// Channel construction failed.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Invalid configuration (empty source flow, missing handler name, ...).
    #[error("Channel configuration error: {0}")]
    Config(String),

    /// A channel with this name is already registered in this process.
    #[error("a channel named {0:?} is already registered")]
    DuplicateChannel(String),

    /// The replay listener could not be wired up.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A pipeline run failed.
///
/// The embedded message reflects the run's pre-failure state: for a failed
/// source processor, the context snapshot taken before that processor ran;
/// for destination failures, the post-source state every destination
/// observed, with the skip set already grown by this run's successes.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A source processor failed; no destinations were invoked.
    #[error("source processor {name:?} failed: {description}")]
    Processor {
        name: String,
        description: String,
        message: Box<Message>,
    },

    /// A processor or destination router failed; no destinations were invoked.
    #[error("router {name:?} failed: {description}")]
    Routing {
        name: String,
        description: String,
        message: Box<Message>,
    },

    /// One or more destinations failed; the rest of the run completed.
    #[error("destination failures: {}", comma_separated(.failures))]
    Destinations {
        failures: BTreeMap<String, String>,
        message: Box<Message>,
    },
}

fn comma_separated(failures: &BTreeMap<String, String>) -> String {
    failures.keys().cloned().collect::<Vec<_>>().join(", ")
}

impl ExecutionError {
    /// The message to persist for later replay
    #[must_use]
    pub fn message(&self) -> &Message {
        match self {
            Self::Processor { message, .. }
            | Self::Routing { message, .. }
            | Self::Destinations { message, .. } => message,
        }
    }

    /// Consume this error into its replayable message
    #[must_use]
    pub fn into_message(self) -> Message {
        match self {
            Self::Processor { message, .. }
            | Self::Routing { message, .. }
            | Self::Destinations { message, .. } => *message,
        }
    }

    /// Per-destination failures, when destinations ran at all
    #[must_use]
    pub const fn failures(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Destinations { failures, .. } => Some(failures),
            _ => None,
        }
    }
}

//! Channel construction and the execute/replay entry points.

use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde_json::Value;
use tracing::{debug, warn};
use weft_common::{Message, MessageContext, MessageId};
use weft_listener::StoreListener;
use weft_store::MessageStore;

use crate::{
    error::{ChannelError, ExecutionError},
    executor::{self, ExecutionResult},
    handler::{Destination, DestinationsFlow, Processor},
    registry, replay,
};

/// Failure capture and replay options for a channel
#[derive(Debug, Clone, Default)]
pub struct FailureConfig {
    /// Where failed runs are persisted for later replay
    pub failure_store: Option<Arc<dyn MessageStore>>,
    /// Store the replay listener polls; defaults to the failure store
    pub replay_store: Option<Arc<dyn MessageStore>>,
    /// When present, a replay listener is wired up at construction
    pub replay_listener: Option<ReplayConfig>,
}

/// Options for a channel's auto-wired replay listener
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Period between replay-store polls
    pub polling_interval: Duration,
    /// Additional replay attempts after the initial failure, applied at the
    /// service layer so each attempt sees the freshly-updated message
    pub max_retries: u32,
    /// Delay between replay attempts
    pub retry_interval: Duration,
    /// With no dead-letter store: drop instead of keeping the message after
    /// exhausted replays
    pub drop_message_after_max_retries: bool,
    /// Receives messages whose replays are exhausted
    pub dead_letter_store: Option<Arc<dyn MessageStore>>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(1),
            max_retries: 0,
            retry_interval: Duration::from_secs(1),
            drop_message_after_max_retries: false,
            dead_letter_store: None,
        }
    }
}

/// A configured pipeline: source processors feeding parallel destinations,
/// with optional failure capture and replay.
///
/// Channels are registered process-wide by name at construction and are
/// normally never torn down; [`Channel::shutdown`] exists for orderly test
/// and process teardown.
pub struct Channel {
    name: String,
    source_flow: Vec<Processor>,
    destinations: DestinationsFlow,
    failure_store: Option<Arc<dyn MessageStore>>,
    replay_listener: Mutex<Option<StoreListener>>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("source_flow", &self.source_flow)
            .field("destinations", &self.destinations)
            .finish_non_exhaustive()
    }
}

impl Channel {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn source_flow(&self) -> &[Processor] {
        &self.source_flow
    }

    pub(crate) const fn destinations(&self) -> &DestinationsFlow {
        &self.destinations
    }

    /// Run the pipeline over fresh content.
    ///
    /// # Errors
    /// Returns the failure as an [`ExecutionError`] carrying a replayable
    /// message; the same message is written to the failure store best-effort.
    pub async fn execute(&self, content: Value) -> Result<ExecutionResult, ExecutionError> {
        self.execute_with_skips(content, Vec::new()).await
    }

    /// Run the pipeline over fresh content, bypassing the named destinations
    /// as if they had already succeeded.
    ///
    /// # Errors
    /// See [`Self::execute`]
    pub async fn execute_with_skips(
        &self,
        content: Value,
        skips: Vec<String>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let id = MessageId::generate();
        debug!(channel = %self.name, message = %id, "executing channel");
        let ctx = MessageContext::new(id, content, skips);
        self.run(ctx, true).await
    }

    /// Re-run a previously-failed message, bypassing destinations that
    /// already succeeded. Failures are NOT re-written to the failure store.
    ///
    /// # Errors
    /// Returns the failure as an [`ExecutionError`] whose message carries the
    /// (possibly grown) skip set for a further replay
    pub async fn replay(&self, message: Message) -> Result<ExecutionResult, ExecutionError> {
        self.replay_with_options(message, true).await
    }

    /// Re-run a previously-failed message.
    ///
    /// `skip_failure_store` suppresses the failure-store write on failure;
    /// the default (`true`) prevents the replay listener from feeding itself.
    ///
    /// # Errors
    /// See [`Self::replay`]
    pub async fn replay_with_options(
        &self,
        message: Message,
        skip_failure_store: bool,
    ) -> Result<ExecutionResult, ExecutionError> {
        debug!(channel = %self.name, message = %message.id, "replaying channel");
        let mut ctx = MessageContext::from_message(message);
        ctx.clean_error_info_for_replay();
        self.run(ctx, !skip_failure_store).await
    }

    async fn run(
        &self,
        ctx: MessageContext,
        persist_on_failure: bool,
    ) -> Result<ExecutionResult, ExecutionError> {
        let outcome = executor::run_pipeline(self, ctx).await;
        if persist_on_failure
            && let Err(err) = &outcome
        {
            self.persist_failure(err.message()).await;
        }
        outcome
    }

    /// Best-effort failure-store write: a persistence problem is logged and
    /// never shadows the original execution error.
    async fn persist_failure(&self, message: &Message) {
        let Some(store) = &self.failure_store else {
            return;
        };
        match serde_json::to_value(message) {
            Ok(value) => {
                if let Err(e) = store.store(&value).await {
                    warn!(channel = %self.name, message = %message.id, error = %e, "failed to persist failure message");
                }
            }
            Err(e) => {
                warn!(channel = %self.name, message = %message.id, error = %e, "failed to serialize failure message");
            }
        }
    }

    pub(crate) fn install_replay_listener(&self, listener: StoreListener) {
        *self
            .replay_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub(crate) async fn stop_replay(&self) {
        let listener = self
            .replay_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener
            && let Err(e) = listener.graceful_stop().await
        {
            warn!(channel = %self.name, error = %e, "replay listener did not stop cleanly");
        }
    }

    /// Stop the replay listener (waiting for any in-flight replay) and
    /// remove this channel from the process-wide registry.
    pub async fn shutdown(&self) {
        self.stop_replay().await;
        registry::deregister(&self.name);
    }
}

/// Builder for [`Channel`]
#[derive(Debug)]
pub struct ChannelBuilder {
    name: String,
    source_flow: Vec<Processor>,
    destinations: Option<DestinationsFlow>,
    failure_config: FailureConfig,
}

impl ChannelBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_flow: Vec::new(),
            destinations: None,
            failure_config: FailureConfig::default(),
        }
    }

    /// Append a source processor, preserving declaration order
    #[must_use]
    pub fn source(mut self, processor: Processor) -> Self {
        self.source_flow.push(processor);
        self
    }

    /// Set the destinations flow
    #[must_use]
    pub fn destinations(mut self, flow: DestinationsFlow) -> Self {
        self.destinations = Some(flow);
        self
    }

    /// Set failure capture and replay options
    #[must_use]
    pub fn failure_config(mut self, config: FailureConfig) -> Self {
        self.failure_config = config;
        self
    }

    /// Validate the configuration, register the channel process-wide, and
    /// wire up the replay listener when configured.
    ///
    /// Must be called from within a Tokio runtime if a replay listener is
    /// configured, since the listener's poll job is spawned here.
    ///
    /// # Errors
    /// On invalid configuration or a duplicate channel name
    pub fn build(self) -> Result<Arc<Channel>, ChannelError> {
        if self.name.trim().is_empty() {
            return Err(ChannelError::Config(
                "channel name must be non-empty".to_string(),
            ));
        }
        if self.source_flow.is_empty() {
            return Err(ChannelError::Config(format!(
                "channel {:?} requires at least one source processor",
                self.name
            )));
        }
        for processor in &self.source_flow {
            validate_processor(processor)?;
        }

        let destinations = self.destinations.ok_or_else(|| {
            ChannelError::Config(format!("channel {:?} requires a destinations flow", self.name))
        })?;
        validate_destinations(&destinations)?;

        let channel = Arc::new(Channel {
            name: self.name,
            source_flow: self.source_flow,
            destinations,
            failure_store: self.failure_config.failure_store.clone(),
            replay_listener: Mutex::new(None),
        });

        registry::register(&channel)?;

        if let Err(e) = replay::wire(&channel, &self.failure_config) {
            registry::deregister(channel.name());
            return Err(e);
        }

        Ok(channel)
    }
}

fn validate_processor(processor: &Processor) -> Result<(), ChannelError> {
    if processor.name().trim().is_empty() {
        return Err(ChannelError::Config(
            "every processor requires a non-empty name".to_string(),
        ));
    }
    Ok(())
}

fn validate_destination(destination: &Destination) -> Result<(), ChannelError> {
    if destination.name().trim().is_empty() {
        return Err(ChannelError::Config(
            "every destination requires a non-empty name".to_string(),
        ));
    }
    for preprocessor in destination.preprocessors() {
        validate_processor(preprocessor)?;
    }
    Ok(())
}

fn validate_destinations(flow: &DestinationsFlow) -> Result<(), ChannelError> {
    match flow {
        DestinationsFlow::Static(destinations) => {
            if destinations.is_empty() {
                return Err(ChannelError::Config(
                    "destinations flow requires at least one destination".to_string(),
                ));
            }
            let mut seen = HashSet::new();
            for destination in destinations {
                validate_destination(destination)?;
                if !seen.insert(destination.name()) {
                    return Err(ChannelError::Config(format!(
                        "duplicate destination name {:?}",
                        destination.name()
                    )));
                }
            }
            Ok(())
        }
        DestinationsFlow::Router { name, .. } => {
            if name.trim().is_empty() {
                return Err(ChannelError::Config(
                    "destination router requires a non-empty name".to_string(),
                ));
            }
            Ok(())
        }
    }
}

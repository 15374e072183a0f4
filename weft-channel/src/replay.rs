//! Replay wiring: binds a store listener to a channel so captured failures
//! are reprocessed automatically.
//!
//! Retry lives at the service layer, not the listener: the listener's retry
//! loop would resend the original content, but each replay attempt must see
//! the freshly-updated message so destinations that succeeded in the
//! meantime stay skipped. The listener is therefore created with zero
//! retries of its own, and its dead-letter/drop policy engages only once
//! service-level retries are exhausted.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time;
use tracing::{info, warn};
use weft_common::Message;
use weft_listener::{Handler, ListenerConfig, StoreListener};

use crate::channel::{Channel, FailureConfig};
use crate::error::ChannelError;

/// Wire a replay listener onto the channel per its failure configuration.
///
/// A no-op when no replay listener is configured; logs and skips when one is
/// configured but neither a replay store nor a failure store exists.
pub(crate) fn wire(channel: &Arc<Channel>, config: &FailureConfig) -> Result<(), ChannelError> {
    let Some(replay_config) = &config.replay_listener else {
        return Ok(());
    };

    let Some(target) = config
        .replay_store
        .clone()
        .or_else(|| config.failure_store.clone())
    else {
        warn!(
            channel = channel.name(),
            "replay listener configured without a replay or failure store, skipping"
        );
        return Ok(());
    };

    let listener_config = ListenerConfig {
        polling_interval: replay_config.polling_interval,
        // Listener-level retry would resend the original content; replay
        // retries at the service layer with the updated message instead.
        max_retries: 0,
        retry_interval: replay_config.retry_interval,
        drop_message_after_max_retries: replay_config.drop_message_after_max_retries,
        dead_letter_store: replay_config.dead_letter_store.clone(),
    };

    let listener = StoreListener::new(target, listener_config)?;
    listener.attach(Arc::new(ReplayService {
        channel: Arc::downgrade(channel),
        max_retries: replay_config.max_retries,
        retry_interval: replay_config.retry_interval,
    }))?;
    listener.start()?;

    channel.install_replay_listener(listener);
    Ok(())
}

/// Listener handler that replays captured failures through the channel.
struct ReplayService {
    channel: Weak<Channel>,
    max_retries: u32,
    retry_interval: std::time::Duration,
}

#[async_trait]
impl Handler for ReplayService {
    async fn handle(&self, content: Value) -> anyhow::Result<()> {
        let Some(channel) = self.channel.upgrade() else {
            anyhow::bail!("channel was shut down");
        };

        let mut message: Message = serde_json::from_value(content)?;

        for attempt in 0..=self.max_retries {
            match channel.replay(message).await {
                Ok(result) => {
                    info!(
                        channel = channel.name(),
                        message = %result.message.id,
                        "replay succeeded"
                    );
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        channel = channel.name(),
                        attempt = attempt + 1,
                        error = %err,
                        "replay attempt failed"
                    );
                    // Thread the updated message into the next attempt so
                    // destinations that just succeeded stay skipped.
                    message = err.into_message();
                }
            }
            if attempt < self.max_retries {
                time::sleep(self.retry_interval).await;
            }
        }

        anyhow::bail!(
            "replay of message {} failed after {} attempts",
            message.id,
            self.max_retries + 1
        )
    }
}

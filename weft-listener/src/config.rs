//! Listener configuration.

use std::{sync::Arc, time::Duration};

use weft_store::MessageStore;

use crate::error::ListenerError;

/// Options controlling a [`crate::StoreListener`]'s poll and retry behavior
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Period between poll attempts. Must be non-zero.
    pub polling_interval: Duration,

    /// Additional dispatch attempts after the initial failure
    pub max_retries: u32,

    /// Delay between retry attempts. Must be non-zero.
    pub retry_interval: Duration,

    /// With no dead-letter store configured: whether exhausted retries
    /// positively acknowledge (drop) the message instead of releasing it
    /// back to the store.
    pub drop_message_after_max_retries: bool,

    /// When set, exhausted retries route the message here instead of
    /// applying the drop/keep decision.
    pub dead_letter_store: Option<Arc<dyn MessageStore>>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            polling_interval: defaults::polling_interval(),
            max_retries: defaults::max_retries(),
            retry_interval: defaults::retry_interval(),
            drop_message_after_max_retries: false,
            dead_letter_store: None,
        }
    }
}

impl ListenerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// If either interval is zero
    pub fn validate(&self) -> Result<(), ListenerError> {
        if self.polling_interval.is_zero() {
            return Err(ListenerError::Config(
                "polling_interval must be greater than zero".to_string(),
            ));
        }
        if self.retry_interval.is_zero() {
            return Err(ListenerError::Config(
                "retry_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod defaults {
    use std::time::Duration;

    pub const fn polling_interval() -> Duration {
        Duration::from_secs(1)
    }

    pub const fn max_retries() -> u32 {
        0
    }

    pub const fn retry_interval() -> Duration {
        Duration::from_secs(1)
    }
}

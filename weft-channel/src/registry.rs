//! Process-wide channel registry.
//!
//! Channel names are unique per process; entries are added at construction
//! and normally never removed. [`reset`] exists for deterministic test
//! teardown.

use std::sync::{Arc, LazyLock};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{channel::Channel, error::ChannelError};

static CHANNELS: LazyLock<DashMap<String, Arc<Channel>>> = LazyLock::new(DashMap::new);

pub(crate) fn register(channel: &Arc<Channel>) -> Result<(), ChannelError> {
    match CHANNELS.entry(channel.name().to_string()) {
        Entry::Occupied(_) => Err(ChannelError::DuplicateChannel(channel.name().to_string())),
        Entry::Vacant(slot) => {
            slot.insert(Arc::clone(channel));
            Ok(())
        }
    }
}

pub(crate) fn deregister(name: &str) -> Option<Arc<Channel>> {
    CHANNELS.remove(name).map(|(_, channel)| channel)
}

/// Look up a registered channel by name
#[must_use]
pub fn get(name: &str) -> Option<Arc<Channel>> {
    CHANNELS.get(name).map(|entry| Arc::clone(entry.value()))
}

/// Names of all registered channels
#[must_use]
pub fn names() -> Vec<String> {
    CHANNELS.iter().map(|entry| entry.key().clone()).collect()
}

/// Deregister every channel, gracefully stopping replay listeners first.
///
/// Intended for test environments that need deterministic teardown.
pub async fn reset() {
    let channels: Vec<Arc<Channel>> = CHANNELS
        .iter()
        .map(|entry| Arc::clone(entry.value()))
        .collect();
    CHANNELS.clear();
    for channel in channels {
        channel.stop_replay().await;
    }
}

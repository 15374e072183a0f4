//! Polling store consumer.
//!
//! A [`StoreListener`] runs one recurring task that retrieves the next entry
//! from its store, dispatches it to the attached [`Handler`], and settles the
//! handle per the configured retry, dead-letter, and drop policy. One tick
//! runs to completion before the next begins; store-level errors are logged
//! and never abort the listener.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use weft_store::{MessageStore, Retrieved, StoreError};

use crate::{config::ListenerConfig, error::ListenerError, handler::Handler};

struct PollJob {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    handler: Option<Arc<dyn Handler>>,
    poll: Option<PollJob>,
}

/// A polling consumer bound to one message store.
pub struct StoreListener {
    store: Arc<dyn MessageStore>,
    config: ListenerConfig,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for StoreListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreListener")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StoreListener {
    /// Create a listener over the given store.
    ///
    /// # Errors
    /// If the configuration fails validation
    pub fn new(store: Arc<dyn MessageStore>, config: ListenerConfig) -> Result<Self, ListenerError> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Attach the handler that poll ticks dispatch into.
    ///
    /// # Errors
    /// If a handler is already attached
    pub fn attach(&self, handler: Arc<dyn Handler>) -> Result<(), ListenerError> {
        let mut inner = self.inner.lock()?;
        if inner.handler.is_some() {
            return Err(ListenerError::HandlerAlreadyAttached);
        }
        inner.handler = Some(handler);
        Ok(())
    }

    /// Detach the current handler, cancelling the poll job if it is running.
    ///
    /// # Errors
    /// If internal state is poisoned
    pub fn detach(&self) -> Result<(), ListenerError> {
        let mut inner = self.inner.lock()?;
        if let Some(job) = inner.poll.take() {
            let _ = job.shutdown.send(true);
            job.task.abort();
        }
        inner.handler = None;
        Ok(())
    }

    /// Start the recurring poll job.
    ///
    /// A no-op when no handler is attached or the job is already running.
    ///
    /// # Errors
    /// If internal state is poisoned
    pub fn start(&self) -> Result<(), ListenerError> {
        let mut inner = self.inner.lock()?;

        let Some(handler) = inner.handler.as_ref().map(Arc::clone) else {
            debug!("start ignored, no handler attached");
            return Ok(());
        };
        if inner.poll.as_ref().is_some_and(|job| !job.task.is_finished()) {
            debug!("start ignored, poll job already running");
            return Ok(());
        }

        let (shutdown, mut rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            let mut timer = time::interval(config.polling_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first tick to avoid immediate execution
            timer.tick().await;

            loop {
                tokio::select! {
                    // Shutdown wins over a tick that became due during a
                    // long dispatch
                    biased;
                    _ = rx.changed() => {
                        debug!("poll job received shutdown signal");
                        break;
                    }
                    _ = timer.tick() => {
                        poll_once(&store, &config, &handler).await;
                    }
                }
            }
        });

        inner.poll = Some(PollJob { shutdown, task });
        Ok(())
    }

    /// Whether the poll job is currently running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .poll
                    .as_ref()
                    .is_some_and(|job| !job.task.is_finished())
            })
            .unwrap_or(false)
    }

    /// Stop polling and wait for any in-flight dispatch to finish.
    ///
    /// # Errors
    /// If internal state is poisoned
    pub async fn graceful_stop(&self) -> Result<(), ListenerError> {
        let job = self.inner.lock()?.poll.take();
        if let Some(job) = job {
            let _ = job.shutdown.send(true);
            if let Err(e) = job.task.await {
                warn!(error = %e, "poll job ended abnormally during graceful stop");
            }
        }
        Ok(())
    }

    /// Cancel the poll job without waiting.
    ///
    /// A dispatch attempt already handed to its own task is not interrupted.
    ///
    /// # Errors
    /// If internal state is poisoned
    pub fn immediate_stop(&self) -> Result<(), ListenerError> {
        if let Some(job) = self.inner.lock()?.poll.take() {
            job.task.abort();
        }
        Ok(())
    }
}

/// One poll tick: retrieve, dispatch with retries, settle the handle.
async fn poll_once(store: &Arc<dyn MessageStore>, config: &ListenerConfig, handler: &Arc<dyn Handler>) {
    let retrieved = match store.retrieve().await {
        Ok(Some(retrieved)) => retrieved,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "store retrieve failed, will poll again");
            return;
        }
    };

    let ack = if dispatch_with_retries(config, handler, &retrieved.content).await {
        store.acknowledge(&retrieved.handle, true).await
    } else {
        settle_failed(store, config, &retrieved).await
    };

    if let Err(e) = ack {
        warn!(error = %e, "store acknowledge failed");
    }
}

/// Dispatch one message: the initial attempt plus up to `max_retries`
/// further attempts, sleeping `retry_interval` between them (never after
/// the final one). Returns whether any attempt succeeded.
async fn dispatch_with_retries(
    config: &ListenerConfig,
    handler: &Arc<dyn Handler>,
    content: &Value,
) -> bool {
    for attempt in 0..=config.max_retries {
        match invoke(handler, content).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(
                    attempt = attempt + 1,
                    remaining = config.max_retries - attempt,
                    error = %e,
                    "handler dispatch failed"
                );
            }
        }
        if attempt < config.max_retries {
            time::sleep(config.retry_interval).await;
        }
    }
    false
}

/// Invoke the handler on its own task so a panic is contained and reported
/// as an ordinary failed attempt.
async fn invoke(handler: &Arc<dyn Handler>, content: &Value) -> anyhow::Result<()> {
    let handler = Arc::clone(handler);
    let content = content.clone();
    match tokio::spawn(async move { handler.handle(content).await }).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(anyhow::anyhow!("handler panicked: {e}")),
        Err(e) => Err(anyhow::anyhow!("handler task failed: {e}")),
    }
}

/// Settle a message whose retries are exhausted.
///
/// A configured dead-letter store dominates the drop/keep decision; if the
/// dead-letter write itself fails, the message is settled as if no
/// dead-letter store existed.
async fn settle_failed(
    store: &Arc<dyn MessageStore>,
    config: &ListenerConfig,
    retrieved: &Retrieved,
) -> Result<(), StoreError> {
    if let Some(dlq) = &config.dead_letter_store {
        match dlq.store(&retrieved.content).await {
            Ok(()) => {
                info!("message routed to dead-letter store after exhausted retries");
                return store.acknowledge(&retrieved.handle, true).await;
            }
            Err(e) => {
                warn!(error = %e, "dead-letter store rejected message, falling back");
            }
        }
    }

    if config.drop_message_after_max_retries {
        warn!("dropping message after exhausted retries");
        store.acknowledge(&retrieved.handle, true).await
    } else {
        store.acknowledge(&retrieved.handle, false).await
    }
}

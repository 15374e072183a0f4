//! End-to-end listener scenarios against the in-memory store.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use weft_listener::{Handler, HandlerFn, ListenerConfig, StoreListener};
use weft_store::{InMemoryStore, MessageStore};

/// Fails the first `failures` invocations, then succeeds
#[derive(Debug)]
struct FlakyHandler {
    calls: AtomicU32,
    failures: u32,
}

impl FlakyHandler {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            failures,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for FlakyHandler {
    async fn handle(&self, _content: Value) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("induced failure {call}");
        }
        Ok(())
    }
}

fn fast_config() -> ListenerConfig {
    ListenerConfig {
        polling_interval: Duration::from_millis(10),
        retry_interval: Duration::from_millis(10),
        ..ListenerConfig::default()
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_retries_then_succeeds() {
    let store = Arc::new(InMemoryStore::new());
    store.store(&Value::from("payload")).await.expect("store");

    let handler = FlakyHandler::new(2);
    let listener = StoreListener::new(
        store.clone(),
        ListenerConfig {
            max_retries: 3,
            ..fast_config()
        },
    )
    .expect("listener");

    listener.attach(handler.clone()).expect("attach");
    listener.start().expect("start");

    wait_for(|| store.is_empty()).await;
    listener.graceful_stop().await.expect("stop");

    // Initial attempt + 2 failed retries before the third call succeeds
    assert_eq!(handler.calls(), 3);
    assert!(store.is_empty());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_exhausted_retries_route_to_dead_letter_store() {
    let store = Arc::new(InMemoryStore::new());
    let dlq = Arc::new(InMemoryStore::new());
    store.store(&Value::from("poison")).await.expect("store");

    let handler = FlakyHandler::new(u32::MAX);
    let listener = StoreListener::new(
        store.clone(),
        ListenerConfig {
            max_retries: 2,
            dead_letter_store: Some(dlq.clone()),
            ..fast_config()
        },
    )
    .expect("listener");

    listener.attach(handler.clone()).expect("attach");
    listener.start().expect("start");

    wait_for(|| dlq.len() == 1).await;
    listener.graceful_stop().await.expect("stop");

    // 1 initial attempt + 2 retries, then exactly one dead-letter write
    assert_eq!(handler.calls(), 3);
    assert!(store.is_empty());

    let dead = dlq.retrieve().await.expect("retrieve").expect("entry");
    assert_eq!(dead.content, Value::from("poison"));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_exhausted_retries_keep_message_by_default() {
    let store = Arc::new(InMemoryStore::new());
    store.store(&Value::from("poison")).await.expect("store");

    let handler = FlakyHandler::new(u32::MAX);
    let listener = StoreListener::new(
        store.clone(),
        ListenerConfig {
            max_retries: 1,
            drop_message_after_max_retries: false,
            ..fast_config()
        },
    )
    .expect("listener");

    listener.attach(handler.clone()).expect("attach");
    listener.start().expect("start");

    // Let at least one full dispatch cycle fail
    wait_for(|| handler.calls() >= 2).await;
    listener.graceful_stop().await.expect("stop");

    // Negative ack returned the message to the store
    assert_eq!(store.len(), 1);
    let back = store.retrieve().await.expect("retrieve").expect("entry");
    assert_eq!(back.content, Value::from("poison"));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_exhausted_retries_drop_message_when_configured() {
    let store = Arc::new(InMemoryStore::new());
    store.store(&Value::from("poison")).await.expect("store");

    let handler = FlakyHandler::new(u32::MAX);
    let listener = StoreListener::new(
        store.clone(),
        ListenerConfig {
            max_retries: 1,
            drop_message_after_max_retries: true,
            ..fast_config()
        },
    )
    .expect("listener");

    listener.attach(handler.clone()).expect("attach");
    listener.start().expect("start");

    wait_for(|| store.is_empty()).await;
    listener.graceful_stop().await.expect("stop");

    assert_eq!(handler.calls(), 2);
    assert!(store.is_empty());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_dead_letter_failure_falls_back_to_keep() {
    /// A store that rejects every write
    #[derive(Debug)]
    struct RejectingStore;

    #[async_trait]
    impl MessageStore for RejectingStore {
        async fn store(&self, _value: &Value) -> weft_store::Result<()> {
            Err(weft_store::StoreError::Internal("full".to_string()))
        }

        async fn retrieve(&self) -> weft_store::Result<Option<weft_store::Retrieved>> {
            Ok(None)
        }

        async fn acknowledge(
            &self,
            handle: &weft_store::Handle,
            _success: bool,
        ) -> weft_store::Result<()> {
            Err(weft_store::StoreError::UnknownHandle(handle.clone()))
        }
    }

    let store = Arc::new(InMemoryStore::new());
    store.store(&Value::from("poison")).await.expect("store");

    let handler = FlakyHandler::new(u32::MAX);
    let listener = StoreListener::new(
        store.clone(),
        ListenerConfig {
            max_retries: 0,
            drop_message_after_max_retries: false,
            dead_letter_store: Some(Arc::new(RejectingStore)),
            ..fast_config()
        },
    )
    .expect("listener");

    listener.attach(handler.clone()).expect("attach");
    listener.start().expect("start");

    wait_for(|| handler.calls() >= 1).await;
    listener.graceful_stop().await.expect("stop");

    // The dead-letter write failed, so the message stays in the source store
    assert_eq!(store.len(), 1);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_closure_handler_drains_the_store_in_order() {
    let store = Arc::new(InMemoryStore::new());
    store.store(&Value::from(1)).await.expect("store");
    store.store(&Value::from(2)).await.expect("store");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let seen = Arc::clone(&seen);
        HandlerFn::new(move |content| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                seen.lock().expect("seen mutex").push(content);
                Ok(())
            })
        })
    };

    let listener = StoreListener::new(store.clone(), fast_config()).expect("listener");
    listener.attach(Arc::new(handler)).expect("attach");
    listener.start().expect("start");

    wait_for(|| store.is_empty()).await;
    listener.graceful_stop().await.expect("stop");

    assert_eq!(
        *seen.lock().expect("seen mutex"),
        vec![Value::from(1), Value::from(2)]
    );
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_detach_stops_polling() {
    let store = Arc::new(InMemoryStore::new());

    let listener = StoreListener::new(store.clone(), fast_config()).expect("listener");
    let handler = FlakyHandler::new(0);
    listener.attach(handler.clone()).expect("attach");
    listener.start().expect("start");
    assert!(listener.is_running());

    listener.detach().expect("detach");
    assert!(!listener.is_running());

    // Messages stored after detach are never dispatched
    store.store(&Value::from("late")).await.expect("store");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handler.calls(), 0);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_immediate_stop_cancels_poll_job() {
    let store = Arc::new(InMemoryStore::new());
    let listener = StoreListener::new(store, fast_config()).expect("listener");
    listener.attach(FlakyHandler::new(0)).expect("attach");
    listener.start().expect("start");

    listener.immediate_stop().expect("stop");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!listener.is_running());
}

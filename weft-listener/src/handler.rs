//! The handler seam a listener dispatches into.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

/// A consumer of retrieved store content.
///
/// Returning `Err` (or panicking; panics are contained by the listener and
/// treated the same way) marks the attempt as failed and engages the
/// listener's retry and dead-letter policy.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, content: Value) -> anyhow::Result<()>;
}

/// Adapter turning a plain async closure into a [`Handler`]
pub struct HandlerFn<F>(F);

impl<F> HandlerFn<F>
where
    F: Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
{
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> std::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync,
{
    async fn handle(&self, content: Value) -> anyhow::Result<()> {
        (self.0)(content).await
    }
}

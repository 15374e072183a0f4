//! The handler model: source processors, destinations, and routers.
//!
//! Handlers are registered explicitly with a non-empty, unique name; the
//! executor matches on the processor kind rather than discovering behavior
//! through reflection. User code supplies async closures returning boxed
//! futures, which keeps the seam object-safe without a proliferation of
//! one-off traits.

use std::{fmt, sync::Arc};

use futures_util::future::BoxFuture;
use serde_json::Value;
use weft_common::MessageContext;

type GenericFn =
    Box<dyn for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, anyhow::Result<()>> + Send + Sync>;
type FilterFn =
    Box<dyn for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, anyhow::Result<bool>> + Send + Sync>;
type TransformFn =
    Box<dyn for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, anyhow::Result<Value>> + Send + Sync>;
type ProcessorRouteFn = Box<
    dyn for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, anyhow::Result<Option<Processor>>>
        + Send
        + Sync,
>;
type DestinationFn =
    Box<dyn for<'a> Fn(&'a MessageContext) -> BoxFuture<'a, anyhow::Result<Value>> + Send + Sync>;
type DestinationRouteFn = Box<
    dyn for<'a> Fn(
            &'a MessageContext,
        ) -> BoxFuture<'a, anyhow::Result<Option<Vec<Arc<Destination>>>>>
        + Send
        + Sync,
>;

/// The behavior variants a source processor can have
pub(crate) enum ProcessorKind {
    /// Side-effect only
    Generic(GenericFn),
    /// `false` short-circuits the pipeline; no destinations run
    Filter(FilterFn),
    /// Replaces the context content
    Transformer(TransformFn),
    /// Picks a processor to run in place; `None` short-circuits
    Router(ProcessorRouteFn),
}

impl ProcessorKind {
    pub(crate) const fn label(&self) -> &'static str {
        match self {
            Self::Generic(_) => "generic processor",
            Self::Filter(_) => "filter",
            Self::Transformer(_) => "transformer",
            Self::Router(_) => "processor router",
        }
    }
}

/// A named source processor (or destination preprocessor)
pub struct Processor {
    name: Arc<str>,
    kind: ProcessorKind,
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .finish()
    }
}

impl Processor {
    /// A side-effecting processor
    pub fn generic<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            kind: ProcessorKind::Generic(Box::new(f)),
        }
    }

    /// A filter; returning `false` short-circuits the pipeline
    pub fn filter<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, anyhow::Result<bool>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            kind: ProcessorKind::Filter(Box::new(f)),
        }
    }

    /// A transformer; the returned value replaces the context content
    pub fn transformer<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, anyhow::Result<Value>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            kind: ProcessorKind::Transformer(Box::new(f)),
        }
    }

    /// A router; the returned processor executes in place, `None`
    /// short-circuits like a filter
    pub fn router<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut MessageContext) -> BoxFuture<'a, anyhow::Result<Option<Processor>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            kind: ProcessorKind::Router(Box::new(f)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) const fn kind(&self) -> &ProcessorKind {
        &self.kind
    }
}

/// A terminal handler, executed in parallel with its peers.
///
/// Preprocessors run sequentially against the destination's private context
/// clone before the handler; any of them may short-circuit, which skips this
/// destination for the current run only.
pub struct Destination {
    name: Arc<str>,
    preprocessors: Vec<Processor>,
    handler: DestinationFn,
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("name", &self.name)
            .field("preprocessors", &self.preprocessors)
            .finish_non_exhaustive()
    }
}

impl Destination {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a MessageContext) -> BoxFuture<'a, anyhow::Result<Value>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            preprocessors: Vec::new(),
            handler: Box::new(f),
        }
    }

    /// Append a preprocessor, preserving declaration order
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: Processor) -> Self {
        self.preprocessors.push(preprocessor);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn preprocessors(&self) -> &[Processor] {
        &self.preprocessors
    }

    pub(crate) fn handler(&self) -> &DestinationFn {
        &self.handler
    }
}

/// How a channel decides which destinations a run fans out to
pub enum DestinationsFlow {
    /// A fixed destination set
    Static(Vec<Arc<Destination>>),
    /// A router invoked once per run to select the set; `None` yields an
    /// empty, successful result set
    Router {
        name: Arc<str>,
        route: DestinationRouteFn,
    },
}

impl fmt::Debug for DestinationsFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(destinations) => {
                f.debug_tuple("Static").field(destinations).finish()
            }
            Self::Router { name, .. } => f
                .debug_struct("Router")
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}

impl DestinationsFlow {
    /// A single fixed destination
    #[must_use]
    pub fn single(destination: Destination) -> Self {
        Self::Static(vec![Arc::new(destination)])
    }

    /// A fixed set of destinations
    #[must_use]
    pub fn all(destinations: impl IntoIterator<Item = Destination>) -> Self {
        Self::Static(destinations.into_iter().map(Arc::new).collect())
    }

    /// A destination router
    pub fn router<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(
                &'a MessageContext,
            ) -> BoxFuture<'a, anyhow::Result<Option<Vec<Arc<Destination>>>>>
            + Send
            + Sync
            + 'static,
    {
        Self::Router {
            name: Arc::from(name.into()),
            route: Box::new(f),
        }
    }
}

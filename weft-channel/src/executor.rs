//! Pipeline execution.
//!
//! One run: source processors strictly in declaration order, then a parallel
//! fan-out to every destination not already satisfied. The context is cloned
//! before each processor call so the persisted failure record reflects
//! pre-failure state, and each destination task works against its own clone
//! so concurrent destinations cannot observe each other's mutations.

use std::{collections::BTreeMap, sync::Arc};

use ahash::AHashMap;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;
use weft_common::{ErrorInfo, Message, MessageContext};

use crate::{
    channel::Channel,
    error::ExecutionError,
    handler::{Destination, DestinationsFlow, Processor, ProcessorKind},
};

/// The outcome of a successful pipeline run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The message as of the end of the run
    pub message: Message,
    /// Successful destination results, keyed by destination name
    pub destination_results: AHashMap<String, Value>,
}

enum StepOutcome {
    Continue,
    ShortCircuit,
}

struct StepError {
    name: String,
    description: String,
    routing: bool,
}

impl StepError {
    fn handler(name: &str, error: &anyhow::Error) -> Self {
        Self {
            name: name.to_string(),
            description: error.to_string(),
            routing: false,
        }
    }

    fn router(name: &str, description: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            description: description.into(),
            routing: true,
        }
    }

    /// Stamp error info onto the given context (the pre-failure snapshot)
    /// and wrap it into the run-level error.
    fn into_execution_error(self, mut ctx: MessageContext) -> ExecutionError {
        let what = if self.routing { "router" } else { "source processor" };
        ctx.set_error_info(
            ErrorInfo::new(format!("{what} {:?} failed: {}", self.name, self.description))
                .with_cause(self.name.clone(), self.description.clone()),
        );
        let message = Box::new(ctx.into_message());
        if self.routing {
            ExecutionError::Routing {
                name: self.name,
                description: self.description,
                message,
            }
        } else {
            ExecutionError::Processor {
                name: self.name,
                description: self.description,
                message,
            }
        }
    }
}

/// Execute one processor against the context.
///
/// Boxed for recursion: a processor router's selected processor runs in
/// place, and may itself be a router.
fn run_processor<'a>(
    processor: &'a Processor,
    ctx: &'a mut MessageContext,
) -> BoxFuture<'a, Result<StepOutcome, StepError>> {
    Box::pin(async move {
        let name = processor.name();
        match processor.kind() {
            ProcessorKind::Generic(f) => f(&mut *ctx)
                .await
                .map(|()| StepOutcome::Continue)
                .map_err(|e| StepError::handler(name, &e)),
            ProcessorKind::Filter(f) => match f(&mut *ctx).await {
                Ok(true) => Ok(StepOutcome::Continue),
                Ok(false) => {
                    debug!(filter = name, "filter short-circuited the pipeline");
                    Ok(StepOutcome::ShortCircuit)
                }
                Err(e) => Err(StepError::handler(name, &e)),
            },
            ProcessorKind::Transformer(f) => match f(&mut *ctx).await {
                Ok(content) => {
                    ctx.set_content(content);
                    Ok(StepOutcome::Continue)
                }
                Err(e) => Err(StepError::handler(name, &e)),
            },
            ProcessorKind::Router(f) => match f(&mut *ctx).await {
                Ok(Some(routed)) => {
                    if routed.name().trim().is_empty() {
                        return Err(StepError::router(
                            name,
                            "router returned a processor with an empty name",
                        ));
                    }
                    debug!(router = name, routed = routed.name(), "router selected processor");
                    run_processor(&routed, ctx).await
                }
                Ok(None) => {
                    debug!(router = name, "processor router short-circuited the pipeline");
                    Ok(StepOutcome::ShortCircuit)
                }
                Err(e) => Err(StepError::router(name, e.to_string())),
            },
        }
    })
}

enum DestinationOutcome {
    Success(Value),
    /// A preprocessor short-circuited: not a success, not a failure, and
    /// deliberately absent from the skip set so replay attempts it again
    Skipped,
    Failed(String),
}

/// Run one destination against its private context clone
async fn run_destination(destination: Arc<Destination>, mut ctx: MessageContext) -> DestinationOutcome {
    for preprocessor in destination.preprocessors() {
        match run_processor(preprocessor, &mut ctx).await {
            Ok(StepOutcome::Continue) => {}
            Ok(StepOutcome::ShortCircuit) => {
                debug!(
                    destination = destination.name(),
                    preprocessor = preprocessor.name(),
                    "destination skipped by preprocessor"
                );
                return DestinationOutcome::Skipped;
            }
            Err(step) => {
                return DestinationOutcome::Failed(format!(
                    "preprocessor {:?} failed: {}",
                    step.name, step.description
                ));
            }
        }
    }

    match (destination.handler())(&ctx).await {
        Ok(value) => DestinationOutcome::Success(value),
        Err(e) => DestinationOutcome::Failed(e.to_string()),
    }
}

pub(crate) async fn run_pipeline(
    channel: &Channel,
    mut ctx: MessageContext,
) -> Result<ExecutionResult, ExecutionError> {
    // Source processors, strictly in declaration order. The clone taken
    // before each call is what gets persisted if that processor fails.
    for processor in channel.source_flow() {
        let snapshot = ctx.clone();
        match run_processor(processor, &mut ctx).await {
            Ok(StepOutcome::Continue) => {}
            Ok(StepOutcome::ShortCircuit) => {
                return Ok(ExecutionResult {
                    message: ctx.into_message(),
                    destination_results: AHashMap::new(),
                });
            }
            Err(step) => return Err(step.into_execution_error(snapshot)),
        }
    }

    // Resolve the destination set for this run
    let destinations = match channel.destinations() {
        DestinationsFlow::Static(destinations) => destinations.clone(),
        DestinationsFlow::Router { name, route } => match route(&ctx).await {
            Ok(Some(destinations)) => destinations,
            Ok(None) => {
                debug!(router = %name, "destination router selected no destinations");
                return Ok(ExecutionResult {
                    message: ctx.into_message(),
                    destination_results: AHashMap::new(),
                });
            }
            Err(e) => {
                return Err(StepError::router(name, e.to_string()).into_execution_error(ctx));
            }
        },
    };

    // Fan out, bypassing destinations that already succeeded in a previous run
    let mut tasks: Vec<(String, JoinHandle<DestinationOutcome>)> = Vec::new();
    for destination in destinations {
        let name = destination.name().to_string();
        if ctx.is_skipped(&name) {
            debug!(destination = %name, "bypassing destination that already succeeded");
            continue;
        }
        let task_ctx = ctx.clone();
        tasks.push((name, tokio::spawn(run_destination(destination, task_ctx))));
    }

    let mut successes = AHashMap::new();
    let mut failures = BTreeMap::new();
    for (name, task) in tasks {
        match task.await {
            Ok(DestinationOutcome::Success(value)) => {
                ctx.add_skip_destination(&name);
                successes.insert(name, value);
            }
            Ok(DestinationOutcome::Skipped) => {}
            Ok(DestinationOutcome::Failed(description)) => {
                failures.insert(name, description);
            }
            Err(e) => {
                let description = if e.is_panic() {
                    format!("destination panicked: {e}")
                } else {
                    format!("destination task failed: {e}")
                };
                failures.insert(name, description);
            }
        }
    }

    if failures.is_empty() {
        return Ok(ExecutionResult {
            message: ctx.into_message(),
            destination_results: successes,
        });
    }

    let mut info = ErrorInfo::new(format!(
        "destination failures: {}",
        failures.keys().cloned().collect::<Vec<_>>().join(", ")
    ));
    for (name, description) in &failures {
        info = info.with_cause(name.clone(), description.clone());
    }
    ctx.set_error_info(info);

    Err(ExecutionError::Destinations {
        failures,
        message: Box::new(ctx.into_message()),
    })
}

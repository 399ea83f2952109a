//! The pipeline runner: validate, seed context, then walk the graph one
//! node at a time, routing on each outcome until an exit node, a dead end,
//! or a cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use conductor_types::{ConductorError, Context, Outcome};

use crate::edge_selection::select_edge;
use crate::events::{EventDispatcher, PipelineEvent};
use crate::failure::{resolve_failure_target, route_past_exhausted_target, RetryCounters};
use crate::graph::{Node, PipelineGraph};
use crate::handler::HandlerRegistry;
use crate::validation::validate;

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// The result of a finished run.
#[derive(Debug)]
pub struct PipelineResult {
    pub status: RunStatus,
    pub completed_nodes: Vec<String>,
    pub node_outcomes: HashMap<String, Outcome>,
    pub final_context: HashMap<String, serde_json::Value>,
}

/// Cooperative cancel signal, checked between nodes. An in-flight handler
/// is not interrupted; its outcome is discarded if the signal fired while
/// it ran.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The pipeline executor. Owns the handler registry, the event dispatcher,
/// and the run context for the duration of each run.
pub struct PipelineExecutor {
    registry: HandlerRegistry,
    events: Arc<EventDispatcher>,
    cancel: CancelToken,
}

impl PipelineExecutor {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::with_events(registry, Arc::new(EventDispatcher::new()))
    }

    /// Build an executor around an existing dispatcher, e.g. one already
    /// wired into a per-turn telemetry callback.
    pub fn with_events(registry: HandlerRegistry, events: Arc<EventDispatcher>) -> Self {
        Self {
            registry,
            events,
            cancel: CancelToken::new(),
        }
    }

    /// The dispatcher events are emitted through; register observers here.
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// A handle that cancels this executor's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the pipeline to completion.
    pub async fn run(&self, graph: &PipelineGraph) -> conductor_types::Result<PipelineResult> {
        let collection = validate(graph);
        if collection.has_errors() {
            self.events.emit(PipelineEvent::ValidationFailed {
                pipeline_name: graph.name.clone(),
                messages: collection
                    .errors()
                    .iter()
                    .map(|d| d.message.clone())
                    .collect(),
            });
            return Err(ConductorError::Validation(collection));
        }

        let context = Context::new();
        for (key, value) in &graph.graph_attributes {
            context.set(key.clone(), value.clone()).await;
        }
        if !graph.goal.is_empty() {
            context
                .set("goal", serde_json::Value::String(graph.goal.clone()))
                .await;
        }

        self.events.emit(PipelineEvent::PipelineStarted {
            pipeline_name: graph.name.clone(),
            node_count: graph.node_count(),
        });

        let mut completed_nodes: Vec<String> = Vec::new();
        let mut node_outcomes: HashMap<String, Outcome> = HashMap::new();
        let mut retries = RetryCounters::new();

        let mut current = graph.start_node().ok_or_else(|| {
            ConductorError::Invariant("validated graph has no start node".into())
        })?;

        let status = loop {
            if self.cancel.is_cancelled() {
                break RunStatus::Cancelled;
            }

            let outcome = self.run_node(current, &context, graph).await?;
            if self.cancel.is_cancelled() {
                // Cancelled mid-handler; the late outcome is discarded.
                break RunStatus::Cancelled;
            }

            completed_nodes.push(current.id.clone());
            node_outcomes.insert(current.id.clone(), outcome.clone());

            context.apply_updates(outcome.context_updates.clone()).await;
            context
                .set(
                    "outcome",
                    serde_json::Value::String(outcome.status.as_condition_str().to_string()),
                )
                .await;
            if let Some(label) = &outcome.preferred_label {
                context
                    .set("preferred_label", serde_json::Value::String(label.clone()))
                    .await;
            }

            self.events.emit(PipelineEvent::NodeCompleted {
                node_id: current.id.clone(),
                status: outcome.status,
            });

            if current.is_exit() {
                break RunStatus::Completed;
            }

            let snapshot = context.snapshot().await;
            let status_str = outcome.status.as_condition_str();
            let resolver = move |key: &str| -> String {
                if key == "outcome" {
                    status_str.to_string()
                } else {
                    snapshot.get(key).map(value_to_string).unwrap_or_default()
                }
            };

            let next_id = if outcome.status.is_success() {
                match select_edge(&current.id, &resolver, graph) {
                    Some(edge) => {
                        self.events.emit(PipelineEvent::EdgeTraversed {
                            from_node: edge.from.clone(),
                            to_node: edge.to.clone(),
                            label: edge.label.clone(),
                        });
                        edge.to.clone()
                    }
                    None => break RunStatus::Completed,
                }
            } else {
                match self.route_failure(current, graph, &resolver, &mut retries) {
                    Some(target) => {
                        self.events.emit(PipelineEvent::EdgeTraversed {
                            from_node: current.id.clone(),
                            to_node: target.clone(),
                            label: None,
                        });
                        target
                    }
                    None => break RunStatus::Failed,
                }
            };

            current = graph.node(&next_id).ok_or_else(|| {
                ConductorError::Invariant(format!(
                    "route from '{}' leads to missing node '{next_id}'",
                    current.id
                ))
            })?;
        };

        let final_context = context.snapshot().await;
        self.events.emit(PipelineEvent::PipelineCompleted {
            pipeline_name: graph.name.clone(),
            completed_nodes: completed_nodes.clone(),
            status: status.as_str().to_string(),
        });

        Ok(PipelineResult {
            status,
            completed_nodes,
            node_outcomes,
            final_context,
        })
    }

    /// Dispatch one node to its handler. Handler errors become `Fail`
    /// outcomes so failure routing can run; invariant violations abort.
    async fn run_node(
        &self,
        node: &Node,
        context: &Context,
        graph: &PipelineGraph,
    ) -> conductor_types::Result<Outcome> {
        let handler_type = self.registry.resolve_type(node);
        self.events.emit(PipelineEvent::NodeEntered {
            node_id: node.id.clone(),
            handler_type: handler_type.clone(),
        });
        tracing::info!(node = %node.id, handler = %handler_type, "Executing node");

        let handler = self.registry.get(&handler_type).ok_or_else(|| {
            ConductorError::Invariant(format!(
                "no handler registered for type '{handler_type}' (node '{}')",
                node.id
            ))
        })?;

        match handler.handle(node, context, graph).await {
            Ok(outcome) => Ok(outcome),
            Err(error @ ConductorError::Invariant(_)) => Err(error),
            Err(error) => {
                tracing::warn!(node = %node.id, error = %error, "Handler failed");
                Ok(Outcome::fail(error.to_string()))
            }
        }
    }

    /// Failure routing with retry caps. Redirects consume the target's
    /// retry budget; an exhausted budget reroutes past the capped target.
    fn route_failure(
        &self,
        node: &Node,
        graph: &PipelineGraph,
        resolver: &dyn Fn(&str) -> String,
        retries: &mut RetryCounters,
    ) -> Option<String> {
        let target = resolve_failure_target(node, graph, resolver)?;
        let budget = graph.node(&target).map(|n| n.max_retries()).unwrap_or(1);
        if retries.try_redirect(&target, budget) {
            return Some(target);
        }

        tracing::info!(
            node = %node.id,
            target = %target,
            attempts = retries.attempts(&target),
            "Retry budget exhausted; rerouting"
        );
        route_past_exhausted_target(node, graph, &target)
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

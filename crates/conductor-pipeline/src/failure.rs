//! Failure routing: where to send the pipeline when a handler reports
//! `Fail` or `Retry`.

use std::collections::HashMap;

use crate::condition::evaluate_condition;
use crate::edge_selection::best_by_weight;
use crate::graph::{Edge, Node, PipelineGraph};

/// Resolve the failure target for `node` under a failure outcome.
///
/// The cascade, in order: the first outgoing edge whose condition evaluates
/// true, the node's `retry_target` attribute, the node's
/// `fallback_retry_target` attribute. Attribute targets must name existing
/// nodes. `None` means the pipeline terminates in a failed state.
pub fn resolve_failure_target(
    node: &Node,
    graph: &PipelineGraph,
    resolve: &dyn Fn(&str) -> String,
) -> Option<String> {
    for edge in graph.outgoing_edges(&node.id) {
        if edge.is_conditional()
            && evaluate_condition(edge.condition.as_deref().unwrap_or(""), resolve)
        {
            return Some(edge.to.clone());
        }
    }

    for target in [node.retry_target(), node.fallback_retry_target()]
        .into_iter()
        .flatten()
    {
        if graph.node(target).is_some() {
            return Some(target.to_string());
        }
    }

    None
}

/// Where to go once the retry budget for `capped` is exhausted: the node's
/// fallback retry target if it points elsewhere, else the best unconditional
/// outgoing edge that avoids the capped node.
pub(crate) fn route_past_exhausted_target(
    node: &Node,
    graph: &PipelineGraph,
    capped: &str,
) -> Option<String> {
    for target in [node.retry_target(), node.fallback_retry_target()]
        .into_iter()
        .flatten()
    {
        if target != capped && graph.node(target).is_some() {
            return Some(target.to_string());
        }
    }

    let unconditional: Vec<&Edge> = graph
        .outgoing_edges(&node.id)
        .iter()
        .filter(|e| !e.is_conditional() && e.to != capped)
        .collect();
    best_by_weight(&unconditional).map(|e| e.to.clone())
}

/// Per-run redirect counters, keyed by the node being re-entered.
#[derive(Debug, Default)]
pub struct RetryCounters {
    counts: HashMap<String, usize>,
}

impl RetryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many failure redirects have already re-entered `node_id`.
    pub fn attempts(&self, node_id: &str) -> usize {
        self.counts.get(node_id).copied().unwrap_or(0)
    }

    /// Consume one unit of `node_id`'s retry budget. Returns `false` when
    /// the budget (`max_retries`) is already spent, leaving the counter
    /// untouched.
    pub fn try_redirect(&mut self, node_id: &str, max_retries: usize) -> bool {
        let count = self.counts.entry(node_id.to_string()).or_insert(0);
        if *count >= max_retries {
            return false;
        }
        *count += 1;
        true
    }
}

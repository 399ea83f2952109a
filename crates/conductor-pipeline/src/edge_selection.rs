//! Edge selection for the success path.
//!
//! After a node completes, the next edge is chosen by a fixed cascade:
//! first condition-true conditional edge in declaration order, otherwise the
//! unconditional edges (or, lacking any, the full edge set) ordered by
//! descending weight with a lexicographic tiebreak on the target id. The
//! tiebreak makes runs reproducible.

use crate::condition::evaluate_condition;
use crate::graph::{Edge, PipelineGraph};

/// Select the next edge to follow after `node_id` completes.
///
/// `resolve` maps condition keys (`outcome`, context keys) to string values.
/// Returns `None` when the node has no outgoing edges, which terminates the
/// pipeline.
pub fn select_edge<'a>(
    node_id: &str,
    resolve: &dyn Fn(&str) -> String,
    graph: &'a PipelineGraph,
) -> Option<&'a Edge> {
    let edges = graph.outgoing_edges(node_id);
    if edges.is_empty() {
        return None;
    }

    // Conditional edges win, first match in declaration order.
    if let Some(edge) = edges
        .iter()
        .filter(|e| e.is_conditional())
        .find(|e| evaluate_condition(e.condition.as_deref().unwrap_or(""), resolve))
    {
        return Some(edge);
    }

    // Otherwise prefer unconditional edges; fall back to the full set.
    let unconditional: Vec<&Edge> = edges.iter().filter(|e| !e.is_conditional()).collect();
    let candidates = if unconditional.is_empty() {
        edges.iter().collect()
    } else {
        unconditional
    };

    best_by_weight(&candidates).copied()
}

/// Highest weight wins; ties break on the lexicographically smallest target.
pub(crate) fn best_by_weight<'a, 'b>(edges: &'b [&'a Edge]) -> Option<&'b &'a Edge> {
    edges
        .iter()
        .min_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.to.cmp(&b.to)))
}

//! Graph validation: structural rules and the diagnostic collection API.
//!
//! [`validate`] runs every rule and collects findings; [`validate_or_raise`]
//! fails with the full collection when any error-severity finding exists.

use std::collections::{HashSet, VecDeque};

use conductor_types::{ConductorError, Diagnostic, DiagnosticCollection, Severity};

use crate::condition::parse_condition;
use crate::graph::PipelineGraph;

/// One structural check over a graph.
pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct StartNodeRule;
impl LintRule for StartNodeRule {
    fn name(&self) -> &str {
        "start_node"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let starts: Vec<_> = graph
            .all_nodes()
            .filter(|n| n.is_start() || n.id == "start")
            .collect();
        match starts.len() {
            1 => vec![],
            0 => vec![Diagnostic::new(
                self.name(),
                Severity::Error,
                "pipeline has no start node",
            )
            .with_suggestion("add a node with the start shape (Mdiamond)")],
            n => {
                let ids: Vec<_> = starts.iter().map(|s| s.id.as_str()).collect();
                vec![Diagnostic::new(
                    self.name(),
                    Severity::Error,
                    format!("pipeline has {n} start nodes ({}); expected exactly one", ids.join(", ")),
                )
                .with_suggestion("remove the extra start nodes")]
            }
        }
    }
}

struct ExitNodeRule;
impl LintRule for ExitNodeRule {
    fn name(&self) -> &str {
        "exit_node"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        if graph.all_nodes().any(|n| n.is_exit()) {
            vec![]
        } else {
            vec![Diagnostic::new(
                self.name(),
                Severity::Error,
                "pipeline has no exit node",
            )
            .with_suggestion("add a node with the exit shape (Msquare)")]
        }
    }
}

struct EdgeEndpointsRule;
impl LintRule for EdgeEndpointsRule {
    fn name(&self) -> &str {
        "edge_endpoints"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for edge in graph.all_edges() {
            for (endpoint, role) in [(&edge.from, "source"), (&edge.to, "target")] {
                if graph.node(endpoint).is_none() {
                    diagnostics.push(
                        Diagnostic::new(
                            self.name(),
                            Severity::Error,
                            format!(
                                "edge {} -> {} references missing {role} '{endpoint}'",
                                edge.from, edge.to
                            ),
                        )
                        .for_edge(edge.from.clone(), edge.to.clone())
                        .with_suggestion(format!("add node '{endpoint}' or fix the edge")),
                    );
                }
            }
        }
        diagnostics
    }
}

struct DeadEndRule;
impl LintRule for DeadEndRule {
    fn name(&self) -> &str {
        "dead_end"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .all_nodes()
            .filter(|n| !n.is_exit() && graph.outgoing_edges(&n.id).is_empty())
            .map(|n| {
                Diagnostic::new(
                    self.name(),
                    Severity::Error,
                    format!("non-exit node '{}' has no outgoing edges", n.id),
                )
                .for_node(n.id.clone())
                .with_suggestion("add an outgoing edge or make the node an exit")
            })
            .collect()
    }
}

struct ReachabilityRule;
impl LintRule for ReachabilityRule {
    fn name(&self) -> &str {
        "reachability"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let Some(start) = graph.start_node() else {
            return vec![]; // StartNodeRule reports this
        };

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start.id.clone());
        queue.push_back(start.id.clone());
        while let Some(current) = queue.pop_front() {
            for edge in graph.outgoing_edges(&current) {
                if visited.insert(edge.to.clone()) {
                    queue.push_back(edge.to.clone());
                }
            }
        }

        let mut unreachable: Vec<_> = graph
            .all_nodes()
            .filter(|n| !visited.contains(&n.id))
            .map(|n| n.id.clone())
            .collect();
        unreachable.sort();

        unreachable
            .into_iter()
            .map(|id| {
                Diagnostic::new(
                    self.name(),
                    Severity::Error,
                    format!("node '{id}' is not reachable from the start node"),
                )
                .for_node(id.clone())
                .with_suggestion(format!("add an edge leading to '{id}' or remove it"))
            })
            .collect()
    }
}

struct ConditionSyntaxRule;
impl LintRule for ConditionSyntaxRule {
    fn name(&self) -> &str {
        "condition_syntax"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .all_edges()
            .iter()
            .filter(|e| e.is_conditional())
            .filter_map(|e| {
                let condition = e.condition.as_deref().unwrap_or("");
                parse_condition(condition).err().map(|err| {
                    // Malformed conditions evaluate to false at runtime, so
                    // this is advisory rather than fatal.
                    Diagnostic::new(
                        self.name(),
                        Severity::Warning,
                        format!(
                            "edge {} -> {} has malformed condition '{condition}': {err}",
                            e.from, e.to
                        ),
                    )
                    .for_edge(e.from.clone(), e.to.clone())
                    .with_suggestion("fix the condition expression")
                })
            })
            .collect()
    }
}

struct RetryTargetRule;
impl LintRule for RetryTargetRule {
    fn name(&self) -> &str {
        "retry_target_exists"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for node in graph.all_nodes() {
            for (attr, target) in [
                ("retry_target", node.retry_target()),
                ("fallback_retry_target", node.fallback_retry_target()),
            ] {
                if let Some(target) = target {
                    if graph.node(target).is_none() {
                        diagnostics.push(
                            Diagnostic::new(
                                self.name(),
                                Severity::Warning,
                                format!("node '{}' has {attr} '{target}' which does not exist", node.id),
                            )
                            .for_node(node.id.clone())
                            .with_suggestion(format!("add node '{target}' or fix {attr}")),
                        );
                    }
                }
            }
        }
        diagnostics
    }
}

struct ExitOutgoingRule;
impl LintRule for ExitOutgoingRule {
    fn name(&self) -> &str {
        "exit_no_outgoing"
    }
    fn apply(&self, graph: &PipelineGraph) -> Vec<Diagnostic> {
        graph
            .all_nodes()
            .filter(|n| n.is_exit() && !graph.outgoing_edges(&n.id).is_empty())
            .map(|n| {
                Diagnostic::new(
                    self.name(),
                    Severity::Warning,
                    format!("exit node '{}' has outgoing edges that will never run", n.id),
                )
                .for_node(n.id.clone())
                .with_suggestion(format!("remove the outgoing edges from '{}'", n.id))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// The built-in rule set.
pub fn default_rules() -> Vec<Box<dyn LintRule>> {
    vec![
        Box::new(StartNodeRule),
        Box::new(ExitNodeRule),
        Box::new(EdgeEndpointsRule),
        Box::new(DeadEndRule),
        Box::new(ReachabilityRule),
        Box::new(ConditionSyntaxRule),
        Box::new(RetryTargetRule),
        Box::new(ExitOutgoingRule),
    ]
}

/// Run `rules` over the graph and collect every finding.
pub fn validate_with(graph: &PipelineGraph, rules: &[Box<dyn LintRule>]) -> DiagnosticCollection {
    let mut collection = DiagnosticCollection::new();
    for rule in rules {
        collection.extend(rule.apply(graph));
    }
    collection
}

/// Run the built-in rules and collect every finding.
pub fn validate(graph: &PipelineGraph) -> DiagnosticCollection {
    validate_with(graph, &default_rules())
}

/// Validate; fail with the full collection when any error is present.
pub fn validate_or_raise(graph: &PipelineGraph) -> conductor_types::Result<DiagnosticCollection> {
    let collection = validate(graph);
    if collection.has_errors() {
        return Err(ConductorError::Validation(collection));
    }
    Ok(collection)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

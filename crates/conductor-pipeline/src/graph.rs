//! The pipeline graph data model: nodes, edges, and adjacency queries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Node shape vocabulary. Graphviz names are canonical; plain aliases are
/// accepted everywhere shapes are matched.
pub mod shape {
    pub const START: &str = "Mdiamond";
    pub const EXIT: &str = "Msquare";
    pub const ACTION: &str = "box";
    pub const CONDITIONAL: &str = "diamond";
}

fn default_shape() -> String {
    shape::ACTION.to_string()
}

/// One stage of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default = "default_shape")]
    pub shape: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, shape: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            shape: shape.into(),
            prompt: String::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    fn attr_usize(&self, key: &str) -> Option<usize> {
        match self.attributes.get(key)? {
            serde_json::Value::Number(n) => n.as_u64().map(|v| v as usize),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// How many failure redirects may re-enter this node before the runner
    /// gives up on it.
    pub fn max_retries(&self) -> usize {
        self.attr_usize("max_retries").unwrap_or(1)
    }

    pub fn retry_target(&self) -> Option<&str> {
        self.attr_str("retry_target")
    }

    pub fn fallback_retry_target(&self) -> Option<&str> {
        self.attr_str("fallback_retry_target")
    }

    pub fn agent_name(&self) -> Option<&str> {
        self.attr_str("agent")
    }

    pub fn agent_mode(&self) -> Option<&str> {
        self.attr_str("agent.mode")
    }

    pub fn llm_model(&self) -> Option<&str> {
        self.attr_str("llm_model")
    }

    pub fn llm_provider(&self) -> Option<&str> {
        self.attr_str("llm_provider")
    }

    pub fn max_review_rounds(&self) -> Option<usize> {
        self.attr_usize("max_review_rounds")
    }

    pub fn is_start(&self) -> bool {
        self.shape == shape::START || self.shape == "start"
    }

    pub fn is_exit(&self) -> bool {
        self.shape == shape::EXIT || self.shape == "exit"
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub weight: i32,
    /// Optional display label; may embed an interview accelerator like
    /// `[Y] Yes`.
    #[serde(default)]
    pub label: Option<String>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
            weight: 0,
            label: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// An edge guards routing only when it carries a non-empty condition.
    pub fn is_conditional(&self) -> bool {
        self.condition.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// An in-memory pipeline graph, as produced by an external parser.
///
/// Edges are stored stably sorted by source node so each node's outgoing
/// edges form a contiguous slice in declaration order; declaration order is
/// load-bearing for conditional routing.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    pub name: String,
    pub goal: String,
    pub graph_attributes: HashMap<String, serde_json::Value>,
    nodes: HashMap<String, Node>,
    edges: Vec<Edge>,
    adjacency: HashMap<String, (usize, usize)>,
}

/// Serde form of a graph document (JSON interchange).
#[derive(Serialize, Deserialize)]
struct GraphDoc {
    name: String,
    #[serde(default)]
    goal: String,
    #[serde(default)]
    attributes: HashMap<String, serde_json::Value>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl PipelineGraph {
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        graph_attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        let goal = graph_attributes
            .get("goal")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let node_map: HashMap<String, Node> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        // Stable sort keeps declaration order within each source node.
        let mut sorted_edges = edges;
        sorted_edges.sort_by(|a, b| a.from.cmp(&b.from));

        let mut adjacency: HashMap<String, (usize, usize)> = HashMap::new();
        let mut i = 0;
        while i < sorted_edges.len() {
            let start = i;
            let from = sorted_edges[i].from.clone();
            while i < sorted_edges.len() && sorted_edges[i].from == from {
                i += 1;
            }
            adjacency.insert(from, (start, i - start));
        }

        Self {
            name: name.into(),
            goal,
            graph_attributes,
            nodes: node_map,
            edges: sorted_edges,
            adjacency,
        }
    }

    /// Parse a graph from its JSON document form.
    pub fn from_json(text: &str) -> conductor_types::Result<Self> {
        let doc: GraphDoc = serde_json::from_str(text)?;
        let mut attributes = doc.attributes;
        if !doc.goal.is_empty() {
            attributes.insert("goal".into(), serde_json::Value::String(doc.goal));
        }
        Ok(Self::new(doc.name, doc.nodes, doc.edges, attributes))
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The unique start node: start shape, falling back to the id `start`.
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes
            .values()
            .find(|n| n.is_start())
            .or_else(|| self.nodes.get("start"))
    }

    /// Nodes with no outgoing edges.
    pub fn exit_nodes(&self) -> Vec<&Node> {
        let mut exits: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| self.outgoing_edges(&n.id).is_empty())
            .collect();
        exits.sort_by(|a, b| a.id.cmp(&b.id));
        exits
    }

    /// Outgoing edges of `node_id`, in declaration order.
    pub fn outgoing_edges(&self, node_id: &str) -> &[Edge] {
        match self.adjacency.get(node_id) {
            Some(&(start, count)) => &self.edges[start..start + count],
            None => &[],
        }
    }

    pub fn incoming_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.to == node_id).collect()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn all_nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn all_edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> PipelineGraph {
        PipelineGraph::new(
            "test",
            vec![
                Node::new("start", shape::START),
                Node::new("a", shape::ACTION),
                Node::new("b", shape::ACTION),
                Node::new("exit1", shape::EXIT),
                Node::new("exit2", shape::EXIT),
            ],
            vec![
                Edge::new("start", "a"),
                Edge::new("start", "b"),
                Edge::new("a", "exit1"),
                Edge::new("b", "exit1"),
                Edge::new("b", "exit2"),
            ],
            HashMap::new(),
        )
    }

    #[test]
    fn outgoing_edges_in_declaration_order() {
        let graph = sample_graph();
        let edges = graph.outgoing_edges("start");
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].to, "a");
        assert_eq!(edges[1].to, "b");
        assert!(graph.outgoing_edges("exit1").is_empty());
        assert!(graph.outgoing_edges("unknown").is_empty());
    }

    #[test]
    fn incoming_edges_query() {
        let graph = sample_graph();
        let incoming = graph.incoming_edges("exit1");
        assert_eq!(incoming.len(), 2);
        let sources: Vec<_> = incoming.iter().map(|e| e.from.as_str()).collect();
        assert!(sources.contains(&"a"));
        assert!(sources.contains(&"b"));
        assert!(graph.incoming_edges("start").is_empty());
    }

    #[test]
    fn exit_nodes_are_nodes_without_outgoing_edges() {
        let graph = sample_graph();
        let exits = graph.exit_nodes();
        let ids: Vec<_> = exits.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["exit1", "exit2"]);
    }

    #[test]
    fn start_node_by_shape_then_id() {
        let graph = sample_graph();
        assert_eq!(graph.start_node().unwrap().id, "start");

        let by_id = PipelineGraph::new(
            "g",
            vec![Node::new("start", shape::ACTION), Node::new("end", shape::EXIT)],
            vec![Edge::new("start", "end")],
            HashMap::new(),
        );
        assert_eq!(by_id.start_node().unwrap().id, "start");

        let by_shape = PipelineGraph::new(
            "g",
            vec![Node::new("begin", shape::START), Node::new("end", shape::EXIT)],
            vec![Edge::new("begin", "end")],
            HashMap::new(),
        );
        assert_eq!(by_shape.start_node().unwrap().id, "begin");
    }

    #[test]
    fn goal_extracted_from_graph_attributes() {
        let mut attrs = HashMap::new();
        attrs.insert("goal".to_string(), serde_json::json!("ship it"));
        let graph = PipelineGraph::new("g", vec![], vec![], attrs);
        assert_eq!(graph.goal, "ship it");
    }

    #[test]
    fn node_typed_attribute_accessors() {
        let node = Node::new("work", shape::ACTION)
            .with_attr("max_retries", serde_json::json!(3))
            .with_attr("retry_target", serde_json::json!("fixup"))
            .with_attr("agent.mode", serde_json::json!("interactive"))
            .with_attr("llm_model", serde_json::json!("sonnet"));

        assert_eq!(node.max_retries(), 3);
        assert_eq!(node.retry_target(), Some("fixup"));
        assert_eq!(node.fallback_retry_target(), None);
        assert_eq!(node.agent_mode(), Some("interactive"));
        assert_eq!(node.llm_model(), Some("sonnet"));
        assert_eq!(node.llm_provider(), None);
    }

    #[test]
    fn max_retries_defaults_to_one_and_parses_strings() {
        assert_eq!(Node::new("n", shape::ACTION).max_retries(), 1);
        let from_string =
            Node::new("n", shape::ACTION).with_attr("max_retries", serde_json::json!("4"));
        assert_eq!(from_string.max_retries(), 4);
    }

    #[test]
    fn edge_is_conditional_ignores_empty_conditions() {
        assert!(!Edge::new("a", "b").is_conditional());
        assert!(!Edge::new("a", "b").with_condition("   ").is_conditional());
        assert!(Edge::new("a", "b")
            .with_condition("outcome=success")
            .is_conditional());
    }

    #[test]
    fn from_json_round_trip() {
        let text = r#"{
            "name": "demo",
            "goal": "refactor",
            "nodes": [
                {"id": "start", "shape": "Mdiamond"},
                {"id": "work", "prompt": "Please $goal the module",
                 "attributes": {"max_retries": 2}},
                {"id": "done", "shape": "Msquare"}
            ],
            "edges": [
                {"from": "start", "to": "work"},
                {"from": "work", "to": "done", "weight": 5}
            ]
        }"#;
        let graph = PipelineGraph::from_json(text).unwrap();

        assert_eq!(graph.name, "demo");
        assert_eq!(graph.goal, "refactor");
        assert_eq!(graph.node_count(), 3);
        // Unspecified shape defaults to the action shape.
        assert_eq!(graph.node("work").unwrap().shape, shape::ACTION);
        assert_eq!(graph.node("work").unwrap().max_retries(), 2);
        assert_eq!(graph.outgoing_edges("work")[0].weight, 5);
    }

    #[test]
    fn from_json_rejects_malformed_documents() {
        assert!(PipelineGraph::from_json("not json").is_err());
        assert!(PipelineGraph::from_json(r#"{"name": "x"}"#).is_err());
    }
}

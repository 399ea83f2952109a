//! Pre-run graph rewrites.
//!
//! Transforms run once, after parsing and before validation, so the engine
//! only ever sees the rewritten graph.

use std::collections::HashMap;

use crate::graph::PipelineGraph;

/// Apply every transform in order.
pub fn apply_transforms(graph: &mut PipelineGraph) {
    expand_variables(graph);
}

/// Substitute `$goal` and `$<attribute>` references in node prompts from the
/// graph goal and graph-level attributes. Unknown variables are left as-is.
pub fn expand_variables(graph: &mut PipelineGraph) {
    let mut vars: HashMap<String, String> = graph
        .graph_attributes
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), text))
        })
        .collect();
    if !graph.goal.is_empty() {
        vars.insert("goal".to_string(), graph.goal.clone());
    }

    // Longest names first so `$goal_detail` is never clobbered by `$goal`.
    let mut names: Vec<&String> = vars.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    for node in graph.all_nodes_mut() {
        if node.prompt.is_empty() || !node.prompt.contains('$') {
            continue;
        }
        let mut prompt = node.prompt.clone();
        for name in &names {
            prompt = prompt.replace(&format!("${name}"), &vars[name.as_str()]);
        }
        node.prompt = prompt;
    }
}

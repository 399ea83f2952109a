use std::collections::HashMap;

use async_trait::async_trait;

/// Trait for tools an agent backend can invoke.
///
/// Arguments arrive as a flat string map (matching the `{param}` placeholder
/// substitution of config-defined tools). The result is JSON so callers can
/// distinguish plain text from path-shaped values.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn invoke(
        &self,
        args: &HashMap<String, String>,
    ) -> conductor_types::Result<serde_json::Value>;
}

/// Registry that holds named tools and provides lookup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

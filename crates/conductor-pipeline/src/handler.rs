//! Node handler trait, registry, and the pass-through built-ins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use conductor_types::{Context, Outcome};

use crate::backend::{Backend, ConversationalBackend, NodeTurnCallback};
use crate::graph::{shape, Node, PipelineGraph};
use crate::handlers::{CodergenDispatcher, CodergenHandler, InteractiveHandler};
use crate::interviewer::Interviewer;

/// One handler per node shape. Handlers borrow the context and graph for the
/// duration of a call and return a fresh [`Outcome`].
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// The handler type identifier (e.g. "start", "exit", "codergen").
    fn handler_type(&self) -> &str;

    async fn handle(
        &self,
        node: &Node,
        context: &Context,
        graph: &PipelineGraph,
    ) -> conductor_types::Result<Outcome>;
}

/// Maps node shapes to handler types and holds the registered handlers.
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn NodeHandler>>,
    shape_to_type: HashMap<String, String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        let mut shape_to_type = HashMap::new();
        for (s, t) in [
            (shape::START, "start"),
            ("start", "start"),
            (shape::EXIT, "exit"),
            ("exit", "exit"),
            (shape::CONDITIONAL, "conditional"),
            ("conditional", "conditional"),
            (shape::ACTION, "codergen"),
            ("action", "codergen"),
        ] {
            shape_to_type.insert(s.to_string(), t.to_string());
        }

        Self {
            handlers: HashMap::new(),
            shape_to_type,
        }
    }

    pub fn register(&mut self, handler: impl NodeHandler + 'static) {
        self.handlers
            .insert(handler.handler_type().to_string(), Box::new(handler));
    }

    /// Resolve a node's handler type from its shape. Unknown shapes get the
    /// codergen handler.
    pub fn resolve_type(&self, node: &Node) -> String {
        self.shape_to_type
            .get(&node.shape)
            .cloned()
            .unwrap_or_else(|| "codergen".to_string())
    }

    pub fn get(&self, handler_type: &str) -> Option<&dyn NodeHandler> {
        self.handlers.get(handler_type).map(|h| h.as_ref())
    }

    pub fn has(&self, handler_type: &str) -> bool {
        self.handlers.contains_key(handler_type)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Pass-through handlers
// ---------------------------------------------------------------------------

pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
    fn handler_type(&self) -> &str {
        "start"
    }

    async fn handle(
        &self,
        _node: &Node,
        _context: &Context,
        _graph: &PipelineGraph,
    ) -> conductor_types::Result<Outcome> {
        Ok(Outcome::success("Pipeline started"))
    }
}

/// Terminal pass-through; the runner stops after an exit-shaped node.
pub struct ExitHandler;

#[async_trait]
impl NodeHandler for ExitHandler {
    fn handler_type(&self) -> &str {
        "exit"
    }

    async fn handle(
        &self,
        _node: &Node,
        _context: &Context,
        _graph: &PipelineGraph,
    ) -> conductor_types::Result<Outcome> {
        Ok(Outcome::success("Pipeline completed"))
    }
}

/// Routing happens entirely in edge selection; the node itself is inert.
pub struct ConditionalHandler;

#[async_trait]
impl NodeHandler for ConditionalHandler {
    fn handler_type(&self) -> &str {
        "conditional"
    }

    async fn handle(
        &self,
        _node: &Node,
        _context: &Context,
        _graph: &PipelineGraph,
    ) -> conductor_types::Result<Outcome> {
        Ok(Outcome::success("Conditional pass-through"))
    }
}

// ---------------------------------------------------------------------------
// Registry factories
// ---------------------------------------------------------------------------

/// Registry with the built-ins plus a standard-only codergen dispatcher.
/// Interactive-mode nodes fall back to the standard handler.
pub fn default_registry(
    backend: Arc<dyn Backend>,
    on_turn: Option<NodeTurnCallback>,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(StartHandler);
    registry.register(ExitHandler);
    registry.register(ConditionalHandler);
    registry.register(CodergenDispatcher::standard_only(CodergenHandler::new(
        backend, on_turn,
    )));
    registry
}

/// Registry whose codergen dispatcher routes interactive-mode nodes through
/// conversational approval with the given interviewer.
pub fn default_registry_with_interviewer<B>(
    backend: Arc<B>,
    interviewer: Arc<dyn Interviewer>,
    on_turn: Option<NodeTurnCallback>,
) -> HandlerRegistry
where
    B: ConversationalBackend + 'static,
{
    let standard = CodergenHandler::new(backend.clone(), on_turn.clone());
    let interactive = InteractiveHandler::new(backend, interviewer, on_turn);

    let mut registry = HandlerRegistry::new();
    registry.register(StartHandler);
    registry.register(ExitHandler);
    registry.register(ConditionalHandler);
    registry.register(CodergenDispatcher::with_interactive(standard, interactive));
    registry
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

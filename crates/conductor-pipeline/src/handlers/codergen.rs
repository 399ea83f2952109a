//! The standard codergen handler and the dispatcher that chooses between
//! standard and interactive execution.

use std::sync::Arc;

use async_trait::async_trait;

use conductor_types::{Context, Outcome};

use crate::backend::{bind_turn_callback, Backend, BackendReply, NodeTurnCallback};
use crate::graph::{Node, PipelineGraph};
use crate::handler::NodeHandler;
use crate::handlers::interactive::InteractiveHandler;

/// Single-shot agent invocation: run the node prompt once and wrap the
/// reply. Backend failures surface as `Fail` outcomes so failure routing
/// can run.
pub struct CodergenHandler {
    backend: Arc<dyn Backend>,
    on_turn: Option<NodeTurnCallback>,
}

impl CodergenHandler {
    pub fn new(backend: Arc<dyn Backend>, on_turn: Option<NodeTurnCallback>) -> Self {
        Self { backend, on_turn }
    }
}

#[async_trait]
impl NodeHandler for CodergenHandler {
    fn handler_type(&self) -> &str {
        "codergen"
    }

    async fn handle(
        &self,
        node: &Node,
        context: &Context,
        _graph: &PipelineGraph,
    ) -> conductor_types::Result<Outcome> {
        let callback = bind_turn_callback(&node.id, self.on_turn.as_ref());
        match self
            .backend
            .run(node, &node.prompt, context, callback)
            .await
        {
            Ok(BackendReply::Text(text)) => Ok(Outcome::success(text.clone())
                .with_context_update("last_response", serde_json::Value::String(text))),
            Ok(BackendReply::Outcome(outcome)) => Ok(outcome),
            Err(error) => {
                tracing::warn!(node = %node.id, error = %error, "Backend call failed");
                Ok(Outcome::fail(error.to_string()))
            }
        }
    }
}

/// Picks the interactive handler when the node asks for it
/// (`agent.mode = "interactive"`), the standard handler otherwise.
pub struct CodergenDispatcher {
    standard: CodergenHandler,
    interactive: Option<InteractiveHandler>,
}

impl CodergenDispatcher {
    pub fn standard_only(standard: CodergenHandler) -> Self {
        Self {
            standard,
            interactive: None,
        }
    }

    pub fn with_interactive(standard: CodergenHandler, interactive: InteractiveHandler) -> Self {
        Self {
            standard,
            interactive: Some(interactive),
        }
    }
}

#[async_trait]
impl NodeHandler for CodergenDispatcher {
    fn handler_type(&self) -> &str {
        "codergen"
    }

    async fn handle(
        &self,
        node: &Node,
        context: &Context,
        graph: &PipelineGraph,
    ) -> conductor_types::Result<Outcome> {
        if node.agent_mode() == Some("interactive") {
            match &self.interactive {
                Some(interactive) => return interactive.handle(node, context, graph).await,
                None => {
                    tracing::warn!(
                        node = %node.id,
                        "Interactive mode requested but no interactive handler configured"
                    );
                }
            }
        }
        self.standard.handle(node, context, graph).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::backend::{SimulationBackend, TurnCallback};
    use crate::graph::{shape, Edge};
    use crate::interviewer::AutoApproveInterviewer;

    fn minimal_graph() -> PipelineGraph {
        PipelineGraph::new(
            "g",
            vec![Node::new("a", shape::ACTION), Node::new("b", shape::EXIT)],
            vec![Edge::new("a", "b")],
            HashMap::new(),
        )
    }

    struct FailingBackend;

    #[async_trait]
    impl Backend for FailingBackend {
        async fn run(
            &self,
            _node: &Node,
            _prompt: &str,
            _context: &Context,
            _on_turn: Option<TurnCallback>,
        ) -> conductor_types::Result<BackendReply> {
            Err(conductor_types::ConductorError::BackendUnavailable(
                "401 for Bearer sk-verysecret".into(),
            ))
        }
    }

    struct OutcomeBackend;

    #[async_trait]
    impl Backend for OutcomeBackend {
        async fn run(
            &self,
            _node: &Node,
            _prompt: &str,
            _context: &Context,
            _on_turn: Option<TurnCallback>,
        ) -> conductor_types::Result<BackendReply> {
            Ok(BackendReply::Outcome(Outcome::retry("needs another pass")))
        }
    }

    #[tokio::test]
    async fn text_reply_becomes_success_with_context_update() {
        let handler = CodergenHandler::new(Arc::new(SimulationBackend::new()), None);
        let node = Node::new("work", shape::ACTION).with_prompt("Do the thing");
        let outcome = handler
            .handle(&node, &Context::new(), &minimal_graph())
            .await
            .unwrap();

        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Success);
        assert_eq!(outcome.notes, "[simulated] response for stage: work");
        assert_eq!(
            outcome.context_updates.get("last_response"),
            Some(&serde_json::json!("[simulated] response for stage: work"))
        );
    }

    #[tokio::test]
    async fn outcome_reply_passes_through() {
        let handler = CodergenHandler::new(Arc::new(OutcomeBackend), None);
        let node = Node::new("work", shape::ACTION);
        let outcome = handler
            .handle(&node, &Context::new(), &minimal_graph())
            .await
            .unwrap();
        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Retry);
        assert_eq!(outcome.notes, "needs another pass");
    }

    #[tokio::test]
    async fn backend_error_becomes_sanitized_fail_outcome() {
        let handler = CodergenHandler::new(Arc::new(FailingBackend), None);
        let node = Node::new("work", shape::ACTION);
        let outcome = handler
            .handle(&node, &Context::new(), &minimal_graph())
            .await
            .unwrap();

        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Fail);
        let reason = outcome.failure_reason.unwrap();
        assert!(reason.contains("Bearer [REDACTED]"), "reason: {reason}");
        assert!(!reason.contains("verysecret"));
    }

    #[tokio::test]
    async fn on_turn_forwarded_with_node_id() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let on_turn: NodeTurnCallback = Arc::new(move |node_id, turn| {
            sink.lock()
                .unwrap()
                .push(format!("{node_id}:{}", turn.turn_number));
        });

        let handler = CodergenHandler::new(Arc::new(SimulationBackend::new()), Some(on_turn));
        let node = Node::new("gen", shape::ACTION);
        handler
            .handle(&node, &Context::new(), &minimal_graph())
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["gen:1".to_string()]);
    }

    #[tokio::test]
    async fn dispatcher_routes_interactive_nodes() {
        let backend = Arc::new(SimulationBackend::new());
        let standard = CodergenHandler::new(backend.clone(), None);
        let interactive =
            InteractiveHandler::new(backend, Arc::new(AutoApproveInterviewer), None);
        let dispatcher = CodergenDispatcher::with_interactive(standard, interactive);

        let plain = Node::new("plain", shape::ACTION);
        let outcome = dispatcher
            .handle(&plain, &Context::new(), &minimal_graph())
            .await
            .unwrap();
        assert_eq!(outcome.notes, "[simulated] response for stage: plain");

        let interactive_node = Node::new("chat", shape::ACTION)
            .with_attr("agent.mode", serde_json::json!("interactive"));
        let outcome = dispatcher
            .handle(&interactive_node, &Context::new(), &minimal_graph())
            .await
            .unwrap();
        // Auto-approval accepts the first reply.
        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Success);
        assert_eq!(outcome.notes, "[simulated] response for stage: chat");
    }

    #[tokio::test]
    async fn dispatcher_without_interactive_falls_back_to_standard() {
        let backend = Arc::new(SimulationBackend::new());
        let dispatcher =
            CodergenDispatcher::standard_only(CodergenHandler::new(backend, None));

        let node = Node::new("chat", shape::ACTION)
            .with_attr("agent.mode", serde_json::json!("interactive"));
        let outcome = dispatcher
            .handle(&node, &Context::new(), &minimal_graph())
            .await
            .unwrap();
        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Success);
    }
}

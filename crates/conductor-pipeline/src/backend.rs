//! The pluggable agent-backend contract.
//!
//! Backends execute one agent invocation per call. The engine never sees
//! provider details; it hands a node, a prompt, and the run context to the
//! backend and gets back either a plain text answer or a full [`Outcome`]
//! when the backend has a richer termination signal.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use conductor_types::{AgentTurn, Context, Outcome};

use crate::graph::Node;

/// Backend-facing per-turn callback. Invoked once per completed agent turn
/// with a fully populated [`AgentTurn`]; must not block.
pub type TurnCallback = Arc<dyn Fn(&AgentTurn) + Send + Sync>;

/// Handler-facing per-turn callback carrying the node id alongside the turn.
pub type NodeTurnCallback = Arc<dyn Fn(&str, &AgentTurn) + Send + Sync>;

/// Bind a node id into a [`NodeTurnCallback`], producing the backend-facing
/// form.
pub fn bind_turn_callback(
    node_id: &str,
    on_turn: Option<&NodeTurnCallback>,
) -> Option<TurnCallback> {
    on_turn.map(|callback| {
        let callback = callback.clone();
        let node_id = node_id.to_string();
        Arc::new(move |turn: &AgentTurn| callback(&node_id, turn)) as TurnCallback
    })
}

/// What a backend returns from one invocation.
#[derive(Debug, Clone)]
pub enum BackendReply {
    /// A plain text answer; the handler wraps it in a success outcome.
    Text(String),
    /// A full outcome, used when the backend decides status itself.
    Outcome(Outcome),
}

/// One-shot agent backend.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn run(
        &self,
        node: &Node,
        prompt: &str,
        context: &Context,
        on_turn: Option<TurnCallback>,
    ) -> conductor_types::Result<BackendReply>;
}

/// Backend that keeps conversation state across calls within one node.
///
/// State is implicit inside the backend; `reset_conversation` discards it
/// and is mandatory when a new node begins its own conversation.
#[async_trait]
pub trait ConversationalBackend: Backend {
    async fn send_message(
        &self,
        node: &Node,
        message: &str,
        context: &Context,
        on_turn: Option<TurnCallback>,
    ) -> conductor_types::Result<BackendReply>;

    async fn reset_conversation(&self);
}

// ---------------------------------------------------------------------------
// SimulationBackend
// ---------------------------------------------------------------------------

/// No-network backend used by the CLI dry path and tests. Replies with a
/// canned line per stage and reports one synthetic turn per call.
#[derive(Default)]
pub struct SimulationBackend {
    turn_count: Mutex<u32>,
}

impl SimulationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_turn(&self, node: &Node) -> AgentTurn {
        let mut count = self.turn_count.lock().unwrap();
        *count += 1;
        let mut turn = AgentTurn::new(*count);
        turn.model = node.llm_model().unwrap_or("simulation").to_string();
        turn.provider = node.llm_provider().unwrap_or("local").to_string();
        turn
    }
}

#[async_trait]
impl Backend for SimulationBackend {
    async fn run(
        &self,
        node: &Node,
        _prompt: &str,
        _context: &Context,
        on_turn: Option<TurnCallback>,
    ) -> conductor_types::Result<BackendReply> {
        *self.turn_count.lock().unwrap() = 0;
        let turn = self.next_turn(node);
        if let Some(callback) = on_turn {
            callback(&turn);
        }
        Ok(BackendReply::Text(format!(
            "[simulated] response for stage: {}",
            node.id
        )))
    }
}

#[async_trait]
impl ConversationalBackend for SimulationBackend {
    async fn send_message(
        &self,
        node: &Node,
        _message: &str,
        _context: &Context,
        on_turn: Option<TurnCallback>,
    ) -> conductor_types::Result<BackendReply> {
        let turn = self.next_turn(node);
        let turn_number = turn.turn_number;
        if let Some(callback) = on_turn {
            callback(&turn);
        }
        Ok(BackendReply::Text(format!(
            "[simulated] revision {} for stage: {}",
            turn_number, node.id
        )))
    }

    async fn reset_conversation(&self) {
        *self.turn_count.lock().unwrap() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::shape;

    #[tokio::test]
    async fn simulation_replies_per_stage() {
        let backend = SimulationBackend::new();
        let node = Node::new("build", shape::ACTION);
        let reply = backend
            .run(&node, "do it", &Context::new(), None)
            .await
            .unwrap();
        match reply {
            BackendReply::Text(text) => {
                assert_eq!(text, "[simulated] response for stage: build")
            }
            BackendReply::Outcome(_) => panic!("expected text reply"),
        }
    }

    #[tokio::test]
    async fn simulation_reports_turns_and_resets() {
        let backend = SimulationBackend::new();
        let node = Node::new("review", shape::ACTION);
        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: TurnCallback = Arc::new(move |turn: &AgentTurn| {
            sink.lock().unwrap().push(turn.turn_number);
        });

        let ctx = Context::new();
        backend
            .run(&node, "p", &ctx, Some(callback.clone()))
            .await
            .unwrap();
        backend
            .send_message(&node, "revise", &ctx, Some(callback.clone()))
            .await
            .unwrap();
        backend
            .send_message(&node, "again", &ctx, Some(callback.clone()))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);

        backend.reset_conversation().await;
        backend
            .send_message(&node, "fresh", &ctx, Some(callback))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 1]);
    }

    #[tokio::test]
    async fn simulation_turn_uses_node_model_attributes() {
        let backend = SimulationBackend::new();
        let node = Node::new("work", shape::ACTION)
            .with_attr("llm_model", serde_json::json!("sonnet"))
            .with_attr("llm_provider", serde_json::json!("anthropic"));

        let captured: Arc<Mutex<Option<AgentTurn>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let callback: TurnCallback =
            Arc::new(move |turn: &AgentTurn| *sink.lock().unwrap() = Some(turn.clone()));

        backend
            .run(&node, "p", &Context::new(), Some(callback))
            .await
            .unwrap();

        let turn = captured.lock().unwrap().clone().unwrap();
        assert_eq!(turn.model, "sonnet");
        assert_eq!(turn.provider, "anthropic");
    }

    #[test]
    fn bind_turn_callback_carries_node_id() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let node_callback: NodeTurnCallback = Arc::new(move |node_id, turn| {
            sink.lock()
                .unwrap()
                .push(format!("{node_id}#{}", turn.turn_number));
        });

        let bound = bind_turn_callback("stage_a", Some(&node_callback)).unwrap();
        bound(&AgentTurn::new(1));
        bound(&AgentTurn::new(2));
        assert_eq!(*seen.lock().unwrap(), vec!["stage_a#1", "stage_a#2"]);

        assert!(bind_turn_callback("stage_a", None).is_none());
    }
}

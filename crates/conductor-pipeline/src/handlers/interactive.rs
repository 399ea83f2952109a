//! Interactive codergen: a conversational agent whose replies pass through
//! human review before the node completes.
//!
//! Flow: reset the backend's conversation, run the node prompt, then loop,
//! presenting each reply to the interviewer as Approve / Revise / Abort.
//! Approval (or a skipped/timed-out interview) accepts the reply; revision
//! feedback goes back to the backend via `send_message`; abort fails the
//! node. Review rounds are capped by the `max_review_rounds` attribute;
//! exhaustion accepts the last reply as a partial success.

use std::sync::Arc;

use async_trait::async_trait;

use conductor_types::{Context, Outcome};

use crate::backend::{bind_turn_callback, BackendReply, ConversationalBackend, NodeTurnCallback};
use crate::graph::{Node, PipelineGraph};
use crate::handler::NodeHandler;
use crate::interviewer::{Answer, AnswerValue, Choice, Interviewer, Question, QuestionType};

const DEFAULT_REVIEW_ROUNDS: usize = 3;

enum Verdict {
    Approve,
    Revise(String),
    Abort,
}

pub struct InteractiveHandler {
    backend: Arc<dyn ConversationalBackend>,
    interviewer: Arc<dyn Interviewer>,
    on_turn: Option<NodeTurnCallback>,
}

impl InteractiveHandler {
    pub fn new(
        backend: Arc<dyn ConversationalBackend>,
        interviewer: Arc<dyn Interviewer>,
        on_turn: Option<NodeTurnCallback>,
    ) -> Self {
        Self {
            backend,
            interviewer,
            on_turn,
        }
    }

    fn review_question(node: &Node, reply: &str) -> Question {
        Question::new(
            format!("Review the response for stage '{}':\n\n{}", node.id, reply),
            QuestionType::MultipleChoice,
        )
        .with_options(vec![
            Choice::new("A", "[A] Approve"),
            Choice::new("R", "[R] Revise"),
            Choice::new("X", "[X] Abort"),
        ])
        .for_stage(node.id.clone())
    }

    fn interpret(answer: &Answer) -> Verdict {
        let feedback = |fallback: &str| {
            if answer.text.trim().is_empty() {
                fallback.to_string()
            } else {
                answer.text.trim().to_string()
            }
        };

        match &answer.value {
            AnswerValue::Yes => Verdict::Approve,
            AnswerValue::No => Verdict::Abort,
            // Nobody is watching; let the pipeline keep moving.
            AnswerValue::Skipped | AnswerValue::Timeout => Verdict::Approve,
            AnswerValue::Text(value) => {
                let key = answer
                    .selected
                    .as_ref()
                    .map(|c| c.key.as_str())
                    .unwrap_or(value.as_str());
                match key.to_uppercase().as_str() {
                    "A" | "APPROVE" => Verdict::Approve,
                    "X" | "ABORT" => Verdict::Abort,
                    "R" | "REVISE" => Verdict::Revise(feedback("Please revise.")),
                    // Freeform text is taken as revision feedback.
                    _ => Verdict::Revise(feedback(value)),
                }
            }
        }
    }

    fn accepted(text: String) -> Outcome {
        let update = serde_json::Value::String(text.clone());
        Outcome::success(text).with_context_update("last_response", update)
    }
}

#[async_trait]
impl NodeHandler for InteractiveHandler {
    fn handler_type(&self) -> &str {
        "codergen.interactive"
    }

    async fn handle(
        &self,
        node: &Node,
        context: &Context,
        _graph: &PipelineGraph,
    ) -> conductor_types::Result<Outcome> {
        self.backend.reset_conversation().await;
        let callback = bind_turn_callback(&node.id, self.on_turn.as_ref());

        let mut reply = match self
            .backend
            .run(node, &node.prompt, context, callback.clone())
            .await
        {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(node = %node.id, error = %error, "Backend call failed");
                return Ok(Outcome::fail(error.to_string()));
            }
        };

        let max_rounds = node.max_review_rounds().unwrap_or(DEFAULT_REVIEW_ROUNDS);
        let mut last_text = String::new();

        for round in 0..max_rounds {
            let text = match reply {
                BackendReply::Outcome(outcome) => return Ok(outcome),
                BackendReply::Text(text) => text,
            };
            last_text = text.clone();

            let answer = match self
                .interviewer
                .ask(&Self::review_question(node, &text))
                .await
            {
                Ok(answer) => answer,
                Err(error) => {
                    tracing::warn!(node = %node.id, error = %error, "Interview failed");
                    return Ok(Outcome::fail(error.to_string()));
                }
            };

            let feedback = match Self::interpret(&answer) {
                Verdict::Approve => return Ok(Self::accepted(text)),
                Verdict::Abort => {
                    return Ok(Outcome::fail(format!(
                        "reviewer aborted stage '{}'",
                        node.id
                    )))
                }
                Verdict::Revise(feedback) => feedback,
            };

            tracing::info!(node = %node.id, round, "Reviewer requested revision");
            reply = match self
                .backend
                .send_message(node, &feedback, context, callback.clone())
                .await
            {
                Ok(reply) => reply,
                Err(error) => {
                    tracing::warn!(node = %node.id, error = %error, "Backend call failed");
                    return Ok(Outcome::fail(error.to_string()));
                }
            };
        }

        // Review budget exhausted without an explicit verdict.
        let text = match reply {
            BackendReply::Outcome(outcome) => return Ok(outcome),
            BackendReply::Text(text) => text,
        };
        let accepted = if text.is_empty() { last_text } else { text };
        let update = serde_json::Value::String(accepted.clone());
        Ok(Outcome::partial(accepted).with_context_update("last_response", update))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::backend::{Backend, SimulationBackend, TurnCallback};
    use crate::graph::{shape, Edge};
    use crate::interviewer::{QueueInterviewer, RecordingInterviewer};

    fn minimal_graph() -> PipelineGraph {
        PipelineGraph::new(
            "g",
            vec![Node::new("a", shape::ACTION), Node::new("b", shape::EXIT)],
            vec![Edge::new("a", "b")],
            HashMap::new(),
        )
    }

    fn interactive_node(id: &str) -> Node {
        Node::new(id, shape::ACTION)
            .with_prompt("Write the module")
            .with_attr("agent.mode", serde_json::json!("interactive"))
    }

    fn revise_answer() -> Answer {
        let mut answer = Answer::of_choice(Choice::new("R", "[R] Revise"));
        answer.text = "tighten the error handling".into();
        answer
    }

    #[tokio::test]
    async fn approval_accepts_first_reply() {
        let handler = InteractiveHandler::new(
            Arc::new(SimulationBackend::new()),
            Arc::new(QueueInterviewer::new(vec![Answer::of_choice(Choice::new(
                "A",
                "[A] Approve",
            ))])),
            None,
        );

        let outcome = handler
            .handle(&interactive_node("draft"), &Context::new(), &minimal_graph())
            .await
            .unwrap();
        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Success);
        assert_eq!(outcome.notes, "[simulated] response for stage: draft");
    }

    #[tokio::test]
    async fn revision_feedback_reaches_the_backend() {
        let interviewer = Arc::new(RecordingInterviewer::new(Arc::new(QueueInterviewer::new(
            vec![revise_answer(), Answer::of_choice(Choice::new("A", "[A] Approve"))],
        ))));
        let handler = InteractiveHandler::new(
            Arc::new(SimulationBackend::new()),
            interviewer.clone(),
            None,
        );

        let outcome = handler
            .handle(&interactive_node("draft"), &Context::new(), &minimal_graph())
            .await
            .unwrap();

        // Second reply (the revision) was accepted.
        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Success);
        assert_eq!(outcome.notes, "[simulated] revision 2 for stage: draft");

        let transcript = interviewer.recordings();
        assert_eq!(transcript.len(), 2);
        assert!(transcript[0].0.text.contains("response for stage: draft"));
        assert!(transcript[1].0.text.contains("revision 2"));
    }

    #[tokio::test]
    async fn abort_fails_the_node() {
        let handler = InteractiveHandler::new(
            Arc::new(SimulationBackend::new()),
            Arc::new(QueueInterviewer::new(vec![Answer::of_choice(Choice::new(
                "X",
                "[X] Abort",
            ))])),
            None,
        );

        let outcome = handler
            .handle(&interactive_node("draft"), &Context::new(), &minimal_graph())
            .await
            .unwrap();
        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Fail);
        assert!(outcome.failure_reason.unwrap().contains("aborted"));
    }

    #[tokio::test]
    async fn skipped_interview_auto_accepts() {
        // Empty queue: every ask is Skipped.
        let handler = InteractiveHandler::new(
            Arc::new(SimulationBackend::new()),
            Arc::new(QueueInterviewer::new(vec![])),
            None,
        );

        let outcome = handler
            .handle(&interactive_node("draft"), &Context::new(), &minimal_graph())
            .await
            .unwrap();
        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Success);
    }

    #[tokio::test]
    async fn review_budget_exhaustion_is_partial_success() {
        let endless_revisions: Vec<Answer> = (0..5).map(|_| revise_answer()).collect();
        let node = interactive_node("draft").with_attr("max_review_rounds", serde_json::json!(2));
        let handler = InteractiveHandler::new(
            Arc::new(SimulationBackend::new()),
            Arc::new(QueueInterviewer::new(endless_revisions)),
            None,
        );

        let outcome = handler
            .handle(&node, &Context::new(), &minimal_graph())
            .await
            .unwrap();
        assert_eq!(outcome.status, conductor_types::OutcomeStatus::PartialSuccess);
        // Two review rounds ran, so the accepted reply is revision 3.
        assert_eq!(outcome.notes, "[simulated] revision 3 for stage: draft");
    }

    #[tokio::test]
    async fn conversation_reset_before_each_node() {
        let backend = Arc::new(SimulationBackend::new());
        let ctx = Context::new();
        // Seed stale conversational state.
        backend
            .send_message(&interactive_node("old"), "stale", &ctx, None)
            .await
            .unwrap();

        let counted: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = counted.clone();
        let on_turn: NodeTurnCallback =
            Arc::new(move |_node, turn| sink.lock().unwrap().push(turn.turn_number));

        let handler = InteractiveHandler::new(
            backend,
            Arc::new(QueueInterviewer::new(vec![])),
            Some(on_turn),
        );
        handler
            .handle(&interactive_node("fresh"), &ctx, &minimal_graph())
            .await
            .unwrap();

        // The new node's conversation starts at turn 1.
        assert_eq!(*counted.lock().unwrap(), vec![1]);
    }

    struct BrokenBackend;

    #[async_trait]
    impl Backend for BrokenBackend {
        async fn run(
            &self,
            _node: &Node,
            _prompt: &str,
            _context: &Context,
            _on_turn: Option<TurnCallback>,
        ) -> conductor_types::Result<BackendReply> {
            Err(conductor_types::ConductorError::BackendUnavailable(
                "connection refused".into(),
            ))
        }
    }

    #[async_trait]
    impl ConversationalBackend for BrokenBackend {
        async fn send_message(
            &self,
            node: &Node,
            _message: &str,
            context: &Context,
            on_turn: Option<TurnCallback>,
        ) -> conductor_types::Result<BackendReply> {
            self.run(node, "", context, on_turn).await
        }

        async fn reset_conversation(&self) {}
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_fail_outcome() {
        let handler = InteractiveHandler::new(
            Arc::new(BrokenBackend),
            Arc::new(QueueInterviewer::new(vec![])),
            None,
        );
        let outcome = handler
            .handle(&interactive_node("draft"), &Context::new(), &minimal_graph())
            .await
            .unwrap();
        assert_eq!(outcome.status, conductor_types::OutcomeStatus::Fail);
        assert!(outcome
            .failure_reason
            .unwrap()
            .contains("connection refused"));
    }
}

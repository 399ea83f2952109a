//! Pipeline execution engine: graph traversal, handler dispatch, edge
//! selection, failure routing, validation, events, and the interviewer
//! capability for human-in-the-loop approval.

pub mod backend;
pub mod condition;
pub mod edge_selection;
pub mod engine;
pub mod events;
pub mod failure;
pub mod graph;
pub mod handler;
pub mod handlers;
pub mod interviewer;
pub mod prompts;
pub mod transforms;
pub mod validation;

pub use backend::{Backend, BackendReply, ConversationalBackend, NodeTurnCallback, SimulationBackend, TurnCallback};
pub use condition::{evaluate_condition, parse_condition, Clause, ConditionExpr, Operator};
pub use edge_selection::select_edge;
pub use engine::{CancelToken, PipelineExecutor, PipelineResult, RunStatus};
pub use events::{turn_event_callback, EventDispatcher, EventObserver, PipelineEvent, RecordingObserver};
pub use failure::{resolve_failure_target, RetryCounters};
pub use graph::{shape, Edge, Node, PipelineGraph};
pub use handler::{
    default_registry, default_registry_with_interviewer, ConditionalHandler, ExitHandler,
    HandlerRegistry, NodeHandler, StartHandler,
};
pub use handlers::{CodergenDispatcher, CodergenHandler, InteractiveHandler};
pub use interviewer::{
    parse_accelerator, Answer, AnswerValue, AutoApproveInterviewer, CallbackInterviewer, Choice,
    ConsoleInterviewer, Interviewer, Question, QuestionType, QueueInterviewer,
    RecordingInterviewer,
};
pub use prompts::load_prompt_layer;
pub use transforms::{apply_transforms, expand_variables};
pub use validation::{default_rules, validate, validate_or_raise, validate_with, LintRule};

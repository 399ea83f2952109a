//! Typed event fan-out for pipeline observability.
//!
//! The runner owns a single [`EventDispatcher`]; observers register once and
//! receive every event synchronously, in registration order. Observers must
//! not mutate events and must return quickly; slow consumers queue
//! internally.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use conductor_types::{AgentTurn, OutcomeStatus};

use crate::backend::NodeTurnCallback;

/// Events emitted during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    PipelineStarted {
        pipeline_name: String,
        node_count: usize,
    },
    PipelineCompleted {
        pipeline_name: String,
        completed_nodes: Vec<String>,
        status: String,
    },
    NodeEntered {
        node_id: String,
        handler_type: String,
    },
    NodeCompleted {
        node_id: String,
        status: OutcomeStatus,
    },
    EdgeTraversed {
        from_node: String,
        to_node: String,
        label: Option<String>,
    },
    AgentTurnCompleted {
        node_id: String,
        turn: AgentTurn,
    },
    ValidationFailed {
        pipeline_name: String,
        messages: Vec<String>,
    },
}

/// Receives pipeline events. Implementations must be fast and must not
/// mutate the event; the dispatcher does not clone per observer.
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Synchronous fan-out to registered observers.
#[derive(Default)]
pub struct EventDispatcher {
    observers: Mutex<Vec<Arc<dyn EventObserver>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Registration order is delivery order.
    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Deliver `event` to every observer, in registration order.
    pub fn emit(&self, event: PipelineEvent) {
        let observers = self.observers.lock().unwrap();
        for observer in observers.iter() {
            observer.on_event(&event);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }
}

/// Observer that stores every event it sees; useful for tests and for the
/// CLI's verbose run summary.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Build the per-turn callback that streams [`AgentTurn`] records into a
/// dispatcher as `AgentTurnCompleted` events.
pub fn turn_event_callback(dispatcher: Arc<EventDispatcher>) -> NodeTurnCallback {
    Arc::new(move |node_id: &str, turn: &AgentTurn| {
        dispatcher.emit(PipelineEvent::AgentTurnCompleted {
            node_id: node_id.to_string(),
            turn: turn.clone(),
        });
    })
}

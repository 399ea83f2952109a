//! Per-turn recording of file paths written by tools.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::tool::Tool;

/// Ordered, deduplicated set of file paths written during one agent turn.
///
/// `flush` drains the tracker; the returned list populates
/// `AgentTurn::files_written`.
#[derive(Debug, Default)]
pub struct WriteTracker {
    paths: Mutex<Vec<String>>,
}

impl WriteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path. Repeat records of the same path keep the original
    /// insertion position.
    pub fn record(&self, path: impl Into<String>) {
        let path = path.into();
        let mut paths = self.paths.lock().unwrap();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    /// Read out all recorded paths, clearing the tracker.
    pub fn flush(&self) -> Vec<String> {
        std::mem::take(&mut *self.paths.lock().unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().unwrap().is_empty()
    }
}

/// Wraps a file-modifying tool so path-shaped results are recorded.
///
/// If the inner tool returns a string, the string is recorded as a path; if
/// it returns an array, every string element is recorded. Any other shape
/// passes through untouched.
pub struct TrackedTool<T> {
    inner: T,
    tracker: Arc<WriteTracker>,
}

impl<T: Tool> TrackedTool<T> {
    pub fn new(inner: T, tracker: Arc<WriteTracker>) -> Self {
        Self { inner, tracker }
    }
}

#[async_trait]
impl<T: Tool> Tool for TrackedTool<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    async fn invoke(
        &self,
        args: &HashMap<String, String>,
    ) -> conductor_types::Result<serde_json::Value> {
        let result = self.inner.invoke(args).await?;
        record_path_results(&result, &self.tracker);
        Ok(result)
    }
}

fn record_path_results(value: &serde_json::Value, tracker: &WriteTracker) {
    match value {
        serde_json::Value::String(path) => tracker.record(path.clone()),
        serde_json::Value::Array(items) => {
            for item in items {
                if let serde_json::Value::String(path) = item {
                    tracker.record(path.clone());
                }
            }
        }
        _ => {}
    }
}

//! Tool support for Conductor agent backends.
//!
//! Provides the `Tool` trait and registry, shell tools defined by
//! configuration tuples, and the `WriteTracker` that records file paths
//! written during an agent turn.

pub mod shell;
pub mod tool;
pub mod write_tracker;

pub use shell::{load_shell_tools, ShellTool, ToolConfig, DEFAULT_SHELL_TIMEOUT};
pub use tool::{Tool, ToolRegistry};
pub use write_tracker::{TrackedTool, WriteTracker};

//! Handlers for action-shaped nodes: the codergen dispatcher and its
//! standard and interactive variants.

pub mod codergen;
pub mod interactive;

pub use codergen::{CodergenDispatcher, CodergenHandler};
pub use interactive::InteractiveHandler;

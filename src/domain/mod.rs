//! Tool-serving domain logic
//!
//! The capability registry, argument validation, progress reporting, dispatch, and the
//! `ask_human` tool itself. Nothing here knows about JSON-RPC framing.

pub mod dispatcher;
pub mod human;
pub mod progress;
pub mod registry;
pub mod schema;

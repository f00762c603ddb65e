//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Local command execution with error handling
//! - `shell` - Shell and sed escaping and quoting

pub mod command;
pub mod shell;

//! Async terminal I/O core, §4.7-§4.8: reader and writer state machines that
//! each multiplex one non-blocking handle among concurrent callers.
//!
//! The two directions are independent state machines over independent
//! queues; a caller that owns both a [`input::TerminalInput`] and an
//! [`output::TerminalOutput`] over the same underlying fd gets a full duplex
//! terminal, but nothing here requires pairing them.
pub mod input;
pub mod output;

pub use input::{ReadOutcome, TerminalInput};
pub use output::TerminalOutput;

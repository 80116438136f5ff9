//! rai-tools - tool execution for rai sessions
//!
//! Provides the built-in `terminal` tool (timeout-bounded shell
//! execution) and the dispatch of skill invocations requested by the
//! model.

pub mod error;
pub mod executor;
pub mod terminal;

pub use error::ToolError;
pub use executor::{TERMINAL_TOOL_NAME, ToolExecutor};
pub use terminal::{DEFAULT_TIMEOUT, TerminalArgs, parse_terminal_args};

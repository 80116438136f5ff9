//! rai-session - session execution for rai
//!
//! The output sink fans event records to the console (filtered by
//! verbosity) and a per-session log file; the runner drives the
//! prompt → stream → tool-call → feed-back loop against a resolved
//! provider.

pub mod output;
pub mod runner;

pub use output::{EventKind, Sink, SinkError, SinkOptions};
pub use runner::{MAX_TOOL_ITERATIONS, SessionConfig, SessionError, run};

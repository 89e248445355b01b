//! Logkit - command and script execution core for an interactive log
//! analysis tool.
//!
//! Logkit interprets a small command language: builtin commands, query
//! statements routed to an embedded structured-query engine, recursive
//! script inclusion, and asynchronous piping through external processes.
//! All execution state (variable scopes, diagnostic source locations,
//! output redirection) lives in an [`ExecContext`] and is kept balanced by
//! scoped guards, even across early error returns.
//!
//! # Example
//!
//! ```rust
//! use logkit::{CommandRegistry, ExecContext, execute_any};
//!
//! #[tokio::main]
//! async fn main() -> logkit::Result<()> {
//!     let registry = CommandRegistry::with_defaults();
//!     let mut ec = ExecContext::new();
//!     let out = execute_any(&registry, &mut ec, "echo hello").await?;
//!     assert_eq!(out, "hello");
//!     Ok(())
//! }
//! ```

mod context;
mod error;
mod exec;
mod pipes;
mod query;

pub mod commands;

pub use commands::{Command, CommandRegistry};
pub use context::{
    ExecContext, ExecContextBuilder, OutputSink, SourceFrame, SourceGuard, PIPE_OUTPUT_VAR,
    PIPE_STATUS_VAR,
};
pub use error::{Error, Result};
pub use exec::{
    execute_any, execute_command, execute_file, execute_init_commands, execute_pipe,
};
pub use pipes::{PipeCapture, PipeHandle, PipeInput, PipeRunner, PipeTable, ShellRunner};
pub use query::{
    execute_sql, AccumulatorSink, EngineError, NullEngine, PreparedStatement, Progress,
    QueryEngine, RowControl, RowSink,
};

// Re-exported for implementing the `Command` trait.
pub use async_trait::async_trait;

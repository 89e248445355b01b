//! Query execution against the embedded structured-query engine.
//!
//! The engine itself is an external collaborator: this module owns only the
//! prepare/step seam ([`QueryEngine`] / [`PreparedStatement`]), the per-row
//! delivery contract ([`RowSink`]), and the session-wide progress state used
//! for interactive cancellation.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::context::ExecContext;
use crate::error::{Error, Result};

/// Error text reported by the query engine. Surfaced to the user verbatim
/// behind the current source prefix.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A prepared statement being stepped row by row.
pub trait PreparedStatement: Send {
    /// Advance to the next result row. `Ok(true)` means a row is available
    /// for column access; `Ok(false)` means the statement is done.
    fn step(&mut self) -> std::result::Result<bool, EngineError>;

    /// Number of columns in the current row.
    fn column_count(&self) -> usize;

    /// Name of the given column.
    fn column_name(&self, idx: usize) -> String;

    /// Text rendering of the given column in the current row.
    fn column_text(&self, idx: usize) -> String;
}

/// The embedded structured-query engine, injected at context construction.
pub trait QueryEngine: Send + Sync {
    /// Prepare a statement for stepping.
    fn prepare(&self, sql: &str) -> std::result::Result<Box<dyn PreparedStatement>, EngineError>;

    /// Notice reported when a statement succeeds but produces no rows.
    fn no_rows_notice(&self, _sql: &str) -> String {
        "statement executed, no rows returned".to_string()
    }
}

/// Default engine when none is attached: every statement fails to prepare.
pub struct NullEngine;

impl QueryEngine for NullEngine {
    fn prepare(&self, _sql: &str) -> std::result::Result<Box<dyn PreparedStatement>, EngineError> {
        Err(EngineError::new("no query engine attached"))
    }
}

/// Row delivery verdict: keep iterating or stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowControl {
    /// Deliver the next row.
    Continue,
    /// Terminate row iteration; no further rows are delivered.
    Stop,
}

/// Consumer of query result rows, invoked once per row in engine order.
pub trait RowSink: Send + Sync {
    /// Render or accumulate one row. The statement is positioned on the row.
    fn push_row(&self, ec: &mut ExecContext, stmt: &mut dyn PreparedStatement) -> RowControl;
}

/// Default row sink: tab-separated column text, one line per row, appended
/// to the context accumulator.
pub struct AccumulatorSink;

impl RowSink for AccumulatorSink {
    fn push_row(&self, ec: &mut ExecContext, stmt: &mut dyn PreparedStatement) -> RowControl {
        let mut line = String::new();
        for idx in 0..stmt.column_count() {
            if idx > 0 {
                line.push('\t');
            }
            line.push_str(&stmt.column_text(idx));
        }
        ec.accumulator.push_str(&line);
        ec.accumulator.push('\n');
        RowControl::Continue
    }
}

/// Session-owned progress state: one "currently executing query" slot plus
/// the cancel flag.
///
/// Shared with interactive callers (e.g. the UI thread handling an
/// interrupt) through `Arc`; reset after each statement completes or fails
/// so the next statement starts uninfluenced.
pub struct Progress {
    active: Mutex<Option<String>>,
    cancel: AtomicBool,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
            cancel: AtomicBool::new(false),
        }
    }

    /// Mark a statement as the one currently executing.
    pub fn begin(&self, statement: &str) {
        let mut slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(statement.to_string());
    }

    /// The statement currently executing, if any.
    pub fn active_statement(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Request cancellation of the in-flight statement. Does not cancel
    /// already-spawned pipe processes.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Progress check invoked between steps; true means cancel.
    pub fn poll(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Clear the active slot and the cancel flag.
    pub fn finish(&self) {
        let mut slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
        self.cancel.store(false, Ordering::SeqCst);
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears progress state on every exit path from `execute_sql`.
struct ProgressGuard(Arc<Progress>);

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Execute one query statement against the attached engine.
///
/// Rows are streamed through the context's row sink in engine order until
/// the statement is done or the sink requests early termination. A statement
/// that succeeds with zero rows populates `alt_msg` with the engine's
/// no-rows notice instead of failing. Engine errors surface verbatim behind
/// the current source prefix; a signalled cancellation aborts with
/// [`Error::Cancelled`]. In dry-run mode the statement is prepared but not
/// stepped.
pub async fn execute_sql(ec: &mut ExecContext, sql: &str, alt_msg: &mut String) -> Result<String> {
    alt_msg.clear();
    let sql = ec.substitute(sql)?;
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(ec.make_error("empty query statement"));
    }

    tracing::debug!(statement = sql, "preparing query");
    let engine = Arc::clone(&ec.engine);
    ec.progress.begin(sql);
    let _progress = ProgressGuard(Arc::clone(&ec.progress));

    let mut stmt = engine.prepare(sql).map_err(|e| ec.make_error(e))?;

    if ec.dry_run {
        return Ok(String::new());
    }

    let sink = Arc::clone(&ec.row_sink);
    let mut rows = 0usize;
    loop {
        if ec.progress.poll() {
            return Err(Error::Cancelled(format!(
                "{}query cancelled",
                ec.get_error_prefix()
            )));
        }
        match stmt.step() {
            Ok(true) => {
                rows += 1;
                if sink.push_row(ec, stmt.as_mut()) == RowControl::Stop {
                    break;
                }
            }
            Ok(false) => break,
            Err(e) => return Err(ec.make_error(e)),
        }
    }

    tracing::trace!(rows, "query finished");
    if rows == 0 {
        *alt_msg = engine.no_rows_notice(sql);
    }
    Ok(String::new())
}

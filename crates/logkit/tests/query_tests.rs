//! Tests for query execution through the engine seam.
//!
//! Uses a scripted in-memory engine: canned rows, injectable prepare/step
//! failures, and a step hook for triggering cancellation mid-statement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use logkit::{
    execute_sql, EngineError, ExecContext, PreparedStatement, QueryEngine, RowControl, RowSink,
};
use pretty_assertions::assert_eq;

#[derive(Default)]
struct TestEngine {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    prepare_error: Option<String>,
    step_error_at: Option<usize>,
    step_hook: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

impl TestEngine {
    fn with_rows(columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|v| v.to_string()).collect())
                .collect(),
            ..Self::default()
        }
    }
}

impl QueryEngine for TestEngine {
    fn prepare(&self, _sql: &str) -> Result<Box<dyn PreparedStatement>, EngineError> {
        if let Some(msg) = &self.prepare_error {
            return Err(EngineError::new(msg.clone()));
        }
        Ok(Box::new(TestStatement {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            pos: 0,
            step_error_at: self.step_error_at,
            step_hook: self.step_hook.clone(),
        }))
    }
}

struct TestStatement {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    pos: usize,
    step_error_at: Option<usize>,
    step_hook: Option<Arc<dyn Fn(usize) + Send + Sync>>,
}

impl PreparedStatement for TestStatement {
    fn step(&mut self) -> Result<bool, EngineError> {
        if let Some(hook) = &self.step_hook {
            hook(self.pos);
        }
        if self.step_error_at == Some(self.pos) {
            return Err(EngineError::new("disk I/O error"));
        }
        if self.pos < self.rows.len() {
            self.pos += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, idx: usize) -> String {
        self.columns[idx].clone()
    }

    fn column_text(&self, idx: usize) -> String {
        self.rows[self.pos - 1][idx].clone()
    }
}

/// Row sink counting invocations, optionally stopping early.
struct CountingSink {
    count: AtomicUsize,
    stop_after: Option<usize>,
}

impl CountingSink {
    fn new(stop_after: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            count: AtomicUsize::new(0),
            stop_after,
        })
    }
}

impl RowSink for CountingSink {
    fn push_row(&self, _ec: &mut ExecContext, _stmt: &mut dyn PreparedStatement) -> RowControl {
        let seen = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        match self.stop_after {
            Some(limit) if seen >= limit => RowControl::Stop,
            _ => RowControl::Continue,
        }
    }
}

/// N rows invoke the sink exactly N times, in engine order
#[tokio::test]
async fn every_row_reaches_the_sink() {
    let engine = TestEngine::with_rows(&["n"], &[&["1"], &["2"], &["3"]]);
    let sink = CountingSink::new(None);
    let mut ec = ExecContext::builder()
        .engine(Arc::new(engine))
        .row_sink(sink.clone())
        .build();

    let mut alt_msg = String::new();
    let result = execute_sql(&mut ec, "SELECT n FROM t", &mut alt_msg)
        .await
        .unwrap();

    assert_eq!(sink.count.load(Ordering::SeqCst), 3);
    assert_eq!(result, "");
    assert_eq!(alt_msg, "");
}

/// A sink requesting early termination receives no further rows
#[tokio::test]
async fn early_termination_stops_delivery() {
    let engine = TestEngine::with_rows(&["n"], &[&["1"], &["2"], &["3"]]);
    let sink = CountingSink::new(Some(1));
    let mut ec = ExecContext::builder()
        .engine(Arc::new(engine))
        .row_sink(sink.clone())
        .build();

    let mut alt_msg = String::new();
    execute_sql(&mut ec, "SELECT n FROM t", &mut alt_msg)
        .await
        .unwrap();

    assert_eq!(sink.count.load(Ordering::SeqCst), 1);
}

/// Zero rows is success with the alternate-message slot populated
#[tokio::test]
async fn zero_rows_populates_alternate_message() {
    let engine = TestEngine::with_rows(&["n"], &[]);
    let mut ec = ExecContext::builder().engine(Arc::new(engine)).build();

    let mut alt_msg = String::new();
    let result = execute_sql(&mut ec, "SELECT n FROM t WHERE 0", &mut alt_msg)
        .await
        .unwrap();

    assert_eq!(result, "");
    assert_eq!(alt_msg, "statement executed, no rows returned");
}

/// The default sink renders rows tab-separated into the accumulator
#[tokio::test]
async fn default_sink_accumulates_rows() {
    let engine = TestEngine::with_rows(&["level", "count"], &[&["error", "7"], &["warn", "12"]]);
    let mut ec = ExecContext::builder().engine(Arc::new(engine)).build();

    let mut alt_msg = String::new();
    execute_sql(&mut ec, "SELECT level, count FROM s", &mut alt_msg)
        .await
        .unwrap();

    assert_eq!(ec.accumulator, "error\t7\nwarn\t12\n");
}

/// Prepare failures surface the engine text verbatim behind the prefix
#[tokio::test]
async fn prepare_error_carries_source_prefix() {
    let engine = TestEngine {
        prepare_error: Some("near \"SELEKT\": syntax error".to_string()),
        ..TestEngine::default()
    };
    let mut ec = ExecContext::builder().engine(Arc::new(engine)).build();

    let mut guard = ec.enter_source("report.lks", 4);
    let mut alt_msg = String::new();
    let err = execute_sql(&mut guard, "SELEKT 1", &mut alt_msg)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "report.lks:4: error: near \"SELEKT\": syntax error"
    );
}

/// Step failures mid-iteration are engine errors too
#[tokio::test]
async fn step_error_carries_source_prefix() {
    let engine = TestEngine {
        step_error_at: Some(1),
        ..TestEngine::with_rows(&["n"], &[&["1"], &["2"]])
    };
    let mut ec = ExecContext::builder().engine(Arc::new(engine)).build();

    let mut alt_msg = String::new();
    let err = execute_sql(&mut ec, "SELECT n FROM t", &mut alt_msg)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "error: disk I/O error");
}

/// Cancellation mid-statement aborts with a cancellation failure and leaves
/// progress state clean for the next statement
#[tokio::test]
async fn cancellation_clears_progress_state() {
    let sink = CountingSink::new(None);
    let mut ec = ExecContext::builder().row_sink(sink.clone()).build();

    // The engine requests cancellation while delivering the second row.
    let progress = Arc::clone(&ec.progress);
    let engine = TestEngine {
        step_hook: Some(Arc::new(move |pos| {
            if pos == 1 {
                progress.request_cancel();
            }
        })),
        ..TestEngine::with_rows(&["n"], &[&["1"], &["2"], &["3"]])
    };
    ec.engine = Arc::new(engine);

    let mut alt_msg = String::new();
    let err = execute_sql(&mut ec, "SELECT n FROM t", &mut alt_msg)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "error: query cancelled");
    // Not all rows were delivered.
    assert!(sink.count.load(Ordering::SeqCst) < 3);

    // Progress state was cleared on the way out.
    assert!(!ec.progress.poll());
    assert_eq!(ec.progress.active_statement(), None);

    // A subsequent statement starts uninfluenced.
    let engine = TestEngine::with_rows(&["n"], &[&["9"]]);
    ec.engine = Arc::new(engine);
    let mut alt_msg = String::new();
    execute_sql(&mut ec, "SELECT n FROM t2", &mut alt_msg)
        .await
        .unwrap();
}

/// Dry run prepares (validates) the statement but never steps it
#[tokio::test]
async fn dry_run_does_not_step() {
    let engine = TestEngine::with_rows(&["n"], &[&["1"], &["2"]]);
    let sink = CountingSink::new(None);
    let mut ec = ExecContext::builder()
        .engine(Arc::new(engine))
        .row_sink(sink.clone())
        .dry_run(true)
        .build();

    let mut alt_msg = String::new();
    execute_sql(&mut ec, "SELECT n FROM t", &mut alt_msg)
        .await
        .unwrap();

    assert_eq!(sink.count.load(Ordering::SeqCst), 0);
    assert_eq!(alt_msg, "");

    // A prepare failure still surfaces in dry-run mode.
    let engine = TestEngine {
        prepare_error: Some("syntax error".to_string()),
        ..TestEngine::default()
    };
    ec.engine = Arc::new(engine);
    let err = execute_sql(&mut ec, "SELEKT", &mut alt_msg)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "error: syntax error");
}

/// Variables are substituted into the statement before it reaches the engine
#[tokio::test]
async fn statement_text_is_substituted() {
    let mut ec = ExecContext::builder()
        .override_var("min_level", "error")
        .build();

    let mut alt_msg = String::new();
    let err = execute_sql(&mut ec, "SELECT * WHERE level = '$missing'", &mut alt_msg)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "error: unknown variable: missing");
}

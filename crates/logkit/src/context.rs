//! Execution context threaded through every command, query, and script.
//!
//! [`ExecContext`] aggregates the nested execution state: variable scopes,
//! source locations for diagnostics, output redirection frames, the output
//! accumulator, and the injected capabilities (query engine, row sink, pipe
//! runner). Nested executions push frames via [`ExecContext::enter_source`] /
//! [`ExecContext::enter_script`]; the returned [`SourceGuard`] pops exactly
//! what was pushed on every exit path, including early `?` returns.

use std::collections::HashMap;
use std::fmt::Display;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pipes::{PipeCapture, PipeRunner, PipeTable, ShellRunner};
use crate::query::{AccumulatorSink, NullEngine, Progress, QueryEngine, RowSink};

/// Variable name resolved pipe output is published under.
pub const PIPE_OUTPUT_VAR: &str = "pipe_output";

/// Variable name the last resolved pipe's exit status is published under.
pub const PIPE_STATUS_VAR: &str = "pipe_exit_status";

/// An output sink installed by redirection; writes go to it instead of the
/// default display surface.
pub type OutputSink = Box<dyn Write + Send>;

/// One entry on the source stack: where the interpreter currently is, for
/// diagnostics. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFrame {
    /// Script path, or the literal `"command"` for direct invocations.
    pub origin: String,
    /// 1-based line number within the origin.
    pub line: usize,
}

/// Execution context for one interactive session or one top-level invocation.
///
/// The context is exclusively owned and mutated by the interpreter; pipe
/// workers only ever write into their own completion values.
pub struct ExecContext {
    /// Cursor position in the viewed content. Opaque to this core.
    pub top_line: usize,
    /// When set, side-effecting operations are skipped and only described.
    pub dry_run: bool,

    /// Highest-priority variables, seeded externally (e.g. from argv).
    pub overrides: HashMap<String, String>,
    /// Scope stack; only the top frame is consulted as "local".
    pub local_vars: Vec<HashMap<String, String>>,
    /// Variables that persist for the whole context lifetime.
    pub global_vars: HashMap<String, String>,

    /// Directories for resolving relative script paths; top is current.
    pub path_stack: Vec<PathBuf>,
    /// Never empty; the base `("command", 1)` frame is never popped.
    pub source_stack: Vec<SourceFrame>,
    /// Redirection frames; starts with one inactive frame.
    pub output_stack: Vec<Option<OutputSink>>,

    /// Append-only formatted output for the current top-level invocation.
    pub accumulator: String,

    /// Pending pipe captures spawned by this invocation.
    pub pipes: PipeTable,

    /// Embedded structured-query engine.
    pub engine: Arc<dyn QueryEngine>,
    /// Consumer of query result rows.
    pub row_sink: Arc<dyn RowSink>,
    /// External process spawner for piped execution.
    pub pipe_runner: Arc<dyn PipeRunner>,
    /// Session-wide progress/cancellation state for in-flight queries.
    pub progress: Arc<Progress>,
}

impl ExecContext {
    /// Create a context with default capabilities (no query engine attached,
    /// accumulator row sink, `sh -c` pipe runner).
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for customized construction.
    pub fn builder() -> ExecContextBuilder {
        ExecContextBuilder::default()
    }

    /// The diagnostic prefix for the current source location.
    ///
    /// `"<origin>:<line>: error: "` when inside a nested source, otherwise
    /// the generic `"error: "`. Pure, no side effects.
    pub fn get_error_prefix(&self) -> String {
        if self.source_stack.len() <= 1 {
            return "error: ".to_string();
        }

        // Stack is never empty, checked above.
        let frame = &self.source_stack[self.source_stack.len() - 1];
        format!("{}:{}: error: ", frame.origin, frame.line)
    }

    /// Build a source-located failure. Every fallible operation in this core
    /// routes its diagnostics through here.
    pub fn make_error(&self, msg: impl Display) -> Error {
        Error::Command(format!("{}{}", self.get_error_prefix(), msg))
    }

    /// The nearest active output sink, searched from the top of the
    /// redirection stack downward. `None` means the caller falls back to the
    /// default display surface.
    pub fn get_output(&mut self) -> Option<&mut OutputSink> {
        self.output_stack.iter_mut().rev().find_map(|f| f.as_mut())
    }

    /// Push a source frame and return a guard that pops it on drop.
    ///
    /// Safe to nest arbitrarily (script including script including script);
    /// the guard borrows the context mutably so it cannot outlive it.
    pub fn enter_source(&mut self, origin: impl Into<String>, line: usize) -> SourceGuard<'_> {
        self.source_stack.push(SourceFrame {
            origin: origin.into(),
            line,
        });
        SourceGuard {
            ec: self,
            script_scope: false,
        }
    }

    /// Enter a script scope: a source frame at line 1, the script directory
    /// on the path stack, a fresh local frame (positional variables), and an
    /// inactive output frame. The guard pops all four on drop.
    pub fn enter_script(
        &mut self,
        origin: impl Into<String>,
        dir: PathBuf,
        locals: HashMap<String, String>,
    ) -> SourceGuard<'_> {
        self.source_stack.push(SourceFrame {
            origin: origin.into(),
            line: 1,
        });
        self.path_stack.push(dir);
        self.local_vars.push(locals);
        self.output_stack.push(None);
        SourceGuard {
            ec: self,
            script_scope: true,
        }
    }

    /// Advance the top source frame's line number.
    pub fn set_source_line(&mut self, line: usize) {
        if let Some(frame) = self.source_stack.last_mut() {
            frame.line = line;
        }
    }

    /// Resolve a variable: overrides first, then the top local frame, then
    /// globals. Lower local frames are not searched.
    pub fn resolve_var(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.overrides.get(name) {
            return Some(v);
        }
        if let Some(v) = self.local_vars.last().and_then(|frame| frame.get(name)) {
            return Some(v);
        }
        self.global_vars.get(name).map(String::as_str)
    }

    /// Expand `$name`, `${name}`, and `$$` (a literal dollar) in `input`.
    ///
    /// Unresolved names are substitution errors, source-prefixed and naming
    /// the identifier. A `$` not followed by a name passes through.
    pub fn substitute(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();

        while let Some(ch) = chars.next() {
            if ch != '$' {
                out.push(ch);
                continue;
            }

            let name = match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                    continue;
                }
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(self
                                    .make_error("unterminated variable reference"));
                            }
                        }
                    }
                    if name.is_empty() {
                        return Err(self.make_error("empty variable reference"));
                    }
                    name
                }
                Some(&c) if c.is_ascii_alphanumeric() || c == '_' || c == '#' => {
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' || c == '#' {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    name
                }
                _ => {
                    out.push('$');
                    continue;
                }
            };

            match self.resolve_var(&name) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(self.make_error(format!("unknown variable: {name}")));
                }
            }
        }

        Ok(out)
    }

    /// Resolve every pending pipe capture, publishing the last one under the
    /// `pipe_output` / `pipe_exit_status` globals for later substitution.
    ///
    /// Blocks until each spawned process has exited and its output stream is
    /// fully drained. Resolving when nothing is pending is a no-op.
    pub async fn resolve_pipes(&mut self) -> Vec<PipeCapture> {
        let captures = self.pipes.resolve_all().await;
        if let Some(last) = captures.last() {
            self.global_vars
                .insert(PIPE_OUTPUT_VAR.to_string(), last.text.clone());
            match last.status {
                Some(status) => {
                    self.global_vars
                        .insert(PIPE_STATUS_VAR.to_string(), status.to_string());
                }
                // Killed by a signal: an earlier pipe's status must not
                // linger next to the fresh output.
                None => {
                    self.global_vars.remove(PIPE_STATUS_VAR);
                }
            }
        }
        captures
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped pop for frames pushed by [`ExecContext::enter_source`] /
/// [`ExecContext::enter_script`].
///
/// Dereferences to the context so nested execution runs against the guard
/// directly. The pop happens on drop regardless of how control leaves the
/// scope; pushes and pops therefore always balance.
pub struct SourceGuard<'a> {
    ec: &'a mut ExecContext,
    script_scope: bool,
}

impl Deref for SourceGuard<'_> {
    type Target = ExecContext;

    fn deref(&self) -> &ExecContext {
        self.ec
    }
}

impl DerefMut for SourceGuard<'_> {
    fn deref_mut(&mut self) -> &mut ExecContext {
        self.ec
    }
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        self.ec.source_stack.pop();
        if self.script_scope {
            self.ec.path_stack.pop();
            self.ec.local_vars.pop();
            self.ec.output_stack.pop();
        }
    }
}

/// Builder for customized [`ExecContext`] construction.
#[derive(Default)]
pub struct ExecContextBuilder {
    overrides: HashMap<String, String>,
    globals: HashMap<String, String>,
    cwd: Option<PathBuf>,
    dry_run: bool,
    engine: Option<Arc<dyn QueryEngine>>,
    row_sink: Option<Arc<dyn RowSink>>,
    pipe_runner: Option<Arc<dyn PipeRunner>>,
}

impl ExecContextBuilder {
    /// Seed an override variable (takes precedence over local and global).
    pub fn override_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    /// Seed a global variable.
    pub fn global_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    /// Set the base directory for resolving relative script paths.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Enable dry-run mode: validate and describe, skip side effects.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Attach a query engine.
    pub fn engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Attach a row sink consuming query result rows.
    pub fn row_sink(mut self, sink: Arc<dyn RowSink>) -> Self {
        self.row_sink = Some(sink);
        self
    }

    /// Attach a pipe runner spawning external processes.
    pub fn pipe_runner(mut self, runner: Arc<dyn PipeRunner>) -> Self {
        self.pipe_runner = Some(runner);
        self
    }

    /// Build the context. The base frames of each stack are installed here
    /// and never removed during normal operation.
    pub fn build(self) -> ExecContext {
        let cwd = self
            .cwd
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        ExecContext {
            top_line: 0,
            dry_run: self.dry_run,
            overrides: self.overrides,
            local_vars: vec![HashMap::new()],
            global_vars: self.globals,
            path_stack: vec![cwd],
            source_stack: vec![SourceFrame {
                origin: "command".to_string(),
                line: 1,
            }],
            output_stack: vec![None],
            accumulator: String::new(),
            pipes: PipeTable::new(),
            engine: self.engine.unwrap_or_else(|| Arc::new(NullEngine)),
            row_sink: self.row_sink.unwrap_or_else(|| Arc::new(AccumulatorSink)),
            pipe_runner: self.pipe_runner.unwrap_or_else(|| Arc::new(ShellRunner)),
            progress: Arc::new(Progress::new()),
        }
    }
}

//! Command dispatch and script execution.
//!
//! A statement is classified by its leading marker: `;` routes to the query
//! executor, `|` to the pipe executor, `@` (in [`execute_any`]) to recursive
//! script inclusion, and anything else (with an optional `:` prefix) to the
//! builtin command registry.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::commands::CommandRegistry;
use crate::context::{ExecContext, PIPE_OUTPUT_VAR, PIPE_STATUS_VAR};
use crate::error::Result;
use crate::pipes::PipeInput;
use crate::query::execute_sql;

/// Execute a single non-multiline statement.
///
/// Classification in order: leading `;` → query, leading `|` → pipe,
/// otherwise builtin lookup on the first whitespace-delimited token.
/// Returns the handler's result string, or a source-prefixed failure.
pub async fn execute_command(
    registry: &CommandRegistry,
    ec: &mut ExecContext,
    cmdline: &str,
) -> Result<String> {
    let line = cmdline.trim_start();

    if let Some(sql) = line.strip_prefix(';') {
        let mut alt_msg = String::new();
        let result = execute_sql(ec, sql, &mut alt_msg).await?;
        // A zero-row statement reports through the alternate message.
        return Ok(if result.is_empty() { alt_msg } else { result });
    }

    if let Some(pipe_cmd) = line.strip_prefix('|') {
        return execute_pipe(ec, pipe_cmd).await;
    }

    let line = line.strip_prefix(':').unwrap_or(line);
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Err(ec.make_error("expecting a command"));
    };
    let args: Vec<String> = parts
        .map(|arg| ec.substitute(arg))
        .collect::<Result<_>>()?;

    let Some(handler) = registry.get(name) else {
        return Err(ec.make_error(format!("unknown command: {name}")));
    };

    tracing::debug!(command = name, "dispatching builtin");
    handler.execute(ec, &args).await
}

/// Execute any statement: builtin, query, pipe, or `@path` script inclusion.
///
/// A statement that references either published pipe variable (output text
/// or exit status) first resolves every pending pipe capture, so
/// substitution sees completed values.
pub async fn execute_any(
    registry: &CommandRegistry,
    ec: &mut ExecContext,
    cmdline: &str,
) -> Result<String> {
    let line = cmdline.trim();

    if !ec.pipes.is_empty()
        && (line.contains(PIPE_OUTPUT_VAR) || line.contains(PIPE_STATUS_VAR))
    {
        ec.resolve_pipes().await;
    }

    if let Some(path_and_args) = line.strip_prefix('@') {
        return execute_file(registry, ec, path_and_args.trim(), true).await;
    }

    execute_command(registry, ec, line).await
}

/// Spawn an external process with the accumulator as its standard input.
///
/// Does not block: the returned pending capture is registered in the
/// context's pipe table and completes once the process exits and its output
/// is drained. Spawn failure is an immediate source-prefixed error.
pub async fn execute_pipe(ec: &mut ExecContext, cmdline: &str) -> Result<String> {
    let cmdline = ec.substitute(cmdline)?;
    let cmdline = cmdline.trim();
    if cmdline.is_empty() {
        return Err(ec.make_error("expecting a command to pipe through"));
    }

    if ec.dry_run {
        return Ok(format!("would pipe through '{cmdline}'"));
    }

    let runner = Arc::clone(&ec.pipe_runner);
    let input = PipeInput::Bytes(ec.accumulator.clone().into_bytes());
    let handle = runner
        .spawn(cmdline, input)
        .map_err(|e| ec.make_error(format!("unable to run '{cmdline}': {e}")))?;
    ec.pipes.push(handle);
    Ok(String::new())
}

/// Execute a script file, fail-fast, with guaranteed frame unwind.
///
/// `path_and_args` is the script path followed by optional arguments; the
/// path is resolved against the top of the path stack. The script runs in
/// its own scope (source frame, script directory, positional locals `0..N`
/// and `#`, inactive output frame), all restored on every exit path.
/// Returns the last statement's result; the first failure aborts the rest
/// of the file.
pub async fn execute_file(
    registry: &CommandRegistry,
    ec: &mut ExecContext,
    path_and_args: &str,
    multiline: bool,
) -> Result<String> {
    let mut parts = path_and_args.split_whitespace();
    let Some(path) = parts.next() else {
        return Err(ec.make_error("expecting a script path"));
    };
    let args: Vec<String> = parts.map(str::to_string).collect();

    let base = ec
        .path_stack
        .last()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let script_path = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        base.join(path)
    };

    let content = tokio::fs::read_to_string(&script_path).await.map_err(|e| {
        ec.make_error(format!(
            "unable to open script '{}': {}",
            script_path.display(),
            e
        ))
    })?;

    let dir = script_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(base);
    let origin = script_path.to_string_lossy().into_owned();

    let mut locals = HashMap::new();
    locals.insert("0".to_string(), origin.clone());
    for (idx, arg) in args.iter().enumerate() {
        locals.insert((idx + 1).to_string(), arg.clone());
    }
    locals.insert("#".to_string(), args.len().to_string());

    tracing::debug!(script = %origin, multiline, "executing script");
    let mut ec = ec.enter_script(origin, dir, locals);

    let mut last = String::new();
    for stmt in split_statements(&content, multiline) {
        ec.set_source_line(stmt.line);
        // Included scripts accumulate their own statements.
        let is_include = stmt.text.starts_with('@');
        let result = Box::pin(execute_any(registry, &mut ec, &stmt.text)).await?;
        if !result.is_empty() && !is_include {
            if !ec.accumulator.is_empty() {
                ec.accumulator.push('\n');
            }
            ec.accumulator.push_str(&result);
            if let Some(sink) = ec.get_output() {
                if let Err(e) = writeln!(sink, "{result}") {
                    return Err(ec.make_error(format!("unable to write output: {e}")));
                }
            }
        }
        last = result;
    }

    Ok(last)
}

/// Run startup statements, collecting each result with its alternate
/// message. A failing statement does not stop the remaining ones.
///
/// Each statement runs against a `("command", n)` source frame so its
/// diagnostics identify the 1-based position in the startup list.
pub async fn execute_init_commands(
    registry: &CommandRegistry,
    ec: &mut ExecContext,
    commands: &[String],
) -> Vec<(Result<String>, String)> {
    let mut msgs = Vec::with_capacity(commands.len());

    for (idx, cmdline) in commands.iter().enumerate() {
        let mut guard = ec.enter_source("command", idx + 1);
        let mut alt_msg = String::new();
        let line = cmdline.trim();
        let result = if let Some(sql) = line.strip_prefix(';') {
            execute_sql(&mut guard, sql, &mut alt_msg).await
        } else {
            Box::pin(execute_any(registry, &mut guard, line)).await
        };
        msgs.push((result, alt_msg));
    }

    msgs
}

/// One statement extracted from script content, tagged with the 1-based
/// line number of its first physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement {
    pub(crate) line: usize,
    pub(crate) text: String,
}

/// Split script content into statements.
///
/// Blank lines and `#` comment lines are skipped. In multiline mode a line
/// whose first character is one of `:`/`;`/`|`/`@` starts a new statement
/// and any other line continues the previous one; in single-line mode every
/// line is its own statement.
pub(crate) fn split_statements(content: &str, multiline: bool) -> Vec<Statement> {
    let mut statements: Vec<Statement> = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let starts_statement =
            !multiline || matches!(trimmed.chars().next(), Some(':' | ';' | '|' | '@'));

        match statements.last_mut() {
            Some(last) if !starts_statement => {
                last.text.push('\n');
                last.text.push_str(raw);
            }
            _ => statements.push(Statement {
                line,
                text: trimmed.to_string(),
            }),
        }
    }

    statements
}

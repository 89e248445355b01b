//! Asynchronous capture of external process output.
//!
//! Piped execution never blocks the interpreter: spawning returns a
//! [`PipeHandle`] whose completion value is produced by a worker task that
//! drains the child's stdout and records its exit status. The worker writes
//! only into its own completion value, never into the execution context.

use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

/// Captured output of a completed pipe process.
///
/// A non-zero exit status is not an error by itself; the captured text is
/// returned regardless and the status is exposed for callers that care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeCapture {
    /// Everything the process wrote to stdout.
    pub text: String,
    /// Exit code, or `None` if the process was killed by a signal.
    pub status: Option<i32>,
}

/// A pending pipe capture.
///
/// Resolution blocks until the process has exited and its output stream is
/// fully drained, then caches the capture: repeated resolution returns the
/// identical value.
pub struct PipeHandle {
    task: Option<JoinHandle<PipeCapture>>,
    done: Option<PipeCapture>,
}

impl PipeHandle {
    /// Wrap a worker task producing the capture.
    pub fn from_task(task: JoinHandle<PipeCapture>) -> Self {
        Self {
            task: Some(task),
            done: None,
        }
    }

    /// A handle that is already complete. Useful for pipe runner test
    /// doubles.
    pub fn ready(capture: PipeCapture) -> Self {
        Self {
            task: None,
            done: Some(capture),
        }
    }

    /// True once the capture has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.done.is_some()
    }

    /// Resolve the capture, blocking until the process completes.
    pub async fn resolve(&mut self) -> &PipeCapture {
        if let Some(task) = self.task.take() {
            let capture = match task.await {
                Ok(capture) => capture,
                // Worker panicked; treat as a process that produced nothing.
                Err(_) => PipeCapture {
                    text: String::new(),
                    status: None,
                },
            };
            self.done.get_or_insert(capture);
        }
        self.done.get_or_insert_with(|| PipeCapture {
            text: String::new(),
            status: None,
        })
    }
}

/// Standard input supplied to a spawned pipe process.
pub enum PipeInput {
    /// Feed the given bytes (e.g. the current accumulator contents).
    Bytes(Vec<u8>),
    /// Connect an already-open file.
    File(std::fs::File),
    /// No input.
    Null,
}

/// External process spawner, injected at context construction.
///
/// Spawn failure (shell unavailable, fork failure) must surface as an
/// immediate error; it never yields a pending value that callers might wait
/// on indefinitely.
pub trait PipeRunner: Send + Sync {
    fn spawn(&self, cmdline: &str, input: PipeInput) -> std::io::Result<PipeHandle>;
}

/// Default pipe runner: `sh -c <cmdline>` with stdout captured and stderr
/// discarded.
pub struct ShellRunner;

impl PipeRunner for ShellRunner {
    fn spawn(&self, cmdline: &str, input: PipeInput) -> std::io::Result<PipeHandle> {
        let (stdin, bytes) = match input {
            PipeInput::Bytes(bytes) => (Stdio::piped(), Some(bytes)),
            PipeInput::File(file) => (Stdio::from(file), None),
            PipeInput::Null => (Stdio::null(), None),
        };

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(cmdline)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        tracing::debug!(cmdline, "spawned pipe process");

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();

        let task = tokio::spawn(async move {
            let feed = async {
                if let (Some(mut stdin), Some(bytes)) = (stdin_pipe, bytes) {
                    let _ = stdin.write_all(&bytes).await;
                    // Dropping closes the write end so the child sees EOF.
                }
            };
            let drain = async {
                let mut buf = Vec::new();
                if let Some(mut stdout) = stdout_pipe {
                    let _ = stdout.read_to_end(&mut buf).await;
                }
                buf
            };
            let ((), buf) = tokio::join!(feed, drain);

            let status = child.wait().await.ok().and_then(|s| s.code());
            PipeCapture {
                text: String::from_utf8_lossy(&buf).into_owned(),
                status,
            }
        });

        Ok(PipeHandle::from_task(task))
    }
}

/// Pending pipes spawned during the current invocation.
#[derive(Default)]
pub struct PipeTable {
    pending: Vec<PipeHandle>,
}

impl PipeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly spawned pipe.
    pub fn push(&mut self, handle: PipeHandle) {
        self.pending.push(handle);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Resolve and drain every pending pipe, in spawn order.
    pub async fn resolve_all(&mut self) -> Vec<PipeCapture> {
        let mut captures = Vec::with_capacity(self.pending.len());
        for mut handle in self.pending.drain(..) {
            captures.push(handle.resolve().await.clone());
        }
        captures
    }
}

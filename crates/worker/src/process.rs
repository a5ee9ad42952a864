//! Subprocess plumbing shared by the command-backed collaborators.
//!
//! Collaborators are synchronous and run on the blocking job worker, so each
//! adapter drives its child through [`BlockingRuntime`]: the ambient tokio
//! runtime when called from `spawn_blocking`, or a private current-thread
//! runtime otherwise. Children are spawned with `kill_on_drop(true)`, so a
//! timed-out or abandoned child never outlives its owner.

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::time::error::Elapsed;

/// Maximum stdout or stderr size captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Failure to run a child process to completion.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("failed to wait for process: {0}")]
    Wait(std::io::Error),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("failed to start I/O runtime: {0}")]
    Runtime(std::io::Error),
}

/// Exit status and captured output of a finished child.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

// ---------------------------------------------------------------------------
// BlockingRuntime
// ---------------------------------------------------------------------------

/// Lets synchronous code on a blocking thread drive async process I/O.
///
/// Must not be used from inside an async task.
#[derive(Debug)]
pub enum BlockingRuntime {
    Ambient(Handle),
    Owned(Runtime),
}

impl BlockingRuntime {
    /// Reuse the current tokio runtime, or start a private one.
    pub fn acquire() -> Result<Self, ProcessError> {
        match Handle::try_current() {
            Ok(handle) => Ok(Self::Ambient(handle)),
            Err(_) => Builder::new_current_thread()
                .enable_all()
                .build()
                .map(Self::Owned)
                .map_err(ProcessError::Runtime),
        }
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        match self {
            Self::Ambient(handle) => handle.block_on(fut),
            Self::Owned(runtime) => runtime.block_on(fut),
        }
    }

    /// [`block_on`](Self::block_on) bounded by `limit`.
    ///
    /// The timer is created inside the runtime, so this also works on a
    /// thread that has not entered one.
    pub fn block_on_timeout<F: Future>(
        &self,
        limit: Duration,
        fut: F,
    ) -> Result<F::Output, Elapsed> {
        self.block_on(async move { tokio::time::timeout(limit, fut).await })
    }
}

// ---------------------------------------------------------------------------
// run_piped
// ---------------------------------------------------------------------------

/// Spawn `cmd`, feed it `input` on stdin, and capture stdout and stderr.
///
/// The stdin write, both reads and the wait all share one `timeout`: a
/// child that never reads its input or never exits is killed when the
/// deadline passes.
pub async fn run_piped(
    cmd: &mut Command,
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<CapturedOutput, ProcessError> {
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: cmd.as_std().get_program().to_string_lossy().into_owned(),
        source,
    })?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let exchange = async {
        let write = async {
            if let (Some(mut stdin), Some(input)) = (stdin, input) {
                // The child may exit without reading; its status tells why.
                let _ = stdin.write_all(input).await;
            }
        };
        let ((), stdout, stderr) = tokio::join!(write, read_capped(stdout), read_capped(stderr));
        let status = child.wait().await.map_err(ProcessError::Wait)?;
        Ok(CapturedOutput {
            status,
            stdout,
            stderr,
        })
    };

    // On timeout `child` is dropped with `kill_on_drop(true)`, killing it.
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ProcessError::Timeout(timeout))?
}

/// Read an output stream to the end, capped at [`MAX_OUTPUT_BYTES`].
async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Runs one invocation as a child process under a deadline.
//!
//! Each call spawns exactly one process and keeps nothing afterwards; the
//! wrapped CLI is stateless per invocation. A timeout is a result, not an
//! error: the child's process group is killed and the result is flagged.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use crate::error::OrbError;
use crate::normalize::NormalizedInvocation;
use crate::options::ExecutionControlOptions;

/// How long output pipes may stay open once the child is gone. Anything
/// still holding them after that (a backgrounded helper) is cut off and the
/// output read so far is kept.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// The controlling host.
    Local,
    /// Inside the named VM, via the wrapped CLI's run verb.
    Machine(String),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Local => "local",
            Target::Machine(name) => name,
        }
    }
}

/// Final argv handed to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    /// Host-side working directory; only set for `Target::Local`.
    pub current_dir: Option<String>,
}

impl Invocation {
    /// Build the run-verb argv for `target`.
    ///
    /// The line always reaches the target through a non-interactive
    /// `sh -c`, which never performs history expansion. A login user only
    /// exists inside a machine, so asking for one locally is an error.
    pub fn for_target(
        cli_program: &str,
        target: &Target,
        line: &NormalizedInvocation,
        opts: &ExecutionControlOptions,
    ) -> Result<Self, OrbError> {
        if opts.pty {
            tracing::debug!(machine = target.name(), "pty requested; captured runs never allocate one");
        }

        let mut args = Vec::new();
        let mut current_dir = None;
        let program = match target {
            Target::Local => {
                if let Some(user) = &opts.login_user {
                    return Err(OrbError::Validation {
                        message: format!(
                            "login user '{user}' needs a machine target; use elevation to switch users locally"
                        ),
                    });
                }
                current_dir = opts.working_dir.clone();
                "sh".to_string()
            }
            Target::Machine(name) => {
                args.extend(["run".to_string(), "-m".to_string(), name.clone()]);
                if let Some(user) = &opts.login_user {
                    args.extend(["-u".to_string(), user.clone()]);
                }
                if let Some(dir) = &opts.working_dir {
                    args.extend(["-w".to_string(), dir.clone()]);
                }
                args.push("sh".into());
                cli_program.to_string()
            }
        };
        args.push("-c".into());
        args.push(line.as_str().to_string());

        Ok(Self {
            program,
            args,
            stdin: opts.stdin.clone(),
            current_dir,
        })
    }

    /// Direct argv for host-side CLI calls that bypass any shell.
    pub fn direct<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
            current_dir: None,
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of one attempt. Fresh per attempt, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `None` when the child was killed (timeout) or ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl ExecutionResult {
    pub fn completed(exit_code: Option<i32>, stdout: String, stderr: String, elapsed: Duration) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            elapsed,
            timed_out: false,
        }
    }

    pub fn timed_out(stdout: String, stderr: String, elapsed: Duration) -> Self {
        Self {
            exit_code: None,
            stdout,
            stderr,
            elapsed,
            timed_out: true,
        }
    }

    /// Whether this attempt counts as success under `codes`.
    pub fn succeeded(&self, codes: &[i32]) -> bool {
        !self.timed_out && self.exit_code.is_some_and(|c| codes.contains(&c))
    }
}

#[allow(async_fn_in_trait)] // futures are awaited in place, never spawned
pub trait ProcessExecutor {
    /// Run `invocation` to completion or until `timeout` elapses.
    ///
    /// Returns `Err` only when the process could not be run at all, or
    /// when `cancel` fires (the child is killed first).
    async fn execute(
        &self,
        invocation: &Invocation,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, OrbError>;
}

/// Spawns real child processes via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliExecutor;

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl ProcessExecutor for CliExecutor {
    async fn execute(
        &self,
        invocation: &Invocation,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, OrbError> {
        let start = Instant::now();

        let mut cmd = tokio::process::Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| OrbError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        tracing::debug!(pid = ?child.id(), argv = %invocation.display(), "spawned");

        if let (Some(payload), Some(mut stdin)) = (invocation.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&payload).await {
                    tracing::debug!("stdin write failed: {e}");
                }
                // dropping stdin closes the pipe
            });
        }
        let stdout = Capture::spawn(child.stdout.take());
        let stderr = Capture::spawn(child.stderr.take());

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = tokio::time::sleep(timeout) => Waited::TimedOut,
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        match waited {
            Waited::Exited(status) => {
                let status = status.map_err(|source| OrbError::Io {
                    context: format!("waiting for {}", invocation.program),
                    source,
                })?;
                let (stdout, stderr) = collect(stdout, stderr).await;
                Ok(ExecutionResult::completed(
                    status.code(),
                    stdout,
                    stderr,
                    start.elapsed(),
                ))
            }
            Waited::TimedOut => {
                terminate(&mut child).await;
                let (stdout, stderr) = collect(stdout, stderr).await;
                tracing::debug!(
                    program = %invocation.program,
                    timeout_s = timeout.as_secs_f64(),
                    "child killed after timeout"
                );
                Ok(ExecutionResult::timed_out(stdout, stderr, start.elapsed()))
            }
            Waited::Cancelled => {
                terminate(&mut child).await;
                stdout.abort();
                stderr.abort();
                Err(OrbError::Cancelled {
                    label: invocation.program.clone(),
                })
            }
        }
    }
}

// ── Output capture ───────────────────────────────────────

/// One output pipe, read into a buffer that outlives the reader task.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl Capture {
    fn spawn<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|r| tokio::spawn(read_into(r, Arc::clone(&buf))));
        Self { buf, task }
    }

    /// Wait for EOF until `deadline`, then keep whatever has been read.
    async fn finish(self, deadline: tokio::time::Instant) -> String {
        if let Some(mut task) = self.task {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                tracing::debug!("output pipe still held open after exit; keeping partial output");
                task.abort();
            }
        }
        let bytes = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn abort(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

async fn read_into<R: AsyncRead + Unpin>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..n]),
        }
    }
}

/// Both pipes share one grace deadline.
async fn collect(stdout: Capture, stderr: Capture) -> (String, String) {
    let deadline = tokio::time::Instant::now() + PIPE_DRAIN_GRACE;
    tokio::join!(stdout.finish(deadline), stderr.finish(deadline))
}

/// Kill the child's whole process group, then reap the child.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    let _ = child.kill().await;
}

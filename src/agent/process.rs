//! Subprocess runner for a single agent invocation.
//!
//! Spawns the agent CLI in its own process group, forwards stdout and stderr
//! line by line while the process runs, and enforces a wall-clock timeout by
//! killing the whole group.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::backend::InvocationError;

/// How long output pipes may stay open after the process exited
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Bound on draining once the lingering group was killed
const PIPE_DRAIN_AFTER_KILL: Duration = Duration::from_secs(5);

/// Program, arguments and extra environment for one subprocess
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: &HashMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

/// One line of subprocess output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: OutputSource,
    pub line: String,
}

/// How the subprocess ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Exited with code zero within budget
    Success,
    /// Exited non-zero, or was killed by a signal (`code` is `None`)
    Crashed { code: Option<i32> },
    /// Exceeded the timeout and was killed
    Timeout,
}

impl RunStatus {
    fn from_exit(status: ExitStatus) -> Self {
        if status.success() {
            RunStatus::Success
        } else {
            RunStatus::Crashed {
                code: status.code(),
            }
        }
    }
}

/// Final status plus everything the process printed
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Kills the process group when dropped while still armed.
///
/// Covers callers that drop the `run` future before it completes.
struct ProcessGroupGuard {
    pid: Option<u32>,
    armed: bool,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if self.armed {
            kill_process_group(self.pid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // The child leads its own group, so its pid is the pgid.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

async fn terminate(child: &mut Child) {
    kill_process_group(child.id());
    // Reaps the leader; also covers platforms without process groups.
    let _ = child.kill().await;
}

/// Read one line, replacing invalid UTF-8 instead of failing the run
async fn next_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Locate an executable by absolute path or on `PATH`
pub fn find_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Runs one subprocess per call
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Spawn `command` in `working_dir` and wait for it, at most `timeout`.
    ///
    /// Output lines are sent to `output_tx` as they arrive and also collected
    /// into the returned [`RunOutcome`]. The run ends when the process exits,
    /// not when its pipes close: background children still holding them get a
    /// short grace period before the group is killed. When the timeout fires
    /// the group is killed and the readers are stopped before this returns,
    /// so nothing further reaches `output_tx`.
    pub async fn run(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        timeout: Duration,
        output_tx: Option<mpsc::Sender<OutputLine>>,
    ) -> Result<RunOutcome, InvocationError> {
        if !working_dir.is_dir() {
            return Err(InvocationError::Unavailable(format!(
                "working directory {} does not exist",
                working_dir.display()
            )));
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(working_dir)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            InvocationError::Unavailable(format!(
                "failed to start {}: {}",
                command.program.display(),
                e
            ))
        })?;
        let pid = child.id();
        let mut guard = ProcessGroupGuard::new(pid);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| InvocationError::Io("failed to capture stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| InvocationError::Io("failed to capture stderr pipe".to_string()))?;

        let stdout_text = SharedText::default();
        let stderr_text = SharedText::default();
        let mut readers = vec![
            spawn_reader(stdout, OutputSource::Stdout, output_tx.clone(), stdout_text.clone()),
            spawn_reader(stderr, OutputSource::Stderr, output_tx, stderr_text.clone()),
        ];

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate(&mut child).await;
                stop_readers(readers).await;
                guard.disarm();
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!(
                    "[shikigami:agent] {} exceeded {}s, killing process group",
                    command.program.display(),
                    timeout.as_secs()
                );
                terminate(&mut child).await;
                stop_readers(readers).await;
                guard.disarm();
                return Ok(RunOutcome {
                    status: RunStatus::Timeout,
                    stdout: take_text(&stdout_text),
                    stderr: take_text(&stderr_text),
                });
            }
        };

        if !drain_readers(&mut readers, PIPE_DRAIN_GRACE).await {
            tracing::debug!(
                "[shikigami:agent] {} exited but its output pipes are still open, killing process group",
                command.program.display()
            );
            kill_process_group(pid);
            if !drain_readers(&mut readers, PIPE_DRAIN_AFTER_KILL).await {
                stop_readers(readers).await;
            }
        }
        guard.disarm();

        Ok(RunOutcome {
            status: RunStatus::from_exit(status),
            stdout: take_text(&stdout_text),
            stderr: take_text(&stderr_text),
        })
    }
}

/// Output collected by a reader task, readable even if the task is stopped
type SharedText = Arc<Mutex<String>>;

fn take_text(text: &SharedText) -> String {
    std::mem::take(&mut *text.lock().unwrap_or_else(|e| e.into_inner()))
}

/// Forward and collect every line of `pipe` until it closes
fn spawn_reader<R>(
    pipe: R,
    source: OutputSource,
    output_tx: Option<mpsc::Sender<OutputLine>>,
    collected: SharedText,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        while let Ok(Some(line)) = next_line_lossy(&mut reader, &mut buf).await {
            {
                let mut text = collected.lock().unwrap_or_else(|e| e.into_inner());
                text.push_str(&line);
                text.push('\n');
            }
            if let Some(tx) = &output_tx {
                // A dropped receiver must not stall the pipe; keep draining.
                let _ = tx.send(OutputLine { source, line }).await;
            }
        }
    })
}

/// Wait up to `grace` for every reader to hit EOF. Finished readers are
/// removed, so this can be called again after it returns `false`.
async fn drain_readers(readers: &mut Vec<JoinHandle<()>>, grace: Duration) -> bool {
    tokio::time::timeout(grace, async {
        while let Some(reader) = readers.last_mut() {
            let _ = reader.await;
            readers.pop();
        }
    })
    .await
    .is_ok()
}

async fn stop_readers(readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        reader.abort();
        let _ = reader.await;
    }
}

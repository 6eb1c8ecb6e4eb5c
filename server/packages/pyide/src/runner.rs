//! Runs submitted Python source in a child interpreter.
//!
//! Each run gets a scratch directory for the script, the workspace root as
//! working directory and import path, a wall-clock limit, capped output
//! capture, and a slot from a shared concurrency limit. Children are
//! kill-on-drop and lead their own process group, which is killed once the
//! run ends so background processes the script started do not outlive it.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use pyide_error::IdeError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 4;
/// Per stream.
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;
pub const DEFAULT_SCRIPT_NAME: &str = "main.py";

const TRUNCATION_MARKER: &str = "\n[output truncated]\n";
const READ_CHUNK: usize = 8 * 1024;
/// How long to keep draining pipes after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const SYNTAX_CHECK_SCRIPT: &str = r#"
import ast, json, sys
source = sys.stdin.buffer.read().decode("utf-8", "replace")
try:
    ast.parse(source, filename=sys.argv[1])
except (SyntaxError, ValueError) as exc:
    error = {
        "line": getattr(exc, "lineno", None) or 1,
        "column": getattr(exc, "offset", None) or 1,
        "message": getattr(exc, "msg", None) or str(exc),
    }
    print(json.dumps({"valid": False, "errors": [error]}))
else:
    print(json.dumps({"valid": True, "errors": []}))
"#;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub python: String,
    pub workspace_root: PathBuf,
    /// Upper bound for every run; requests may only lower it.
    pub timeout: Duration,
    pub output_limit: usize,
    pub max_concurrent: usize,
}

impl RunnerConfig {
    pub fn new(python: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            workspace_root: workspace_root.into(),
            timeout: DEFAULT_EXECUTION_TIMEOUT,
            output_limit: DEFAULT_OUTPUT_LIMIT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: String,
    /// `null` when the process was killed by a signal or the timeout.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxCheckRequest {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxIssue {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxCheckResult {
    pub valid: bool,
    pub errors: Vec<SyntaxIssue>,
}

#[derive(Debug)]
pub struct Runner {
    config: RunnerConfig,
    permits: Arc<Semaphore>,
}

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

struct RawOutput {
    status: Option<ExitStatus>,
    stdout: Captured,
    stderr: Captured,
    timed_out: bool,
    elapsed: Duration,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self { config, permits }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecutionResult, IdeError> {
        let limit = self.effective_timeout(request.timeout_secs);
        let filename = sanitize_filename(request.filename.as_deref());
        let scratch = tempfile::Builder::new().prefix("pyide-run-").tempdir()?;
        let script = scratch.path().join(&filename);
        tokio::fs::write(&script, request.code.as_bytes()).await?;

        let mut command = self.python_command();
        command.arg("-u").arg(&script).stdin(Stdio::null());

        let raw = self.run(command, None, limit).await?;
        let exit_code = raw.status.and_then(|status| status.code());
        let success = !raw.timed_out && raw.status.is_some_and(|status| status.success());
        let mut error = raw.stderr.into_text();
        if raw.timed_out {
            if !error.is_empty() && !error.ends_with('\n') {
                error.push('\n');
            }
            error.push_str(&format!(
                "Execution timed out after {} seconds",
                limit.as_secs()
            ));
        }

        tracing::info!(
            filename = %filename,
            success,
            exit_code = ?exit_code,
            timed_out = raw.timed_out,
            duration_ms = raw.elapsed.as_millis() as u64,
            "execution finished"
        );

        Ok(ExecutionResult {
            success,
            output: raw.stdout.into_text(),
            error,
            exit_code,
            timed_out: raw.timed_out,
            duration_ms: raw.elapsed.as_millis() as u64,
        })
    }

    /// Parses `code` with the interpreter's own parser without running it.
    pub async fn check_syntax(
        &self,
        code: &str,
        filename: Option<&str>,
    ) -> Result<SyntaxCheckResult, IdeError> {
        let filename = sanitize_filename(filename);
        let mut command = self.python_command();
        command
            .arg("-c")
            .arg(SYNTAX_CHECK_SCRIPT)
            .arg(&filename)
            .stdin(Stdio::piped());

        let raw = self
            .run(command, Some(code.as_bytes().to_vec()), self.config.timeout)
            .await?;
        if raw.timed_out {
            return Err(IdeError::Io {
                message: format!(
                    "syntax check timed out after {} seconds",
                    self.config.timeout.as_secs()
                ),
            });
        }
        let stdout = raw.stdout.into_text();
        serde_json::from_str(stdout.trim()).map_err(|err| {
            tracing::warn!(error = %err, stderr = %raw.stderr.into_text(), "unexpected syntax check output");
            IdeError::ProtocolParse {
                message: format!("syntax check produced invalid output: {err}"),
            }
        })
    }

    fn effective_timeout(&self, requested_secs: Option<u64>) -> Duration {
        match requested_secs {
            Some(secs) => Duration::from_secs(secs.max(1)).min(self.config.timeout),
            None => self.config.timeout,
        }
    }

    fn python_command(&self) -> Command {
        let root = &self.config.workspace_root;
        let mut command = Command::new(&self.config.python);
        command
            .current_dir(root)
            .env("PYTHONPATH", root)
            .env("PYTHONIOENCODING", "utf-8")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    async fn run(
        &self,
        mut command: Command,
        input: Option<Vec<u8>>,
        limit: Duration,
    ) -> Result<RawOutput, IdeError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| IdeError::Io {
                message: "execution runner is shut down".to_string(),
            })?;

        let started = Instant::now();
        let mut child = command.spawn().map_err(|err| IdeError::ProcessSpawn {
            program: self.config.python.clone(),
            message: err.to_string(),
        })?;
        let pid = child.id();

        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(&input).await {
                    tracing::debug!(error = %err, "child closed stdin early");
                }
            });
        }
        let stdout = child.stdout.take().map(|pipe| spawn_capture(pipe, self.config.output_limit));
        let stderr = child.stderr.take().map(|pipe| spawn_capture(pipe, self.config.output_limit));

        let (status, timed_out) = match tokio::time::timeout(limit, child.wait()).await {
            Ok(Ok(status)) => {
                kill_process_group(pid);
                (Some(status), false)
            }
            Ok(Err(err)) => {
                kill_process_group(pid);
                return Err(IdeError::Io {
                    message: format!("waiting for {} failed: {err}", self.config.python),
                });
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = limit.as_secs(),
                    pid = ?pid,
                    "execution timed out; killing"
                );
                kill_process_group(pid);
                if let Err(err) = child.kill().await {
                    tracing::warn!(error = %err, "failed to kill timed out process");
                }
                (None, true)
            }
        };

        Ok(RawOutput {
            status,
            stdout: finish_capture(stdout).await,
            stderr: finish_capture(stderr).await,
            timed_out,
            elapsed: started.elapsed(),
        })
    }
}

/// Basename of the requested filename, or [`DEFAULT_SCRIPT_NAME`].
pub fn sanitize_filename(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name.trim()).file_name())
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_SCRIPT_NAME.to_string())
}

/// Kills whatever is left in the process group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: kill(2) with a negative pid only signals that process group.
    let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %err, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Output read so far lives in `buffer`, so it survives an aborted task.
struct Capture {
    task: JoinHandle<()>,
    buffer: Arc<Mutex<Captured>>,
}

fn spawn_capture<R>(reader: R, limit: usize) -> Capture
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(Captured::default()));
    let sink = buffer.clone();
    let task = tokio::spawn(async move { read_capped(reader, limit, &sink).await });
    Capture { task, buffer }
}

async fn finish_capture(capture: Option<Capture>) -> Captured {
    let Some(Capture { mut task, buffer }) = capture else {
        return Captured::default();
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "output capture task failed"),
        Err(_) => {
            // Something outside the process group still holds the pipe open.
            tracing::warn!("output pipe still open after the run ended");
            task.abort();
        }
    }
    let mut captured = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::take(&mut *captured)
}

/// Reads to EOF, keeping at most `limit` bytes in `sink`. Keeps draining past
/// the limit so the child never blocks on a full pipe.
async fn read_capped<R>(mut reader: R, limit: usize, sink: &Mutex<Captured>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        append_capped(sink, &chunk[..read], limit);
    }
}

fn append_capped(sink: &Mutex<Captured>, data: &[u8], limit: usize) {
    let mut captured = sink.lock().unwrap_or_else(PoisonError::into_inner);
    let room = limit.saturating_sub(captured.bytes.len());
    if data.len() > room {
        captured.bytes.extend_from_slice(&data[..room]);
        captured.truncated = true;
    } else {
        captured.bytes.extend_from_slice(data);
    }
}

//! Launching the language-server child process.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::RelayError;

/// Command line and environment for the language server.
#[derive(Debug, Clone)]
pub struct LanguageServerConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory of the server; also the project root it is initialized with.
    pub root: PathBuf,
    pub env: Vec<(String, String)>,
}

/// Byte streams of a launched server plus the child handle, when there is a real process.
pub struct ServerIo {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub child: Option<Child>,
}

impl std::fmt::Debug for ServerIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerIo")
            .field("pid", &self.child.as_ref().and_then(|child| child.id()))
            .finish()
    }
}

/// Seam between the relay and whatever produces a server; tests swap in in-memory pipes.
pub trait ServerLauncher: Send + Sync {
    fn launch(&self) -> Result<ServerIo, RelayError>;
}

#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    config: LanguageServerConfig,
}

impl ProcessLauncher {
    pub fn new(config: LanguageServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LanguageServerConfig {
        &self.config
    }
}

impl ServerLauncher for ProcessLauncher {
    fn launch(&self) -> Result<ServerIo, RelayError> {
        let config = &self.config;
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .current_dir(&config.root)
            .envs(config.env.iter().cloned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| RelayError::Spawn {
            program: config.program.clone(),
            source,
        })?;
        let stdin = child.stdin.take().ok_or(RelayError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(RelayError::MissingPipe("stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr, config.program.clone()));
        }

        tracing::info!(
            program = %config.program,
            pid = ?child.id(),
            root = %config.root.display(),
            "language server started"
        );

        Ok(ServerIo {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            child: Some(child),
        })
    }
}

async fn log_stderr(stderr: ChildStderr, program: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(program = %program, "{line}");
    }
}

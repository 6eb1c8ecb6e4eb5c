//! Runtime configuration shared by the server components.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pyide_lsp_relay::DEFAULT_SHUTDOWN_GRACE;

use crate::runner::{DEFAULT_EXECUTION_TIMEOUT, DEFAULT_MAX_CONCURRENT_EXECUTIONS, DEFAULT_OUTPUT_LIMIT};

pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_LANGUAGE_SERVER: &str = "pylsp";
const CONTAINER_WORKSPACE: &str = "/workspace";
const LOCAL_WORKSPACE: &str = "./workspace";

#[derive(Debug, Clone)]
pub struct IdeConfig {
    pub workspace_root: PathBuf,
    pub python: String,
    pub language_server: String,
    pub language_server_args: Vec<String>,
    /// `None` asks the interpreter at startup.
    pub stdlib_dir: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub execution_timeout: Duration,
    pub max_concurrent_executions: usize,
    pub output_limit: usize,
    pub shutdown_grace: Duration,
}

impl IdeConfig {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            python: DEFAULT_PYTHON.to_string(),
            language_server: DEFAULT_LANGUAGE_SERVER.to_string(),
            language_server_args: Vec::new(),
            stdlib_dir: None,
            static_dir: None,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            max_concurrent_executions: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
            output_limit: DEFAULT_OUTPUT_LIMIT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// `/workspace` when it exists (container layout), otherwise `./workspace`.
pub fn default_workspace_dir() -> PathBuf {
    if Path::new(CONTAINER_WORKSPACE).is_dir() {
        PathBuf::from(CONTAINER_WORKSPACE)
    } else {
        PathBuf::from(LOCAL_WORKSPACE)
    }
}

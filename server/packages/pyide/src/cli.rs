use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{default_workspace_dir, IdeConfig, DEFAULT_LANGUAGE_SERVER, DEFAULT_PYTHON};
use crate::router::{build_router_with_state, AppState};
use crate::runner::{DEFAULT_EXECUTION_TIMEOUT, DEFAULT_MAX_CONCURRENT_EXECUTIONS};
use crate::telemetry::init_logging;

/// Extra time past the relay grace period before shutdown stops waiting for relays.
const RELAY_DRAIN_SLACK: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "pyide")]
#[command(about = "Browser Python IDE backend", version)]
pub struct Cli {
    #[arg(long, env = "PYIDE_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "PYIDE_PORT", default_value_t = 3000)]
    port: u16,

    /// Defaults to `/workspace` when it exists, else `./workspace`.
    #[arg(long, env = "PYIDE_WORKSPACE")]
    workspace: Option<PathBuf>,

    #[arg(long, env = "PYIDE_PYTHON", default_value = DEFAULT_PYTHON)]
    python: String,

    #[arg(long = "language-server", env = "PYIDE_LANGUAGE_SERVER", default_value = DEFAULT_LANGUAGE_SERVER)]
    language_server: String,

    #[arg(long = "language-server-arg", allow_hyphen_values = true)]
    language_server_args: Vec<String>,

    /// Defaults to asking the interpreter.
    #[arg(long = "stdlib-dir", env = "PYIDE_STDLIB_DIR")]
    stdlib_dir: Option<PathBuf>,

    /// Serve the browser client from this directory.
    #[arg(long = "static-dir", env = "PYIDE_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    #[arg(long = "execution-timeout-secs", env = "PYIDE_EXECUTION_TIMEOUT_SECS", default_value_t = DEFAULT_EXECUTION_TIMEOUT.as_secs())]
    execution_timeout_secs: u64,

    #[arg(long = "max-concurrent-executions", env = "PYIDE_MAX_CONCURRENT_EXECUTIONS", default_value_t = DEFAULT_MAX_CONCURRENT_EXECUTIONS)]
    max_concurrent_executions: usize,

    #[arg(long, env = "PYIDE_DEBUG")]
    debug: bool,

    #[arg(long = "cors-allow-origin")]
    cors_allow_origin: Vec<String>,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid cors origin: {0}")]
    InvalidCorsOrigin(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Ide(#[from] pyide_error::IdeError),
    #[error("server error: {0}")]
    Server(String),
}

impl Cli {
    pub fn to_config(&self) -> Result<IdeConfig, CliError> {
        if self.execution_timeout_secs == 0 {
            return Err(CliError::InvalidConfig(
                "--execution-timeout-secs must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_executions == 0 {
            return Err(CliError::InvalidConfig(
                "--max-concurrent-executions must be at least 1".to_string(),
            ));
        }

        let mut config = IdeConfig::new(
            self.workspace
                .clone()
                .unwrap_or_else(default_workspace_dir),
        );
        config.python = self.python.clone();
        config.language_server = self.language_server.clone();
        config.language_server_args = self.language_server_args.clone();
        config.stdlib_dir = self.stdlib_dir.clone();
        config.static_dir = self.static_dir.clone();
        config.execution_timeout = Duration::from_secs(self.execution_timeout_secs);
        config.max_concurrent_executions = self.max_concurrent_executions;
        Ok(config)
    }
}

pub fn run_pyide() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    run_server(&cli)
}

fn run_server(cli: &Cli) -> Result<(), CliError> {
    let config = cli.to_config()?;
    let state = Arc::new(AppState::new(config)?);
    let mut router = build_router_with_state(state.clone());

    if let Some(cors) = build_cors_layer(cli)? {
        router = router.layer(cors);
    }

    let addr = format!("{}:{}", cli.host, cli.port);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(addr = %addr, "pyide listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(state))
            .await
            .map_err(|err| CliError::Server(err.to_string()))
    })
}

/// Resolves on ctrl-c or SIGTERM after asking relays to stop their servers.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutting down");
    state.begin_shutdown();
    // Shutdown response, input flush and process exit each get one grace period.
    let limit = state.config().shutdown_grace * 3 + RELAY_DRAIN_SLACK;
    if !state.wait_for_relays(limit).await {
        tracing::warn!("language servers still running after shutdown grace period");
    }
}

fn build_cors_layer(cli: &Cli) -> Result<Option<CorsLayer>, CliError> {
    if cli.cors_allow_origin.is_empty() {
        return Ok(None);
    }

    let mut cors = CorsLayer::new();
    if cli.cors_allow_origin.iter().any(|origin| origin == "*") {
        cors = cors.allow_origin(Any);
    } else {
        let mut origins = Vec::new();
        for origin in &cli.cors_allow_origin {
            let value = origin
                .parse()
                .map_err(|_| CliError::InvalidCorsOrigin(origin.clone()))?;
            origins.push(value);
        }
        cors = cors.allow_origin(origins);
    }

    Ok(Some(cors.allow_methods(Any).allow_headers(Any)))
}

use std::path::{Path as StdPath, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use pyide_error::{ErrorType, IdeError, ProblemDetails};
use pyide_lsp_relay::{root_uri, LanguageServerConfig, ProcessLauncher, RelayConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::Span;
use utoipa::{OpenApi, ToSchema};

use crate::archive::zip_directory;
use crate::catalog::{Catalog, Snippet, Template};
use crate::config::IdeConfig;
use crate::lsp::lsp_ws_handler;
use crate::runner::{
    ExecuteRequest, ExecutionResult, Runner, RunnerConfig, SyntaxCheckRequest, SyntaxCheckResult,
    SyntaxIssue,
};
use crate::stdlib::{detect_stdlib_dir, Stdlib};
use crate::ui;
use crate::workspace::{DirEntry, EntryType, FileStat, Workspace};

/// Multipart uploads may carry whole project folders.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct AppState {
    config: IdeConfig,
    workspace: Workspace,
    runner: Runner,
    stdlib: Stdlib,
    catalog: Catalog,
    shutdown: watch::Sender<bool>,
    active_relays: watch::Sender<usize>,
}

impl AppState {
    pub fn new(config: IdeConfig) -> Result<Self, IdeError> {
        let workspace = Workspace::new(&config.workspace_root)?;
        let runner = Runner::new(RunnerConfig {
            python: config.python.clone(),
            workspace_root: workspace.root().to_path_buf(),
            timeout: config.execution_timeout,
            output_limit: config.output_limit,
            max_concurrent: config.max_concurrent_executions,
        });
        let stdlib_dir = config
            .stdlib_dir
            .clone()
            .or_else(|| detect_stdlib_dir(&config.python));
        let stdlib = Stdlib::new(stdlib_dir.as_deref());
        let catalog = Catalog::load()?;
        let (shutdown, _) = watch::channel(false);
        let (active_relays, _) = watch::channel(0);

        tracing::info!(
            workspace = %workspace.root().display(),
            python = %config.python,
            language_server = %config.language_server,
            stdlib = ?stdlib.root(),
            "workspace ready"
        );
        Ok(Self {
            config,
            workspace,
            runner,
            stdlib,
            catalog,
            shutdown,
            active_relays,
        })
    }

    pub fn config(&self) -> &IdeConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Launcher for one language-server process, rooted at the workspace.
    pub fn language_server_launcher(&self) -> ProcessLauncher {
        let root = self.workspace.root().to_path_buf();
        ProcessLauncher::new(LanguageServerConfig {
            program: self.config.language_server.clone(),
            args: self.config.language_server_args.clone(),
            env: vec![(
                "PYTHONPATH".to_string(),
                root.to_string_lossy().to_string(),
            )],
            root,
        })
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            root: self.workspace.root().to_path_buf(),
            shutdown_grace: self.config.shutdown_grace,
        }
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Tells every open relay to stop its language server.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub(crate) fn relay_started(&self) -> RelayGuard<'_> {
        self.active_relays.send_modify(|count| *count += 1);
        RelayGuard { state: self }
    }

    /// Waits until every relay has finished, or `limit` passes.
    pub async fn wait_for_relays(&self, limit: Duration) -> bool {
        let mut active = self.active_relays.subscribe();
        let drained = tokio::time::timeout(limit, active.wait_for(|count| *count == 0)).await;
        matches!(drained, Ok(Ok(_)))
    }
}

pub(crate) struct RelayGuard<'a> {
    state: &'a AppState,
}

impl Drop for RelayGuard<'_> {
    fn drop(&mut self) {
        self.state
            .active_relays
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

pub fn build_router(state: AppState) -> Router {
    build_router_with_state(Arc::new(state))
}

pub fn build_router_with_state(shared: Arc<AppState>) -> Router {
    let upload_router = Router::new()
        .route("/upload", post(upload_files))
        .route("/upload-directory", post(upload_directory))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    let api_router = Router::new()
        .route("/health", get(get_health))
        .route("/info", get(get_info))
        .route("/files", get(list_files))
        .route(
            "/files/*path",
            get(read_entry).post(write_file).delete(delete_entry),
        )
        .route("/stat/*path", get(stat_entry))
        .route("/mkdir", post(make_directory))
        .route("/move", post(move_entry))
        .route("/duplicate", post(duplicate_entry))
        .merge(upload_router)
        .route("/download", get(download_root))
        .route("/download/*path", get(download_entry))
        .route("/stdlib/*path", get(read_stdlib_file))
        .route("/check-syntax", post(check_syntax))
        .route("/execute", post(execute_code))
        .route("/templates", get(list_templates))
        .route("/snippets", get(list_snippets))
        .route("/openapi.json", get(get_openapi))
        .fallback(not_found)
        .with_state(shared.clone());

    let mut router = Router::new()
        .route("/lsp", get(lsp_ws_handler))
        .with_state(shared.clone())
        .nest("/api", api_router);

    router = match shared.config.static_dir.as_deref() {
        Some(dir) => router.merge(ui::router(dir)),
        None => router.fallback(not_found),
    };

    let http_logging = match std::env::var("PYIDE_LOG_HTTP") {
        Ok(value) if value == "0" || value.eq_ignore_ascii_case("false") => false,
        _ => true,
    };
    if http_logging {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|req: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %req.method(),
                    uri = %req.uri()
                )
            })
            .on_request(|_req: &Request<_>, span: &Span| {
                tracing::debug!(parent: span, "request");
            })
            .on_response(|res: &Response<_>, latency: Duration, span: &Span| {
                tracing::info!(
                    parent: span,
                    status = %res.status(),
                    latency_ms = latency.as_millis()
                );
            });
        router = router.layer(trace_layer);
    }

    router
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_health,
        get_info,
        list_files,
        read_entry,
        write_file,
        delete_entry,
        stat_entry,
        make_directory,
        move_entry,
        duplicate_entry,
        upload_files,
        upload_directory,
        download_root,
        download_entry,
        read_stdlib_file,
        check_syntax,
        execute_code,
        list_templates,
        list_snippets
    ),
    components(
        schemas(
            HealthResponse,
            InfoResponse,
            DirEntry,
            EntryType,
            FileStat,
            FileContent,
            ContentEncoding,
            WriteFileRequest,
            WriteFileResponse,
            PathRequest,
            PathResponse,
            MoveRequest,
            DuplicateRequest,
            TransferResponse,
            UploadResponse,
            ExecuteRequest,
            ExecutionResult,
            SyntaxCheckRequest,
            SyntaxCheckResult,
            SyntaxIssue,
            Template,
            Snippet,
            ProblemDetails,
            ErrorType
        )
    ),
    tags(
        (name = "meta", description = "Service metadata"),
        (name = "files", description = "Workspace files"),
        (name = "execution", description = "Running and checking code"),
        (name = "catalog", description = "Templates and snippets")
    )
)]
pub struct ApiDoc;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ide(#[from] IdeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let problem: ProblemDetails = match &self {
            ApiError::Ide(err) => err.to_problem_details(),
        };
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %problem.error, "request failed");
        }
        (status, Json(problem)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub workspace_root: String,
    pub root_uri: Option<String>,
    pub python: String,
    pub language_server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdlib_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub encoding: ContentEncoding,
}

impl FileContent {
    /// UTF-8 text as-is, anything else base64 encoded.
    fn from_bytes(path: String, bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(content) => FileContent {
                path,
                content,
                encoding: ContentEncoding::Utf8,
            },
            Err(err) => FileContent {
                path,
                content: base64::engine::general_purpose::STANDARD.encode(err.into_bytes()),
                encoding: ContentEncoding::Base64,
            },
        }
    }
}

/// A file's content, or the directory tree when the path is a directory.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EntryResponse {
    File(FileContent),
    Tree(Vec<DirEntry>),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileRequest {
    pub content: String,
    #[serde(default)]
    pub encoding: ContentEncoding,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileResponse {
    pub path: String,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PathRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PathResponse {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    #[serde(alias = "from")]
    pub source: String,
    #[serde(alias = "to")]
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRequest {
    pub path: String,
    /// Defaults to `name_copy.ext` next to the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub paths: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Server is healthy", body = HealthResponse)),
    tag = "meta"
)]
/// Health Check
async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/info",
    responses((status = 200, description = "Workspace and tool configuration", body = InfoResponse)),
    tag = "meta"
)]
/// Server Info
///
/// Returns the workspace root (as a path and a `file://` URI) and the configured tools.
async fn get_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let root = state.workspace.root();
    Json(InfoResponse {
        workspace_root: root.to_string_lossy().to_string(),
        root_uri: root_uri(root),
        python: state.config.python.clone(),
        language_server: state.config.language_server.clone(),
        stdlib_dir: state
            .stdlib
            .root()
            .map(|dir| dir.to_string_lossy().to_string()),
    })
}

#[utoipa::path(
    get,
    path = "/api/files",
    responses((status = 200, description = "Workspace tree", body = Vec<DirEntry>)),
    tag = "files"
)]
/// List Workspace
///
/// Returns the full tree: directories first, then files, each sorted by name.
async fn list_files(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DirEntry>>, ApiError> {
    Ok(Json(state.workspace.list_tree("")?))
}

#[utoipa::path(
    get,
    path = "/api/files/{path}",
    params(("path" = String, Path, description = "Workspace path")),
    responses(
        (status = 200, description = "File content, or the tree below a directory", body = FileContent),
        (status = 403, description = "Path escapes the workspace", body = ProblemDetails),
        (status = 404, description = "No such entry", body = ProblemDetails)
    ),
    tag = "files"
)]
/// Read Entry
async fn read_entry(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<EntryResponse>, ApiError> {
    let workspace = &state.workspace;
    let stat = workspace.stat(&path)?;
    let response = match stat.entry_type {
        EntryType::Directory => EntryResponse::Tree(workspace.list_tree(&path)?),
        EntryType::File => {
            EntryResponse::File(FileContent::from_bytes(stat.path, workspace.read_file(&path)?))
        }
    };
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/files/{path}",
    request_body = WriteFileRequest,
    params(("path" = String, Path, description = "Workspace path")),
    responses((status = 200, description = "Write result", body = WriteFileResponse)),
    tag = "files"
)]
/// Write File
///
/// Creates or replaces a file, creating missing parent directories.
async fn write_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(request): Json<WriteFileRequest>,
) -> Result<Json<WriteFileResponse>, ApiError> {
    let bytes = match request.encoding {
        ContentEncoding::Utf8 => request.content.into_bytes(),
        ContentEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(request.content.as_bytes())
            .map_err(|err| IdeError::invalid(format!("content is not valid base64: {err}")))?,
    };
    let path = state.workspace.write_file(&path, &bytes)?;
    Ok(Json(WriteFileResponse {
        path,
        bytes_written: bytes.len() as u64,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/files/{path}",
    params(("path" = String, Path, description = "File or directory path")),
    responses((status = 200, description = "Deleted", body = PathResponse)),
    tag = "files"
)]
/// Delete Entry
///
/// Deletes a file, or a directory and everything below it.
async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<PathResponse>, ApiError> {
    let path = state.workspace.delete(&path)?;
    Ok(Json(PathResponse { path }))
}

#[utoipa::path(
    get,
    path = "/api/stat/{path}",
    params(("path" = String, Path, description = "Workspace path")),
    responses((status = 200, description = "Entry metadata", body = FileStat)),
    tag = "files"
)]
/// Get Entry Info
async fn stat_entry(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<FileStat>, ApiError> {
    Ok(Json(state.workspace.stat(&path)?))
}

#[utoipa::path(
    post,
    path = "/api/mkdir",
    request_body = PathRequest,
    responses((status = 200, description = "Directory created", body = PathResponse)),
    tag = "files"
)]
/// Create Directory
async fn make_directory(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PathRequest>,
) -> Result<Json<PathResponse>, ApiError> {
    let path = state.workspace.create_dir(&request.path)?;
    Ok(Json(PathResponse { path }))
}

#[utoipa::path(
    post,
    path = "/api/move",
    request_body = MoveRequest,
    responses(
        (status = 200, description = "Moved", body = TransferResponse),
        (status = 409, description = "Destination exists", body = ProblemDetails)
    ),
    tag = "files"
)]
/// Move Entry
///
/// Renames or moves a file or directory. Existing destinations are never overwritten.
async fn move_entry(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let (source, destination) = state
        .workspace
        .rename(&request.source, &request.destination)?;
    Ok(Json(TransferResponse {
        source,
        destination,
    }))
}

#[utoipa::path(
    post,
    path = "/api/duplicate",
    request_body = DuplicateRequest,
    responses((status = 200, description = "Copied", body = TransferResponse)),
    tag = "files"
)]
/// Duplicate Entry
async fn duplicate_entry(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DuplicateRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let (source, destination) = match request.destination.as_deref() {
        Some(destination) => state.workspace.copy(&request.path, destination)?,
        None => state.workspace.duplicate(&request.path)?,
    };
    Ok(Json(TransferResponse {
        source,
        destination,
    }))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(
        content = Vec<u8>,
        description = "multipart/form-data: `files` parts, optional `paths` parts in the same order, optional `targetDir`",
        content_type = "multipart/form-data"
    ),
    responses((status = 200, description = "Stored paths", body = UploadResponse)),
    tag = "files"
)]
/// Upload Files
async fn upload_files(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    Ok(Json(form.store(&state.workspace, false)?))
}

#[utoipa::path(
    post,
    path = "/api/upload-directory",
    request_body(
        content = Vec<u8>,
        description = "multipart/form-data: `files` parts with a `paths` part for every file, optional `targetDir`",
        content_type = "multipart/form-data"
    ),
    responses((status = 200, description = "Stored paths", body = UploadResponse)),
    tag = "files"
)]
/// Upload Directory
///
/// Uploads a folder, recreating each file's relative path.
async fn upload_directory(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    Ok(Json(form.store(&state.workspace, true)?))
}

#[utoipa::path(
    get,
    path = "/api/download",
    responses((status = 200, description = "Zip archive of the whole workspace", body = Vec<u8>)),
    tag = "files"
)]
/// Download Workspace
async fn download_root(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    download(&state, "")
}

#[utoipa::path(
    get,
    path = "/api/download/{path}",
    params(("path" = String, Path, description = "File or directory path")),
    responses((status = 200, description = "File bytes, or a zip archive of a directory", body = Vec<u8>)),
    tag = "files"
)]
/// Download Entry
async fn download_entry(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    download(&state, &path)
}

fn download(state: &AppState, path: &str) -> Result<Response, ApiError> {
    let workspace = &state.workspace;
    let target = workspace.resolve(path)?;
    let stat = workspace.stat(path)?;
    let name = if stat.path.is_empty() {
        "workspace".to_string()
    } else {
        target
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string())
    };

    let (content_type, file_name, bytes) = match stat.entry_type {
        EntryType::Directory => ("application/zip", format!("{name}.zip"), zip_directory(&target)?),
        EntryType::File => (
            "application/octet-stream",
            name,
            workspace.read_file(path)?,
        ),
    };
    tracing::debug!(path = %stat.path, bytes = bytes.len(), "download");
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, attachment(&file_name)),
        ],
        Bytes::from(bytes),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/api/stdlib/{path}",
    params(("path" = String, Path, description = "Path relative to the stdlib directory")),
    responses((status = 200, description = "Read-only source file", body = FileContent)),
    tag = "files"
)]
/// Read Stdlib File
async fn read_stdlib_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<FileContent>, ApiError> {
    let bytes = state.stdlib.read(&path)?;
    Ok(Json(FileContent::from_bytes(path, bytes)))
}

#[utoipa::path(
    post,
    path = "/api/check-syntax",
    request_body = SyntaxCheckRequest,
    responses((status = 200, description = "Parse result", body = SyntaxCheckResult)),
    tag = "execution"
)]
/// Check Syntax
///
/// Parses the source with the interpreter without running it.
async fn check_syntax(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyntaxCheckRequest>,
) -> Result<Json<SyntaxCheckResult>, ApiError> {
    let result = state
        .runner
        .check_syntax(&request.code, request.filename.as_deref())
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/execute",
    request_body = ExecuteRequest,
    responses(
        (status = 200, description = "Execution result", body = ExecutionResult),
        (status = 500, description = "Interpreter could not be started", body = ProblemDetails)
    ),
    tag = "execution"
)]
/// Execute Code
///
/// Runs the source in a fresh interpreter with the workspace as working directory.
async fn execute_code(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecutionResult>, ApiError> {
    Ok(Json(state.runner.execute(request).await?))
}

#[utoipa::path(
    get,
    path = "/api/templates",
    responses((status = 200, description = "Bundled templates", body = Vec<Template>)),
    tag = "catalog"
)]
/// List Templates
async fn list_templates(State(state): State<Arc<AppState>>) -> Json<Vec<Template>> {
    Json(state.catalog.templates().to_vec())
}

#[utoipa::path(
    get,
    path = "/api/snippets",
    responses((status = 200, description = "Bundled snippets", body = Vec<Snippet>)),
    tag = "catalog"
)]
/// List Snippets
async fn list_snippets(State(state): State<Arc<AppState>>) -> Json<Vec<Snippet>> {
    Json(state.catalog.snippets().to_vec())
}

async fn get_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn not_found() -> ApiError {
    ApiError::Ide(IdeError::NotFound {
        path: "route".to_string(),
    })
}

fn attachment(file_name: &str) -> HeaderValue {
    let escaped = file_name.replace(['"', '\\'], "_");
    HeaderValue::from_str(&format!("attachment; filename=\"{escaped}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Parsed upload form: files in arrival order plus their optional relative paths.
#[derive(Debug, Default)]
struct UploadForm {
    files: Vec<(Option<String>, Bytes)>,
    paths: Vec<String>,
    target_dir: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, IdeError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
            match field.name().unwrap_or_default() {
                "files" | "file" => {
                    let file_name = field.file_name().map(str::to_string);
                    let bytes = field.bytes().await.map_err(upload_error)?;
                    form.files.push((file_name, bytes));
                }
                "paths" | "path" => form.paths.push(field.text().await.map_err(upload_error)?),
                "targetDir" | "target_dir" => {
                    form.target_dir = Some(field.text().await.map_err(upload_error)?)
                }
                other => tracing::debug!(field = other, "ignoring unknown upload field"),
            }
        }
        Ok(form)
    }

    fn store(self, workspace: &Workspace, require_paths: bool) -> Result<UploadResponse, IdeError> {
        if self.files.is_empty() {
            return Err(IdeError::Upload {
                message: "no files in upload".to_string(),
            });
        }
        if require_paths && self.paths.len() != self.files.len() {
            return Err(IdeError::Upload {
                message: format!(
                    "expected a path for each of {} files, got {}",
                    self.files.len(),
                    self.paths.len()
                ),
            });
        }

        let base = PathBuf::from(self.target_dir.unwrap_or_default());
        let mut stored = Vec::with_capacity(self.files.len());
        for (index, (file_name, bytes)) in self.files.into_iter().enumerate() {
            let relative = self
                .paths
                .get(index)
                .cloned()
                .filter(|path| !path.trim().is_empty())
                .or(file_name)
                .ok_or_else(|| IdeError::Upload {
                    message: format!("file #{} has neither a path nor a file name", index + 1),
                })?;
            let destination = join_upload_path(&base, &relative);
            stored.push(workspace.write_file(&destination, &bytes)?);
        }
        tracing::info!(files = stored.len(), "stored upload");
        Ok(UploadResponse { paths: stored })
    }
}

fn join_upload_path(base: &StdPath, relative: &str) -> String {
    base.join(relative.trim_start_matches('/'))
        .to_string_lossy()
        .to_string()
}

fn upload_error(err: axum::extract::multipart::MultipartError) -> IdeError {
    IdeError::Upload {
        message: err.to_string(),
    }
}

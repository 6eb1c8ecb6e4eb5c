//! Per-connection relay between a JSON-RPC client and a language-server process.
//!
//! States: `Idle → ServerSpawned → Relaying → Closed`, with `Failed` when the
//! server cannot be started. The client side is a pair of channels carrying raw
//! JSON text in and JSON values out, so the relay is independent of the socket type.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use url::Url;

use crate::codec::{encode_message, FrameDecoder};
use crate::message::{
    error_codes, error_response, notification, request, show_error, Message, Method, RequestId,
};
use crate::pending::PendingRequests;
use crate::process::{ServerIo, ServerLauncher};

const READ_CHUNK: usize = 8 * 1024;
const SHUTDOWN_REQUEST_ID: &str = "pyide-relay-shutdown";
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    ServerSpawned,
    Relaying,
    Failed,
    Closed,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Workspace root the server is initialized with.
    pub root: PathBuf,
    /// How long to wait for the `shutdown` response, the input flush and process exit, each.
    pub shutdown_grace: Duration,
}

impl RelayConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Summary returned when a relay finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    /// State the relay was in when the connection ended, before closing.
    pub last_state: RelayState,
    pub frames_to_server: u64,
    pub frames_to_client: u64,
    pub unanswered_requests: usize,
}

enum Event {
    Client(Option<String>),
    Server(std::io::Result<usize>),
    ServerInput(String),
    Shutdown(bool),
}

type ServerOutput = Box<dyn AsyncRead + Send + Unpin>;

/// A running server. Its stdin belongs to a writer task so a server that stops
/// reading never blocks the relay loop.
struct Connection {
    stdout: ServerOutput,
    child: Option<Child>,
    writer: mpsc::UnboundedSender<Vec<u8>>,
    writer_task: JoinHandle<std::io::Result<()>>,
}

impl Connection {
    fn start(io: ServerIo) -> Self {
        let ServerIo {
            stdin,
            stdout,
            child,
        } = io;
        let (writer, frames) = mpsc::unbounded_channel();
        Self {
            stdout,
            child,
            writer,
            writer_task: tokio::spawn(write_frames(stdin, frames)),
        }
    }
}

pub struct Relay<L> {
    launcher: L,
    config: RelayConfig,
    state: RelayState,
    pending: PendingRequests,
    decoder: FrameDecoder,
    server: Option<Connection>,
    client: mpsc::Sender<Value>,
    client_gone: bool,
    failure: Option<String>,
    frames_to_server: u64,
    frames_to_client: u64,
}

impl<L: ServerLauncher> Relay<L> {
    pub fn new(launcher: L, config: RelayConfig, client: mpsc::Sender<Value>) -> Self {
        Self {
            launcher,
            config,
            state: RelayState::Idle,
            pending: PendingRequests::default(),
            decoder: FrameDecoder::new(),
            server: None,
            client,
            client_gone: false,
            failure: None,
            frames_to_server: 0,
            frames_to_client: 0,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Drives the relay until the client disconnects or `shutdown` flips to `true`.
    pub async fn run(
        mut self,
        mut incoming: mpsc::Receiver<String>,
        mut shutdown: watch::Receiver<bool>,
    ) -> RelayReport {
        let mut chunk = vec![0u8; READ_CHUNK];
        while !self.client_gone && !*shutdown.borrow() {
            let event = {
                let (stdout, writer_task) = match self.server.as_mut() {
                    Some(conn) => (Some(&mut conn.stdout), Some(&mut conn.writer_task)),
                    None => (None, None),
                };
                tokio::select! {
                    message = incoming.recv() => Event::Client(message),
                    read = read_server(stdout, &mut chunk) => Event::Server(read),
                    reason = writer_stopped(writer_task) => Event::ServerInput(reason),
                    changed = shutdown.changed() => Event::Shutdown(changed.is_err()),
                }
            };

            match event {
                Event::Client(Some(text)) => self.handle_client_text(&text).await,
                Event::Client(None) => {
                    tracing::debug!("lsp client disconnected");
                    break;
                }
                Event::Server(Ok(0)) => {
                    self.handle_server_exit("language server closed its output")
                        .await
                }
                Event::Server(Ok(read)) => self.handle_server_output(&chunk[..read]).await,
                Event::Server(Err(err)) => {
                    self.handle_server_exit(&format!("reading language server output failed: {err}"))
                        .await
                }
                Event::ServerInput(reason) => self.handle_server_exit(&reason).await,
                Event::Shutdown(sender_dropped) => {
                    if sender_dropped || *shutdown.borrow() {
                        tracing::info!("stopping lsp relay for server shutdown");
                        break;
                    }
                }
            }
        }

        let last_state = self.state;
        self.close().await;
        if !self.pending.is_empty() {
            tracing::debug!(
                unanswered = self.pending.len(),
                "lsp connection closed with unanswered requests"
            );
        }
        RelayReport {
            last_state,
            frames_to_server: self.frames_to_server,
            frames_to_client: self.frames_to_client,
            unanswered_requests: self.pending.len(),
        }
    }

    async fn handle_client_text(&mut self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, "lsp client sent malformed JSON");
                self.send_to_client(error_response(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("parse error: {err}"),
                ))
                .await;
                return;
            }
        };
        let message = match Message::from_value(&value) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "lsp client sent an invalid message");
                self.send_to_client(error_response(
                    None,
                    error_codes::INVALID_REQUEST,
                    err.to_string(),
                ))
                .await;
                return;
            }
        };

        match self.state {
            RelayState::Idle => self.handle_before_initialize(message, value).await,
            RelayState::ServerSpawned | RelayState::Relaying => {
                self.forward_to_server(&message, &value).await
            }
            RelayState::Failed | RelayState::Closed => self.reject(&message).await,
        }
    }

    async fn handle_before_initialize(&mut self, message: Message, value: Value) {
        match message {
            Message::Request {
                id,
                method: Method::Initialize,
                ..
            } => self.start_server(id, value).await,
            Message::Request { id, method, .. } => {
                tracing::debug!(id = %id, method = %method, "request before initialize");
                self.send_to_client(error_response(
                    Some(&id),
                    error_codes::SERVER_NOT_INITIALIZED,
                    format!("{method} received before initialize"),
                ))
                .await;
            }
            Message::Notification { method, .. } => {
                tracing::debug!(method = %method, "dropping notification before initialize");
            }
            Message::Response { id, .. } => {
                tracing::debug!(id = ?id, "dropping response before initialize");
            }
        }
    }

    async fn start_server(&mut self, id: RequestId, mut value: Value) {
        match self.launcher.launch() {
            Ok(io) => {
                self.server = Some(Connection::start(io));
                self.transition(RelayState::ServerSpawned);
                patch_initialize_params(&mut value, &self.config.root);
                let message = Message::Request {
                    id,
                    method: Method::Initialize,
                    params: None,
                };
                self.forward_to_server(&message, &value).await;
                if self.state == RelayState::ServerSpawned {
                    self.transition(RelayState::Relaying);
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to start language server");
                let reason = err.to_string();
                self.send_to_client(error_response(
                    Some(&id),
                    error_codes::INTERNAL_ERROR,
                    reason.clone(),
                ))
                .await;
                self.failure = Some(reason);
                self.transition(RelayState::Failed);
            }
        }
    }

    async fn reject(&mut self, message: &Message) {
        match message {
            Message::Request { id, method, .. } => {
                let reason = self
                    .failure
                    .clone()
                    .unwrap_or_else(|| "language server is not running".to_string());
                tracing::debug!(id = %id, method = %method, state = ?self.state, "rejecting request");
                self.send_to_client(error_response(
                    Some(id),
                    error_codes::INTERNAL_ERROR,
                    reason,
                ))
                .await;
            }
            Message::Notification { method, .. } => {
                tracing::debug!(method = %method, state = ?self.state, "dropping notification");
            }
            Message::Response { id, .. } => {
                tracing::debug!(id = ?id, state = ?self.state, "dropping response");
            }
        }
    }

    async fn forward_to_server(&mut self, message: &Message, value: &Value) {
        let Some(server) = self.server.as_ref() else {
            self.reject(message).await;
            return;
        };
        let frame = match encode_message(value) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode client message");
                return;
            }
        };
        if let Message::Request { id, method, .. } = message {
            self.pending.record(id.clone(), method.clone());
        }

        let bytes = frame.len();
        if server.writer.send(frame).is_err() {
            self.handle_server_exit("language server input closed").await;
            return;
        }
        self.frames_to_server += 1;
        tracing::debug!(
            method = message.method().map(Method::as_str).unwrap_or("<response>"),
            bytes,
            pending = self.pending.len(),
            "client -> server"
        );
    }

    async fn handle_server_output(&mut self, bytes: &[u8]) {
        self.decoder.push(bytes);
        while !self.client_gone {
            match self.decoder.next_frame() {
                Ok(Some(body)) => match serde_json::from_slice::<Value>(&body) {
                    Ok(value) => self.dispatch_to_client(value).await,
                    Err(err) => tracing::warn!(
                        error = %err,
                        bytes = body.len(),
                        "dropping unparseable frame from language server"
                    ),
                },
                Ok(None) => break,
                Err(err) => tracing::warn!(error = %err, "dropping malformed frame header"),
            }
        }
    }

    async fn dispatch_to_client(&mut self, value: Value) {
        match Message::from_value(&value) {
            Ok(Message::Response {
                id: Some(id), error, ..
            }) => {
                let method = self.pending.resolve(&id);
                tracing::debug!(
                    id = %id,
                    method = method.as_ref().map(Method::as_str).unwrap_or("<unknown>"),
                    failed = error.is_some(),
                    "server -> client response"
                );
            }
            Ok(message) => {
                tracing::debug!(
                    method = message.method().map(Method::as_str).unwrap_or("<response>"),
                    "server -> client"
                );
            }
            Err(err) => {
                tracing::debug!(error = %err, "forwarding unrecognized server message");
            }
        }
        self.send_to_client(value).await;
        self.frames_to_client += 1;
    }

    async fn handle_server_exit(&mut self, reason: &str) {
        tracing::warn!(reason, "language server stopped");
        if let Some(mut conn) = self.server.take() {
            conn.writer_task.abort();
            if let Some(child) = conn.child.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        tracing::info!(status = %status, "language server exited")
                    }
                    _ => {
                        let _ = child.start_kill();
                    }
                }
            }
        }
        self.send_to_client(show_error(format!(
            "Python language server stopped: {reason}"
        )))
        .await;
        self.transition(RelayState::Closed);
    }

    async fn send_to_client(&mut self, value: Value) {
        if self.client.send(value).await.is_err() {
            tracing::debug!("lsp client channel closed");
            self.client_gone = true;
        }
    }

    async fn close(&mut self) {
        if let Some(conn) = self.server.take() {
            stop_server(conn, &mut self.decoder, self.config.shutdown_grace).await;
        }
        self.transition(RelayState::Closed);
    }

    fn transition(&mut self, next: RelayState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "lsp relay state");
            self.state = next;
        }
    }
}

async fn read_server(stdout: Option<&mut ServerOutput>, buf: &mut [u8]) -> std::io::Result<usize> {
    match stdout {
        Some(stdout) => stdout.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Resolves only if the writer task ends while the relay still holds its sender.
async fn writer_stopped(task: Option<&mut JoinHandle<std::io::Result<()>>>) -> String {
    let Some(task) = task else {
        return std::future::pending().await;
    };
    match task.await {
        Ok(Ok(())) => "language server input closed".to_string(),
        Ok(Err(err)) => format!("writing to language server failed: {err}"),
        Err(err) => format!("language server writer stopped: {err}"),
    }
}

async fn write_frames(
    mut stdin: Box<dyn AsyncWrite + Send + Unpin>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) -> std::io::Result<()> {
    while let Some(frame) = frames.recv().await {
        write_frame(&mut stdin, &frame).await?;
    }
    Ok(())
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

/// `shutdown` request, bounded wait for its response, `exit`, bounded wait for exit, kill.
async fn stop_server(conn: Connection, decoder: &mut FrameDecoder, grace: Duration) {
    let Connection {
        mut stdout,
        child,
        writer,
        mut writer_task,
    } = conn;
    let id = RequestId::String(SHUTDOWN_REQUEST_ID.to_string());

    let sent = match encode_message(&request(&id, Method::Shutdown, None)) {
        Ok(frame) => writer.send(frame).is_ok(),
        Err(_) => false,
    };
    if sent {
        match tokio::time::timeout(grace, await_response(&mut stdout, decoder, &id)).await {
            Ok(true) => tracing::debug!("language server acknowledged shutdown"),
            Ok(false) => tracing::debug!("language server closed before acknowledging shutdown"),
            Err(_) => tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "language server did not answer shutdown"
            ),
        }
        if let Ok(frame) = encode_message(&notification(Method::Exit, None)) {
            let _ = writer.send(frame);
        }
    }
    // The writer closes stdin once the queue is flushed.
    drop(writer);
    if tokio::time::timeout(grace, &mut writer_task).await.is_err() {
        tracing::warn!("language server stopped reading its input");
        writer_task.abort();
    }

    if let Some(mut child) = child {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(status = %status, "language server exited"),
            Ok(Err(err)) => tracing::warn!(error = %err, "waiting for language server failed"),
            Err(_) => {
                tracing::warn!("language server did not exit in time; killing");
                if let Err(err) = child.kill().await {
                    tracing::warn!(error = %err, "failed to kill language server");
                }
            }
        }
    }
}

async fn await_response<R>(reader: &mut R, decoder: &mut FrameDecoder, id: &RequestId) -> bool
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        loop {
            match decoder.next_frame() {
                Ok(Some(body)) => {
                    let Ok(value) = serde_json::from_slice::<Value>(&body) else {
                        continue;
                    };
                    if let Ok(Message::Response { id: Some(got), .. }) = Message::from_value(&value)
                    {
                        if &got == id {
                            return true;
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => continue,
            }
        }
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => return false,
            Ok(read) => decoder.push(&chunk[..read]),
        }
    }
}

pub fn root_uri(root: &Path) -> Option<String> {
    Url::from_file_path(root).ok().map(|url| url.to_string())
}

/// Points `rootPath`, `rootUri` and `workspaceFolders` of an `initialize` request at `root`.
pub fn patch_initialize_params(message: &mut Value, root: &Path) {
    let Some(object) = message.as_object_mut() else {
        return;
    };
    let params = object.entry("params").or_insert_with(|| json!({}));
    if params.is_null() {
        *params = json!({});
    }
    let Some(params) = params.as_object_mut() else {
        return;
    };

    params.insert("rootPath".to_string(), json!(root.display().to_string()));
    if let Some(uri) = root_uri(root) {
        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string());
        params.insert("rootUri".to_string(), json!(uri));
        params.insert(
            "workspaceFolders".to_string(),
            json!([{ "uri": uri, "name": name }]),
        );
    }
}

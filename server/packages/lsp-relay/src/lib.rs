//! Bridges an LSP client that speaks bare JSON messages to a stdio language server
//! that speaks `Content-Length` framed JSON-RPC.

pub mod codec;
pub mod message;
pub mod pending;
pub mod process;
pub mod relay;

pub use codec::{encode_frame, encode_message, FrameDecoder, FrameError};
pub use message::{Message, Method, RequestId};
pub use process::{LanguageServerConfig, ProcessLauncher, ServerIo, ServerLauncher};
pub use relay::{root_uri, Relay, RelayConfig, RelayReport, RelayState, DEFAULT_SHUTDOWN_GRACE};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to start language server {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("language server {0} pipe was not captured")]
    MissingPipe(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

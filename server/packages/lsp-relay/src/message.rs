//! Typed view over the JSON-RPC 2.0 messages that cross the relay.
//!
//! The relay forwards the original JSON verbatim; these types only drive
//! dispatch and logging.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(value) => write!(f, "{value}"),
            RequestId::String(value) => write!(f, "{value}"),
        }
    }
}

/// LSP methods the IDE client and the Python language server exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Initialize,
    Initialized,
    Shutdown,
    Exit,
    DidOpen,
    DidChange,
    DidSave,
    DidClose,
    Completion,
    CompletionResolve,
    Hover,
    Definition,
    References,
    SignatureHelp,
    DocumentSymbol,
    Formatting,
    Rename,
    CodeAction,
    PublishDiagnostics,
    LogMessage,
    ShowMessage,
    CancelRequest,
    Progress,
    Other(String),
}

impl Method {
    pub fn parse(name: &str) -> Self {
        match name {
            "initialize" => Method::Initialize,
            "initialized" => Method::Initialized,
            "shutdown" => Method::Shutdown,
            "exit" => Method::Exit,
            "textDocument/didOpen" => Method::DidOpen,
            "textDocument/didChange" => Method::DidChange,
            "textDocument/didSave" => Method::DidSave,
            "textDocument/didClose" => Method::DidClose,
            "textDocument/completion" => Method::Completion,
            "completionItem/resolve" => Method::CompletionResolve,
            "textDocument/hover" => Method::Hover,
            "textDocument/definition" => Method::Definition,
            "textDocument/references" => Method::References,
            "textDocument/signatureHelp" => Method::SignatureHelp,
            "textDocument/documentSymbol" => Method::DocumentSymbol,
            "textDocument/formatting" => Method::Formatting,
            "textDocument/rename" => Method::Rename,
            "textDocument/codeAction" => Method::CodeAction,
            "textDocument/publishDiagnostics" => Method::PublishDiagnostics,
            "window/logMessage" => Method::LogMessage,
            "window/showMessage" => Method::ShowMessage,
            "$/cancelRequest" => Method::CancelRequest,
            "$/progress" => Method::Progress,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Initialize => "initialize",
            Method::Initialized => "initialized",
            Method::Shutdown => "shutdown",
            Method::Exit => "exit",
            Method::DidOpen => "textDocument/didOpen",
            Method::DidChange => "textDocument/didChange",
            Method::DidSave => "textDocument/didSave",
            Method::DidClose => "textDocument/didClose",
            Method::Completion => "textDocument/completion",
            Method::CompletionResolve => "completionItem/resolve",
            Method::Hover => "textDocument/hover",
            Method::Definition => "textDocument/definition",
            Method::References => "textDocument/references",
            Method::SignatureHelp => "textDocument/signatureHelp",
            Method::DocumentSymbol => "textDocument/documentSymbol",
            Method::Formatting => "textDocument/formatting",
            Method::Rename => "textDocument/rename",
            Method::CodeAction => "textDocument/codeAction",
            Method::PublishDiagnostics => "textDocument/publishDiagnostics",
            Method::LogMessage => "window/logMessage",
            Method::ShowMessage => "window/showMessage",
            Method::CancelRequest => "$/cancelRequest",
            Method::Progress => "$/progress",
            Method::Other(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: RequestId,
        method: Method,
        params: Option<Value>,
    },
    Notification {
        method: Method,
        params: Option<Value>,
    },
    Response {
        id: Option<RequestId>,
        result: Option<Value>,
        error: Option<ResponseError>,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("invalid request id: {0}")]
    InvalidId(String),
    #[error("message has neither a method nor a result/error")]
    Unrecognized,
}

impl Message {
    pub fn from_value(value: &Value) -> Result<Self, MessageError> {
        let object = value.as_object().ok_or(MessageError::NotAnObject)?;
        let id = match object.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(
                serde_json::from_value::<RequestId>(raw.clone())
                    .map_err(|_| MessageError::InvalidId(raw.to_string()))?,
            ),
        };
        let params = object.get("params").cloned();

        if let Some(method) = object.get("method").and_then(Value::as_str) {
            let method = Method::parse(method);
            return Ok(match id {
                Some(id) => Message::Request { id, method, params },
                None => Message::Notification { method, params },
            });
        }

        if object.contains_key("result") || object.contains_key("error") {
            let error = object
                .get("error")
                .and_then(|raw| serde_json::from_value::<ResponseError>(raw.clone()).ok());
            return Ok(Message::Response {
                id,
                result: object.get("result").cloned(),
                error,
            });
        }

        Err(MessageError::Unrecognized)
    }

    pub fn method(&self) -> Option<&Method> {
        match self {
            Message::Request { method, .. } | Message::Notification { method, .. } => Some(method),
            Message::Response { .. } => None,
        }
    }
}

pub fn request(id: &RequestId, method: Method, params: Option<Value>) -> Value {
    let mut message = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method.as_str(),
    });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

pub fn notification(method: Method, params: Option<Value>) -> Value {
    let mut message = json!({
        "jsonrpc": "2.0",
        "method": method.as_str(),
    });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

pub fn error_response(id: Option<&RequestId>, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message.into(),
        },
    })
}

/// `window/showMessage` notification with the LSP `Error` message type.
pub fn show_error(message: impl Into<String>) -> Value {
    notification(
        Method::ShowMessage,
        Some(json!({ "type": 1, "message": message.into() })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_requests_notifications_and_responses() {
        let request = Message::from_value(&json!({
            "jsonrpc": "2.0", "id": 7, "method": "textDocument/hover", "params": {}
        }))
        .unwrap();
        assert_eq!(
            request,
            Message::Request {
                id: RequestId::Number(7),
                method: Method::Hover,
                params: Some(json!({})),
            }
        );

        let notification = Message::from_value(&json!({
            "jsonrpc": "2.0", "method": "initialized", "params": {}
        }))
        .unwrap();
        assert_eq!(notification.method(), Some(&Method::Initialized));

        let response = Message::from_value(&json!({
            "jsonrpc": "2.0", "id": "abc", "result": null
        }))
        .unwrap();
        assert!(matches!(
            response,
            Message::Response { id: Some(RequestId::String(ref id)), .. } if id == "abc"
        ));
    }

    #[test]
    fn unknown_methods_are_kept_by_name() {
        let message = Message::from_value(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "pylsp/executeCustom"
        }))
        .unwrap();
        assert_eq!(
            message.method(),
            Some(&Method::Other("pylsp/executeCustom".to_string()))
        );
        assert_eq!(Method::parse("textDocument/didChange").as_str(), "textDocument/didChange");
    }

    #[test]
    fn rejects_shapeless_messages() {
        assert_eq!(
            Message::from_value(&json!([1, 2])),
            Err(MessageError::NotAnObject)
        );
        assert_eq!(
            Message::from_value(&json!({"jsonrpc": "2.0"})),
            Err(MessageError::Unrecognized)
        );
        assert!(matches!(
            Message::from_value(&json!({"id": {"x": 1}, "method": "hover"})),
            Err(MessageError::InvalidId(_))
        ));
    }

    #[test]
    fn error_response_keeps_null_id() {
        let value = error_response(None, error_codes::PARSE_ERROR, "bad json");
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
    }
}

//! Error taxonomy shared by the IDE server crates.
//!
//! Every failure surfaced over HTTP is an [`IdeError`]; the HTTP boundary
//! renders it as [`ProblemDetails`] (`{"error", "type", "status"}`).

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    PathEscape,
    NotFound,
    InvalidRequest,
    Conflict,
    IoError,
    ProcessSpawnFailure,
    ProtocolParseError,
    UploadError,
}

impl ErrorType {
    pub fn status(&self) -> u16 {
        match self {
            ErrorType::PathEscape => 403,
            ErrorType::NotFound => 404,
            ErrorType::InvalidRequest
            | ErrorType::ProtocolParseError
            | ErrorType::UploadError => 400,
            ErrorType::Conflict => 409,
            ErrorType::IoError | ErrorType::ProcessSpawnFailure => 500,
        }
    }
}

/// JSON error envelope returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
pub struct ProblemDetails {
    pub error: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub status: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum IdeError {
    #[error("path escapes the workspace: {path}")]
    PathEscape { path: String },
    #[error("not found: {path}")]
    NotFound { path: String },
    #[error("{message}")]
    InvalidRequest { message: String },
    #[error("already exists: {path}")]
    Conflict { path: String },
    #[error("io error: {message}")]
    Io { message: String },
    #[error("failed to start {program}: {message}")]
    ProcessSpawn { program: String, message: String },
    #[error("malformed message: {message}")]
    ProtocolParse { message: String },
    #[error("upload failed: {message}")]
    Upload { message: String },
}

impl IdeError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            IdeError::PathEscape { .. } => ErrorType::PathEscape,
            IdeError::NotFound { .. } => ErrorType::NotFound,
            IdeError::InvalidRequest { .. } => ErrorType::InvalidRequest,
            IdeError::Conflict { .. } => ErrorType::Conflict,
            IdeError::Io { .. } => ErrorType::IoError,
            IdeError::ProcessSpawn { .. } => ErrorType::ProcessSpawnFailure,
            IdeError::ProtocolParse { .. } => ErrorType::ProtocolParseError,
            IdeError::Upload { .. } => ErrorType::UploadError,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        IdeError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Maps an io error on `path`, keeping `NotFound` and `AlreadyExists` distinct.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IdeError::NotFound {
                path: path.display().to_string(),
            },
            std::io::ErrorKind::AlreadyExists => IdeError::Conflict {
                path: path.display().to_string(),
            },
            _ => IdeError::Io {
                message: format!("{}: {err}", path.display()),
            },
        }
    }

    pub fn to_problem_details(&self) -> ProblemDetails {
        let error_type = self.error_type();
        ProblemDetails {
            error: self.to_string(),
            error_type,
            status: error_type.status(),
        }
    }
}

impl From<std::io::Error> for IdeError {
    fn from(err: std::io::Error) -> Self {
        IdeError::Io {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_details_carry_type_and_status() {
        let err = IdeError::PathEscape {
            path: "../etc/passwd".to_string(),
        };
        let problem = err.to_problem_details();
        assert_eq!(problem.status, 403);
        assert_eq!(problem.error_type, ErrorType::PathEscape);
        assert!(problem.error.contains("../etc/passwd"));

        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["type"], "path_escape");
        assert_eq!(json["status"], 403);
    }

    #[test]
    fn io_errors_map_by_kind() {
        let path = Path::new("missing.py");
        let err = IdeError::from_io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, IdeError::NotFound { .. }));

        let err = IdeError::from_io(
            path,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "there"),
        );
        assert_eq!(err.error_type().status(), 409);

        let err = IdeError::from_io(
            path,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert_eq!(err.error_type(), ErrorType::IoError);
    }
}

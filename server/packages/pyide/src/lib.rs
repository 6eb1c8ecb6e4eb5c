//! Backend for the browser Python IDE: sandboxed workspace files, code
//! execution, and a WebSocket relay to a Python language server.

pub mod archive;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod lsp;
pub mod router;
pub mod runner;
pub mod stdlib;
pub mod telemetry;
pub mod ui;
pub mod workspace;

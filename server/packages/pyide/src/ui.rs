//! Serves the browser client from a directory so one binary hosts both halves.

use std::path::Path;

use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

/// Static files under `dir`, falling back to `index.html` for client-side routes.
pub fn router(dir: &Path) -> Router {
    let index = dir.join("index.html");
    let service = ServeDir::new(dir)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(index));
    Router::new().fallback_service(service)
}

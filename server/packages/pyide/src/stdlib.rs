//! Read-only browsing of the interpreter's standard library sources, used by
//! the editor to open go-to-definition targets outside the workspace.

use std::path::{Path, PathBuf};
use std::process::Command;

use pyide_error::IdeError;

use crate::workspace::Workspace;

const STDLIB_QUERY: &str = "import sysconfig; print(sysconfig.get_paths()['stdlib'])";

/// Asks `python` where its standard library lives.
pub fn detect_stdlib_dir(python: &str) -> Option<PathBuf> {
    let output = match Command::new(python).arg("-c").arg(STDLIB_QUERY).output() {
        Ok(output) => output,
        Err(err) => {
            tracing::warn!(python, error = %err, "could not query stdlib location");
            return None;
        }
    };
    if !output.status.success() {
        tracing::warn!(
            python,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "stdlib query failed"
        );
        return None;
    }
    let dir = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!dir.is_empty()).then(|| PathBuf::from(dir))
}

#[derive(Debug, Clone, Default)]
pub struct Stdlib {
    tree: Option<Workspace>,
}

impl Stdlib {
    pub fn new(dir: Option<&Path>) -> Self {
        let tree = dir.and_then(|dir| match Workspace::open(dir) {
            Ok(tree) => Some(tree),
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "stdlib directory unavailable");
                None
            }
        });
        Self { tree }
    }

    pub fn root(&self) -> Option<&Path> {
        self.tree.as_ref().map(Workspace::root)
    }

    /// Same confinement rules as workspace paths.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, IdeError> {
        let tree = self.tree.as_ref().ok_or_else(|| IdeError::NotFound {
            path: format!("stdlib/{path}"),
        })?;
        tree.read_file(path)
    }
}

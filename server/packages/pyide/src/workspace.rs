//! Sandboxed filesystem access under the workspace root.
//!
//! Every caller-supplied path goes through [`Workspace::resolve`], which
//! normalizes it lexically and rejects anything that would land outside the
//! root before the filesystem is touched.

use std::fs;
use std::path::{Component, Path, PathBuf};

use pyide_error::IdeError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Names hidden from tree listings.
pub const IGNORED_NAMES: [&str; 5] = [
    "__pycache__",
    ".git",
    ".pytest_cache",
    ".mypy_cache",
    ".DS_Store",
];

const MAX_DUPLICATE_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Root-relative, `/`-separated.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<DirEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Opens `root`, creating it when missing.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, IdeError> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|err| IdeError::from_io(root, err))?;
        Self::open(root)
    }

    /// Opens an existing directory without creating it.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, IdeError> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|err| IdeError::from_io(root, err))?;
        if !root.is_dir() {
            return Err(IdeError::invalid(format!(
                "workspace root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a workspace path to an absolute path under the root.
    ///
    /// A leading `/` is relative to the root. `..` may not climb above the
    /// root, and an existing path (or its nearest existing ancestor) must stay
    /// under the root once symlinks are resolved.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, IdeError> {
        let relative = normalize(raw).ok_or_else(|| IdeError::PathEscape {
            path: raw.to_string(),
        })?;
        let candidate = self.root.join(relative);

        for ancestor in candidate.ancestors() {
            let Ok(canonical) = fs::canonicalize(ancestor) else {
                continue;
            };
            if !canonical.starts_with(&self.root) {
                tracing::warn!(path = raw, "path resolves outside the workspace");
                return Err(IdeError::PathEscape {
                    path: raw.to_string(),
                });
            }
            break;
        }
        Ok(candidate)
    }

    /// Root-relative `/`-separated form of an absolute path under the root.
    pub fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, IdeError> {
        let target = self.resolve(path)?;
        let metadata = fs::metadata(&target).map_err(|err| self.map_fs_error(&target, err))?;
        if metadata.is_dir() {
            return Err(IdeError::invalid(format!(
                "path is a directory: {}",
                self.relative(&target)
            )));
        }
        fs::read(&target).map_err(|err| self.map_fs_error(&target, err))
    }

    /// Writes `bytes`, creating parent directories; returns the normalized path.
    pub fn write_file(&self, path: &str, bytes: &[u8]) -> Result<String, IdeError> {
        let target = self.resolve(path)?;
        if target.is_dir() {
            return Err(IdeError::invalid(format!(
                "path is a directory: {}",
                self.relative(&target)
            )));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| self.map_fs_error(parent, err))?;
        }
        fs::write(&target, bytes).map_err(|err| self.map_fs_error(&target, err))?;
        tracing::debug!(path = %self.relative(&target), bytes = bytes.len(), "wrote file");
        Ok(self.relative(&target))
    }

    pub fn create_dir(&self, path: &str) -> Result<String, IdeError> {
        let target = self.resolve(path)?;
        if target.exists() && !target.is_dir() {
            return Err(IdeError::Conflict {
                path: self.relative(&target),
            });
        }
        fs::create_dir_all(&target).map_err(|err| self.map_fs_error(&target, err))?;
        Ok(self.relative(&target))
    }

    /// Deletes a file, or a directory with everything in it.
    pub fn delete(&self, path: &str) -> Result<String, IdeError> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(IdeError::invalid("cannot delete the workspace root"));
        }
        let metadata =
            fs::symlink_metadata(&target).map_err(|err| self.map_fs_error(&target, err))?;
        if metadata.is_dir() {
            fs::remove_dir_all(&target).map_err(|err| self.map_fs_error(&target, err))?;
        } else {
            fs::remove_file(&target).map_err(|err| self.map_fs_error(&target, err))?;
        }
        tracing::debug!(path = %self.relative(&target), "deleted entry");
        Ok(self.relative(&target))
    }

    /// Moves `from` to `to`. Never overwrites.
    pub fn rename(&self, from: &str, to: &str) -> Result<(String, String), IdeError> {
        let (source, destination) = self.transfer_paths(from, to)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| self.map_fs_error(parent, err))?;
        }
        fs::rename(&source, &destination).map_err(|err| self.map_fs_error(&source, err))?;
        Ok((self.relative(&source), self.relative(&destination)))
    }

    /// Recursively copies `from` to `to`. Never overwrites.
    ///
    /// Symlinks are not followed: a link to a file under the root is copied as
    /// that file's content, any other link is skipped.
    pub fn copy(&self, from: &str, to: &str) -> Result<(String, String), IdeError> {
        let (source, destination) = self.transfer_paths(from, to)?;
        self.copy_recursive(&source, &destination)
            .map_err(|err| self.map_fs_error(&destination, err))?;
        Ok((self.relative(&source), self.relative(&destination)))
    }

    /// Copies `path` next to itself as `name_copy.ext`, `name_copy2.ext`, ...
    pub fn duplicate(&self, path: &str) -> Result<(String, String), IdeError> {
        let source = self.resolve(path)?;
        if !source.exists() {
            return Err(IdeError::NotFound {
                path: self.relative(&source),
            });
        }
        let parent = source
            .parent()
            .ok_or_else(|| IdeError::invalid("cannot duplicate the workspace root"))?;
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let destination = (1..=MAX_DUPLICATE_ATTEMPTS)
            .map(|attempt| {
                let suffix = if attempt == 1 {
                    "_copy".to_string()
                } else {
                    format!("_copy{attempt}")
                };
                parent.join(format!("{stem}{suffix}{extension}"))
            })
            .find(|candidate| !candidate.exists())
            .ok_or_else(|| IdeError::Conflict {
                path: self.relative(&source),
            })?;

        let source = self.relative(&source);
        let destination = self.relative(&destination);
        self.copy(&source, &destination)
    }

    /// Recursive listing: directories first, then by name, ignored names skipped.
    pub fn list_tree(&self, path: &str) -> Result<Vec<DirEntry>, IdeError> {
        let target = self.resolve(path)?;
        let metadata = fs::metadata(&target).map_err(|err| self.map_fs_error(&target, err))?;
        if !metadata.is_dir() {
            return Err(IdeError::invalid(format!(
                "path is not a directory: {}",
                self.relative(&target)
            )));
        }
        self.read_tree(&target)
    }

    pub fn stat(&self, path: &str) -> Result<FileStat, IdeError> {
        let target = self.resolve(path)?;
        let metadata = fs::metadata(&target).map_err(|err| self.map_fs_error(&target, err))?;
        let modified = metadata
            .modified()
            .ok()
            .map(|time| chrono::DateTime::<chrono::Utc>::from(time).to_rfc3339());
        Ok(FileStat {
            path: self.relative(&target),
            entry_type: entry_type(metadata.is_dir()),
            size: metadata.len(),
            modified,
        })
    }

    fn read_tree(&self, dir: &Path) -> Result<Vec<DirEntry>, IdeError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).map_err(|err| self.map_fs_error(dir, err))? {
            let entry = entry.map_err(|err| self.map_fs_error(dir, err))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if IGNORED_NAMES.contains(&name.as_str()) {
                continue;
            }
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|err| self.map_fs_error(&path, err))?;
            // Symlinked directories are listed but not descended into.
            let is_dir = file_type.is_dir() || (file_type.is_symlink() && path.is_dir());
            let children = if file_type.is_dir() {
                Some(self.read_tree(&path)?)
            } else if is_dir {
                Some(Vec::new())
            } else {
                None
            };
            entries.push(DirEntry {
                name,
                entry_type: entry_type(is_dir),
                path: self.relative(&path),
                children,
            });
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    fn transfer_paths(&self, from: &str, to: &str) -> Result<(PathBuf, PathBuf), IdeError> {
        let source = self.resolve(from)?;
        let destination = self.resolve(to)?;
        if source == self.root || destination == self.root {
            return Err(IdeError::invalid("cannot move or copy the workspace root"));
        }
        fs::symlink_metadata(&source).map_err(|err| self.map_fs_error(&source, err))?;
        if fs::symlink_metadata(&destination).is_ok() {
            return Err(IdeError::Conflict {
                path: self.relative(&destination),
            });
        }
        if destination.starts_with(&source) {
            return Err(IdeError::invalid(format!(
                "cannot move {} into itself",
                self.relative(&source)
            )));
        }
        Ok((source, destination))
    }

    fn copy_recursive(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        let file_type = fs::symlink_metadata(from)?.file_type();
        if file_type.is_symlink() {
            match fs::canonicalize(from) {
                Ok(target) if target.starts_with(&self.root) && target.is_file() => {
                    copy_file(&target, to)?;
                }
                _ => tracing::debug!(path = %self.relative(from), "skipping symlink during copy"),
            }
        } else if file_type.is_dir() {
            fs::create_dir_all(to)?;
            for entry in fs::read_dir(from)? {
                let entry = entry?;
                self.copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
            }
        } else {
            copy_file(from, to)?;
        }
        Ok(())
    }

    fn map_fs_error(&self, path: &Path, err: std::io::Error) -> IdeError {
        IdeError::from_io(Path::new(&self.relative(path)), err)
    }
}

/// Lexical normalization; `None` when `..` climbs above the root.
fn normalize(raw: &str) -> Option<PathBuf> {
    let mut parts = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Some(parts.into_iter().collect())
}

fn entry_type(is_dir: bool) -> EntryType {
    if is_dir {
        EntryType::Directory
    } else {
        EntryType::File
    }
}

fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| {
        let a_is_file = a.entry_type == EntryType::File;
        let b_is_file = b.entry_type == EntryType::File;
        a_is_file.cmp(&b_is_file).then_with(|| a.name.cmp(&b.name))
    });
}

fn copy_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(dir.path()).expect("workspace");
        (dir, workspace)
    }

    fn names(entries: &[DirEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    #[test]
    fn parent_escapes_are_rejected() {
        let (_dir, workspace) = workspace();
        for raw in ["../x", "a/../../x", "../../../etc/passwd", ".."] {
            assert!(
                matches!(workspace.resolve(raw), Err(IdeError::PathEscape { .. })),
                "{raw} should escape"
            );
        }
        assert!(!workspace.root().parent().unwrap().join("x").exists());
    }

    #[test]
    fn normalization_stays_inside_root() {
        let (_dir, workspace) = workspace();
        assert_eq!(
            workspace.resolve("a/../b").unwrap(),
            workspace.root().join("b")
        );
        assert_eq!(
            workspace.resolve("/pkg/./mod.py").unwrap(),
            workspace.root().join("pkg/mod.py")
        );
        assert_eq!(workspace.resolve("").unwrap(), workspace.root());
        assert_eq!(workspace.resolve("/").unwrap(), workspace.root());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_out_of_the_root_are_rejected() {
        let (_dir, workspace) = workspace();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), workspace.root().join("link")).unwrap();

        assert!(matches!(
            workspace.read_file("link/secret.txt"),
            Err(IdeError::PathEscape { .. })
        ));
        assert!(matches!(
            workspace.write_file("link/new.txt", b"x"),
            Err(IdeError::PathEscape { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn copy_skips_links_that_leave_the_root() {
        use std::os::unix::fs::symlink;

        let (_dir, workspace) = workspace();
        let root = workspace.root().to_path_buf();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        workspace.write_file("pkg/mod.py", b"x = 1\n").unwrap();
        workspace.write_file("notes.txt", b"notes").unwrap();
        symlink(outside.path().join("secret.txt"), root.join("pkg/link")).unwrap();
        symlink(outside.path(), root.join("pkg/outside")).unwrap();
        symlink(root.join("pkg"), root.join("pkg/again")).unwrap();
        symlink(root.join("notes.txt"), root.join("pkg/notes")).unwrap();

        workspace.copy("pkg", "pkg2").unwrap();
        let (_, duplicated) = workspace.duplicate("pkg").unwrap();
        assert_eq!(duplicated, "pkg_copy");

        for copy in ["pkg2", "pkg_copy"] {
            assert_eq!(workspace.read_file(&format!("{copy}/mod.py")).unwrap(), b"x = 1\n");
            assert_eq!(workspace.read_file(&format!("{copy}/notes")).unwrap(), b"notes");
            for skipped in ["link", "outside", "again"] {
                assert!(
                    std::fs::symlink_metadata(root.join(copy).join(skipped)).is_err(),
                    "{copy}/{skipped} was copied"
                );
            }
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_dir, workspace) = workspace();
        for (path, content) in [
            ("empty.py", ""),
            ("pkg/nested/mod.py", "def f():\n    return 'é'\n"),
        ] {
            workspace.write_file(path, content.as_bytes()).unwrap();
            assert_eq!(workspace.read_file(path).unwrap(), content.as_bytes());
        }
    }

    #[test]
    fn listing_is_sorted_and_skips_ignored_names() {
        let (_dir, workspace) = workspace();
        workspace.write_file("b.py", b"").unwrap();
        workspace.write_file("A.py", b"").unwrap();
        workspace.write_file("zeta/inner.py", b"").unwrap();
        workspace.create_dir("alpha").unwrap();
        workspace.write_file("__pycache__/b.cpython-311.pyc", b"").unwrap();
        workspace.write_file(".git/HEAD", b"").unwrap();

        let first = workspace.list_tree("").unwrap();
        assert_eq!(names(&first), ["alpha", "zeta", "A.py", "b.py"]);
        assert_eq!(first[1].path, "zeta");
        assert_eq!(first[1].children.as_ref().unwrap()[0].path, "zeta/inner.py");
        assert_eq!(first[0].children, Some(Vec::new()));
        assert_eq!(first[2].children, None);
        assert_eq!(workspace.list_tree("/").unwrap(), first);
    }

    #[test]
    fn listing_a_file_is_invalid() {
        let (_dir, workspace) = workspace();
        workspace.write_file("main.py", b"").unwrap();
        assert!(matches!(
            workspace.list_tree("main.py"),
            Err(IdeError::InvalidRequest { .. })
        ));
        assert!(matches!(
            workspace.list_tree("missing"),
            Err(IdeError::NotFound { .. })
        ));
    }

    #[test]
    fn reading_missing_or_directory_paths_fails() {
        let (_dir, workspace) = workspace();
        workspace.create_dir("pkg").unwrap();
        assert!(matches!(
            workspace.read_file("nope.py"),
            Err(IdeError::NotFound { ref path }) if path == "nope.py"
        ));
        assert!(matches!(
            workspace.read_file("pkg"),
            Err(IdeError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn delete_removes_directories_recursively_but_not_the_root() {
        let (_dir, workspace) = workspace();
        workspace.write_file("pkg/sub/a.py", b"x").unwrap();
        assert_eq!(workspace.delete("pkg").unwrap(), "pkg");
        assert!(!workspace.root().join("pkg").exists());

        assert!(matches!(
            workspace.delete("/"),
            Err(IdeError::InvalidRequest { .. })
        ));
        assert!(matches!(
            workspace.delete("pkg"),
            Err(IdeError::NotFound { .. })
        ));
    }

    #[test]
    fn rename_creates_parents_and_refuses_to_overwrite() {
        let (_dir, workspace) = workspace();
        workspace.write_file("a.py", b"a").unwrap();
        workspace.write_file("b.py", b"b").unwrap();

        assert!(matches!(
            workspace.rename("a.py", "b.py"),
            Err(IdeError::Conflict { .. })
        ));
        let (from, to) = workspace.rename("a.py", "lib/util/a.py").unwrap();
        assert_eq!((from.as_str(), to.as_str()), ("a.py", "lib/util/a.py"));
        assert_eq!(workspace.read_file("lib/util/a.py").unwrap(), b"a");
        assert!(matches!(
            workspace.rename("lib", "lib/inner"),
            Err(IdeError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn copy_walks_directories() {
        let (_dir, workspace) = workspace();
        workspace.write_file("pkg/__init__.py", b"").unwrap();
        workspace.write_file("pkg/sub/mod.py", b"x = 1\n").unwrap();

        workspace.copy("pkg", "pkg2").unwrap();
        assert_eq!(workspace.read_file("pkg2/sub/mod.py").unwrap(), b"x = 1\n");
        assert!(workspace.root().join("pkg/sub/mod.py").exists());
    }

    #[test]
    fn duplicate_picks_the_first_free_name() {
        let (_dir, workspace) = workspace();
        workspace.write_file("src/main.py", b"print(1)\n").unwrap();

        let (_, first) = workspace.duplicate("src/main.py").unwrap();
        let (_, second) = workspace.duplicate("src/main.py").unwrap();
        assert_eq!(first, "src/main_copy.py");
        assert_eq!(second, "src/main_copy2.py");
        assert_eq!(workspace.read_file(&second).unwrap(), b"print(1)\n");

        let (_, dir_copy) = workspace.duplicate("src").unwrap();
        assert_eq!(dir_copy, "src_copy");
    }

    #[test]
    fn create_dir_conflicts_with_files() {
        let (_dir, workspace) = workspace();
        workspace.write_file("data", b"").unwrap();
        assert!(matches!(
            workspace.create_dir("data"),
            Err(IdeError::Conflict { .. })
        ));
        assert_eq!(workspace.create_dir("a/b/c").unwrap(), "a/b/c");
    }

    #[test]
    fn stat_reports_type_and_size() {
        let (_dir, workspace) = workspace();
        workspace.write_file("main.py", b"print()\n").unwrap();
        let stat = workspace.stat("main.py").unwrap();
        assert_eq!(stat.entry_type, EntryType::File);
        assert_eq!(stat.size, 8);
        assert!(stat.modified.is_some());
        assert_eq!(workspace.stat("").unwrap().entry_type, EntryType::Directory);
    }
}

//! Workspace path guard and atomic file writes.
//!
//! Filenames arrive from callers. Every path is normalized lexically first
//! (no absolute paths, no `..` climbing above the root), then checked again
//! against the canonical root so a symlink inside the workspace cannot point
//! the write elsewhere.

use crate::error::{AuthorityError, AuthorityResult};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `filename` to a path under the root, or `WorkspaceEscape`.
    ///
    /// No file is created or opened.
    pub async fn resolve(&self, filename: &str) -> AuthorityResult<PathBuf> {
        let relative = normalize(filename)?;
        let candidate = self.root.join(&relative);

        // Root may not exist yet; nothing under it can then be a symlink.
        let canonical_root = match tokio::fs::canonicalize(&self.root).await {
            Ok(root) => root,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(candidate),
            Err(e) => {
                return Err(AuthorityError::FileRead {
                    path: self.root.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        // Canonicalize the deepest existing ancestor.
        let mut existing = candidate.clone();
        loop {
            match tokio::fs::canonicalize(&existing).await {
                Ok(resolved) => {
                    if !resolved.starts_with(&canonical_root) {
                        warn!(filename, resolved = %resolved.display(), "Path escapes workspace via symlink");
                        return Err(AuthorityError::WorkspaceEscape(filename.to_string()));
                    }
                    break;
                }
                Err(_) => {
                    if !existing.pop() || existing == self.root {
                        break;
                    }
                }
            }
        }

        Ok(candidate)
    }

    /// Current content of `filename`, or empty text when it does not exist.
    pub async fn read_or_empty(&self, filename: &str) -> AuthorityResult<String> {
        let path = self.resolve(filename).await?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(AuthorityError::FileRead {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Write `content` to `filename` by write-then-rename.
    ///
    /// Returns the final path. A failure leaves any previous file untouched.
    pub async fn write_atomic(&self, filename: &str, content: &str) -> AuthorityResult<PathBuf> {
        let path = self.resolve(filename).await?;
        let write_err = |e: std::io::Error| AuthorityError::FileWrite {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&parent).await.map_err(write_err)?;

        let stem = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{stem}.{}.tmp", uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp, content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }

        debug!(path = %path.display(), bytes = content.len(), "Wrote workspace file");
        Ok(path)
    }
}

/// Lexical normalization: relative, no root or prefix, no net `..`.
fn normalize(filename: &str) -> AuthorityResult<PathBuf> {
    let escape = || AuthorityError::WorkspaceEscape(filename.to_string());
    if filename.trim().is_empty() {
        return Err(AuthorityError::Validation("filename must not be empty".to_string()));
    }

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(filename).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    if parts.is_empty() {
        return Err(escape());
    }
    Ok(parts.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_escapes() {
        assert!(matches!(normalize("../x.py"), Err(AuthorityError::WorkspaceEscape(_))));
        assert!(matches!(normalize("a/../../x.py"), Err(AuthorityError::WorkspaceEscape(_))));
        assert!(matches!(normalize("/etc/passwd"), Err(AuthorityError::WorkspaceEscape(_))));
        assert!(matches!(normalize("."), Err(AuthorityError::WorkspaceEscape(_))));
        assert!(matches!(normalize(""), Err(AuthorityError::Validation(_))));
    }

    #[test]
    fn normalize_keeps_inner_paths() {
        assert_eq!(normalize("pkg/./mod.py").unwrap(), PathBuf::from("pkg/mod.py"));
        assert_eq!(normalize("pkg/sub/../mod.py").unwrap(), PathBuf::from("pkg/mod.py"));
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("ws"));

        assert_eq!(workspace.read_or_empty("a/b.py").await.unwrap(), "");
        let path = workspace.write_atomic("a/b.py", "x = 1\n").await.unwrap();
        assert!(path.ends_with("a/b.py"));
        assert_eq!(workspace.read_or_empty("a/b.py").await.unwrap(), "x = 1\n");

        workspace.write_atomic("a/b.py", "x = 2\n").await.unwrap();
        assert_eq!(workspace.read_or_empty("a/b.py").await.unwrap(), "x = 2\n");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("ws/a"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_out_of_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = dir.path().join("outside");
        let root = dir.path().join("ws");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let workspace = Workspace::new(&root);
        assert!(matches!(
            workspace.write_atomic("link/evil.py", "x").await,
            Err(AuthorityError::WorkspaceEscape(_))
        ));
        assert!(!outside.join("evil.py").exists());
    }
}

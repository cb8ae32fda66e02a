//! Path validation: keeps file tools inside the project directory.
//!
//! The model names files relative to the project root. Every path goes
//! through [`ProjectSandbox::resolve`] before a tool touches the disk:
//! traversal sequences are rejected, the path is anchored at the root,
//! symlinks are resolved through the nearest existing ancestor, and the
//! result must stay under the root and outside every forbidden prefix.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the project directory")]
    OutsideProject { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// The project root plus the forbidden prefixes tools must respect.
#[derive(Debug, Clone)]
pub struct ProjectSandbox {
    root: PathBuf,
    forbidden: Vec<PathBuf>,
    forbidden_patterns: Vec<String>,
}

impl ProjectSandbox {
    /// Create a sandbox rooted at `root`, which must exist.
    pub fn new(root: impl AsRef<Path>, forbidden_paths: &[String]) -> Result<Self, PathValidationError> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            root,
            forbidden: forbidden_paths.iter().map(|p| PathBuf::from(expand_tilde(p))).collect(),
            forbidden_patterns: forbidden_paths.to_vec(),
        })
    }

    /// The canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a model-supplied path to an absolute path inside the project.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathValidationError> {
        let trimmed = path.trim();
        let candidate = Path::new(if trimmed.is_empty() { "." } else { trimmed });

        if candidate.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PathValidationError::PathTraversal { path: path.into() });
        }

        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        let resolved = canonicalize_lenient(&joined).map_err(|reason| {
            PathValidationError::CanonicalizeFailed {
                path: path.into(),
                reason,
            }
        })?;

        for (prefix, pattern) in self.forbidden.iter().zip(&self.forbidden_patterns) {
            if resolved.starts_with(prefix) {
                return Err(PathValidationError::ForbiddenPath {
                    path: path.into(),
                    pattern: pattern.clone(),
                });
            }
        }

        if !resolved.starts_with(&self.root) {
            return Err(PathValidationError::OutsideProject { path: path.into() });
        }

        Ok(resolved)
    }

    /// A path relative to the project root, as shown to the model ("." for the root).
    pub fn relative(&self, absolute: &Path) -> String {
        match absolute.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".into(),
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => absolute.to_string_lossy().into_owned(),
        }
    }
}

/// Canonicalize the longest existing ancestor and re-attach the missing tail,
/// so paths that do not exist yet (write targets) still resolve symlinks.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf, String> {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();

    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return Ok(normalize(path)),
        }
    }

    let mut resolved = existing.canonicalize().map_err(|e| e.to_string())?;
    for part in tail.into_iter().rev() {
        resolved.push(part);
    }
    Ok(normalize(&resolved))
}

/// Drop `.` components.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, ProjectSandbox) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = ProjectSandbox::new(dir.path(), &[]).unwrap();
        (dir, sandbox)
    }

    #[test]
    fn relative_path_resolves_under_root() {
        let (_dir, sandbox) = sandbox();
        let resolved = sandbox.resolve("src/main.rs").unwrap();
        assert!(resolved.starts_with(sandbox.root()));
        assert_eq!(sandbox.relative(&resolved), "src/main.rs");
    }

    #[test]
    fn dot_resolves_to_root() {
        let (_dir, sandbox) = sandbox();
        let resolved = sandbox.resolve(".").unwrap();
        assert_eq!(resolved, sandbox.root());
        assert_eq!(sandbox.relative(&resolved), ".");
        assert_eq!(sandbox.resolve("").unwrap(), sandbox.root());
    }

    #[test]
    fn path_traversal_blocked() {
        let (_dir, sandbox) = sandbox();
        match sandbox.resolve("../../../etc/passwd").unwrap_err() {
            PathValidationError::PathTraversal { .. } => {}
            other => panic!("Expected PathTraversal, got: {other}"),
        }
        assert!(sandbox.resolve("src/../../secret").is_err());
    }

    #[test]
    fn absolute_path_outside_project_blocked() {
        let (_dir, sandbox) = sandbox();
        match sandbox.resolve("/usr/bin/env").unwrap_err() {
            PathValidationError::OutsideProject { .. } => {}
            other => panic!("Expected OutsideProject, got: {other}"),
        }
    }

    #[test]
    fn absolute_path_inside_project_allowed() {
        let (_dir, sandbox) = sandbox();
        let inside = sandbox.root().join("notes.txt");
        let resolved = sandbox.resolve(inside.to_str().unwrap()).unwrap();
        assert_eq!(resolved, inside);
    }

    #[test]
    fn forbidden_prefix_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().canonicalize().unwrap().join("secrets");
        let sandbox =
            ProjectSandbox::new(dir.path(), &[secrets.to_string_lossy().into_owned()]).unwrap();
        match sandbox.resolve("secrets/key.pem").unwrap_err() {
            PathValidationError::ForbiddenPath { pattern, .. } => {
                assert!(pattern.ends_with("secrets"));
            }
            other => panic!("Expected ForbiddenPath, got: {other}"),
        }
        assert!(sandbox.resolve("src/lib.rs").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_blocked() {
        let outside = tempfile::tempdir().unwrap();
        let (_dir, sandbox) = sandbox();
        std::os::unix::fs::symlink(outside.path(), sandbox.root().join("link")).unwrap();
        assert!(matches!(
            sandbox.resolve("link/file.txt"),
            Err(PathValidationError::OutsideProject { .. })
        ));
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(ProjectSandbox::new("/nonexistent/codeloop/root", &[]).is_err());
    }
}

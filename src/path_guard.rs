//! Storage-root containment.
//!
//! Every user-supplied path goes through [`PathGuard::resolve`] before it is
//! handed to the filesystem: the input is normalized with [`normalize_path`],
//! joined onto the root, and then re-checked with [`is_within`] on the
//! resolved result. Normalization alone is never trusted; the containment
//! check runs at the point of use.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathGuardError {
    #[error("path is empty")]
    Empty,
    #[error("path traversal is not allowed: {0}")]
    Traversal(String),
    #[error("path escapes the storage root: {0}")]
    OutsideRoot(String),
}

/// Resolves user-supplied relative paths against a fixed storage root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalizes `input`, joins it onto the root and verifies the joined
    /// path still resolves inside the root.
    pub fn resolve(&self, input: &str) -> Result<PathBuf, PathGuardError> {
        let relative = normalize_path(input)?;
        let joined = self.root.join(relative);
        if !is_within(&self.root, &joined) {
            return Err(PathGuardError::OutsideRoot(input.to_string()));
        }
        Ok(joined)
    }
}

/// Normalizes a user-supplied relative path.
///
/// Leading root or drive prefixes are dropped so absolute input is treated as
/// root-relative, `.` segments are removed, and any `..` segment is rejected
/// outright. An input that normalizes to nothing is rejected as well.
pub fn normalize_path(input: &str) -> Result<PathBuf, PathGuardError> {
    let mut normalized = PathBuf::new();

    for component in Path::new(input.trim()).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => return Err(PathGuardError::Traversal(input.to_string())),
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathGuardError::Empty);
    }

    Ok(normalized)
}

/// Returns true iff `candidate` resolves to `root` itself or to a path nested
/// under it.
///
/// Both sides are made absolute, the longest existing ancestor is
/// canonicalized (so symlinks pointing out of the root are caught) and the
/// non-existent remainder is normalized lexically. The target does not need
/// to exist.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    let root = resolve_absolute(root);
    let candidate = resolve_absolute(candidate);
    candidate.starts_with(&root)
}

fn resolve_absolute(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    let lexical = lexical_normalize(&absolute);

    let mut existing = lexical.as_path();
    let mut remainder: Vec<OsString> = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in remainder.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical,
        }
    }
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_keeps_plain_relative_paths() {
        assert_eq!(
            normalize_path("custom-documents/report.json").unwrap(),
            PathBuf::from("custom-documents/report.json")
        );
        assert_eq!(
            normalize_path("  ./folder/./file.txt ").unwrap(),
            PathBuf::from("folder/file.txt")
        );
    }

    #[test]
    fn normalize_treats_absolute_input_as_relative() {
        assert_eq!(
            normalize_path("/etc/passwd").unwrap(),
            PathBuf::from("etc/passwd")
        );
    }

    #[test]
    fn normalize_rejects_traversal_anywhere() {
        for input in ["..", "../secret", "../../etc", "a/../../b", "a/..", "folder/../x"] {
            assert!(
                matches!(normalize_path(input), Err(PathGuardError::Traversal(_))),
                "expected traversal rejection for {input}"
            );
        }
    }

    #[test]
    fn normalize_rejects_empty_results() {
        for input in ["", "   ", ".", "/", "./."] {
            assert_eq!(normalize_path(input), Err(PathGuardError::Empty));
        }
    }

    #[test]
    fn is_within_accepts_root_and_children() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        assert!(is_within(root, root));
        assert!(is_within(root, &root.join("a/b/c.json")));
    }

    #[test]
    fn is_within_rejects_escapes_whether_or_not_target_exists() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("documents");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(tmp.path().join("secret"), "x").unwrap();

        assert!(!is_within(&root, &root.join("../secret")));
        assert!(!is_within(&root, &root.join("../missing")));
        assert!(!is_within(&root, &root.join("a/../../../etc")));
    }

    #[test]
    fn is_within_compares_components_not_prefixes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("documents");
        let sibling = tmp.path().join("documents-archive/file.txt");
        assert!(!is_within(&root, &sibling));
    }

    #[cfg(unix)]
    #[test]
    fn is_within_rejects_symlink_escape() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("documents");
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        assert!(!is_within(&root, &root.join("link/file.txt")));
    }

    #[test]
    fn guard_resolves_inside_root() {
        let tmp = TempDir::new().unwrap();
        let guard = PathGuard::new(tmp.path());
        let resolved = guard.resolve("folder/file.txt").unwrap();
        assert_eq!(resolved, tmp.path().join("folder/file.txt"));
    }

    #[test]
    fn guard_rejects_traversal_before_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let guard = PathGuard::new(tmp.path().join("not-created-yet"));
        assert!(matches!(
            guard.resolve("../../etc"),
            Err(PathGuardError::Traversal(_))
        ));
        assert!(!tmp.path().join("not-created-yet").exists());
    }
}

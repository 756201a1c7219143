//! Folder creation inside the storage root.

use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

use crate::path_guard::{PathGuard, PathGuardError};

#[derive(Debug, Error)]
pub enum FolderError {
    #[error("Invalid folder name.")]
    Invalid(#[from] PathGuardError),
    #[error("Folder by that name already exists")]
    AlreadyExists,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FolderManager {
    guard: PathGuard,
}

impl FolderManager {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }

    /// Creates `name` (and any missing intermediate folders) under the
    /// storage root. The leaf is created with a single non-recursive call so
    /// a concurrent creator cannot slip between the check and the create.
    pub async fn create_folder(&self, name: &str) -> Result<PathBuf, FolderError> {
        let path = self.guard.resolve(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match tokio::fs::create_dir(&path).await {
            Ok(()) => {
                tracing::info!("created folder {}", path.display());
                Ok(path)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(FolderError::AlreadyExists),
            Err(e) => Err(FolderError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(tmp: &TempDir) -> FolderManager {
        FolderManager::new(PathGuard::new(tmp.path()))
    }

    #[tokio::test]
    async fn creates_nested_folders() {
        let tmp = TempDir::new().unwrap();
        let created = manager(&tmp).create_folder("reports/2024").await.unwrap();
        assert!(created.is_dir());
        assert_eq!(created, tmp.path().join("reports/2024"));
    }

    #[tokio::test]
    async fn existing_folder_is_reported() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("invoices")).unwrap();

        let err = manager(&tmp).create_folder("invoices").await.unwrap_err();
        assert!(matches!(err, FolderError::AlreadyExists));
        assert_eq!(err.to_string(), "Folder by that name already exists");
    }

    #[tokio::test]
    async fn existing_file_counts_as_taken() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("taken"), "x").unwrap();
        let err = manager(&tmp).create_folder("taken").await.unwrap_err();
        assert!(matches!(err, FolderError::AlreadyExists));
    }

    #[tokio::test]
    async fn traversal_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("documents");
        std::fs::create_dir(&root).unwrap();
        let manager = FolderManager::new(PathGuard::new(&root));

        let err = manager.create_folder("../../etc").await.unwrap_err();
        assert!(matches!(err, FolderError::Invalid(PathGuardError::Traversal(_))));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn blank_name_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let err = manager(&tmp).create_folder("  ").await.unwrap_err();
        assert!(matches!(err, FolderError::Invalid(PathGuardError::Empty)));
    }
}

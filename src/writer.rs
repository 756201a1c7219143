//! Persistence of converted page records into the document store.

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::{DocumentRecord, WrittenDocument};
use crate::path_guard::PathGuard;
use crate::record::UPLOAD_FOLDER;

/// Writes one record under a caller-chosen unique filename.
#[async_trait]
pub trait DocumentWriter: Send + Sync {
    async fn persist(&self, record: DocumentRecord, filename: &str) -> Result<WrittenDocument>;
}

/// Stores each record as pretty-printed JSON at
/// `<documents_root>/custom-documents/<filename>.json`.
pub struct JsonFileWriter {
    guard: PathGuard,
}

impl JsonFileWriter {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl DocumentWriter for JsonFileWriter {
    async fn persist(&self, record: DocumentRecord, filename: &str) -> Result<WrittenDocument> {
        let location = format!("{}/{}.json", UPLOAD_FOLDER, filename);
        let path = self.guard.resolve(&location)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let body = serde_json::to_vec_pretty(&record)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::debug!("wrote {}", location);
        Ok(WrittenDocument { record, location })
    }
}

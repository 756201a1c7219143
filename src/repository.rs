//! Lookup of documents that have been embedded into a workspace.
//!
//! A stored file referenced by any workspace document is considered embedded
//! and its location must not change, since workspaces key their vectors by
//! `docpath`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::EmbeddedDocument;

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Every workspace document whose `docpath` is one of `docpaths`.
    async fn find_by_docpath_in(&self, docpaths: &[String]) -> Result<Vec<EmbeddedDocument>>;
}

pub struct SqliteDocumentRepository {
    pool: SqlitePool,
}

impl SqliteDocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records that `docpath` has been embedded into `workspace_id`.
    pub async fn insert(
        &self,
        filename: &str,
        docpath: &str,
        workspace_id: i64,
    ) -> Result<EmbeddedDocument> {
        let doc_id = Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().timestamp();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO workspace_documents (doc_id, filename, docpath, workspace_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&doc_id)
        .bind(filename)
        .bind(docpath)
        .bind(workspace_id)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(EmbeddedDocument {
            id,
            doc_id,
            filename: filename.to_string(),
            docpath: docpath.to_string(),
            workspace_id,
            created_at,
        })
    }
}

#[async_trait]
impl DocumentRepository for SqliteDocumentRepository {
    async fn find_by_docpath_in(&self, docpaths: &[String]) -> Result<Vec<EmbeddedDocument>> {
        if docpaths.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; docpaths.len()].join(", ");
        let sql = format!(
            "SELECT id, doc_id, filename, docpath, workspace_id, created_at \
             FROM workspace_documents WHERE docpath IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for docpath in docpaths {
            query = query.bind(docpath);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| EmbeddedDocument {
                id: row.get("id"),
                doc_id: row.get("doc_id"),
                filename: row.get("filename"),
                docpath: row.get("docpath"),
                workspace_id: row.get("workspace_id"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn repository(tmp: &TempDir) -> SqliteDocumentRepository {
        let pool = db::connect_path(&tmp.path().join("vault.sqlite")).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        SqliteDocumentRepository::new(pool)
    }

    #[tokio::test]
    async fn finds_only_requested_docpaths() {
        let tmp = TempDir::new().unwrap();
        let repo = repository(&tmp).await;
        repo.insert("a.json", "custom-documents/a.json", 1).await.unwrap();
        repo.insert("a.json", "custom-documents/a.json", 2).await.unwrap();
        repo.insert("b.json", "custom-documents/b.json", 1).await.unwrap();

        let found = repo
            .find_by_docpath_in(&[
                "custom-documents/a.json".to_string(),
                "custom-documents/missing.json".to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|d| d.docpath == "custom-documents/a.json"));
    }

    #[tokio::test]
    async fn empty_lookup_skips_the_query() {
        let tmp = TempDir::new().unwrap();
        let repo = repository(&tmp).await;
        assert!(repo.find_by_docpath_in(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let tmp = TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("vault.sqlite")).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
        migrate::migrate_pool(&pool).await.unwrap();
    }
}

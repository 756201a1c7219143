use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates the schema on an open pool. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // One row per (stored file, workspace) embedding. `docpath` is the
    // storage-relative path of the file and is what moves are checked against.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workspace_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id TEXT NOT NULL UNIQUE,
            filename TEXT NOT NULL,
            docpath TEXT NOT NULL,
            workspace_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_workspace_documents_docpath ON workspace_documents(docpath)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

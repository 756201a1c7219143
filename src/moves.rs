//! Batch relocation of stored files.
//!
//! A file that any workspace has embedded keeps its location; everything else
//! is renamed concurrently, one independent outcome per requested pair.

use anyhow::Result;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::FileMove;
use crate::path_guard::{normalize_path, PathGuard, PathGuardError};
use crate::repository::DocumentRepository;

/// What happened to one `{from, to}` pair.
#[derive(Debug)]
pub enum MoveOutcome {
    Moved,
    /// `from` is referenced by a workspace document.
    Embedded,
    Rejected(PathGuardError),
    Failed(std::io::Error),
}

#[derive(Debug)]
pub struct MoveReport {
    pub outcomes: Vec<(FileMove, MoveOutcome)>,
}

impl MoveReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Pairs left in place without attempting a rename.
    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, MoveOutcome::Embedded | MoveOutcome::Rejected(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, MoveOutcome::Failed(_)))
            .count()
    }

    pub fn moved(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, MoveOutcome::Moved))
            .count()
    }

    /// `None` when nothing was skipped.
    pub fn message(&self) -> Option<String> {
        let skipped = self.skipped();
        (skipped > 0).then(|| {
            format!(
                "{}/{} files not moved. Unembed them from all workspaces.",
                skipped,
                self.total()
            )
        })
    }
}

#[derive(Clone)]
pub struct MoveService {
    repository: Arc<dyn DocumentRepository>,
    guard: PathGuard,
}

impl MoveService {
    pub fn new(repository: Arc<dyn DocumentRepository>, guard: PathGuard) -> Self {
        Self { repository, guard }
    }

    /// Moves every pair whose source is not embedded.
    ///
    /// A source counts as embedded when either its raw spelling or its
    /// normalized form matches a stored docpath, so `./a.json` and
    /// `/a.json` are both treated as `a.json`.
    ///
    /// Only a repository failure aborts the batch; per-pair errors are
    /// recorded in the report and never stop sibling moves.
    pub async fn move_files(&self, files: Vec<FileMove>) -> Result<MoveReport> {
        let mut lookup: Vec<String> = Vec::with_capacity(files.len() * 2);
        for pair in &files {
            lookup.push(pair.from.clone());
            if let Some(key) = docpath_key(&pair.from) {
                if key != pair.from {
                    lookup.push(key);
                }
            }
        }

        let embedded: HashSet<String> = self
            .repository
            .find_by_docpath_in(&lookup)
            .await?
            .into_iter()
            .flat_map(|doc| {
                let key = docpath_key(&doc.docpath);
                std::iter::once(doc.docpath).chain(key)
            })
            .collect();

        let moves = files.into_iter().map(|pair| {
            let is_embedded = embedded.contains(&pair.from)
                || docpath_key(&pair.from).is_some_and(|key| embedded.contains(&key));
            async move {
                let outcome = if is_embedded {
                    MoveOutcome::Embedded
                } else {
                    self.relocate(&pair).await
                };
                (pair, outcome)
            }
        });
        let outcomes = join_all(moves).await;

        for (pair, outcome) in &outcomes {
            match outcome {
                MoveOutcome::Moved => tracing::debug!("moved {} to {}", pair.from, pair.to),
                MoveOutcome::Embedded => {
                    tracing::info!("{} is embedded in a workspace; left in place", pair.from)
                }
                MoveOutcome::Rejected(e) => {
                    tracing::warn!("rejected move {} -> {}: {}", pair.from, pair.to, e)
                }
                MoveOutcome::Failed(e) => {
                    tracing::error!("error moving file {} to {}: {}", pair.from, pair.to, e)
                }
            }
        }

        Ok(MoveReport { outcomes })
    }

    async fn relocate(&self, pair: &FileMove) -> MoveOutcome {
        let source = match self.guard.resolve(&pair.from) {
            Ok(path) => path,
            Err(e) => return MoveOutcome::Rejected(e),
        };
        let destination = match self.guard.resolve(&pair.to) {
            Ok(path) => path,
            Err(e) => return MoveOutcome::Rejected(e),
        };

        match tokio::fs::rename(&source, &destination).await {
            Ok(()) => MoveOutcome::Moved,
            Err(e) => MoveOutcome::Failed(e),
        }
    }
}

/// Canonical `/`-separated spelling of a storage-relative path, or `None`
/// when the path cannot be normalized.
fn docpath_key(input: &str) -> Option<String> {
    let normalized = normalize_path(input).ok()?;
    let parts: Vec<String> = normalized
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

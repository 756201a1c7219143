//! # Page Vault CLI (`pvault`)
//!
//! The `pvault` binary converts uploaded documents into per-page records and
//! manages the document store they land in.
//!
//! ## Usage
//!
//! ```bash
//! pvault --config ./config/pvault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pvault init` | Create the SQLite database and run schema migrations |
//! | `pvault serve` | Start the HTTP server |
//! | `pvault convert <file>` | Convert one file into per-page documents |
//! | `pvault mkdir <name>` | Create a folder in the document store |
//! | `pvault mv <from> <to> [--pair <from>=<to>]...` | Move stored files that no workspace has embedded |
//!
//! Logging goes through `tracing`; set `RUST_LOG=debug` for per-page detail.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use page_vault::config;
use page_vault::convert::Converter;
use page_vault::folders::FolderManager;
use page_vault::models::FileMove;
use page_vault::moves::MoveService;
use page_vault::path_guard::PathGuard;
use page_vault::repository::SqliteDocumentRepository;
use page_vault::{db, migrate, server};

/// Page Vault: page-level document ingestion with guarded storage management.
#[derive(Parser)]
#[command(name = "pvault", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pvault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Convert a file into per-page JSON documents under the documents root.
    ///
    /// The source file is disposed of according to
    /// `[conversion].source_disposal`.
    Convert {
        /// File to convert.
        path: PathBuf,

        /// Display name recorded in each page (defaults to the file name).
        #[arg(long)]
        name: Option<String>,
    },

    /// Create a folder (and any missing parents) in the document store.
    Mkdir {
        /// Folder path relative to the documents root.
        name: String,
    },

    /// Move stored files as one batch. Files embedded in any workspace are
    /// left in place.
    Mv {
        /// Current path relative to the documents root.
        from: String,
        /// New path relative to the documents root.
        to: String,
        /// Further moves in the same batch, as `<from>=<to>`.
        #[arg(long = "pair", value_name = "FROM=TO", value_parser = parse_move_pair)]
        pairs: Vec<FileMove>,
    },
}

fn parse_move_pair(raw: &str) -> Result<FileMove, String> {
    match raw.split_once('=') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() => Ok(FileMove {
            from: from.to_string(),
            to: to.to_string(),
        }),
        _ => Err(format!("expected <from>=<to>, got {:?}", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Convert { path, name } => {
            let filename = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .with_context(|| format!("No file name in {}", path.display()))?,
            };
            let result = Converter::from_config(&cfg).convert(&path, &filename).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                anyhow::bail!(
                    "Conversion failed: {}",
                    result.reason.unwrap_or_default()
                );
            }
        }
        Commands::Mkdir { name } => {
            let folders = FolderManager::new(PathGuard::new(&cfg.storage.documents_root));
            let created = folders.create_folder(&name).await?;
            println!("Created {}", created.display());
        }
        Commands::Mv { from, to, pairs } => {
            let pool = db::connect(&cfg).await?;
            migrate::migrate_pool(&pool).await?;
            let moves = MoveService::new(
                Arc::new(SqliteDocumentRepository::new(pool)),
                PathGuard::new(&cfg.storage.documents_root),
            );
            let mut batch = vec![FileMove { from, to }];
            batch.extend(pairs);
            let report = moves.move_files(batch).await?;
            if report.failed() > 0 {
                anyhow::bail!("Failed to move some files.");
            }
            match report.message() {
                Some(message) => println!("{}", message),
                None => println!("Moved."),
            }
        }
    }

    Ok(())
}

//! # Page Vault
//!
//! Page-level document ingestion and guarded storage management for
//! retrieval pipelines.
//!
//! Uploaded files are split into one JSON record per page (falling back to
//! OCR when a PDF has no text layer) and written into a document store.
//! The store is managed over HTTP: folders can be created, files moved,
//! downloaded or previewed, and every user-supplied path is confined to the
//! store's root.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌────────────┐   ┌───────────────────┐
//! │  hotdir  │──▶│ Extractors │──▶│  Records   │──▶│ documents_root/   │
//! │ uploads  │   │ (+ OCR)    │   │ per page   │   │ custom-documents/ │
//! └──────────┘   └────────────┘   └────────────┘   └─────────┬─────────┘
//!                                                            │
//!                                 ┌──────────────────────────┤
//!                                 ▼                          ▼
//!                           ┌──────────┐              ┌────────────┐
//!                           │   CLI    │              │    HTTP    │
//!                           │ (pvault) │              │ PathGuard  │
//!                           └──────────┘              └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`path_guard`] | Storage-root containment |
//! | [`extract`] | Page-aware text extraction |
//! | [`ocr`] | OCR fallback for image-only PDFs |
//! | [`tokenizer`] | Token count estimation |
//! | [`record`] | Per-page record assembly |
//! | [`writer`] | Record persistence |
//! | [`convert`] | Conversion pipeline |
//! | [`folders`] | Folder creation |
//! | [`moves`] | Batch file moves |
//! | [`file_server`] | File download and preview |
//! | [`repository`] | Embedded document lookup |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod convert;
pub mod db;
pub mod extract;
pub mod file_server;
pub mod folders;
pub mod migrate;
pub mod models;
pub mod moves;
pub mod ocr;
pub mod path_guard;
pub mod record;
pub mod repository;
pub mod server;
pub mod tokenizer;
pub mod writer;

//! Core data models used throughout Page Vault.
//!
//! These types represent the extracted pages, per-page document records, and
//! request payloads that flow through the conversion pipeline and the storage
//! management endpoints.

use serde::{Deserialize, Serialize};

/// Metadata read from a PDF's header and `Info` dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfMetadata {
    pub version: Option<String>,
    pub total_pages: Option<u32>,
    pub creator: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
}

/// One page of text produced by an extractor or an OCR pass.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    pub content: String,
    /// Page number reported by the extractor, when it knows one.
    pub page_number: Option<u32>,
    pub pdf: Option<PdfMetadata>,
}

impl ExtractedPage {
    pub fn new(content: impl Into<String>, page_number: Option<u32>) -> Self {
        Self {
            content: content.into(),
            page_number,
            pdf: None,
        }
    }
}

/// A normalized, page-level document ready for embedding.
///
/// Field names on the wire match what the embedding stage reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    pub id: String,
    pub url: String,
    pub title: String,
    #[serde(rename = "docAuthor")]
    pub doc_author: String,
    pub description: String,
    #[serde(rename = "docSource")]
    pub doc_source: String,
    #[serde(rename = "chunkSource")]
    pub chunk_source: String,
    pub published: String,
    #[serde(rename = "wordCount")]
    pub word_count: usize,
    #[serde(rename = "pageContent")]
    pub page_content: String,
    pub token_count_estimate: usize,
    #[serde(rename = "loc_pageNumber")]
    pub loc_page_number: Option<u32>,
    pub metadata_pdf_version: Option<String>,
    pub metadata_pdf_total_pages: Option<u32>,
    pub metadata_pdf_creator: Option<String>,
    pub metadata_pdf_title: Option<String>,
    pub metadata_pdf_author: Option<String>,
    pub metadata_pdf_subject: Option<String>,
    pub metadata_pdf_keywords: Option<String>,
    pub metadata_pdf_producer: Option<String>,
    pub metadata_pdf_creation_date: Option<String>,
    pub metadata_pdf_modification_date: Option<String>,
}

/// A record after it has been persisted, with its storage-relative location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WrittenDocument {
    #[serde(flatten)]
    pub record: DocumentRecord,
    pub location: String,
}

/// Outcome of a single page write within a conversion run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Written(WrittenDocument),
    Failed { filename: String, error: String },
}

impl PageOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, PageOutcome::Written(_))
    }
}

/// Result of converting one uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub success: bool,
    pub reason: Option<String>,
    pub documents: Vec<PageOutcome>,
}

impl ConversionResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            documents: Vec::new(),
        }
    }
}

/// A workspace document row: a stored file that has been embedded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedDocument {
    pub id: i64,
    pub doc_id: String,
    pub filename: String,
    pub docpath: String,
    pub workspace_id: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMove {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileMoveRequest {
    pub files: Vec<FileMove>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderCreateRequest {
    pub name: String,
}

//! Per-page document record assembly.
//!
//! Turns raw [`ExtractedPage`]s into [`DocumentRecord`]s: generates the id,
//! fills metadata defaults, counts words and tokens, and derives the unique
//! on-disk filename for each page.

use chrono::{DateTime, Utc};
use std::path::Path;
use uuid::Uuid;

use crate::models::{DocumentRecord, ExtractedPage};
use crate::tokenizer::Tokenizer;

pub const DEFAULT_AUTHOR: &str = "no author found";
pub const DEFAULT_DESCRIPTION: &str = "No description found.";
/// Storage folder that uploaded documents land in.
pub const UPLOAD_FOLDER: &str = "custom-documents";

/// Facts about the uploaded file shared by every page record.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    /// Format label from the extractor (`"pdf"`, `"docx"`, ...).
    pub format: String,
    pub published: String,
}

impl SourceFile {
    /// Reads the file's creation time from disk.
    pub async fn inspect(path: &Path, filename: &str, format: &str) -> Self {
        Self {
            filename: filename.to_string(),
            format: format.to_string(),
            published: created_date(path).await,
        }
    }
}

/// Creation time of a file, falling back to modification time on platforms
/// without birth time, and to now when the file cannot be stat'ed.
pub async fn created_date(path: &Path) -> String {
    let timestamp: DateTime<Utc> = match tokio::fs::metadata(path).await {
        Ok(meta) => meta
            .created()
            .or_else(|_| meta.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now()),
        Err(_) => Utc::now(),
    };
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Builds the record for the page at 0-based `position`.
pub fn build_record(
    source: &SourceFile,
    page: &ExtractedPage,
    position: usize,
    tokenizer: &dyn Tokenizer,
) -> DocumentRecord {
    let pdf = page.pdf.clone().unwrap_or_default();

    DocumentRecord {
        id: Uuid::new_v4().to_string(),
        url: format!("{}/{}", UPLOAD_FOLDER, source.filename),
        title: source.filename.clone(),
        doc_author: pdf
            .creator
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
        description: pdf
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        doc_source: format!("{} file uploaded by the user.", source.format),
        chunk_source: String::new(),
        published: source.published.clone(),
        word_count: page.content.split_whitespace().count(),
        page_content: page.content.clone(),
        token_count_estimate: tokenizer.estimate(&page.content),
        loc_page_number: Some(page.page_number.unwrap_or(position as u32 + 1)),
        metadata_pdf_version: pdf.version,
        metadata_pdf_total_pages: pdf.total_pages,
        metadata_pdf_creator: pdf.creator,
        metadata_pdf_title: pdf.title,
        metadata_pdf_author: pdf.author,
        metadata_pdf_subject: pdf.subject,
        metadata_pdf_keywords: pdf.keywords,
        metadata_pdf_producer: pdf.producer,
        metadata_pdf_creation_date: pdf.creation_date,
        metadata_pdf_modification_date: pdf.modification_date,
    }
}

/// `<filename>-page-<pageNumberOrIndex>-<id>`, with path separators
/// in the uploaded name flattened so the result is a single path segment.
pub fn page_filename(record: &DocumentRecord, position: usize) -> String {
    let base: String = record
        .title
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let page = record.loc_page_number.unwrap_or(position as u32 + 1);
    format!("{}-page-{}-{}", base, page, record.id)
}

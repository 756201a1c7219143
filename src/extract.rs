//! Page-aware text extraction.
//!
//! Each supported format has a [`PageExtractor`] that turns a file on disk
//! into an ordered list of [`ExtractedPage`]s. The [`ExtractorRegistry`] maps
//! file extensions to extractors and is what the converter consults.
//!
//! | Extension | Pages |
//! |-----------|-------|
//! | `.pdf` | one per PDF page with text; blank pages are dropped |
//! | `.docx` | one, the whole body |
//! | `.pptx` | one per slide |
//! | `.xlsx` | one per worksheet |
//! | `.txt`, `.md` | one, the file content |
//!
//! Parsing is CPU-bound and runs on the blocking pool.

use async_trait::async_trait;
use lopdf::{Dictionary, Object};
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{ExtractedPage, PdfMetadata};

/// Maximum worksheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Splits a file into pages of text.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Short format label used in record provenance (e.g. `"pdf"`).
    fn format(&self) -> &str;

    /// Whether an OCR pass should be attempted when this extractor finds no
    /// pages at all.
    fn ocr_fallback(&self) -> bool {
        false
    }

    async fn load(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractError>;
}

/// Extension → extractor lookup.
pub struct ExtractorRegistry {
    by_extension: HashMap<String, Arc<dyn PageExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Registry with every built-in format.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("pdf", Arc::new(PdfExtractor));
        registry.register("docx", Arc::new(DocxExtractor));
        registry.register("pptx", Arc::new(PptxExtractor));
        registry.register("xlsx", Arc::new(XlsxExtractor));
        let text: Arc<dyn PageExtractor> = Arc::new(TextExtractor);
        registry.register("txt", text.clone());
        registry.register("md", text);
        registry
    }

    /// Registers (or replaces) the extractor for an extension, without the dot.
    pub fn register(&mut self, extension: &str, extractor: Arc<dyn PageExtractor>) {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), extractor);
    }

    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn PageExtractor>, ExtractError> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        self.by_extension
            .get(&extension)
            .cloned()
            .ok_or_else(|| ExtractError::UnsupportedFormat(format!(".{}", extension)))
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

async fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    tokio::fs::read(path).await.map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })
}

async fn parse_blocking<F>(
    bytes: Vec<u8>,
    parse: F,
    on_panic: fn(String) -> ExtractError,
) -> Result<Vec<ExtractedPage>, ExtractError>
where
    F: FnOnce(&[u8]) -> Result<Vec<ExtractedPage>, ExtractError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || parse(&bytes))
        .await
        .map_err(|e| on_panic(e.to_string()))?
}

// ============ PDF ============

/// PDF text layer extraction, one page per PDF page.
///
/// Pages whose text layer is blank are dropped, so a scanned document with no
/// text layer yields no pages and becomes an OCR candidate.
pub struct PdfExtractor;

#[async_trait]
impl PageExtractor for PdfExtractor {
    fn format(&self) -> &str {
        "pdf"
    }

    fn ocr_fallback(&self) -> bool {
        true
    }

    async fn load(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
        let bytes = read_bytes(path).await?;
        parse_blocking(bytes, extract_pdf_pages, ExtractError::Pdf).await
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractError> {
    let texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut metadata = read_pdf_metadata(bytes);
    if metadata.total_pages.is_none() {
        metadata.total_pages = Some(texts.len() as u32);
    }

    Ok(texts
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(index, text)| ExtractedPage {
            content: text.trim().to_string(),
            page_number: Some(index as u32 + 1),
            pdf: Some(metadata.clone()),
        })
        .collect())
}

/// Reads the header version, page count and `Info` dictionary.
///
/// Metadata is best effort: a document lopdf cannot load (encrypted, damaged)
/// still converts, just without metadata.
pub fn read_pdf_metadata(bytes: &[u8]) -> PdfMetadata {
    let doc = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::debug!("PDF metadata unavailable: {}", e);
            return PdfMetadata::default();
        }
    };

    let mut metadata = PdfMetadata {
        version: Some(doc.version.clone()),
        total_pages: Some(doc.get_pages().len() as u32),
        ..PdfMetadata::default()
    };

    let info = doc.trailer.get(b"Info").ok().and_then(|obj| match obj {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    });

    if let Some(info) = info {
        metadata.creator = info_string(&doc, info, b"Creator");
        metadata.title = info_string(&doc, info, b"Title");
        metadata.author = info_string(&doc, info, b"Author");
        metadata.subject = info_string(&doc, info, b"Subject");
        metadata.keywords = info_string(&doc, info, b"Keywords");
        metadata.producer = info_string(&doc, info, b"Producer");
        metadata.creation_date = info_string(&doc, info, b"CreationDate");
        metadata.modification_date = info_string(&doc, info, b"ModDate");
    }

    metadata
}

fn info_string(doc: &lopdf::Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    let value = match info.get(key).ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    match value {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        _ => None,
    }
}

/// Decodes a PDF text string: UTF-16BE when it carries a byte order mark,
/// otherwise treated as single-byte PDFDocEncoding.
fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    let text = if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============ Plain text ============

pub struct TextExtractor;

#[async_trait]
impl PageExtractor for TextExtractor {
    fn format(&self) -> &str {
        "text"
    }

    async fn load(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
        let bytes = read_bytes(path).await?;
        let text = String::from_utf8_lossy(&bytes);
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ExtractedPage::new(text.into_owned(), Some(1))])
    }
}

// ============ OOXML ============

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entry names matching `<prefix><n>.xml`, sorted by `n`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Collects the text of every `<p>` paragraph, concatenating its `<t>` runs.
/// Works for both WordprocessingML (`w:`) and DrawingML (`a:`) namespaces.
fn collect_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    let tail = current.trim();
    if !tail.is_empty() {
        paragraphs.push(tail.to_string());
    }
    Ok(paragraphs)
}

pub struct DocxExtractor;

#[async_trait]
impl PageExtractor for DocxExtractor {
    fn format(&self) -> &str {
        "docx"
    }

    async fn load(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
        let bytes = read_bytes(path).await?;
        parse_blocking(bytes, extract_docx_pages, ExtractError::Ooxml).await
    }
}

fn extract_docx_pages(bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    let body = collect_paragraphs(&xml)?.join("\n");
    if body.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![ExtractedPage::new(body, Some(1))])
}

pub struct PptxExtractor;

#[async_trait]
impl PageExtractor for PptxExtractor {
    fn format(&self) -> &str {
        "pptx"
    }

    async fn load(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
        let bytes = read_bytes(path).await?;
        parse_blocking(bytes, extract_pptx_pages, ExtractError::Ooxml).await
    }
}

fn extract_pptx_pages(bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut pages = Vec::new();
    for (index, name) in numbered_entries(&archive, "ppt/slides/slide")
        .into_iter()
        .enumerate()
    {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = collect_paragraphs(&xml)?.join("\n");
        if !text.is_empty() {
            pages.push(ExtractedPage::new(text, Some(index as u32 + 1)));
        }
    }
    Ok(pages)
}

pub struct XlsxExtractor;

#[async_trait]
impl PageExtractor for XlsxExtractor {
    fn format(&self) -> &str {
        "xlsx"
    }

    async fn load(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
        let bytes = read_bytes(path).await?;
        parse_blocking(bytes, extract_xlsx_pages, ExtractError::Ooxml).await
    }
}

fn extract_xlsx_pages(bytes: &[u8]) -> Result<Vec<ExtractedPage>, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        let xml = read_zip_entry_bounded(&mut archive, "xl/sharedStrings.xml")?;
        read_shared_strings(&xml)?
    } else {
        Vec::new()
    };

    let mut pages = Vec::new();
    for (index, name) in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
        .enumerate()
    {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let cells = sheet_cells(&xml, &shared_strings)?;
        if !cells.is_empty() {
            pages.push(ExtractedPage::new(cells.join(" "), Some(index as u32 + 1)));
        }
    }
    Ok(pages)
}

/// One entry per `<si>`, with rich-text runs concatenated.
fn read_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell texts of one worksheet in document order: shared strings are looked
/// up, inline strings and literal values are taken as-is.
fn sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut cells = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut shared = false;
    let mut in_value = false;
    let mut in_inline = false;
    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared = e.attributes().flatten().any(|a| {
                        a.key.as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" => in_value = true,
                b"t" => in_inline = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_inline = false,
                b"c" => shared = false,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value || in_inline => {
                let raw = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                let value = raw.trim();
                if !value.is_empty() {
                    if in_value && shared {
                        if let Some(text) = value
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i))
                        {
                            cells.push(text.clone());
                        }
                    } else {
                        cells.push(value.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}

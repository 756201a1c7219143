//! Conversion of an uploaded file into per-page document records.
//!
//! ```text
//! load pages ──▶ (no pages? OCR) ──▶ build records ──▶ write all ──▶ dispose source
//! ```
//!
//! The OCR pass replaces the primary result wholesale and only runs when the
//! primary extractor returned no pages at all. Writes are dispatched together
//! and every outcome is collected before the source file is disposed of.

use anyhow::Result;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, SourceDisposal};
use crate::extract::{ExtractorRegistry, PageExtractor};
use crate::models::{ConversionResult, ExtractedPage, PageOutcome};
use crate::ocr::{build_ocr_engine, OcrEngine};
use crate::path_guard::PathGuard;
use crate::record::{build_record, page_filename, SourceFile};
use crate::tokenizer::{CharRatioTokenizer, Tokenizer};
use crate::writer::{DocumentWriter, JsonFileWriter};

pub struct Converter {
    extractors: Arc<ExtractorRegistry>,
    ocr: Arc<dyn OcrEngine>,
    tokenizer: Arc<dyn Tokenizer>,
    writer: Arc<dyn DocumentWriter>,
    disposal: SourceDisposal,
}

impl Converter {
    pub fn new(
        extractors: Arc<ExtractorRegistry>,
        ocr: Arc<dyn OcrEngine>,
        tokenizer: Arc<dyn Tokenizer>,
        writer: Arc<dyn DocumentWriter>,
        disposal: SourceDisposal,
    ) -> Self {
        Self {
            extractors,
            ocr,
            tokenizer,
            writer,
            disposal,
        }
    }

    /// Converter wired with the built-in extractors, the configured OCR
    /// engine and a JSON writer rooted at `storage.documents_root`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(ExtractorRegistry::with_builtins()),
            build_ocr_engine(&config.ocr),
            Arc::new(CharRatioTokenizer),
            Arc::new(JsonFileWriter::new(PathGuard::new(
                &config.storage.documents_root,
            ))),
            config.conversion.source_disposal,
        )
    }

    /// Converts the file at `path`, recording it under the display name
    /// `filename`.
    ///
    /// Zero pages after the OCR fallback is still a success with an empty
    /// document list. Failures to read or parse the file come back as
    /// `success: false` and leave the source in place.
    pub async fn convert(&self, path: &Path, filename: &str) -> ConversionResult {
        tracing::info!("-- Working {} --", filename);

        let extractor = match self.extractors.for_path(path) {
            Ok(extractor) => extractor,
            Err(e) => {
                tracing::warn!("{}: {}", filename, e);
                return ConversionResult::failed(e.to_string());
            }
        };

        let pages = match self.extract_pages(extractor.as_ref(), path, filename).await {
            Ok(pages) => pages,
            Err(e) => {
                tracing::error!("Failed to extract {}: {:#}", filename, e);
                return ConversionResult::failed(format!("{:#}", e));
            }
        };
        tracing::info!("Processing {} page(s) from {}", pages.len(), filename);

        let source = SourceFile::inspect(path, filename, extractor.format()).await;
        let documents = self.write_pages(&source, &pages).await;

        self.dispose_source(path, &documents).await;

        let written = documents.iter().filter(|d| d.is_written()).count();
        tracing::info!(
            "[SUCCESS]: {} converted ({}/{} pages written) & ready for embedding.",
            filename,
            written,
            documents.len()
        );

        ConversionResult {
            success: true,
            reason: None,
            documents,
        }
    }

    async fn extract_pages(
        &self,
        extractor: &dyn PageExtractor,
        path: &Path,
        filename: &str,
    ) -> Result<Vec<ExtractedPage>> {
        let pages = extractor.load(path).await?;
        if !pages.is_empty() || !extractor.ocr_fallback() {
            return Ok(pages);
        }

        tracing::info!(
            "No text content found for {}. Will attempt OCR parse.",
            filename
        );
        Ok(self.ocr.ocr_pdf(path).await?)
    }

    /// Builds every record in page order, then drives all writes together.
    async fn write_pages(&self, source: &SourceFile, pages: &[ExtractedPage]) -> Vec<PageOutcome> {
        let records: Vec<_> = pages
            .iter()
            .enumerate()
            .map(|(position, page)| {
                let record = build_record(source, page, position, self.tokenizer.as_ref());
                let filename = page_filename(&record, position);
                (record, filename)
            })
            .collect();

        let writes = records.into_iter().map(|(record, filename)| async move {
            let outcome = self.writer.persist(record, &filename).await;
            match outcome {
                Ok(written) => PageOutcome::Written(written),
                Err(e) => {
                    tracing::error!("Failed to write {}: {:#}", filename, e);
                    PageOutcome::Failed {
                        filename,
                        error: format!("{:#}", e),
                    }
                }
            }
        });

        join_all(writes).await
    }

    async fn dispose_source(&self, path: &Path, documents: &[PageOutcome]) {
        let discard = match self.disposal {
            SourceDisposal::Always => true,
            SourceDisposal::OnSuccess => documents.iter().all(PageOutcome::is_written),
            SourceDisposal::Keep => false,
        };

        if !discard {
            tracing::info!("Keeping source file {}", path.display());
            return;
        }

        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!("Failed to discard source {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;
    use crate::models::{DocumentRecord, WrittenDocument};
    use crate::ocr::OcrError;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FixedExtractor {
        pages: Vec<ExtractedPage>,
    }

    #[async_trait]
    impl PageExtractor for FixedExtractor {
        fn format(&self) -> &str {
            "pdf"
        }
        fn ocr_fallback(&self) -> bool {
            true
        }
        async fn load(&self, _path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
            Ok(self.pages.clone())
        }
    }

    struct BrokenExtractor;

    #[async_trait]
    impl PageExtractor for BrokenExtractor {
        fn format(&self) -> &str {
            "pdf"
        }
        async fn load(&self, _path: &Path) -> Result<Vec<ExtractedPage>, ExtractError> {
            Err(ExtractError::Pdf("damaged xref".to_string()))
        }
    }

    struct CountingOcr {
        calls: AtomicUsize,
        pages: usize,
    }

    #[async_trait]
    impl OcrEngine for CountingOcr {
        async fn ocr_pdf(&self, _path: &Path) -> Result<Vec<ExtractedPage>, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.pages)
                .map(|i| ExtractedPage::new(format!("ocr text {}", i + 1), Some(i as u32 + 1)))
                .collect())
        }
    }

    /// Keeps written records in memory; fails any page whose filename
    /// contains `fail_marker`.
    #[derive(Default)]
    struct MemoryWriter {
        written: Mutex<Vec<(String, DocumentRecord)>>,
        fail_marker: Option<String>,
    }

    #[async_trait]
    impl DocumentWriter for MemoryWriter {
        async fn persist(&self, record: DocumentRecord, filename: &str) -> Result<WrittenDocument> {
            if let Some(marker) = &self.fail_marker {
                if filename.contains(marker.as_str()) {
                    anyhow::bail!("disk full");
                }
            }
            self.written
                .lock()
                .unwrap()
                .push((filename.to_string(), record.clone()));
            Ok(WrittenDocument {
                record,
                location: format!("custom-documents/{}.json", filename),
            })
        }
    }

    struct Harness {
        _tmp: TempDir,
        source: std::path::PathBuf,
        ocr: Arc<CountingOcr>,
        writer: Arc<MemoryWriter>,
        converter: Converter,
    }

    fn harness(
        extractor: Arc<dyn PageExtractor>,
        ocr_pages: usize,
        writer: MemoryWriter,
        disposal: SourceDisposal,
    ) -> Harness {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("report.pdf");
        std::fs::write(&source, b"%PDF-1.4 placeholder").unwrap();

        let mut registry = ExtractorRegistry::new();
        registry.register("pdf", extractor);
        let ocr = Arc::new(CountingOcr {
            calls: AtomicUsize::new(0),
            pages: ocr_pages,
        });
        let writer = Arc::new(writer);
        let converter = Converter::new(
            Arc::new(registry),
            ocr.clone(),
            Arc::new(CharRatioTokenizer),
            writer.clone(),
            disposal,
        );
        Harness {
            _tmp: tmp,
            source,
            ocr,
            writer,
            converter,
        }
    }

    fn text_pages(n: u32) -> Vec<ExtractedPage> {
        (1..=n)
            .map(|i| ExtractedPage::new(format!("page {} body", i), Some(i)))
            .collect()
    }

    fn page_numbers(result: &ConversionResult) -> Vec<Option<u32>> {
        result
            .documents
            .iter()
            .map(|d| match d {
                PageOutcome::Written(w) => w.record.loc_page_number,
                PageOutcome::Failed { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn three_text_pages_become_three_records() {
        let h = harness(
            Arc::new(FixedExtractor { pages: text_pages(3) }),
            5,
            MemoryWriter::default(),
            SourceDisposal::Always,
        );
        let result = h.converter.convert(&h.source, "report.pdf").await;

        assert!(result.success);
        assert!(result.reason.is_none());
        assert_eq!(page_numbers(&result), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);

        let written = h.writer.written.lock().unwrap();
        let ids: HashSet<&str> = written.iter().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(!h.source.exists(), "source should be discarded");
    }

    #[tokio::test]
    async fn zero_pages_falls_back_to_ocr() {
        let h = harness(
            Arc::new(FixedExtractor { pages: vec![] }),
            5,
            MemoryWriter::default(),
            SourceDisposal::Always,
        );
        let result = h.converter.convert(&h.source, "report.pdf").await;

        assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            page_numbers(&result),
            vec![Some(1), Some(2), Some(3), Some(4), Some(5)]
        );
    }

    #[tokio::test]
    async fn an_empty_page_still_counts_as_extracted() {
        let h = harness(
            Arc::new(FixedExtractor {
                pages: vec![ExtractedPage::new("", None)],
            }),
            5,
            MemoryWriter::default(),
            SourceDisposal::Always,
        );
        let result = h.converter.convert(&h.source, "report.pdf").await;

        assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.documents.len(), 1);
        assert_eq!(page_numbers(&result), vec![Some(1)]);
    }

    #[tokio::test]
    async fn nothing_after_ocr_is_an_empty_success() {
        let h = harness(
            Arc::new(FixedExtractor { pages: vec![] }),
            0,
            MemoryWriter::default(),
            SourceDisposal::Always,
        );
        let result = h.converter.convert(&h.source, "report.pdf").await;

        assert!(result.success);
        assert!(result.documents.is_empty());
        assert!(!h.source.exists());
    }

    #[tokio::test]
    async fn duplicate_page_numbers_get_distinct_filenames() {
        let pages = vec![
            ExtractedPage::new("a", Some(1)),
            ExtractedPage::new("b", Some(1)),
            ExtractedPage::new("c", None),
        ];
        let h = harness(
            Arc::new(FixedExtractor { pages }),
            0,
            MemoryWriter::default(),
            SourceDisposal::Always,
        );
        h.converter.convert(&h.source, "report.pdf").await;

        let written = h.writer.written.lock().unwrap();
        let names: HashSet<&str> = written.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert!(written.iter().any(|(n, _)| n.starts_with("report.pdf-page-3-")));
    }

    #[tokio::test]
    async fn failed_write_is_reported_and_source_still_discarded() {
        let writer = MemoryWriter {
            fail_marker: Some("-page-2-".to_string()),
            ..MemoryWriter::default()
        };
        let h = harness(
            Arc::new(FixedExtractor { pages: text_pages(3) }),
            0,
            writer,
            SourceDisposal::Always,
        );
        let result = h.converter.convert(&h.source, "report.pdf").await;

        assert!(result.success);
        assert_eq!(result.documents.len(), 3);
        assert!(matches!(
            &result.documents[1],
            PageOutcome::Failed { error, .. } if error.contains("disk full")
        ));
        assert!(result.documents[0].is_written());
        assert!(result.documents[2].is_written());
        assert!(!h.source.exists());
    }

    #[tokio::test]
    async fn on_success_policy_keeps_source_after_partial_failure() {
        let writer = MemoryWriter {
            fail_marker: Some("-page-1-".to_string()),
            ..MemoryWriter::default()
        };
        let h = harness(
            Arc::new(FixedExtractor { pages: text_pages(2) }),
            0,
            writer,
            SourceDisposal::OnSuccess,
        );
        h.converter.convert(&h.source, "report.pdf").await;
        assert!(h.source.exists());
    }

    #[tokio::test]
    async fn keep_policy_never_discards() {
        let h = harness(
            Arc::new(FixedExtractor { pages: text_pages(1) }),
            0,
            MemoryWriter::default(),
            SourceDisposal::Keep,
        );
        h.converter.convert(&h.source, "report.pdf").await;
        assert!(h.source.exists());
    }

    #[tokio::test]
    async fn extraction_error_fails_and_keeps_source() {
        let h = harness(
            Arc::new(BrokenExtractor),
            0,
            MemoryWriter::default(),
            SourceDisposal::Always,
        );
        let result = h.converter.convert(&h.source, "report.pdf").await;

        assert!(!result.success);
        assert!(result.reason.unwrap().contains("damaged xref"));
        assert!(h.source.exists());
    }

    #[tokio::test]
    async fn unsupported_format_is_a_failure() {
        let h = harness(
            Arc::new(FixedExtractor { pages: text_pages(1) }),
            0,
            MemoryWriter::default(),
            SourceDisposal::Always,
        );
        let other = h.source.with_extension("xyz");
        std::fs::write(&other, b"??").unwrap();

        let result = h.converter.convert(&other, "file.xyz").await;
        assert!(!result.success);
        assert!(result.reason.unwrap().contains("unsupported file type"));
        assert!(other.exists());
    }
}

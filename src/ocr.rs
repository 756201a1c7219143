//! Optical character recognition fallback for PDFs without a text layer.
//!
//! The Tesseract engine rasterizes the document with `pdftoppm` into a
//! scratch directory and runs `tesseract` over each page image in order.
//! Both tools are external binaries configured under `[ocr]`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

use crate::config::OcrConfig;
use crate::models::ExtractedPage;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("OCR scratch space: {0}")]
    Io(#[from] std::io::Error),
}

/// Recognizes text in a whole PDF, returning one page per PDF page.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn ocr_pdf(&self, path: &Path) -> Result<Vec<ExtractedPage>, OcrError>;
}

/// Builds the engine selected by `[ocr].provider`.
pub fn build_ocr_engine(config: &OcrConfig) -> Arc<dyn OcrEngine> {
    match config.provider.as_str() {
        "tesseract" => Arc::new(TesseractOcr::from_config(config)),
        _ => Arc::new(DisabledOcr),
    }
}

/// Engine used when OCR is switched off: recognizes nothing.
pub struct DisabledOcr;

#[async_trait]
impl OcrEngine for DisabledOcr {
    async fn ocr_pdf(&self, path: &Path) -> Result<Vec<ExtractedPage>, OcrError> {
        tracing::warn!(
            "OCR is disabled; {} has no text layer and yields no pages",
            path.display()
        );
        Ok(Vec::new())
    }
}

pub struct TesseractOcr {
    tesseract_bin: String,
    pdftoppm_bin: String,
    language: String,
    dpi: u32,
}

impl TesseractOcr {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            tesseract_bin: config.tesseract_bin.clone(),
            pdftoppm_bin: config.pdftoppm_bin.clone(),
            language: config.language.clone(),
            dpi: config.dpi,
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn ocr_pdf(&self, path: &Path) -> Result<Vec<ExtractedPage>, OcrError> {
        let scratch = tempfile::TempDir::new()?;
        let prefix = scratch.path().join("page");

        run(
            &self.pdftoppm_bin,
            Command::new(&self.pdftoppm_bin)
                .arg("-r")
                .arg(self.dpi.to_string())
                .arg("-png")
                .arg(path)
                .arg(&prefix),
        )
        .await?;

        let images = rendered_pages(scratch.path()).await?;
        tracing::info!("OCR: {} page image(s) rendered for {}", images.len(), path.display());

        let mut pages = Vec::with_capacity(images.len());
        for (index, image) in images.iter().enumerate() {
            let stdout = run(
                &self.tesseract_bin,
                Command::new(&self.tesseract_bin)
                    .arg(image)
                    .arg("stdout")
                    .arg("-l")
                    .arg(&self.language),
            )
            .await?;
            let text = String::from_utf8_lossy(&stdout).trim().to_string();
            tracing::debug!("OCR page {}: {} chars", index + 1, text.len());
            pages.push(ExtractedPage::new(text, Some(index as u32 + 1)));
        }

        Ok(pages)
    }
}

async fn run(program: &str, command: &mut Command) -> Result<Vec<u8>, OcrError> {
    let output = command.output().await.map_err(|source| OcrError::Spawn {
        program: program.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(OcrError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

async fn rendered_pages(dir: &Path) -> Result<Vec<PathBuf>, OcrError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "png") {
            images.push(path);
        }
    }
    sort_by_page_suffix(&mut images);
    Ok(images)
}

/// `pdftoppm` zero-pads the page suffix only as wide as the page count needs,
/// so order by the parsed number rather than by name.
fn sort_by_page_suffix(images: &mut [PathBuf]) {
    images.sort_by_key(|path| {
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.rsplit('-').next())
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(u32::MAX)
    });
}

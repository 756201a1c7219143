use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root of the document store. Every path accepted over the API is
    /// resolved relative to this directory and must stay inside it.
    pub documents_root: PathBuf,
    /// Upload drop directory that `POST /process` reads from.
    #[serde(default = "default_hotdir")]
    pub hotdir: PathBuf,
}

fn default_hotdir() -> PathBuf {
    PathBuf::from("./hotdir")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// What happens to the uploaded source file once its pages have been written.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceDisposal {
    /// Discard the source after every page write has been awaited, whatever
    /// the individual outcomes were.
    #[default]
    Always,
    /// Discard only when every page write succeeded.
    OnSuccess,
    /// Never discard.
    Keep,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConversionConfig {
    #[serde(default)]
    pub source_disposal: SourceDisposal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_provider")]
    pub provider: String,
    #[serde(default = "default_ocr_language")]
    pub language: String,
    #[serde(default = "default_ocr_dpi")]
    pub dpi: u32,
    #[serde(default = "default_tesseract_bin")]
    pub tesseract_bin: String,
    #[serde(default = "default_pdftoppm_bin")]
    pub pdftoppm_bin: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: default_ocr_provider(),
            language: default_ocr_language(),
            dpi: default_ocr_dpi(),
            tesseract_bin: default_tesseract_bin(),
            pdftoppm_bin: default_pdftoppm_bin(),
        }
    }
}

fn default_ocr_provider() -> String {
    "disabled".to_string()
}
fn default_ocr_language() -> String {
    "eng".to_string()
}
fn default_ocr_dpi() -> u32 {
    300
}
fn default_tesseract_bin() -> String {
    "tesseract".to_string()
}
fn default_pdftoppm_bin() -> String {
    "pdftoppm".to_string()
}

impl OcrConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.storage.documents_root.as_os_str().is_empty() {
        anyhow::bail!("storage.documents_root must not be empty");
    }

    match config.ocr.provider.as_str() {
        "disabled" | "tesseract" => {}
        other => anyhow::bail!(
            "Unknown OCR provider: '{}'. Must be disabled or tesseract.",
            other
        ),
    }

    if config.ocr.is_enabled() && config.ocr.dpi == 0 {
        anyhow::bail!("ocr.dpi must be > 0");
    }

    Ok(())
}

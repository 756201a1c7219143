//! Streaming of stored files for download and inline preview.
//!
//! Both operations resolve the requested docpath through the storage
//! [`PathGuard`], check that a regular file exists there, and open it before
//! any response header is produced. The body is then streamed in chunks;
//! read errors after that point can only be logged, and they end the body.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::io::ReaderStream;

use crate::path_guard::{PathGuard, PathGuardError};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content types for previewable extensions. Lookup is case-insensitive.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("json", "application/json"),
    ("html", "text/html"),
    ("md", "text/markdown"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("doc", "application/msword"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
];

pub fn content_type_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return DEFAULT_CONTENT_TYPE;
    };
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, content_type)| *content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

#[derive(Debug, Error)]
pub enum FileServeError {
    #[error("invalid file path: {0}")]
    Invalid(#[from] PathGuardError),
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Attachment,
    Inline,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

/// An opened stored file, ready to be streamed.
#[derive(Debug)]
pub struct ServedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: &'static str,
    pub len: u64,
    pub disposition: Disposition,
    file: tokio::fs::File,
}

impl IntoResponse for ServedFile {
    fn into_response(self) -> Response {
        let path = self.path.display().to_string();
        let stream = ReaderStream::new(self.file).map(move |chunk| {
            if let Err(e) = &chunk {
                tracing::error!("error streaming {}: {}", path, e);
            }
            chunk
        });

        let disposition = format!(
            "{}; filename=\"{}\"",
            self.disposition.as_str(),
            self.file_name.replace('\\', "\\\\").replace('"', "\\\"")
        );

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.len));
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        } else {
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static(self.disposition.as_str()),
            );
        }
        response
    }
}

#[derive(Debug, Clone)]
pub struct FileServer {
    guard: PathGuard,
}

impl FileServer {
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }

    /// Opens `docpath` to be sent as an attachment, typed by its extension.
    pub async fn download(&self, docpath: &str) -> Result<ServedFile, FileServeError> {
        self.open(docpath, Disposition::Attachment).await
    }

    /// Opens `docpath` for inline display, typed by its extension.
    pub async fn view(&self, docpath: &str) -> Result<ServedFile, FileServeError> {
        self.open(docpath, Disposition::Inline).await
    }

    async fn open(
        &self,
        docpath: &str,
        disposition: Disposition,
    ) -> Result<ServedFile, FileServeError> {
        let path = self.guard.resolve(docpath)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(FileServeError::NotFound(docpath.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FileServeError::NotFound(docpath.to_string()))
            }
            Err(source) => {
                return Err(FileServeError::Io {
                    path: docpath.to_string(),
                    source,
                })
            }
        };

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|source| FileServeError::Io {
                path: docpath.to_string(),
                source,
            })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(ServedFile {
            content_type: content_type_for(&path),
            len: metadata.len(),
            path,
            file_name,
            disposition,
            file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn known_extensions_map_to_their_types() {
        assert_eq!(content_type_for(Path::new("a/report.pdf")), "application/pdf");
        assert_eq!(content_type_for(Path::new("scan.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("notes.md")), "text/markdown");
    }

    #[test]
    fn unknown_extensions_fall_back_to_octet_stream() {
        assert_eq!(
            content_type_for(Path::new("blob.xyz")),
            "application/octet-stream"
        );
        assert_eq!(
            content_type_for(Path::new("Makefile")),
            "application/octet-stream"
        );
    }

    #[tokio::test]
    async fn view_reports_missing_files() {
        let tmp = TempDir::new().unwrap();
        let server = FileServer::new(PathGuard::new(tmp.path()));
        let err = server.view("nope.pdf").await.unwrap_err();
        assert!(matches!(err, FileServeError::NotFound(_)));
    }

    #[tokio::test]
    async fn directories_are_not_served() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("folder")).unwrap();
        let server = FileServer::new(PathGuard::new(tmp.path()));
        assert!(matches!(
            server.view("folder").await.unwrap_err(),
            FileServeError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn traversal_is_rejected_before_lookup() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("documents");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(tmp.path().join("secret"), "x").unwrap();
        let server = FileServer::new(PathGuard::new(&root));

        assert!(matches!(
            server.download("../secret").await.unwrap_err(),
            FileServeError::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn opened_files_carry_headers() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("page.json"), "{\"a\":1}").unwrap();
        let server = FileServer::new(PathGuard::new(tmp.path()));

        let viewed = server.view("page.json").await.unwrap();
        assert_eq!(viewed.content_type, "application/json");
        assert_eq!(viewed.len, 7);

        let response = server.download("page.json").await.unwrap().into_response();
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"page.json\""
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn download_types_by_extension() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("scan.pdf"), b"%PDF").unwrap();
        std::fs::write(tmp.path().join("blob.xyz"), b"??").unwrap();
        let server = FileServer::new(PathGuard::new(tmp.path()));

        let pdf = server.download("scan.pdf").await.unwrap();
        assert_eq!(pdf.content_type, "application/pdf");
        assert_eq!(pdf.disposition, Disposition::Attachment);

        let blob = server.download("blob.xyz").await.unwrap();
        assert_eq!(blob.content_type, "application/octet-stream");
    }
}

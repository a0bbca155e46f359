//! Error types for the edgequake-pdf2html library.
//!
//! Errors are split by the scope they abort:
//!
//! * [`Pdf2HtmlError`] (**per conversion**): the current conversion cannot
//!   complete (remote upload failed, remote file never became active, pdfium
//!   could not open the PDF). Caught at the orchestration boundary and shown
//!   to the user as a single message; never fatal to the server process.
//!
//! * [`UploadError`] (**per request, before any work**): the submitted form
//!   is unusable (no file, wrong extension, no language selected). Each
//!   variant maps to a short notice key that the index page understands.
//!
//! * [`RemoteError`]: a single call to the remote generative service failed
//!   (transport error, non-2xx status, undecodable body).
//!
//! * [`DescribeError`]: alt text for one image could not be produced. The
//!   extractor substitutes a placeholder and keeps going.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a single conversion.
#[derive(Debug, Error)]
pub enum Pdf2HtmlError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Remote service errors ─────────────────────────────────────────────
    /// The upload call itself failed; no remote handle exists.
    #[error("PDF upload to the generative service failed: {0}")]
    RemoteUploadFailed(#[source] RemoteError),

    /// The remote copy did not reach the ACTIVE state.
    #[error(
        "PDF upload failed or did not become active. Final State: {state} after {waited_secs}s.{}",
        .detail.as_ref().map(|d| format!(" {d}")).unwrap_or_default()
    )]
    RemoteFileNotActive {
        name: String,
        state: String,
        waited_secs: u64,
        detail: Option<String>,
    },

    /// The configured vision/text provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a session file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Validation failures of the upload form.
///
/// Surfaced immediately, before a session id is allocated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("No file part")]
    MissingFile,

    #[error("No selected file")]
    EmptyFilename,

    #[error("Invalid file type. Only PDF files are allowed.")]
    InvalidFileType,

    #[error("Please select at least one target language.")]
    NoLanguage,

    #[error("Unsupported target language: {0}")]
    UnsupportedLanguage(String),

    #[error("Malformed upload: {0}")]
    Malformed(String),
}

impl UploadError {
    /// Key understood by the index page's notice lookup.
    pub fn notice_key(&self) -> &'static str {
        match self {
            UploadError::MissingFile | UploadError::EmptyFilename => "no_file",
            UploadError::InvalidFileType => "invalid_file",
            UploadError::NoLanguage => "no_language",
            UploadError::UnsupportedLanguage(_) => "unsupported_language",
            UploadError::Malformed(_) => "malformed",
        }
    }
}

/// A failed call to the remote generative service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection, TLS, or timeout failure.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The resumable upload session was not opened.
    #[error("Upload session URL missing from the start response")]
    MissingUploadUrl,

    /// The response body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Reading the local file to upload failed.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Alt-text generation failed for one image.
#[derive(Debug, Error)]
pub enum DescribeError {
    #[error("Failed to read image '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Vision model call failed: {0}")]
    Llm(String),

    #[error("Vision model returned empty alt text")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_active_display_includes_state_and_detail() {
        let e = Pdf2HtmlError::RemoteFileNotActive {
            name: "files/abc".into(),
            state: "FAILED".into(),
            waited_secs: 20,
            detail: Some("Error during file processing: Code 3, Message: bad pdf".into()),
        };
        let msg = e.to_string();
        assert!(msg.contains("FAILED"), "got: {msg}");
        assert!(msg.contains("after 20s"), "got: {msg}");
        assert!(msg.contains("Code 3"), "got: {msg}");
    }

    #[test]
    fn not_active_display_without_detail() {
        let e = Pdf2HtmlError::RemoteFileNotActive {
            name: "files/abc".into(),
            state: "PROCESSING".into(),
            waited_secs: 180,
            detail: None,
        };
        assert!(e.to_string().ends_with("after 180s."));
    }

    #[test]
    fn upload_error_notice_keys() {
        assert_eq!(UploadError::MissingFile.notice_key(), "no_file");
        assert_eq!(UploadError::EmptyFilename.notice_key(), "no_file");
        assert_eq!(UploadError::InvalidFileType.notice_key(), "invalid_file");
        assert_eq!(UploadError::NoLanguage.notice_key(), "no_language");
        assert_eq!(
            UploadError::UnsupportedLanguage("Klingon".into()).notice_key(),
            "unsupported_language"
        );
    }

    #[test]
    fn api_error_display() {
        let e = RemoteError::Api {
            status: 403,
            message: "API key not valid".into(),
        };
        assert!(e.to_string().contains("403"));
        assert!(e.to_string().contains("API key not valid"));
    }
}

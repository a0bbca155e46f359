//! Upload validation: filenames, PDF magic bytes and target languages.
//!
//! ## Why check magic bytes as well as the extension?
//!
//! The extension is whatever the browser sent. pdfium and the remote service
//! both give unhelpful errors for a renamed JPEG, so the first four bytes are
//! checked for `%PDF` before any session directory exists.

use crate::error::{Pdf2HtmlError, UploadError};
use crate::languages;
use std::path::{Path, PathBuf};
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Fallback name when sanitising leaves nothing usable.
const DEFAULT_UPLOAD_NAME: &str = "upload.pdf";

/// True if `filename` has a `.pdf` extension (case-insensitive).
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case("pdf"))
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_`, anything outside
/// ASCII alphanumerics and `._-` is removed, and leading dots are stripped.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() || !allowed_file(&cleaned) {
        DEFAULT_UPLOAD_NAME.to_string()
    } else {
        cleaned
    }
}

/// Check the first bytes of an upload for the PDF signature.
pub fn check_pdf_magic(bytes: &[u8]) -> Result<(), UploadError> {
    if bytes.len() >= PDF_MAGIC.len() && &bytes[..PDF_MAGIC.len()] == PDF_MAGIC {
        Ok(())
    } else {
        Err(UploadError::InvalidFileType)
    }
}

/// Validate the selected languages, preserving order and dropping duplicates.
pub fn validate_languages(selected: Vec<String>) -> Result<Vec<String>, UploadError> {
    let mut out: Vec<String> = Vec::with_capacity(selected.len());
    for name in selected {
        let name = name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        if !languages::is_supported(&name) {
            return Err(UploadError::UnsupportedLanguage(name));
        }
        if !out.contains(&name) {
            out.push(name);
        }
    }
    if out.is_empty() {
        return Err(UploadError::NoLanguage);
    }
    Ok(out)
}

/// Validate a local PDF for the command-line entry point.
pub fn resolve_local(path: &Path) -> Result<PathBuf, Pdf2HtmlError> {
    if !path.is_file() {
        return Err(Pdf2HtmlError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut magic = [0u8; 4];
    {
        use std::io::Read;
        let mut f = std::fs::File::open(path).map_err(|_| Pdf2HtmlError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        if f.read_exact(&mut magic).is_err() || &magic != PDF_MAGIC {
            return Err(Pdf2HtmlError::NotAPdf {
                path: path.to_path_buf(),
                magic,
            });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_extension_check() {
        assert!(allowed_file("report.pdf"));
        assert!(allowed_file("REPORT.PDF"));
        assert!(allowed_file("a.b.pdf"));
        assert!(!allowed_file("report.docx"));
        assert!(!allowed_file("pdf"));
        assert!(!allowed_file(".pdf"));
        assert!(!allowed_file(""));
    }

    #[test]
    fn sanitize_drops_directories_and_odd_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(sanitize_filename("C:\\docs\\My Report.pdf"), "My_Report.pdf");
        assert_eq!(sanitize_filename("résumé 2024.pdf"), "rsum_2024.pdf");
        assert_eq!(sanitize_filename("..hidden.pdf"), "hidden.pdf");
    }

    #[test]
    fn sanitize_falls_back_when_nothing_left() {
        assert_eq!(sanitize_filename("指南.pdf"), "upload.pdf");
        assert_eq!(sanitize_filename(""), "upload.pdf");
    }

    #[test]
    fn magic_bytes() {
        assert!(check_pdf_magic(b"%PDF-1.7\n...").is_ok());
        assert_eq!(check_pdf_magic(b"\x89PNG"), Err(UploadError::InvalidFileType));
        assert_eq!(check_pdf_magic(b"%P"), Err(UploadError::InvalidFileType));
    }

    #[test]
    fn languages_validated_in_order() {
        let got = validate_languages(vec![
            "Hindi".into(),
            "English".into(),
            "Hindi".into(),
            " ".into(),
        ])
        .unwrap();
        assert_eq!(got, vec!["Hindi".to_string(), "English".to_string()]);
    }

    #[test]
    fn empty_or_unknown_languages_rejected() {
        assert_eq!(validate_languages(vec![]), Err(UploadError::NoLanguage));
        assert_eq!(
            validate_languages(vec!["Klingon".into()]),
            Err(UploadError::UnsupportedLanguage("Klingon".into()))
        );
    }

    #[test]
    fn resolve_local_checks_existence_and_magic() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pdf");
        assert!(matches!(
            resolve_local(&missing),
            Err(Pdf2HtmlError::FileNotFound { .. })
        ));

        let fake = dir.path().join("fake.pdf");
        std::fs::write(&fake, b"GIF89a").unwrap();
        assert!(matches!(
            resolve_local(&fake),
            Err(Pdf2HtmlError::NotAPdf { .. })
        ));

        let real = dir.path().join("real.pdf");
        std::fs::write(&real, b"%PDF-1.4\n%%EOF").unwrap();
        assert_eq!(resolve_local(&real).unwrap(), real);
    }
}

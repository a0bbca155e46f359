//! Per-request session directories and stale-session cleanup.
//!
//! Every conversion gets a fresh UUID v4 and a pair of directories:
//! `<upload_root>/<id>/` for the submitted PDF and `<output_root>/<id>/` for
//! the generated HTML plus an `extracted_images/` subfolder. Starting a new
//! conversion deletes every other session pair, so the service keeps at most
//! one finished result on disk.
//!
//! Only directories whose name parses as a UUID v4 are ever deleted. Anything
//! else an operator drops into the roots is left alone.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Subdirectory of a session's output folder holding extracted images.
pub const IMAGES_SUBDIR: &str = "extracted_images";

/// File name of the finished document inside a session's output folder.
pub const FINAL_HTML_NAME: &str = "final_output.html";

/// Opaque 128-bit random session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a directory or URL segment. Only UUID v4 strings are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s)
            .ok()
            .filter(|u| u.get_version_num() == 4)
            .map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidSessionId(s.to_string()))
    }
}

/// A string that is not a hyphenated UUID v4.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a session token: '{0}'")]
pub struct InvalidSessionId(pub String);

/// Directories belonging to one conversion.
#[derive(Debug, Clone)]
pub struct ConversionSession {
    pub id: SessionId,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl ConversionSession {
    /// Where the finished HTML is written.
    pub fn final_html_path(&self) -> PathBuf {
        self.output_dir.join(FINAL_HTML_NAME)
    }

    /// Where an uploaded file with the given (already sanitised) name is saved.
    pub fn upload_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join(filename)
    }
}

/// Outcome of one cleanup pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Session directories removed.
    pub removed: usize,
    /// Entries left alone because their name is not a session token.
    pub skipped: usize,
    /// Session directories that could not be removed.
    pub failed: usize,
}

/// Owns the upload and output roots.
#[derive(Debug, Clone)]
pub struct SessionStore {
    upload_root: PathBuf,
    output_root: PathBuf,
}

impl SessionStore {
    pub fn new(upload_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            output_root: output_root.into(),
        }
    }

    pub fn upload_root(&self) -> &Path {
        &self.upload_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn new_session_id(&self) -> SessionId {
        SessionId::new_v4()
    }

    /// Paths for `id` without touching the filesystem.
    pub fn session(&self, id: &SessionId) -> ConversionSession {
        let key = id.to_string();
        let output_dir = self.output_root.join(&key);
        ConversionSession {
            id: *id,
            upload_dir: self.upload_root.join(&key),
            images_dir: output_dir.join(IMAGES_SUBDIR),
            output_dir,
        }
    }

    /// Create the session's directories. Idempotent.
    pub fn create_session_dirs(&self, id: &SessionId) -> std::io::Result<ConversionSession> {
        let session = self.session(id);
        std::fs::create_dir_all(&session.upload_dir)?;
        std::fs::create_dir_all(&session.images_dir)?;
        debug!(session = %id, "Created session directories");
        Ok(session)
    }

    /// Delete every session directory except `keep` under both roots.
    ///
    /// Never fails: missing roots are ignored and per-entry errors are logged
    /// and counted.
    pub fn cleanup_other_sessions(&self, keep: &SessionId) -> CleanupReport {
        let mut report = CleanupReport::default();
        for root in [&self.upload_root, &self.output_root] {
            sweep_root(root, keep, &mut report);
        }
        if report.removed > 0 || report.failed > 0 {
            info!(
                removed = report.removed,
                skipped = report.skipped,
                failed = report.failed,
                "Cleaned up stale sessions"
            );
        }
        report
    }

    /// Resolve a file inside a session's output folder.
    ///
    /// Returns `None` for absolute paths, paths containing `..`, or files that
    /// do not exist (for example because a later request cleaned them up).
    pub fn output_file(&self, id: &SessionId, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        if relative.is_empty()
            || !rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        let path = self.session(id).output_dir.join(rel);
        path.is_file().then_some(path)
    }
}

fn sweep_root(root: &Path, keep: &SessionId, report: &mut CleanupReport) {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Could not scan session root");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(id) = name.to_str().and_then(SessionId::parse) else {
            debug!(entry = %path.display(), "Skipping non-session directory");
            report.skipped += 1;
            continue;
        };
        if id == *keep {
            continue;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(session = %id, path = %path.display(), "Removed stale session directory");
                report.removed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove stale session directory");
                report.failed += 1;
            }
        }
    }
}

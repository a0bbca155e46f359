//! Web front end: upload form, conversion endpoint and result serving.
//!
//! ## Routes
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /` | upload form, with an optional `?notice=` banner |
//! | `POST /process` | validate, clean up, check disk, convert, show result |
//! | `GET /output/:session/*file` | serve the document or an extracted image inline |
//! | `GET /download/:session/:file` | same, as an attachment |
//! | `GET /health` | liveness |
//!
//! ## Why a conversion gate?
//!
//! Every conversion deletes all other sessions before it starts. Two
//! overlapping requests would delete each other's directories mid-run, so
//! cleanup, the disk check and the pipeline all run under one async mutex.
//! A second upload waits for the first to finish instead of corrupting it.

use crate::config::ServerConfig;
use crate::convert::{ConversionOutcome, ConversionResult, Converter};
use crate::disk::DiskGuard;
use crate::error::{Pdf2HtmlError, UploadError};
use crate::languages::SUPPORTED_LANGUAGES;
use crate::pipeline::input;
use crate::progress::{NoopProgressCallback, StepMessage};
use crate::session::{SessionId, SessionStore, IMAGES_SUBDIR};
use askama::Template;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: SessionStore,
    pub disk: DiskGuard,
    pub converter: Converter,
    gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>, converter: Converter) -> Self {
        let store = SessionStore::new(config.upload_dir.clone(), config.output_dir.clone());
        let disk = DiskGuard::new(config.output_dir.clone(), config.min_free_space_bytes());
        Self {
            config,
            store,
            disk,
            converter,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Replace the disk guard (tests inject a fixed free-space reading).
    pub fn with_disk_guard(mut self, disk: DiskGuard) -> Self {
        self.disk = disk;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/process", post(process_pdf))
        .route("/output/:session_id/*file", get(serve_output))
        .route("/download/:session_id/:file", get(download_output))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: ServerConfig) -> Result<(), Pdf2HtmlError> {
    for dir in [&config.upload_dir, &config.output_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| Pdf2HtmlError::OutputWriteFailed {
                path: dir.clone(),
                source,
            })?;
    }

    let config = Arc::new(config);
    let converter = Converter::from_config(Arc::clone(&config))?;
    let addr = config.bind;
    let app = build_router(AppState::new(config, converter));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Pdf2HtmlError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| Pdf2HtmlError::Internal(format!("Server error: {e}")))
}

// ── Views ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: &'static str,
    pub text: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub languages: &'static [&'static str],
    pub notice: Option<Notice>,
    pub max_upload_mb: u64,
}

#[derive(Template)]
#[template(path = "result.html")]
pub struct ResultTemplate {
    pub success: bool,
    pub session_id: String,
    pub html_file: String,
    pub has_images: bool,
    pub image_count: usize,
    pub error_message: String,
    pub steps: Vec<StepMessage>,
}

impl From<ConversionResult> for ResultTemplate {
    fn from(result: ConversionResult) -> Self {
        let (success, html_file, error_message) = match result.outcome {
            ConversionOutcome::Success { html_file, .. } => (true, html_file, String::new()),
            ConversionOutcome::Failed(msg) => (false, String::new(), msg),
        };
        Self {
            success,
            session_id: result.session_id.to_string(),
            html_file,
            has_images: result.image_count > 0,
            image_count: result.image_count,
            error_message,
            steps: result.steps,
        }
    }
}

/// Banner text for a `?notice=` key. Unknown keys show nothing.
pub fn notice_for(key: &str, disk: &DiskGuard) -> Option<Notice> {
    let (level, text) = match key {
        "low_storage" => {
            let free = disk.free_space();
            let free_mb = if free == u64::MAX {
                "unknown".to_string()
            } else {
                (free / (1024 * 1024)).to_string()
            };
            (
                "warning",
                format!(
                    "Storage might be low. If conversion fails, please wait a few minutes and try again, or use a smaller PDF. Current free space: {free_mb} MB."
                ),
            )
        }
        "cleaned_up" => (
            "warning",
            "The requested file seems to have been cleaned up. Please try converting again."
                .to_string(),
        ),
        "no_file" => ("danger", "No selected file".to_string()),
        "invalid_file" => (
            "danger",
            UploadError::InvalidFileType.to_string(),
        ),
        "no_language" => ("danger", UploadError::NoLanguage.to_string()),
        "unsupported_language" => (
            "danger",
            "One of the selected languages is not supported.".to_string(),
        ),
        "malformed" => (
            "danger",
            "The upload could not be read. Please try again.".to_string(),
        ),
        _ => return None,
    };
    Some(Notice { level, text })
}

fn redirect_notice(key: &str) -> Response {
    Redirect::to(&format!("/?notice={key}")).into_response()
}

// ── Handlers ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub notice: Option<String>,
}

async fn index(State(state): State<AppState>, Query(query): Query<IndexQuery>) -> impl IntoResponse {
    IndexTemplate {
        languages: SUPPORTED_LANGUAGES,
        notice: query
            .notice
            .as_deref()
            .and_then(|key| notice_for(key, &state.disk)),
        max_upload_mb: state.config.max_upload_mb,
    }
}

async fn health_check() -> &'static str {
    "ok"
}

/// Validated upload form.
#[derive(Debug)]
pub struct UploadForm {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub languages: Vec<String>,
}

enum FormError {
    Invalid(UploadError),
    Multipart(MultipartError),
}

impl From<MultipartError> for FormError {
    fn from(e: MultipartError) -> Self {
        FormError::Multipart(e)
    }
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, FormError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut languages = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("pdf_file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("target_languages") => languages.push(field.text().await?),
            _ => {}
        }
    }

    let (name, bytes) = file.ok_or(FormError::Invalid(UploadError::MissingFile))?;
    if name.is_empty() {
        return Err(FormError::Invalid(UploadError::EmptyFilename));
    }
    if !input::allowed_file(&name) {
        return Err(FormError::Invalid(UploadError::InvalidFileType));
    }
    input::check_pdf_magic(&bytes).map_err(FormError::Invalid)?;
    let languages = input::validate_languages(languages).map_err(FormError::Invalid)?;

    Ok(UploadForm {
        filename: input::sanitize_filename(&name),
        bytes,
        languages,
    })
}

async fn process_pdf(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(FormError::Invalid(e)) => {
            info!("Rejected upload: {}", e);
            return redirect_notice(e.notice_key());
        }
        Err(FormError::Multipart(e)) => {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                warn!("Upload exceeds {} MB", state.config.max_upload_mb);
                return (StatusCode::PAYLOAD_TOO_LARGE, e.body_text()).into_response();
            }
            warn!("Malformed multipart upload: {}", e);
            return redirect_notice(UploadError::Malformed(e.body_text()).notice_key());
        }
    };

    let _gate = state.gate.lock().await;

    let id = state.store.new_session_id();
    info!(session = %id, file = %form.filename, languages = ?form.languages, "Starting new conversion");

    let store = state.store.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || store.cleanup_other_sessions(&id)).await {
        warn!(session = %id, error = %e, "Session cleanup task failed");
    }

    if !state.disk.has_enough_space() {
        warn!(
            free_mb = state.disk.free_space() / (1024 * 1024),
            need_mb = state.config.min_free_space_mb,
            "Low storage, refusing conversion"
        );
        return redirect_notice("low_storage");
    }

    let session = match state.store.create_session_dirs(&id) {
        Ok(s) => s,
        Err(e) => {
            error!(session = %id, error = %e, "Could not create session directories");
            return failure_page(id, format!("Could not create working directories: {e}"));
        }
    };

    let pdf_path = session.upload_path(&form.filename);
    if let Err(e) = tokio::fs::write(&pdf_path, &form.bytes).await {
        error!(session = %id, error = %e, "Could not save upload");
        return failure_page(id, format!("Could not save the uploaded file: {e}"));
    }

    let result = state
        .converter
        .run(&session, &pdf_path, &form.languages, &NoopProgressCallback)
        .await;
    ResultTemplate::from(result).into_response()
}

fn failure_page(id: SessionId, message: String) -> Response {
    ResultTemplate::from(ConversionResult {
        session_id: id,
        outcome: ConversionOutcome::Failed(message),
        steps: Vec::new(),
        image_count: 0,
    })
    .into_response()
}

async fn serve_output(
    State(state): State<AppState>,
    Path((session_id, file)): Path<(String, String)>,
) -> Response {
    let file = file.trim_start_matches('/').to_string();
    let is_image = file.starts_with(&format!("{IMAGES_SUBDIR}/"));
    match resolve(&state, &session_id, &file) {
        Some(path) => file_response(&path, &file, false).await,
        None if is_image => (StatusCode::NOT_FOUND, "Image not found").into_response(),
        None => redirect_notice("cleaned_up"),
    }
}

async fn download_output(
    State(state): State<AppState>,
    Path((session_id, file)): Path<(String, String)>,
) -> Response {
    match resolve(&state, &session_id, &file) {
        Some(path) => file_response(&path, &file, true).await,
        None => redirect_notice("cleaned_up"),
    }
}

fn resolve(state: &AppState, session_id: &str, file: &str) -> Option<std::path::PathBuf> {
    let id = SessionId::parse(session_id)?;
    state.store.output_file(&id, file)
}

async fn file_response(path: &std::path::Path, name: &str, attachment: bool) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read output file");
            return redirect_notice("cleaned_up");
        }
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = if mime.type_() == mime_guess::mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    };
    let filename = name.rsplit('/').next().unwrap_or(name);
    let disposition = if attachment { "attachment" } else { "inline" };

    (
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("{disposition}; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::FreeSpaceProbe;

    struct Fixed(u64);

    impl FreeSpaceProbe for Fixed {
        fn available_bytes(&self, _path: &std::path::Path) -> std::io::Result<u64> {
            Ok(self.0)
        }
    }

    #[test]
    fn low_storage_notice_reports_free_mb() {
        let disk = DiskGuard::with_probe(".", 0, Arc::new(Fixed(42 * 1024 * 1024)));
        let n = notice_for("low_storage", &disk).unwrap();
        assert_eq!(n.level, "warning");
        assert!(n.text.ends_with("Current free space: 42 MB."));
    }

    #[test]
    fn unknown_notice_is_ignored() {
        let disk = DiskGuard::with_probe(".", 0, Arc::new(Fixed(0)));
        assert!(notice_for("<script>", &disk).is_none());
        assert!(notice_for("cleaned_up", &disk).is_some());
    }

    #[test]
    fn result_view_from_failure() {
        let id = SessionId::new_v4();
        let view = ResultTemplate::from(ConversionResult {
            session_id: id,
            outcome: ConversionOutcome::Failed("boom".into()),
            steps: Vec::new(),
            image_count: 0,
        });
        assert!(!view.success);
        assert_eq!(view.error_message, "boom");
        assert_eq!(view.session_id, id.to_string());
        let html = view.render().unwrap();
        assert!(html.contains("boom"));
    }
}

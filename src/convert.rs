//! Conversion orchestration: one PDF in, one finished HTML document out.
//!
//! [`Converter::run`] sequences the four pipeline steps for a session that
//! already has its directories. It never returns an error: any failure is
//! folded into [`ConversionOutcome::Failed`] with a single user-facing
//! message, so both the web handler and the CLI can render the result the
//! same way.
//!
//! The remote file is released on every path: by `upload_and_wait` when it
//! never became active, and by `generate_and_release` after generation.

use crate::config::ServerConfig;
use crate::error::Pdf2HtmlError;
use crate::languages::DEFAULT_LANGUAGE;
use crate::pipeline::describe::{ImageDescriber, StaticDescriber, VisionDescriber};
use crate::pipeline::remote::{GeminiFileService, RemoteFileService};
use crate::pipeline::{extract, finalize, generate, input, remote};
use crate::progress::{ConversionProgressCallback, ConversionStep, StepLog, StepMessage, Tee};
use crate::prompts::head_markup;
use crate::session::{ConversionSession, SessionId, FINAL_HTML_NAME, IMAGES_SUBDIR};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// How a conversion ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    Success {
        /// Absolute or root-relative path of the written document.
        html_path: PathBuf,
        /// File name relative to the session output folder.
        html_file: String,
    },
    Failed(String),
}

/// Everything the result view needs about one conversion.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub session_id: SessionId,
    pub outcome: ConversionOutcome,
    /// User-facing step messages, in order.
    pub steps: Vec<StepMessage>,
    /// Images present in the session's `extracted_images` folder.
    pub image_count: usize,
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ConversionOutcome::Success { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            ConversionOutcome::Failed(msg) => Some(msg),
            ConversionOutcome::Success { .. } => None,
        }
    }
}

/// Runs the pipeline with a fixed describer and remote service.
#[derive(Clone)]
pub struct Converter {
    config: Arc<ServerConfig>,
    describer: Arc<dyn ImageDescriber>,
    remote: Arc<dyn RemoteFileService>,
}

impl Converter {
    pub fn new(
        config: Arc<ServerConfig>,
        describer: Arc<dyn ImageDescriber>,
        remote: Arc<dyn RemoteFileService>,
    ) -> Self {
        Self {
            config,
            describer,
            remote,
        }
    }

    /// Build the production converter: Gemini vision for alt text and the
    /// Gemini Files API for upload and generation.
    ///
    /// A vision model that cannot be initialised is not fatal; images then
    /// get a generic alt text. A missing API key is.
    pub fn from_config(config: Arc<ServerConfig>) -> Result<Self, Pdf2HtmlError> {
        if config.api_key.trim().is_empty() {
            return Err(Pdf2HtmlError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: "Set GEMINI_API_KEY (or pass --api-key).".to_string(),
            });
        }

        let describer: Arc<dyn ImageDescriber> = match VisionDescriber::from_config(&config) {
            Ok(d) => Arc::new(d),
            Err(e) => {
                warn!(
                    "Could not initialize vision model '{}'; alt text will be generic. {}",
                    config.vision_model, e
                );
                Arc::new(StaticDescriber::default())
            }
        };

        let remote = GeminiFileService::from_config(&config).map_err(|e| {
            Pdf2HtmlError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: e.to_string(),
            }
        })?;

        Ok(Self::new(config, describer, Arc::new(remote)))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Convert `pdf_path` into `session`'s output folder.
    ///
    /// `languages` is the ordered target list; the first entry is the
    /// primary language used for alt text and the document's `lang`.
    pub async fn run(
        &self,
        session: &ConversionSession,
        pdf_path: &Path,
        languages: &[String],
        progress: &dyn ConversionProgressCallback,
    ) -> ConversionResult {
        let start = Instant::now();
        let languages: Vec<String> = if languages.is_empty() {
            vec![DEFAULT_LANGUAGE.to_string()]
        } else {
            languages.to_vec()
        };

        let log = StepLog::default();
        let tee = Tee {
            log: &log,
            user: progress,
        };

        info!(session = %session.id, pdf = %pdf_path.display(), "Starting conversion");
        let outcome = match self.run_steps(session, pdf_path, &languages, &tee).await {
            Ok(path) => {
                info!(session = %session.id, elapsed = ?start.elapsed(), "Conversion complete");
                tee.on_conversion_complete(&path);
                ConversionOutcome::Success {
                    html_path: path,
                    html_file: FINAL_HTML_NAME.to_string(),
                }
            }
            Err(e) => {
                error!(session = %session.id, error = %e, "Conversion failed");
                let message = e.to_string();
                tee.on_conversion_error(&message);
                ConversionOutcome::Failed(message)
            }
        };

        ConversionResult {
            session_id: session.id,
            outcome,
            steps: log.messages(),
            image_count: count_files(&session.images_dir),
        }
    }

    async fn run_steps(
        &self,
        session: &ConversionSession,
        pdf_path: &Path,
        languages: &[String],
        progress: &dyn ConversionProgressCallback,
    ) -> Result<PathBuf, Pdf2HtmlError> {
        let config = self.config.as_ref();
        let primary = languages
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_LANGUAGE);

        // ── Step 1: Extract images and alt text ──────────────────────────
        progress.on_step_start(ConversionStep::ExtractImages);
        let images = extract::extract(
            pdf_path,
            &session.images_dir,
            self.describer.as_ref(),
            primary,
            config,
            progress,
        )
        .await?;
        progress.on_images_ready(images.len());

        // ── Step 2: Upload and wait for the remote file ──────────────────
        progress.on_step_start(ConversionStep::Upload);
        let file = remote::upload_and_wait(
            self.remote.as_ref(),
            pdf_path,
            config.poll_interval(),
            config.max_wait(),
        )
        .await?;
        progress.on_remote_file_active(&file.name);

        // ── Step 3: Generate (releases the remote file) ──────────────────
        progress.on_step_start(ConversionStep::Generate);
        let raw = generate::generate_and_release(
            self.remote.as_ref(),
            &file,
            &images,
            languages,
            config,
        )
        .await;

        // ── Step 4: Finalize and write ───────────────────────────────────
        progress.on_step_start(ConversionStep::Finalize);
        let html = finalize::finalize(&raw, &head_markup(languages), languages);
        let path = session.final_html_path();
        write_atomic(&path, &html).await?;
        Ok(path)
    }
}

/// Convert a local PDF into `output_dir` without a session store.
///
/// Used by the command-line entry point: `output_dir` receives
/// `final_output.html` and an `extracted_images/` folder.
pub async fn convert_to_dir(
    pdf_path: &Path,
    languages: &[String],
    output_dir: &Path,
    config: Arc<ServerConfig>,
    progress: &dyn ConversionProgressCallback,
) -> Result<ConversionResult, Pdf2HtmlError> {
    let pdf_path = input::resolve_local(pdf_path)?;
    let images_dir = output_dir.join(IMAGES_SUBDIR);
    tokio::fs::create_dir_all(&images_dir)
        .await
        .map_err(|source| Pdf2HtmlError::OutputWriteFailed {
            path: images_dir.clone(),
            source,
        })?;

    let session = ConversionSession {
        id: SessionId::new_v4(),
        upload_dir: pdf_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        output_dir: output_dir.to_path_buf(),
        images_dir,
    };

    let converter = Converter::from_config(config)?;
    Ok(converter.run(&session, &pdf_path, languages, progress).await)
}

/// Write via temp file + rename so a reader never sees a partial document.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), Pdf2HtmlError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Pdf2HtmlError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let tmp_path = path.with_extension("html.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| Pdf2HtmlError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Pdf2HtmlError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.flatten().filter(|e| e.path().is_file()).count())
        .unwrap_or(0)
}

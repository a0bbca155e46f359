//! # edgequake-pdf2html
//!
//! Convert PDF documents into self-contained, multilingual, accessible HTML
//! using Gemini, served through a small web front end.
//!
//! ## Why this crate?
//!
//! Text extractors lose layout, and page screenshots lose accessibility.
//! Here the whole PDF is handed to a multimodal model that reads it as a
//! document and writes semantic HTML in the languages the user picked. The
//! embedded images are extracted locally first and described by a vision
//! model, so every `<img>` in the result points at a real file and carries
//! meaningful alt text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF upload
//!  │
//!  ├─ 0. Guard    purge stale sessions, check free disk space
//!  ├─ 1. Extract  embedded images via pdfium + alt text via vision model
//!  ├─ 2. Upload   Files API upload, poll until ACTIVE
//!  ├─ 3. Generate one generation call with prompt + file + image metadata
//!  └─ 4. Finalize doctype, <html lang>, <head>; write final_output.html
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2html::{convert_to_dir, NoopProgressCallback, ServerConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let languages = vec!["English".to_string(), "Hindi".to_string()];
//!     let result = convert_to_dir(
//!         Path::new("document.pdf"),
//!         &languages,
//!         Path::new("out"),
//!         Arc::new(config),
//!         &NoopProgressCallback,
//!     )
//!     .await?;
//!     println!("success: {}", result.is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2html` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod disk;
pub mod error;
pub mod languages;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServerConfig, ServerConfigBuilder};
pub use convert::{convert_to_dir, ConversionOutcome, ConversionResult, Converter};
pub use disk::{DiskGuard, FreeSpaceProbe};
pub use error::{DescribeError, Pdf2HtmlError, RemoteError, UploadError};
pub use languages::SUPPORTED_LANGUAGES;
pub use progress::{
    ConversionProgressCallback, ConversionStep, NoopProgressCallback, ProgressCallback,
};
pub use server::{build_router, serve, AppState};
pub use session::{ConversionSession, SessionId, SessionStore};

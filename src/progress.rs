//! Progress-callback trait for conversion step events.
//!
//! Pass an [`Arc<dyn ConversionProgressCallback>`] to
//! [`crate::convert::Converter::run`] to receive events as the pipeline moves
//! through its four steps. The web front end ignores live events and shows
//! the [`StepLog`] that every run collects; the CLI drives a spinner.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a terminal progress bar or a log without the
//! library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2html::{ConversionProgressCallback, ConversionStep};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     steps: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_step_start(&self, step: ConversionStep) {
//!         self.steps.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}", step.announcement());
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

/// The four steps of a conversion, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionStep {
    ExtractImages,
    Upload,
    Generate,
    Finalize,
}

impl ConversionStep {
    /// 1-based position in the pipeline.
    pub fn number(self) -> usize {
        match self {
            ConversionStep::ExtractImages => 1,
            ConversionStep::Upload => 2,
            ConversionStep::Generate => 3,
            ConversionStep::Finalize => 4,
        }
    }

    /// User-facing message shown when the step starts.
    pub fn announcement(self) -> &'static str {
        match self {
            ConversionStep::ExtractImages => {
                "Step 1: Extracting images and generating alt tags..."
            }
            ConversionStep::Upload => "Step 2: Uploading PDF to Gemini...",
            ConversionStep::Generate => "Step 3: Generating HTML from PDF using Gemini...",
            ConversionStep::Finalize => "Step 4: Finalizing HTML...",
        }
    }
}

/// Called by the conversion pipeline as it moves through its steps.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called just before a step begins.
    fn on_step_start(&self, step: ConversionStep) {
        let _ = step;
    }

    /// Called after each extracted image has its alt text.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page the image came from
    /// * `global_index`: running count of images extracted so far
    fn on_image_described(&self, page_num: usize, global_index: usize) {
        let _ = (page_num, global_index);
    }

    /// Called once step 1 finishes.
    fn on_images_ready(&self, count: usize) {
        let _ = count;
    }

    /// Called when the uploaded PDF is active on the remote service.
    fn on_remote_file_active(&self, name: &str) {
        let _ = name;
    }

    /// Called when the finished document has been written.
    fn on_conversion_complete(&self, output: &Path) {
        let _ = output;
    }

    /// Called when the conversion is abandoned.
    fn on_conversion_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias for a shared callback.
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Severity of a [`StepMessage`]; maps onto the result page's alert styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Danger,
}

impl MessageLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageLevel::Info => "info",
            MessageLevel::Success => "success",
            MessageLevel::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StepMessage {
    pub level: MessageLevel,
    pub text: String,
}

/// Collects user-facing step messages for the result page.
#[derive(Debug, Default)]
pub struct StepLog {
    entries: Mutex<Vec<StepMessage>>,
}

impl StepLog {
    fn push(&self, level: MessageLevel, text: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(StepMessage {
                level,
                text: text.into(),
            });
        }
    }

    /// Snapshot of the messages recorded so far.
    pub fn messages(&self) -> Vec<StepMessage> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl ConversionProgressCallback for StepLog {
    fn on_step_start(&self, step: ConversionStep) {
        self.push(MessageLevel::Info, step.announcement());
    }

    fn on_images_ready(&self, count: usize) {
        self.push(
            MessageLevel::Success,
            format!("Successfully processed {count} images."),
        );
    }

    fn on_remote_file_active(&self, name: &str) {
        self.push(
            MessageLevel::Success,
            format!("PDF \"{name}\" uploaded and active."),
        );
    }

    fn on_conversion_complete(&self, _output: &Path) {
        self.push(MessageLevel::Success, "Conversion complete!");
    }

    fn on_conversion_error(&self, error: &str) {
        self.push(MessageLevel::Danger, format!("An error occurred: {error}"));
    }
}

/// Forwards every event to the run's own [`StepLog`] and to the caller's callback.
pub(crate) struct Tee<'a> {
    pub log: &'a StepLog,
    pub user: &'a dyn ConversionProgressCallback,
}

impl ConversionProgressCallback for Tee<'_> {
    fn on_step_start(&self, step: ConversionStep) {
        self.log.on_step_start(step);
        self.user.on_step_start(step);
    }

    fn on_image_described(&self, page_num: usize, global_index: usize) {
        self.log.on_image_described(page_num, global_index);
        self.user.on_image_described(page_num, global_index);
    }

    fn on_images_ready(&self, count: usize) {
        self.log.on_images_ready(count);
        self.user.on_images_ready(count);
    }

    fn on_remote_file_active(&self, name: &str) {
        self.log.on_remote_file_active(name);
        self.user.on_remote_file_active(name);
    }

    fn on_conversion_complete(&self, output: &Path) {
        self.log.on_conversion_complete(output);
        self.user.on_conversion_complete(output);
    }

    fn on_conversion_error(&self, error: &str) {
        self.log.on_conversion_error(error);
        self.user.on_conversion_error(error);
    }
}

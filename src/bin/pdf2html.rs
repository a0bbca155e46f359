//! CLI binary for edgequake-pdf2html.
//!
//! `serve` runs the web front end; `convert` runs one conversion from the
//! terminal into a directory. Both map flags and environment variables onto
//! `ServerConfig`.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2html::pipeline::input::validate_languages;
use edgequake_pdf2html::{
    convert_to_dir, ConversionOutcome, ConversionProgressCallback, ConversionStep, ServerConfig,
    SUPPORTED_LANGUAGES,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_step_start(&self, step: ConversionStep) {
        self.bar.set_prefix(format!("Step {}/4", step.number()));
        self.bar.println(format!("{} {}", bold("◆"), step.announcement()));
    }

    fn on_image_described(&self, page_num: usize, global_index: usize) {
        self.bar
            .set_message(format!("image {global_index} (page {page_num})"));
    }

    fn on_images_ready(&self, count: usize) {
        self.bar
            .println(format!("  {} {count} images extracted", green("✓")));
        self.bar.set_message("");
    }

    fn on_remote_file_active(&self, name: &str) {
        self.bar
            .println(format!("  {} {name} is active", green("✓")));
    }

    fn on_conversion_complete(&self, output: &Path) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", green("✔"), bold(&output.display().to_string()));
    }

    fn on_conversion_error(&self, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), error);
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

/// Convert PDF documents into multilingual, accessible HTML with Gemini.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2html",
    version,
    about = "Convert PDF documents into multilingual, accessible HTML with Gemini",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2HTML_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web front end.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "PDF2HTML_BIND", default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
    },

    /// Convert one PDF from the command line.
    Convert {
        /// Local PDF file.
        input: PathBuf,

        /// Target language; repeat for several. The first one drives alt text and `lang`.
        #[arg(short, long = "language", default_value = "English")]
        languages: Vec<String>,

        /// Directory receiving final_output.html and extracted_images/.
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// List the supported target languages.
    Languages,
}

#[derive(Args, Debug)]
struct Settings {
    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Base URL of the Gemini API.
    #[arg(long, env = "PDF2HTML_API_BASE_URL", global = true)]
    api_base_url: Option<String>,

    /// Model for HTML generation.
    #[arg(long, env = "PDF2HTML_TEXT_MODEL", global = true)]
    text_model: Option<String>,

    /// Model for image alt text.
    #[arg(long, env = "PDF2HTML_VISION_MODEL", global = true)]
    vision_model: Option<String>,

    /// Root for per-session upload folders.
    #[arg(long, env = "PDF2HTML_UPLOAD_DIR", global = true)]
    upload_dir: Option<PathBuf>,

    /// Root for per-session output folders.
    #[arg(long, env = "PDF2HTML_OUTPUT_DIR", global = true)]
    output_dir: Option<PathBuf>,

    /// Maximum upload size in MB.
    #[arg(long, env = "PDF2HTML_MAX_UPLOAD_MB", global = true)]
    max_upload_mb: Option<u64>,

    /// Free space in MB required before a conversion starts.
    #[arg(long, env = "PDF2HTML_MIN_FREE_SPACE_MB", global = true)]
    min_free_space_mb: Option<u64>,

    /// Seconds between readiness polls of the uploaded PDF.
    #[arg(long, env = "PDF2HTML_POLL_INTERVAL", global = true)]
    poll_interval: Option<u64>,

    /// Maximum seconds to wait for the uploaded PDF to become active.
    #[arg(long, env = "PDF2HTML_MAX_WAIT", global = true)]
    max_wait: Option<u64>,

    /// Delay before each alt-text call, in milliseconds.
    #[arg(long, env = "PDF2HTML_DESCRIBE_DELAY_MS", global = true)]
    describe_delay_ms: Option<u64>,

    /// Generation temperature.
    #[arg(long, env = "PDF2HTML_TEMPERATURE", global = true)]
    temperature: Option<f32>,

    /// HTTP timeout for remote calls, in seconds.
    #[arg(long, env = "PDF2HTML_REQUEST_TIMEOUT", global = true)]
    request_timeout: Option<u64>,

    /// Directory containing an existing libpdfium.
    #[arg(long, env = "PDFIUM_LIB_PATH", global = true)]
    pdfium_lib_path: Option<PathBuf>,
}

impl Settings {
    fn into_config(self, bind: Option<SocketAddr>) -> Result<ServerConfig> {
        let mut b = ServerConfig::builder();
        if let Some(v) = self.api_key {
            b = b.api_key(v);
        }
        if let Some(v) = self.api_base_url {
            b = b.api_base_url(v);
        }
        if let Some(v) = self.text_model {
            b = b.text_model(v);
        }
        if let Some(v) = self.vision_model {
            b = b.vision_model(v);
        }
        if let Some(v) = self.upload_dir {
            b = b.upload_dir(v);
        }
        if let Some(v) = self.output_dir {
            b = b.output_dir(v);
        }
        if let Some(v) = self.max_upload_mb {
            b = b.max_upload_mb(v);
        }
        if let Some(v) = self.min_free_space_mb {
            b = b.min_free_space_mb(v);
        }
        if let Some(v) = self.poll_interval {
            b = b.poll_interval_secs(v);
        }
        if let Some(v) = self.max_wait {
            b = b.max_wait_secs(v);
        }
        if let Some(v) = self.describe_delay_ms {
            b = b.describe_delay_ms(v);
        }
        if let Some(v) = self.temperature {
            b = b.temperature(v);
        }
        if let Some(v) = self.request_timeout {
            b = b.request_timeout_secs(v);
        }
        if let Some(v) = self.pdfium_lib_path {
            b = b.pdfium_lib_path(v);
        }
        if let Some(v) = bind {
            b = b.bind(v);
        }
        b.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve { bind } => {
            let config = cli.settings.into_config(Some(bind))?;
            edgequake_pdf2html::serve(config)
                .await
                .context("Server stopped with an error")?;
        }
        Command::Convert {
            input,
            languages,
            output,
        } => {
            let languages = validate_languages(languages).context("Invalid --language")?;
            let config = Arc::new(cli.settings.into_config(None)?);
            let progress = CliProgressCallback::new();

            let result = convert_to_dir(&input, &languages, &output, config, &progress)
                .await
                .context("Conversion failed")?;

            match result.outcome {
                ConversionOutcome::Success { html_path, .. } => {
                    eprintln!(
                        "   {} images  →  {}",
                        result.image_count,
                        html_path.display()
                    );
                }
                ConversionOutcome::Failed(msg) => bail!("Conversion failed: {msg}"),
            }
        }
        Command::Languages => {
            for lang in SUPPORTED_LANGUAGES {
                println!("{lang}");
            }
        }
    }

    Ok(())
}

//! Configuration for the PDF-to-HTML front end.
//!
//! Every knob lives in [`ServerConfig`], built via [`ServerConfigBuilder`].
//! Components receive the config (or the parts they need) in their
//! constructors. The environment is only consulted by the binary at startup,
//! and by the vision provider when no API key was configured.

use crate::error::Pdf2HtmlError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default Gemini REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Configuration for the upload/convert/serve pipeline.
///
/// # Example
/// ```rust
/// use edgequake_pdf2html::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .api_key("test-key")
///     .upload_dir("/tmp/pdf2html/uploads")
///     .output_dir("/tmp/pdf2html/output")
///     .min_free_space_mb(100)
///     .build()
///     .unwrap();
/// assert_eq!(config.poll_interval_secs, 10);
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    /// API credential for the remote generative service.
    pub api_key: String,

    /// Base URL of the remote service. Overridable for tests and proxies.
    pub api_base_url: String,

    /// Model used for the document-to-HTML generation call. Default: `gemini-2.5-flash`.
    pub text_model: String,

    /// Model used for image alt text. Default: `gemini-2.0-flash`.
    pub vision_model: String,

    /// Root directory holding one upload folder per session. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Root directory holding one output folder per session. Default: `output`.
    pub output_dir: PathBuf,

    /// Maximum accepted upload size in MiB. Default: 30.
    pub max_upload_mb: u64,

    /// Minimum free space, in MiB, required before a new job is accepted. Default: 70.
    ///
    /// Checked after stale sessions are purged, so the reading reflects the
    /// space this request can actually use.
    pub min_free_space_mb: u64,

    /// Seconds between readiness polls of an uploaded file. Default: 10.
    pub poll_interval_secs: u64,

    /// Maximum seconds to wait for an uploaded file to become active. Default: 180.
    pub max_wait_secs: u64,

    /// Delay inserted before each alt-text call, in milliseconds. Default: 4000.
    ///
    /// The vision endpoint has a per-minute quota; a document with many
    /// images otherwise burns through it in seconds.
    pub describe_delay_ms: u64,

    /// Sampling temperature for HTML generation. Default: 0.3.
    pub temperature: f32,

    /// Sampling temperature for alt text. Default: 0.3.
    pub alt_text_temperature: f32,

    /// HTTP client timeout for a single remote call, in seconds. Default: 600.
    ///
    /// Generation over a long PDF routinely takes minutes; this only guards
    /// against a hung connection.
    pub request_timeout_secs: u64,

    /// Address the web server binds to. Default: `127.0.0.1:5000`.
    pub bind: SocketAddr,

    /// Directory containing the pdfium shared library. If None, binds to the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Pre-constructed vision provider. Takes precedence over `vision_model`.
    pub vision_provider: Option<Arc<dyn LLMProvider>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            vision_model: "gemini-2.0-flash".to_string(),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            max_upload_mb: 30,
            min_free_space_mb: 70,
            poll_interval_secs: 10,
            max_wait_secs: 180,
            describe_delay_ms: 4000,
            temperature: 0.3,
            alt_text_temperature: 0.3,
            request_timeout_secs: 600,
            bind: SocketAddr::from(([127, 0, 0, 1], 5000)),
            pdfium_lib_path: None,
            vision_provider: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("api_base_url", &self.api_base_url)
            .field("text_model", &self.text_model)
            .field("vision_model", &self.vision_model)
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("max_upload_mb", &self.max_upload_mb)
            .field("min_free_space_mb", &self.min_free_space_mb)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("max_wait_secs", &self.max_wait_secs)
            .field("describe_delay_ms", &self.describe_delay_ms)
            .field("temperature", &self.temperature)
            .field("bind", &self.bind)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "vision_provider",
                &self.vision_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .finish()
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn describe_delay(&self) -> Duration {
        Duration::from_millis(self.describe_delay_ms)
    }

    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_mb as usize).saturating_mul(1024 * 1024)
    }

    pub fn min_free_space_bytes(&self) -> u64 {
        self.min_free_space_mb.saturating_mul(1024 * 1024)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = model.into();
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn max_upload_mb(mut self, mb: u64) -> Self {
        self.config.max_upload_mb = mb;
        self
    }

    pub fn min_free_space_mb(mut self, mb: u64) -> Self {
        self.config.min_free_space_mb = mb;
        self
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs;
        self
    }

    pub fn max_wait_secs(mut self, secs: u64) -> Self {
        self.config.max_wait_secs = secs;
        self
    }

    pub fn describe_delay_ms(mut self, ms: u64) -> Self {
        self.config.describe_delay_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn alt_text_temperature(mut self, t: f32) -> Self {
        self.config.alt_text_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.bind = addr;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn vision_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.vision_provider = Some(provider);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, Pdf2HtmlError> {
        let c = &self.config;
        if c.poll_interval_secs == 0 {
            return Err(Pdf2HtmlError::InvalidConfig(
                "Poll interval must be ≥ 1 second".into(),
            ));
        }
        if c.max_wait_secs < c.poll_interval_secs {
            return Err(Pdf2HtmlError::InvalidConfig(format!(
                "Max wait ({}s) must be at least the poll interval ({}s)",
                c.max_wait_secs, c.poll_interval_secs
            )));
        }
        if c.max_upload_mb == 0 {
            return Err(Pdf2HtmlError::InvalidConfig(
                "Max upload size must be ≥ 1 MiB".into(),
            ));
        }
        if c.text_model.trim().is_empty() || c.vision_model.trim().is_empty() {
            return Err(Pdf2HtmlError::InvalidConfig(
                "Model names must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ServerConfig::default();
        assert_eq!(c.max_upload_mb, 30);
        assert_eq!(c.min_free_space_mb, 70);
        assert_eq!(c.poll_interval(), Duration::from_secs(10));
        assert_eq!(c.max_wait(), Duration::from_secs(180));
        assert_eq!(c.describe_delay(), Duration::from_secs(4));
        assert_eq!(c.upload_dir, PathBuf::from("uploads"));
        assert_eq!(c.output_dir, PathBuf::from("output"));
        assert_eq!(c.max_upload_bytes(), 30 * 1024 * 1024);
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let err = ServerConfig::builder().poll_interval_secs(0).build();
        assert!(matches!(err, Err(Pdf2HtmlError::InvalidConfig(_))));
    }

    #[test]
    fn max_wait_shorter_than_poll_rejected() {
        let err = ServerConfig::builder()
            .poll_interval_secs(30)
            .max_wait_secs(10)
            .build();
        assert!(matches!(err, Err(Pdf2HtmlError::InvalidConfig(_))));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let c = ServerConfig::builder()
            .api_base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(c.api_base_url, "http://localhost:8080");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ServerConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}

//! Alt text for extracted images.
//!
//! The extractor depends only on the [`ImageDescriber`] trait so tests can
//! swap in a deterministic describer. Production uses [`VisionDescriber`],
//! a thin wrapper over an `edgequake_llm` vision provider; all prompt text
//! lives in [`crate::prompts`].
//!
//! A failed description never aborts extraction: the caller substitutes
//! [`crate::prompts::ALT_TEXT_PLACEHOLDER`] and moves on to the next image.

use crate::config::ServerConfig;
use crate::error::{DescribeError, Pdf2HtmlError};
use crate::pipeline::encode::image_data_from_file;
use crate::prompts::{alt_text_prompt, ALT_TEXT_NO_VISION};
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, GeminiProvider, LLMProvider, ProviderFactory,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Produces alt text for one image file.
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    async fn describe(&self, image: &Path, language: &str) -> Result<String, DescribeError>;

    /// Whether calls count against a remote quota and must be paced.
    fn is_rate_limited(&self) -> bool {
        true
    }
}

/// Vision-model describer.
pub struct VisionDescriber {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
}

impl VisionDescriber {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32) -> Self {
        Self {
            provider,
            temperature,
        }
    }

    /// Use the injected provider if there is one. Otherwise build a Gemini
    /// provider for `vision_model` from the configured API key, falling back
    /// to the environment only when no key was configured.
    pub fn from_config(config: &ServerConfig) -> Result<Self, Pdf2HtmlError> {
        let provider: Arc<dyn LLMProvider> = match config.vision_provider {
            Some(ref p) => Arc::clone(p),
            None if !config.api_key.trim().is_empty() => Arc::new(
                GeminiProvider::new(config.api_key.clone()).with_model(&config.vision_model),
            ),
            None => ProviderFactory::create_llm_provider("gemini", &config.vision_model)
                .map_err(|e| Pdf2HtmlError::ProviderNotConfigured {
                    provider: "gemini".to_string(),
                    hint: format!("{e}\nSet GEMINI_API_KEY to enable alt-text generation."),
                })?,
        };
        Ok(Self::new(provider, config.alt_text_temperature))
    }
}

#[async_trait]
impl ImageDescriber for VisionDescriber {
    async fn describe(&self, image: &Path, language: &str) -> Result<String, DescribeError> {
        let start = Instant::now();
        let data = image_data_from_file(image)
            .await
            .map_err(|source| DescribeError::Read {
                path: image.to_path_buf(),
                source,
            })?;

        let prompt = alt_text_prompt(language);
        let messages = vec![ChatMessage::user_with_images(&prompt, vec![data])];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| DescribeError::Llm(e.to_string()))?;

        let alt = clean_alt_text(&response.content);
        debug!(
            "Alt text for {}: {} input tokens, {} output tokens, {:?}",
            image.display(),
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        if alt.is_empty() {
            warn!("Empty alt text for {}", image.display());
            return Err(DescribeError::Empty);
        }
        Ok(alt)
    }
}

/// Describer used when no vision model is available.
#[derive(Debug, Clone)]
pub struct StaticDescriber(pub String);

impl Default for StaticDescriber {
    fn default() -> Self {
        Self(ALT_TEXT_NO_VISION.to_string())
    }
}

#[async_trait]
impl ImageDescriber for StaticDescriber {
    async fn describe(&self, _image: &Path, _language: &str) -> Result<String, DescribeError> {
        Ok(self.0.clone())
    }

    fn is_rate_limited(&self) -> bool {
        false
    }
}

/// Normalise model output for an `alt` attribute.
///
/// Trims, removes single and double quotes, and folds newlines into spaces.
pub fn clean_alt_text(raw: &str) -> String {
    raw.trim()
        .replace(['"', '\''], "")
        .replace("\r\n", " ")
        .replace('\n', " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alt_text_is_cleaned() {
        assert_eq!(clean_alt_text("  \"A red bar chart\"\n"), "A red bar chart");
        assert_eq!(clean_alt_text("Line one\nline two"), "Line one line two");
        assert_eq!(clean_alt_text("It's a map"), "Its a map");
        assert_eq!(clean_alt_text("\r\n  \n"), "");
    }

    #[test]
    fn configured_key_builds_provider_without_env() {
        std::env::remove_var("GEMINI_API_KEY");
        let config = ServerConfig::builder()
            .api_key("configured-key")
            .vision_model("gemini-2.0-flash")
            .build()
            .unwrap();

        let describer = VisionDescriber::from_config(&config).unwrap();
        assert_eq!(describer.provider.name(), "gemini");
        assert_eq!(describer.provider.model(), "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn static_describer_returns_fixed_text() {
        let d = StaticDescriber::default();
        let alt = d.describe(Path::new("missing.png"), "Hindi").await.unwrap();
        assert_eq!(alt, "Image");
    }
}

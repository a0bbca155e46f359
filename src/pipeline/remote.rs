//! Remote file handling on the Gemini Files API.
//!
//! A PDF is uploaded once per conversion, polled until the service has
//! finished ingesting it, referenced by URI in a single generation call and
//! then deleted. Every path out of this module either returns an `Active`
//! file to the caller, who then owns its deletion, or deletes the file itself.
//!
//! ## State machine
//!
//! ```text
//! upload ──▶ PROCESSING ──▶ ACTIVE
//!                 │
//!                 ├──▶ FAILED              (released, error)
//!                 └──▶ still PROCESSING    (timed out: released, error)
//! ```
//!
//! ## Why async polling with a deadline?
//!
//! Ingesting a large PDF can take minutes. The wait is a `tokio::time` loop
//! rather than a blocking sleep, so a server thread is never parked on it,
//! and the elapsed time is measured rather than summed from sleep lengths.

use crate::config::ServerConfig;
use crate::error::{Pdf2HtmlError, RemoteError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Prefix of the display name given to uploaded PDFs.
pub const DISPLAY_NAME_PREFIX: &str = "pdf-conversion-input-";

/// Ingestion state reported by the Files API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Processing,
    Active,
    Failed,
    #[default]
    #[serde(rename = "STATE_UNSPECIFIED", other)]
    Unspecified,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileState::Processing => "PROCESSING",
            FileState::Active => "ACTIVE",
            FileState::Failed => "FAILED",
            FileState::Unspecified => "STATE_UNSPECIFIED",
        })
    }
}

/// Error status attached to a file that failed ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileStatus {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// A file held by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, `files/<id>`.
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub state: FileState,
    #[serde(default)]
    pub error: Option<FileStatus>,
}

/// One generation call against an uploaded file.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system_text: String,
    pub file_uri: String,
    pub file_mime_type: String,
    pub task_text: String,
    pub temperature: f32,
}

/// Text of the first candidate, or the reason the prompt was blocked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateResponse {
    pub text: Option<String>,
    pub block_reason: Option<String>,
}

/// Remote operations the conversion needs.
#[async_trait]
pub trait RemoteFileService: Send + Sync {
    async fn upload(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, RemoteError>;

    async fn get(&self, name: &str) -> Result<RemoteFile, RemoteError>;

    async fn delete(&self, name: &str) -> Result<(), RemoteError>;

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, RemoteError>;
}

/// [`RemoteFileService`] over the Gemini REST API.
#[derive(Clone)]
pub struct GeminiFileService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for GeminiFileService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiFileService")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiFileService {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, RemoteError> {
        Self::new(
            config.api_key.clone(),
            config.api_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn resource_url(&self, name: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, name)
    }
}

/// Turn a non-2xx response into [`RemoteError::Api`], preferring the JSON error message.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(RemoteError::Api {
        status: status.as_u16(),
        message,
    })
}

#[derive(Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[async_trait]
impl RemoteFileService for GeminiFileService {
    async fn upload(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, RemoteError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| RemoteError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        // Resumable protocol: open a session, then send the bytes in one chunk.
        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(RemoteError::MissingUploadUrl)?;

        let finished = self
            .client
            .post(&upload_url)
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let finished = check_status(finished).await?;

        let body: UploadResponse = finished
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(body.file)
    }

    async fn get(&self, name: &str) -> Result<RemoteFile, RemoteError> {
        let response = self
            .client
            .get(self.resource_url(name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.resource_url(name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, RemoteError> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.system_text },
                    { "file_data": {
                        "mime_type": request.file_mime_type,
                        "file_uri": request.file_uri,
                    }},
                    { "text": request.task_text },
                ],
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "responseMimeType": "text/plain",
            },
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, request.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let value: serde_json::Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(parse_generate_response(&value))
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_generate_response(value: &serde_json::Value) -> GenerateResponse {
    let text = value["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .filter(|t| !t.is_empty());
    let block_reason = value["promptFeedback"]["blockReason"]
        .as_str()
        .map(str::to_string);
    GenerateResponse { text, block_reason }
}

/// Display name for an uploaded PDF.
pub fn display_name_for(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{DISPLAY_NAME_PREFIX}{base}")
}

/// Poll `file` until it leaves `Processing` or `max_wait` elapses.
///
/// Returns the file when it is `Active`. Any other end state, a timeout or a
/// failed status check is an error; the caller is responsible for releasing
/// the file in that case (see [`upload_and_wait`]).
pub async fn wait_until_active(
    service: &dyn RemoteFileService,
    mut file: RemoteFile,
    poll_interval: Duration,
    max_wait: Duration,
) -> Result<RemoteFile, Pdf2HtmlError> {
    let start = Instant::now();
    let mut poll_error: Option<String> = None;

    while file.state == FileState::Processing && start.elapsed() < max_wait {
        debug!(
            "Waiting for PDF file '{}' (State: {})... waiting {:?}",
            file.name, file.state, poll_interval
        );
        tokio::time::sleep(poll_interval).await;
        match service.get(&file.name).await {
            Ok(updated) => file = updated,
            Err(e) => {
                warn!("Error fetching file status for {}: {}. Aborting wait.", file.name, e);
                poll_error = Some(format!("Error fetching file status: {e}"));
                break;
            }
        }
    }

    let waited_secs = start.elapsed().as_secs();
    if file.state == FileState::Active && poll_error.is_none() {
        info!(file = %file.name, waited_secs, "Remote file is active");
        return Ok(file);
    }

    let detail = match (&file.error, poll_error) {
        (Some(status), _) => Some(format!(
            "Error during file processing: Code {}, Message: {}",
            status.code, status.message
        )),
        (None, Some(poll)) => Some(poll),
        (None, None) => None,
    };
    Err(Pdf2HtmlError::RemoteFileNotActive {
        name: file.name,
        state: file.state.to_string(),
        waited_secs,
        detail,
    })
}

/// Upload `pdf_path` and wait for it to become active.
///
/// On any failure after the upload succeeded the remote file is deleted
/// before the error is returned.
pub async fn upload_and_wait(
    service: &dyn RemoteFileService,
    pdf_path: &Path,
    poll_interval: Duration,
    max_wait: Duration,
) -> Result<RemoteFile, Pdf2HtmlError> {
    let display_name = display_name_for(pdf_path);
    info!("Uploading {} as '{}'", pdf_path.display(), display_name);

    let file = service
        .upload(pdf_path, &display_name, "application/pdf")
        .await
        .map_err(Pdf2HtmlError::RemoteUploadFailed)?;
    info!(file = %file.name, state = %file.state, "Upload accepted");

    let name = file.name.clone();
    match wait_until_active(service, file, poll_interval, max_wait).await {
        Ok(active) => Ok(active),
        Err(e) => {
            release(service, &name).await;
            Err(e)
        }
    }
}

/// Delete a remote file, logging rather than propagating failures.
pub async fn release(service: &dyn RemoteFileService, name: &str) {
    match service.delete(name).await {
        Ok(()) => info!(file = %name, "Deleted remote file"),
        Err(e) => warn!(file = %name, error = %e, "Could not delete remote file"),
    }
}

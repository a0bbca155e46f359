//! Single-call HTML generation from an uploaded PDF.
//!
//! The request is three parts: the system instruction (rules, head markup,
//! image metadata), the file reference, and a short task restatement. The
//! response is plain text; models still like to wrap it in a Markdown fence,
//! which [`strip_code_fences`] removes.
//!
//! Generation never raises. A failed call, a blocked prompt or an empty
//! answer each produce a small error document so the rest of the pipeline
//! (finalizing, writing, serving) runs unchanged and the user sees what went
//! wrong in place of their document.

use crate::config::ServerConfig;
use crate::pipeline::extract::ImageRecord;
use crate::pipeline::remote::{release, GenerateRequest, RemoteFile, RemoteFileService};
use crate::prompts::{head_markup, system_prompt, task_prompt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

/// Generate HTML for `file`.
pub async fn generate_html(
    service: &dyn RemoteFileService,
    file: &RemoteFile,
    images: &[ImageRecord],
    languages: &[String],
    config: &ServerConfig,
) -> String {
    let head = head_markup(languages);
    let images_json = match serde_json::to_string_pretty(images) {
        Ok(json) => json,
        Err(e) => return fallback_html(&head, &format!("Could not serialise image metadata: {e}")),
    };

    let request = GenerateRequest {
        model: config.text_model.clone(),
        system_text: system_prompt(languages, &head, &images_json),
        file_uri: file.uri.clone(),
        file_mime_type: file.mime_type.clone(),
        task_text: task_prompt(languages),
        temperature: config.temperature,
    };

    info!(
        file = %file.name,
        images = images.len(),
        languages = %languages.join(", "),
        "Requesting HTML generation"
    );

    let response = match service.generate(&request).await {
        Ok(r) => r,
        Err(e) => {
            error!("Error during HTML generation: {}", e);
            return fallback_html(&head, &e.to_string());
        }
    };

    match (response.text, response.block_reason) {
        (Some(text), _) if !text.trim().is_empty() => {
            info!("HTML generation complete ({} bytes)", text.len());
            strip_code_fences(&text)
        }
        (_, Some(reason)) => {
            warn!("Prompt blocked: {}", reason);
            fallback_html(&head, &format!("The request was blocked by the model: {reason}"))
        }
        _ => {
            warn!("Generation returned no text");
            fallback_html(&head, "Received empty content from the generation model.")
        }
    }
}

/// Generate HTML and delete the remote file afterwards, even if generation panics.
pub async fn generate_and_release(
    service: &dyn RemoteFileService,
    file: &RemoteFile,
    images: &[ImageRecord],
    languages: &[String],
    config: &ServerConfig,
) -> String {
    let outcome = AssertUnwindSafe(generate_html(service, file, images, languages, config))
        .catch_unwind()
        .await;
    release(service, &file.name).await;

    match outcome {
        Ok(html) => html,
        Err(_) => {
            error!(file = %file.name, "HTML generation panicked");
            fallback_html(&head_markup(languages), "Internal error during HTML generation.")
        }
    }
}

/// Remove a surrounding ```` ```html ```` or bare ```` ``` ```` fence.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```html") {
        let body = rest.rsplit_once("```").map(|(b, _)| b).unwrap_or(rest);
        return body.trim().to_string();
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim();
        let body = rest.strip_suffix("```").unwrap_or(rest);
        return body.trim().to_string();
    }
    trimmed.to_string()
}

/// Minimal document describing a generation failure.
pub fn fallback_html(head: &str, message: &str) -> String {
    format!(
        "<html><head>{head}</head><body><h1>Error generating HTML</h1><p>{}</p></body></html>",
        html_escape::encode_text(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::remote::tests::{file, ScriptedService};
    use crate::pipeline::remote::{FileState, GenerateResponse};

    fn langs() -> Vec<String> {
        vec!["English".to_string(), "Hindi".to_string()]
    }

    fn record() -> ImageRecord {
        ImageRecord {
            pdf_page_num: 1,
            image_index_on_page: 1,
            html_src_path: "extracted_images/page_1_idx_1_gidx_1.png".into(),
            alt_text: "चार्ट".into(),
        }
    }

    #[test]
    fn strips_html_fence() {
        assert_eq!(strip_code_fences("```html\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(strip_code_fences("  ```html\n<p>x</p>"), "<p>x</p>");
    }

    #[test]
    fn strips_bare_fence() {
        assert_eq!(strip_code_fences("```\n<p>x</p>\n```\n"), "<p>x</p>");
    }

    #[test]
    fn unfenced_output_is_trimmed_only() {
        assert_eq!(strip_code_fences("\n<html></html>\n"), "<html></html>");
    }

    #[test]
    fn fallback_escapes_message() {
        let html = fallback_html("<title>t</title>", "bad <input>");
        assert!(html.contains("<h1>Error generating HTML</h1>"));
        assert!(html.contains("bad &lt;input&gt;"));
        assert!(html.starts_with("<html><head><title>t</title></head>"));
    }

    #[tokio::test]
    async fn request_carries_prompts_file_and_metadata() {
        let svc = ScriptedService::new(FileState::Active, vec![]);
        let config = ServerConfig::default();
        let html = generate_html(&svc, &file(FileState::Active), &[record()], &langs(), &config).await;
        assert_eq!(html, "<html><body><p>ok</p></body></html>");

        let sent = svc.generated.lock().unwrap();
        let req = &sent[0];
        assert_eq!(req.model, "gemini-2.5-flash");
        assert_eq!(req.file_uri, "https://files.example/abc123");
        assert!(req.system_text.contains("\"pdf_page_num\": 1"));
        // Non-ASCII alt text is kept verbatim in the JSON.
        assert!(req.system_text.contains("चार्ट"));
        assert!(req.task_text.contains("Language presentation: English, Hindi."));
        assert!((req.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn call_failure_yields_error_document() {
        let svc = ScriptedService::new(FileState::Active, vec![]);
        *svc.generate_result.lock().unwrap() = Some(Err(500));
        let html = generate_html(&svc, &file(FileState::Active), &[], &langs(), &ServerConfig::default()).await;
        assert!(html.contains("Error generating HTML"));
        assert!(html.contains("generation failed"));
    }

    #[tokio::test]
    async fn blocked_or_empty_yields_error_document() {
        let svc = ScriptedService::new(FileState::Active, vec![]);
        *svc.generate_result.lock().unwrap() = Some(Ok(GenerateResponse {
            text: None,
            block_reason: Some("SAFETY".into()),
        }));
        let html = generate_html(&svc, &file(FileState::Active), &[], &langs(), &ServerConfig::default()).await;
        assert!(html.contains("blocked by the model: SAFETY"));

        *svc.generate_result.lock().unwrap() = Some(Ok(GenerateResponse {
            text: Some("   ".into()),
            block_reason: None,
        }));
        let html = generate_html(&svc, &file(FileState::Active), &[], &langs(), &ServerConfig::default()).await;
        assert!(html.contains("Received empty content"));
    }

    #[tokio::test]
    async fn remote_file_released_after_generation() {
        let svc = ScriptedService::new(FileState::Active, vec![]);
        *svc.generate_result.lock().unwrap() = Some(Err(500));
        generate_and_release(&svc, &file(FileState::Active), &[], &langs(), &ServerConfig::default()).await;
        assert_eq!(svc.deleted(), vec!["files/abc123".to_string()]);
    }
}

//! Embedded-image extraction via pdfium, followed by alt-text generation.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! The page walk and image decoding run under `tokio::task::spawn_blocking`;
//! only the alt-text calls, which are network-bound, run on the async side.
//!
//! ## Naming
//!
//! Each image is written as `page_{p}_idx_{i}_gidx_{g}.png`: `p` is the
//! 1-based page, `i` the 1-based position among the page's *decodable*
//! images and `g` a document-wide running counter. Images pdfium cannot
//! decode are skipped without consuming an index, so the numbering the model
//! sees in the metadata is always dense.

use crate::config::ServerConfig;
use crate::error::Pdf2HtmlError;
use crate::pipeline::describe::ImageDescriber;
use crate::pipeline::encode::{encode_png, EXTRACTED_IMAGE_EXT};
use crate::progress::ConversionProgressCallback;
use crate::prompts::ALT_TEXT_PLACEHOLDER;
use crate::session::IMAGES_SUBDIR;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Metadata for one extracted image, as handed to the generation model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// 1-based page number.
    pub pdf_page_num: usize,
    /// 1-based position among the page's extracted images.
    pub image_index_on_page: usize,
    /// Path relative to the final HTML, e.g. `extracted_images/page_1_idx_1_gidx_1.png`.
    pub html_src_path: String,
    pub alt_text: String,
}

/// An image written to disk that still needs alt text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    pub page_num: usize,
    pub index_on_page: usize,
    pub global_index: usize,
    pub path: PathBuf,
}

impl ExtractedImage {
    pub fn file_name(&self) -> String {
        image_file_name(self.page_num, self.index_on_page, self.global_index)
    }
}

pub fn image_file_name(page: usize, index: usize, global: usize) -> String {
    format!("page_{page}_idx_{index}_gidx_{global}.{EXTRACTED_IMAGE_EXT}")
}

/// Extract every embedded image of `pdf_path` into `images_dir` and describe it.
///
/// A missing document yields an empty list, as does a document without images.
pub async fn extract(
    pdf_path: &Path,
    images_dir: &Path,
    describer: &dyn ImageDescriber,
    primary_language: &str,
    config: &ServerConfig,
    progress: &dyn ConversionProgressCallback,
) -> Result<Vec<ImageRecord>, Pdf2HtmlError> {
    if !pdf_path.exists() {
        warn!("PDF not found: {}", pdf_path.display());
        return Ok(Vec::new());
    }

    let images = write_images(pdf_path, images_dir, config.pdfium_lib_path.clone()).await?;
    info!("Extracted {} images from {}", images.len(), pdf_path.display());

    Ok(describe_all(
        images,
        describer,
        primary_language,
        config.describe_delay(),
        progress,
    )
    .await)
}

/// Run the pdfium walk on the blocking pool.
pub async fn write_images(
    pdf_path: &Path,
    images_dir: &Path,
    pdfium_lib_path: Option<PathBuf>,
) -> Result<Vec<ExtractedImage>, Pdf2HtmlError> {
    let path = pdf_path.to_path_buf();
    let out = images_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(pdfium_lib_path.as_deref())?;
        write_images_blocking(&pdfium, &path, &out)
    })
    .await
    .map_err(|e| Pdf2HtmlError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Bind to pdfium at `lib_dir` if given, else to the system library.
pub fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, Pdf2HtmlError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            .or_else(|_| Pdfium::bind_to_system_library()),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Pdf2HtmlError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn write_images_blocking(
    pdfium: &Pdfium,
    pdf_path: &Path,
    images_dir: &Path,
) -> Result<Vec<ExtractedImage>, Pdf2HtmlError> {
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| Pdf2HtmlError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    std::fs::create_dir_all(images_dir).map_err(|source| Pdf2HtmlError::OutputWriteFailed {
        path: images_dir.to_path_buf(),
        source,
    })?;

    let pages = document.pages();
    debug!("PDF loaded: {} pages", pages.len());

    let mut results = Vec::new();
    let mut global = 0usize;

    for (page_idx, page) in pages.iter().enumerate() {
        let page_num = page_idx + 1;
        let mut index_on_page = 0usize;

        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };

            let decoded = match image_object.get_raw_image() {
                Ok(img) => img,
                Err(e) => {
                    warn!("Could not extract image data on page {}: {:?}", page_num, e);
                    continue;
                }
            };
            let bytes = match encode_png(&decoded) {
                Ok(b) => b,
                Err(e) => {
                    warn!("Could not encode image on page {}: {}", page_num, e);
                    continue;
                }
            };

            global += 1;
            index_on_page += 1;

            let file_name = image_file_name(page_num, index_on_page, global);
            let path = images_dir.join(&file_name);
            std::fs::write(&path, &bytes).map_err(|source| Pdf2HtmlError::OutputWriteFailed {
                path: path.clone(),
                source,
            })?;
            debug!(
                "Extracted {} ({}x{} px)",
                file_name,
                decoded.width(),
                decoded.height()
            );

            results.push(ExtractedImage {
                page_num,
                index_on_page,
                global_index: global,
                path,
            });
        }
    }

    Ok(results)
}

/// Attach alt text to each extracted image, in extraction order.
///
/// Each call is preceded by `delay` when the describer is rate limited.
pub async fn describe_all(
    images: Vec<ExtractedImage>,
    describer: &dyn ImageDescriber,
    language: &str,
    delay: Duration,
    progress: &dyn ConversionProgressCallback,
) -> Vec<ImageRecord> {
    let mut records = Vec::with_capacity(images.len());

    for image in images {
        if describer.is_rate_limited() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let alt_text = match describer.describe(&image.path, language).await {
            Ok(alt) => alt,
            Err(e) => {
                warn!("Error generating alt text for {}: {}", image.path.display(), e);
                ALT_TEXT_PLACEHOLDER.to_string()
            }
        };
        progress.on_image_described(image.page_num, image.global_index);

        records.push(ImageRecord {
            pdf_page_num: image.page_num,
            image_index_on_page: image.index_on_page,
            html_src_path: format!("{}/{}", IMAGES_SUBDIR, image.file_name()),
            alt_text,
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DescribeError;
    use crate::progress::NoopProgressCallback;
    use async_trait::async_trait;
    use pdfium_render::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails on every second call.
    struct FlakyDescriber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ImageDescriber for FlakyDescriber {
        async fn describe(&self, image: &Path, language: &str) -> Result<String, DescribeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                return Err(DescribeError::Llm("quota exceeded".into()));
            }
            let name = image.file_name().unwrap().to_string_lossy().into_owned();
            Ok(format!("{name} in {language}"))
        }
    }

    fn img(page: usize, idx: usize, global: usize) -> ExtractedImage {
        ExtractedImage {
            page_num: page,
            index_on_page: idx,
            global_index: global,
            path: PathBuf::from(format!("/tmp/{}", image_file_name(page, idx, global))),
        }
    }

    #[test]
    fn file_names_follow_pattern() {
        assert_eq!(image_file_name(3, 2, 7), "page_3_idx_2_gidx_7.png");
    }

    #[test]
    fn record_serialises_with_prompt_field_names() {
        let r = ImageRecord {
            pdf_page_num: 1,
            image_index_on_page: 2,
            html_src_path: "extracted_images/page_1_idx_2_gidx_2.png".into(),
            alt_text: "A chart".into(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["pdf_page_num"], 1);
        assert_eq!(json["image_index_on_page"], 2);
        assert_eq!(json["html_src_path"], "extracted_images/page_1_idx_2_gidx_2.png");
        assert_eq!(json["alt_text"], "A chart");
    }

    #[tokio::test]
    async fn failed_descriptions_get_placeholder_and_order_is_kept() {
        let describer = FlakyDescriber {
            calls: AtomicUsize::new(0),
        };
        let images = vec![img(1, 1, 1), img(1, 2, 2), img(3, 1, 3)];

        let records = describe_all(
            images,
            &describer,
            "Hindi",
            Duration::ZERO,
            &NoopProgressCallback,
        )
        .await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].alt_text, "page_1_idx_1_gidx_1.png in Hindi");
        assert_eq!(records[1].alt_text, ALT_TEXT_PLACEHOLDER);
        assert_eq!(records[2].pdf_page_num, 3);
        assert_eq!(records[2].image_index_on_page, 1);
        assert_eq!(records[2].html_src_path, "extracted_images/page_3_idx_1_gidx_3.png");
    }

    #[tokio::test(start_paused = true)]
    async fn describe_calls_are_paced() {
        let describer = FlakyDescriber {
            calls: AtomicUsize::new(0),
        };
        let start = tokio::time::Instant::now();
        describe_all(
            vec![img(1, 1, 1), img(1, 2, 2)],
            &describer,
            "English",
            Duration::from_secs(4),
            &NoopProgressCallback,
        )
        .await;
        assert!(start.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test]
    async fn missing_pdf_yields_no_images() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default();
        let records = extract(
            &dir.path().join("gone.pdf"),
            &dir.path().join(IMAGES_SUBDIR),
            &crate::pipeline::describe::StaticDescriber::default(),
            "English",
            &config,
            &NoopProgressCallback,
        )
        .await
        .unwrap();
        assert!(records.is_empty());
    }

    // ── pdfium-backed walk ───────────────────────────────────────────────
    // Needs a pdfium library (PDFIUM_LIB_PATH or the system one); skipped
    // otherwise. Both documents are checked in one test because every
    // `Pdfium` instance initialises and tears down the library.

    fn build_two_page_pdf(pdfium: &Pdfium, path: &Path, image_on_first_page: bool) {
        let mut document = pdfium.create_new_pdf().unwrap();
        let font = document.fonts_mut().helvetica();
        for page_num in 1..=2 {
            let mut page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::a4())
                .unwrap();
            page.objects_mut()
                .create_text_object(
                    PdfPoints::new(72.0),
                    PdfPoints::new(720.0),
                    format!("Page {page_num}"),
                    font,
                    PdfPoints::new(12.0),
                )
                .unwrap();
            if image_on_first_page && page_num == 1 {
                let picture = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
                    8,
                    6,
                    image::Rgb([200, 30, 30]),
                ));
                let object =
                    PdfPageImageObject::new_with_width(&document, &picture, PdfPoints::new(80.0))
                        .unwrap();
                page.objects_mut().add_image_object(object).unwrap();
            }
        }
        document.save_to_file(path).unwrap();
    }

    #[tokio::test]
    async fn pdfium_walk_finds_embedded_images() {
        let lib_dir = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
        let dir = tempfile::tempdir().unwrap();
        let text_only = dir.path().join("text_only.pdf");
        let with_image = dir.path().join("with_image.pdf");

        {
            let pdfium = match bind_pdfium(lib_dir.as_deref()) {
                Ok(p) => p,
                Err(e) => {
                    println!("SKIP: {e}");
                    return;
                }
            };
            build_two_page_pdf(&pdfium, &text_only, false);
            build_two_page_pdf(&pdfium, &with_image, true);
        }

        let mut builder = ServerConfig::builder().describe_delay_ms(0);
        if let Some(ref d) = lib_dir {
            builder = builder.pdfium_lib_path(d.clone());
        }
        let config = builder.build().unwrap();
        let describer = crate::pipeline::describe::StaticDescriber::default();

        // Text only: nothing extracted, nothing written.
        let images_dir = dir.path().join("text_out").join(IMAGES_SUBDIR);
        let records = extract(
            &text_only,
            &images_dir,
            &describer,
            "English",
            &config,
            &NoopProgressCallback,
        )
        .await
        .unwrap();
        assert!(records.is_empty());
        assert_eq!(std::fs::read_dir(&images_dir).unwrap().count(), 0);

        // One image on page 1 of 2.
        let images_dir = dir.path().join("image_out").join(IMAGES_SUBDIR);
        let records = extract(
            &with_image,
            &images_dir,
            &describer,
            "English",
            &config,
            &NoopProgressCallback,
        )
        .await
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pdf_page_num, 1);
        assert_eq!(records[0].image_index_on_page, 1);
        assert_eq!(
            records[0].html_src_path,
            "extracted_images/page_1_idx_1_gidx_1.png"
        );
        assert_eq!(records[0].alt_text, "Image");

        let written = images_dir.join("page_1_idx_1_gidx_1.png");
        let decoded = image::open(&written).unwrap();
        assert!(decoded.width() > 0 && decoded.height() > 0);
    }
}

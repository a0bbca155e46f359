//! Pipeline stages for PDF-to-HTML conversion.
//!
//! Each submodule implements one step. The remote service and the image
//! describer sit behind traits so the stages can be tested without network
//! access.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ describe ──▶ remote ──▶ generate ──▶ finalize
//! (checks)  (pdfium)    (vision)     (upload,   (one call)   (doctype,
//!                                     poll)                   lang, head)
//! ```
//!
//! 1. [`input`]    validate the upload: extension, magic bytes, languages
//! 2. [`extract`]  save every embedded image as PNG; pdfium runs in
//!    `spawn_blocking` because it is not async-safe
//! 3. [`describe`] alt text per image in the primary language, paced to
//!    respect rate limits
//! 4. [`encode`]   PNG and base64 helpers shared by extract and describe
//! 5. [`remote`]   Files API client: resumable upload, readiness polling,
//!    deletion and the generation call
//! 6. [`generate`] build the prompt, call the model once, strip fences
//! 7. [`finalize`] make the output a complete, language-tagged document

pub mod describe;
pub mod encode;
pub mod extract;
pub mod finalize;
pub mod generate;
pub mod input;
pub mod remote;

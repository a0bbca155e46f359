//! Prompts and shared `<head>` markup for PDF-to-HTML generation.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the generation call, the alt-text call and
//!    the finalizer all agree on the same head markup and language wording.
//!
//! 2. **Testability**: unit tests can inspect prompts directly without a
//!    live model, making prompt regressions easy to catch.

use crate::languages::lang_code;

/// Prompt for a single image's alt text. `{lang}` is the primary target language.
pub fn alt_text_prompt(language: &str) -> String {
    format!(
        "Provide a single, concise, and descriptive alt text for this image in {language}, \
suitable for an HTML img tag's 'alt' attribute. Output only the alt text string itself, \
with no additional explanations, quotation marks, or markdown formatting. Be factual and brief."
    )
}

/// Alt text used when the vision call fails for an image.
pub const ALT_TEXT_PLACEHOLDER: &str = "Image placeholder - error generating alt text";

/// Alt text used when no vision model is available at all.
pub const ALT_TEXT_NO_VISION: &str = "Image";

/// Join names as `A`, `A and B`, or `A, B and C`.
fn join_names(languages: &[String]) -> String {
    match languages {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// Instructions describing how the target languages are laid out.
pub fn language_instructions(languages: &[String]) -> String {
    match languages {
        [] => language_instructions(&[crate::languages::DEFAULT_LANGUAGE.to_string()]),
        [only] => format!("The entire HTML content, including all text, should be in {only}."),
        [primary, rest @ ..] => {
            let order = rest
                .iter()
                .map(|l| format!("Then, present its translation in {l}."))
                .collect::<Vec<_>>()
                .join("\n");
            let second = &rest[0];
            format!(
                "The entire HTML content should be presented in all specified languages: {all}.
For each piece of text content (e.g., paragraph, list item, heading), first present it in {primary}.
{order}
Example for a paragraph with {primary} and {second}:
<p lang=\"{pc}\">Paragraph text in {primary}.</p>
<p lang=\"{sc}\">The same paragraph in {second}.</p>
Maintain this point-by-point or segment-by-segment multilingual presentation throughout the document. Use 'lang' attributes on text elements.",
                all = join_names(languages),
                pc = lang_code(primary),
                sc = lang_code(second),
            )
        }
    }
}

/// Markup placed inside `<head>`: charset, viewport, title, fonts, MathJax and styles.
pub fn head_markup(languages: &[String]) -> String {
    let title = html_escape::encode_text(&languages.join(", ")).into_owned();
    format!(
        r#"<meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>PDF Content ({title})</title>
    <link href="https://fonts.googleapis.com/css2?family=Noto+Sans+Devanagari:wght@400;700&family=Noto+Sans:wght@400;700&display=swap" rel="stylesheet">
    <script>
        window.MathJax = {{
          tex: {{
            inlineMath: [['$', '$'], ['\\(', '\\)']],
            displayMath: [['$$', '$$'], ['\\[', '\\]']]
          }},
          chtml: {{ matchFontHeight: false, mtextInheritFont: true }},
          svg: {{ mtextInheritFont: true }}
        }};
    </script>
    <script type="text/javascript" id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
    <style>
      body {{ font-family: 'Noto Sans', 'Noto Sans Devanagari', sans-serif; margin: 20px; line-height: 1.6; }}
      .scrollable-table-wrapper {{ overflow-x: auto; margin-bottom: 1em; border: 1px solid #ddd; }}
      table {{ border-collapse: collapse; width: 100%; }}
      th, td {{ border: 1px solid #ccc; padding: 8px; text-align: left; vertical-align: top; }}
      th {{ background-color: #f2f2f2; }}
      img {{ max-width: 100%; height: auto; display: block; margin: 1em auto; border: 1px solid #eee; }}
      h1, h2, h3, h4, h5, h6 {{ margin-top: 1.5em; margin-bottom: 0.5em; }}
      p {{ margin-bottom: 1em; }}
      ul, ol {{ margin-bottom: 1em; padding-left: 40px; }}
      li {{ margin-bottom: 0.5em; }}
    </style>"#
    )
}

/// System instruction for the generation call.
///
/// `images_json` is the pretty-printed image metadata list.
pub fn system_prompt(languages: &[String], head: &str, images_json: &str) -> String {
    let langs = language_instructions(languages);
    format!(
        r#"You are an expert PDF to HTML converter.
Your primary goal is to convert the provided PDF content (given as a file input) and associated image information (given as structured text/JSON) into a single, well-structured, and valid HTML file.
The HTML should accurately replicate the text content, general layout, tables, lists, and headings from the PDF.
ONLY use content and information present in the original PDF. DO NOT add any new data, opinions, or external information.

**Language Output:**
{langs}

**HTML Formatting Rules:**
1.  Use pure HTML tags ONLY. No Markdown syntax.
2.  Structure: Complete HTML document (`<!DOCTYPE html>`, `<html>`, `<head>`, `<body>`). The `<head>` section MUST include:
{head}
3.  Equations: Use MathJax compatible LaTeX. Inline: `\( ... \)` or `$ ... $`. Display: `\[ ... \]` or `$$ ... $$`.
4.  Tables: Convert PDF tables into HTML `<table>`. Wrap wide tables in `<div class="scrollable-table-wrapper">...</div>`.
5.  Text Preservation: Preserve all text exactly as it appears in the PDF, then translate/present according to language instructions. For multi-language, use `lang` attribute on paragraph or span tags for each language segment.
6.  Diagrams (Non-Image): If the PDF contains diagrams made from text, lines, or shapes, attempt to replicate their structure using semantic HTML and CSS. If too complex, describe it briefly in text.

**Image Handling - CRITICAL:**
You have been provided with a JSON list of pre-extracted image metadata.
When you identify an image's position in the PDF content:
- You MUST use the provided metadata to insert an `<img>` tag: `<img src="[html_src_path]" alt="[alt_text]" style="max-width:100%; height:auto; display:block; margin:1em auto;">`
- Match image from PDF context to `pdf_page_num` and `image_index_on_page` from metadata.

**Image Metadata (use this to insert <img> tags):**
```json
{images_json}
```

Respond ONLY with the complete HTML code. Do not include any explanations before or after the HTML.
The final HTML should be displayable in Google Chrome and visually resemble the PDF's structure and content.
"#
    )
}

/// User task message sent after the file part.
pub fn task_prompt(languages: &[String]) -> String {
    format!(
        "Please convert the entire PDF (provided as the file input part of this prompt) into a single HTML file.
Follow all instructions in the system prompt precisely, especially regarding:
- Language presentation: {}.
- Using ONLY pure HTML tags (NO MARKDOWN).
- Directly inserting `<img>` tags using the provided image metadata JSON.
- Including the specified `<head>` content.
- Correctly formatting MathJax equations.
Process all pages of the PDF.
",
        languages.join(", ")
    )
}

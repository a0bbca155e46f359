//! Final adjustments to generated HTML before it is written to disk.
//!
//! The model is asked for a complete document but does not always deliver
//! one. Finalizing guarantees four things:
//!
//! 1. a `<!DOCTYPE html>` prefix;
//! 2. a root `<html>` whose `lang` is the primary target language's code;
//! 3. a `<head>` carrying the shared head markup;
//! 4. that running it twice changes nothing.
//!
//! Tag-level changes go through `lol_html`, which rewrites the token stream
//! without re-serialising it, so everything the model wrote outside the
//! touched tags is preserved byte for byte. Only the doctype and the wrap of
//! a bare fragment are handled as plain text.

use crate::languages::primary_lang_code;
use lol_html::html_content::ContentType;
use lol_html::{element, rewrite_str, RewriteStrSettings};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::Cell;
use tracing::{debug, warn};

static RE_LEADING_DOCTYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*<!doctype\s+html").unwrap());

static RE_ANY_DOCTYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!doctype[^>]*>").unwrap());

/// Which structural elements a document already has.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Structure {
    html: bool,
    head: bool,
    body: bool,
}

/// Turn raw generated HTML into a complete, language-tagged document.
pub fn finalize(raw_html: &str, head: &str, languages: &[String]) -> String {
    if raw_html.trim().is_empty() {
        return format!(
            "<!DOCTYPE html><html lang=\"en\"><head>{head}</head><body><p>Error: Received empty content from the generation model.</p></body></html>"
        );
    }

    let code = primary_lang_code(languages);

    let structure = match scan(raw_html) {
        Ok(s) => s,
        Err(e) => {
            warn!("Could not scan generated HTML, treating it as a fragment: {}", e);
            Structure::default()
        }
    };

    if !structure.html {
        debug!("No root element in generated HTML; wrapping fragment");
        let fragment = RE_ANY_DOCTYPE.replace_all(raw_html, "");
        return format!(
            "<!DOCTYPE html>\n<html lang=\"{code}\">\n<head>\n{head}\n</head>\n<body>\n{}\n</body>\n</html>",
            fragment.trim()
        );
    }

    let document = if RE_LEADING_DOCTYPE.is_match(raw_html) {
        raw_html.to_string()
    } else {
        format!("<!DOCTYPE html>\n{raw_html}")
    };

    match rewrite_root(&document, head, code, structure) {
        Ok(html) => html,
        Err(e) => {
            warn!("HTML rewrite failed, keeping model output as-is: {}", e);
            document
        }
    }
}

/// Look for real `html`, `head` and `body` elements. Tags inside comments,
/// scripts or attribute values are not elements and are not counted.
fn scan(document: &str) -> Result<Structure, lol_html::errors::RewritingError> {
    let has_html = Cell::new(false);
    let has_head = Cell::new(false);
    let has_body = Cell::new(false);
    rewrite_str(
        document,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("html", |_el| {
                    has_html.set(true);
                    Ok(())
                }),
                element!("head", |_el| {
                    has_head.set(true);
                    Ok(())
                }),
                element!("body", |_el| {
                    has_body.set(true);
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )?;
    Ok(Structure {
        html: has_html.get(),
        head: has_head.get(),
        body: has_body.get(),
    })
}

fn rewrite_root(
    document: &str,
    head: &str,
    code: &str,
    structure: Structure,
) -> Result<String, lol_html::errors::RewritingError> {
    let head_block = format!("<head>\n{head}\n</head>\n");
    let root_seen = Cell::new(false);

    let output = rewrite_str(
        document,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("html", |el| {
                    // Nested <html> tags in model output are left alone.
                    if root_seen.replace(true) {
                        return Ok(());
                    }
                    if el.get_attribute("lang").as_deref() != Some(code) {
                        el.set_attribute("lang", code)?;
                    }
                    if !structure.head && !structure.body {
                        el.prepend(&format!("\n{head_block}<body>\n"), ContentType::Html);
                        el.append("\n</body>\n", ContentType::Html);
                    }
                    Ok(())
                }),
                element!("body", |el| {
                    if !structure.head {
                        el.before(&head_block, ContentType::Html);
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &str = "<meta charset=\"UTF-8\">";

    fn langs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_input_gives_error_document() {
        let out = finalize("  \n ", HEAD, &langs(&["Hindi"]));
        assert_eq!(
            out,
            "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\"></head><body><p>Error: Received empty content from the generation model.</p></body></html>"
        );
    }

    #[test]
    fn fragment_is_wrapped() {
        let out = finalize("<p>Hi</p>", HEAD, &langs(&["Hindi"]));
        assert_eq!(
            out,
            "<!DOCTYPE html>\n<html lang=\"hi\">\n<head>\n<meta charset=\"UTF-8\">\n</head>\n<body>\n<p>Hi</p>\n</body>\n</html>"
        );
    }

    #[test]
    fn stray_doctype_removed_from_fragment() {
        let out = finalize("<!doctype html>\n<p>Hi</p>", HEAD, &langs(&["English"]));
        assert_eq!(out.matches("<!DOCTYPE").count() + out.matches("<!doctype").count(), 1);
        assert!(out.contains("<body>\n<p>Hi</p>\n</body>"));
    }

    #[test]
    fn lang_added_and_head_inserted_before_body() {
        let out = finalize("<html><body><p>x</p></body></html>", HEAD, &langs(&["Tamil"]));
        assert_eq!(
            out,
            "<!DOCTYPE html>\n<html lang=\"ta\"><head>\n<meta charset=\"UTF-8\">\n</head>\n<body><p>x</p></body></html>"
        );
    }

    #[test]
    fn different_lang_is_overwritten() {
        let out = finalize(
            "<!DOCTYPE html><html lang=\"fr\"><head></head><body></body></html>",
            HEAD,
            &langs(&["Hindi", "English"]),
        );
        assert!(out.contains("<html lang=\"hi\">"), "got: {out}");
        assert!(!out.contains("fr"));
        // Existing head is kept, not duplicated.
        assert_eq!(out.matches("<head>").count(), 1);
        assert!(!out.contains("charset"));
    }

    #[test]
    fn matching_lang_untouched() {
        let input = "<!DOCTYPE html>\n<html lang=\"en\" dir=\"ltr\"><head><title>t</title></head><body>b</body></html>";
        assert_eq!(finalize(input, HEAD, &langs(&["English"])), input);
    }

    #[test]
    fn html_without_head_or_body_gets_skeleton() {
        let out = finalize("<html><p>x</p></html>", HEAD, &langs(&["English"]));
        assert!(out.contains("<head>\n<meta charset=\"UTF-8\">\n</head>\n<body>\n<p>x</p>\n</body>"), "got: {out}");
    }

    #[test]
    fn html_text_in_comment_or_script_is_still_a_fragment() {
        for raw in [
            "<!-- <html> --><p>x</p>",
            "<script>var tpl = \"<html lang='x'>\";</script><p>x</p>",
        ] {
            let out = finalize(raw, HEAD, &langs(&["Tamil"]));
            assert!(
                out.starts_with("<!DOCTYPE html>\n<html lang=\"ta\">\n<head>\n<meta charset=\"UTF-8\">\n</head>\n<body>\n"),
                "got: {out}"
            );
            assert!(out.contains(raw), "fragment changed: {out}");
            assert!(out.ends_with("</body>\n</html>"));
        }
    }

    #[test]
    fn unknown_language_falls_back_to_en() {
        let out = finalize("<p>x</p>", HEAD, &langs(&["Klingon"]));
        assert!(out.contains("<html lang=\"en\">"));
    }

    #[test]
    fn uppercase_tags_recognised() {
        let out = finalize("<HTML><BODY>x</BODY></HTML>", HEAD, &langs(&["English"]));
        assert!(
            out.to_lowercase().starts_with("<!doctype html>\n<html lang=\"en\">"),
            "got: {out}"
        );
        assert!(out.contains("</head>\n<BODY>"));
    }

    #[test]
    fn finalize_is_idempotent() {
        let cases = [
            "<p>fragment</p>",
            "<html><body><p>x</p></body></html>",
            "<html lang=\"de\"><p>no head or body</p></html>",
            "```ignored``` <html><head></head><body></body></html>",
        ];
        for raw in cases {
            let once = finalize(raw, HEAD, &langs(&["Hindi"]));
            let twice = finalize(&once, HEAD, &langs(&["Hindi"]));
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }
}

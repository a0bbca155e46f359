//! Supported target languages and their HTML `lang` codes.
//!
//! At the form layer a language is identified by its English name only;
//! the name is both the key and the display value. Codes appear only in the
//! generated document (`<html lang>` and per-segment `lang` attributes).

/// Languages offered by the upload form, in display order.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "English",
    "Hindi",
    "Marathi",
    "Bengali",
    "Telugu",
    "Tamil",
    "Gujarati",
    "Urdu",
    "Kannada",
    "Odia",
    "Malayalam",
    "Punjabi",
    "Assamese",
    "Maithili",
    "Santali",
    "Konkani",
    "Kashmiri",
    "Dogri",
    "Manipuri",
    "Bodo",
    "Sindhi",
    "Sanskrit",
];

/// Code used when a language name is not recognised.
pub const FALLBACK_LANG_CODE: &str = "en";

/// Primary language used when the caller supplies none.
pub const DEFAULT_LANGUAGE: &str = "English";

// BCP 47 primary subtags. Includes a few common non-Indic languages that
// models occasionally echo back in the target list.
const LANG_CODES: &[(&str, &str)] = &[
    ("english", "en"),
    ("hindi", "hi"),
    ("marathi", "mr"),
    ("bengali", "bn"),
    ("telugu", "te"),
    ("tamil", "ta"),
    ("gujarati", "gu"),
    ("urdu", "ur"),
    ("kannada", "kn"),
    ("odia", "or"),
    ("malayalam", "ml"),
    ("punjabi", "pa"),
    ("assamese", "as"),
    ("maithili", "mai"),
    ("santali", "sat"),
    ("konkani", "kok"),
    ("kashmiri", "ks"),
    ("dogri", "doi"),
    ("manipuri", "mni"),
    ("bodo", "brx"),
    ("sindhi", "sd"),
    ("sanskrit", "sa"),
    ("spanish", "es"),
    ("french", "fr"),
    ("german", "de"),
    ("japanese", "ja"),
    ("chinese", "zh"),
];

/// Map a language name to its `lang` attribute value.
///
/// Matching is case-insensitive and ignores a parenthesised suffix, so
/// `"Hindi (Devanagari)"` maps to `hi`. Unknown names map to
/// [`FALLBACK_LANG_CODE`].
pub fn lang_code(name: &str) -> &'static str {
    let key = name
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    LANG_CODES
        .iter()
        .find(|(n, _)| *n == key)
        .map(|(_, code)| *code)
        .unwrap_or(FALLBACK_LANG_CODE)
}

/// Code of the first language in the list, or the fallback for an empty list.
pub fn primary_lang_code(languages: &[String]) -> &'static str {
    languages
        .first()
        .map(|l| lang_code(l))
        .unwrap_or(FALLBACK_LANG_CODE)
}

/// True if `name` is one of [`SUPPORTED_LANGUAGES`] (exact match).
pub fn is_supported(name: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_map_to_codes() {
        assert_eq!(lang_code("English"), "en");
        assert_eq!(lang_code("Hindi"), "hi");
        assert_eq!(lang_code("SANSKRIT"), "sa");
        assert_eq!(lang_code("Bodo"), "brx");
    }

    #[test]
    fn parenthesised_suffix_ignored() {
        assert_eq!(lang_code("Hindi (Devanagari)"), "hi");
    }

    #[test]
    fn unknown_name_falls_back() {
        assert_eq!(lang_code("Klingon"), FALLBACK_LANG_CODE);
        assert_eq!(lang_code(""), FALLBACK_LANG_CODE);
    }

    #[test]
    fn every_supported_language_has_a_code() {
        for name in SUPPORTED_LANGUAGES {
            let key = name.to_lowercase();
            assert!(
                LANG_CODES.iter().any(|(n, _)| *n == key),
                "{name} missing from LANG_CODES"
            );
        }
    }

    #[test]
    fn primary_code_uses_first_entry() {
        let langs = vec!["Tamil".to_string(), "English".to_string()];
        assert_eq!(primary_lang_code(&langs), "ta");
        assert_eq!(primary_lang_code(&[]), "en");
    }
}

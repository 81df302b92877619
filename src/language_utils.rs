use isolang::Language;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::errors::ConfigError;

/// Target language utilities
///
/// Normalizes the free-text target language given by the user into the
/// labels used in prompts, sanitization and output file names. ISO 639-1 and
/// ISO 639-3 codes are accepted and resolved to their English name.
/// Native-script names for common target languages, keyed by lowercase English name
static NATIVE_NAMES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("spanish", "español"),
        ("italian", "italiano"),
        ("german", "deutsch"),
        ("french", "français"),
        ("portuguese", "português"),
        ("dutch", "nederlands"),
        ("russian", "русский"),
        ("chinese", "中文"),
        ("japanese", "日本語"),
        ("korean", "한국어"),
        ("arabic", "العربية"),
        ("polish", "polski"),
        ("greek", "ελληνικά"),
        ("turkish", "türkçe"),
    ])
});

/// A normalized target language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLanguage {
    /// Lowercase English name, e.g. "spanish"
    name: String,
    /// Native-script name, or the capitalized English name when unknown
    native: String,
}

impl TargetLanguage {
    /// Normalize user input into a target language
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ConfigError::MissingTargetLanguage);
        }

        let name = resolve_iso_code(&normalized).unwrap_or(normalized);
        let native = NATIVE_NAMES
            .get(name.as_str())
            .map(|native| native.to_string())
            .unwrap_or_else(|| capitalize(&name));

        Ok(Self { name, native })
    }

    /// Lowercase English name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native-script name
    pub fn native(&self) -> &str {
        &self.native
    }

    /// Capitalized English name, e.g. "Spanish"
    pub fn display_name(&self) -> String {
        capitalize(&self.name)
    }

    /// Prompt label, e.g. "Spanish (español)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name(), self.native)
    }

    /// File name fragment, e.g. "brazilian_portuguese"
    pub fn file_label(&self) -> String {
        self.name.replace(' ', "_")
    }
}

impl std::fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// Two- and three-letter inputs that are ISO codes resolve to the English name
fn resolve_iso_code(code: &str) -> Option<String> {
    let language = match code.len() {
        2 => Language::from_639_1(code),
        3 => Language::from_639_3(code),
        _ => None,
    }?;

    // Reference names may carry qualifiers, as in "Modern Greek (1453-)"
    let name = language.to_name();
    let name = name.split([';', '(']).next().unwrap_or(name).trim();
    Some(name.to_lowercase())
}

/// Capitalize the first character and lowercase the rest, like Python's `str.capitalize`
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/*!
 * Completion sanitization.
 *
 * Local models are not reliably instruction-following: they prepend
 * meta-commentary ("Here is the translation:") or echo the source text under
 * a label ("Original: ..."). This module strips those parts with a small set
 * of prefix and line heuristics. It is best-effort, not a parser: known
 * imperfect cases are covered by tests.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::language_utils::TargetLanguage;

/// Labels that introduce an echo of the source text
const SKIP_PATTERNS: &[&str] = &["original:", "text:", "source:"];

/// Language-independent leading phrases removed from a completion
static LEADING_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:translation:|translation to|translated:|here's the translation:|here is the translation:)")
        .unwrap()
});

/// Recover the translated payload from a raw completion
///
/// Returns an empty string only when `raw` is blank.
pub fn sanitize(raw: &str, language: &TargetLanguage) -> String {
    let label = language.name();
    let trimmed = raw.trim();
    let content = strip_leading_phrase(trimmed, label);

    let mut kept: Vec<&str> = Vec::new();
    let mut in_translation = true;

    for line in content.lines() {
        let lower = line.trim().to_lowercase();
        let labelled = lower.contains(':');

        if labelled && SKIP_PATTERNS.iter().any(|pattern| lower.contains(pattern)) {
            in_translation = false;
            continue;
        }

        let mut line = line;
        if labelled && lower.contains(label) {
            in_translation = true;
            line = line.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or(line);
        }

        if in_translation && !line.trim().is_empty() {
            kept.push(line);
        }
    }

    let cleaned = kept.join("\n");
    let cleaned = cleaned.trim();
    if !cleaned.is_empty() {
        cleaned.to_string()
    } else if !content.is_empty() {
        content.to_string()
    } else {
        trimmed.to_string()
    }
}

// Remove the first known leading phrase plus any following ":", "-" and whitespace
fn strip_leading_phrase<'a>(content: &'a str, language: &str) -> &'a str {
    let rest = match LEADING_PHRASE.find(content) {
        Some(found) => &content[found.end()..],
        None => {
            let in_language = format!("in {}:", language);
            let labelled = format!("{}:", language);
            match strip_prefix_ignore_case(content, &in_language)
                .or_else(|| strip_prefix_ignore_case(content, &labelled))
            {
                Some(rest) => rest,
                None => return content,
            }
        }
    };

    rest.trim().trim_start_matches([':', '-', '\n']).trim()
}

fn strip_prefix_ignore_case<'a>(content: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = content.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.as_str())
}

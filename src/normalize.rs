//! Text normalization for generated field values.
//!
//! [`clean`] turns free-form model output into a plain field value or an
//! empty string when nothing usable is left. It repeats its passes until the
//! text stops changing, so `clean(clean(x)) == clean(x)`. [`polish`] is the
//! lighter final pass applied to accepted values.

use crate::fusion::{truncate, JUNK_MARKERS};
use crate::schema::NOT_AVAILABLE;
use regex::Regex;
use std::sync::LazyLock;

const MAX_LEN: usize = 500;
const MIN_LEN: usize = 3;
const MAX_PASSES: usize = 16;

/// Characters treated as markup by the admission check and final polish.
pub const MARKUP_CHARS: &[char] = &['{', '}', '[', ']', '*', '#', '`', '_'];

const EDGE_CHARS: &[char] = &[
    '*', '_', '`', '"', '\'', '{', '}', '[', ']', '#', '<', '>', '~', '|', '“', '”', '‘', '’',
];

const UNAVAILABLE_SYNONYMS: &[&str] = &[
    "n/a",
    "na",
    "none",
    "unavailable",
    "not available",
    "no data available",
    "data not available",
    "information not available",
    "not known",
    "no information available",
];

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex")
}

static ESCAPES: LazyLock<Regex> = LazyLock::new(|| re(r"\\[nrt]"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| re(r"\s+"));
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| re(r"\*+|`+|__+"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| re(r"^(?:[-•·▪►]+|\(?\d{1,2}[.)]|[a-z]\))\s+"));
static ATTRIBUTION: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\s*\((?:llm[- ]generated|ai[- ]generated|generated|predicted|estimated)\)")
});
static PREAMBLE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)^(?:(?:answer|response|value|result)\s*:\s*|based on [^,]{0,120},\s*)"));
static TRAILING_ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\s*\((?:predicted|estimated)\)\s*$"));

/// (pattern, replacement) pairs applied in order.
static UNITS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (re(r"(?i)(-?\d+(?:\.\d+)?)\s*(?:°|º|deg(?:rees?)?\.?)\s*C\b"), "$1 °C"),
        (re(r"(?i)(-?\d+(?:\.\d+)?)\s*(?:°|º|deg(?:rees?)?\.?)\s*F\b"), "$1 °F"),
        (re(r"(?i)(\d)\s*mm\s*hg\b"), "$1 mmHg"),
        (re(r"(?i)(\d)\s*torr\b"), "$1 Torr"),
        (re(r"(\d)\s*([kMh]?)Pa\b"), "$1 ${2}Pa"),
        (re(r"(?i)(\d)\s*mg\s*/\s*kg\b"), "$1 mg/kg"),
        (re(r"(?i)(\d)\s*mg\s*/\s*(?:m3|m³|m\^3|cu\.?\s*m)"), "$1 mg/m³"),
        (re(r"(?i)(\d)\s*ppm\b"), "$1 ppm"),
    ]
});

fn single_pass(text: &str) -> String {
    let mut s = ESCAPES.replace_all(text, " ").into_owned();
    s = WHITESPACE.replace_all(&s, " ").into_owned();
    s = s.trim().trim_matches(|c: char| EDGE_CHARS.contains(&c) || c.is_whitespace()).to_string();
    s = EMPHASIS.replace_all(&s, "").into_owned();
    s = BULLET.replace(&s, "").into_owned();
    s = ATTRIBUTION.replace_all(&s, "").into_owned();
    s = PREAMBLE.replace(&s, "").into_owned();
    s = WHITESPACE.replace_all(&s, " ").trim().to_string();
    for (pattern, replacement) in UNITS.iter() {
        s = pattern.replace_all(&s, *replacement).into_owned();
    }

    let bare = s.trim_end_matches(['.', '!']).to_lowercase();
    if UNAVAILABLE_SYNONYMS.contains(&bare.as_str()) {
        s = NOT_AVAILABLE.to_string();
    }

    s = s
        .trim_end_matches(|c: char| matches!(c, ',' | ';' | ':' | '-') || c.is_whitespace())
        .to_string();

    if s.chars().count() < MIN_LEN {
        return String::new();
    }
    let lower = s.to_lowercase();
    if JUNK_MARKERS.iter().any(|junk| lower.contains(junk)) {
        return String::new();
    }
    truncate(&s, MAX_LEN)
}

/// Normalize one raw value. An empty result means the value is rejected.
pub fn clean(text: &str) -> String {
    let mut current = single_pass(text);
    for _ in 0..MAX_PASSES {
        if current.is_empty() {
            break;
        }
        let next = single_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Final pass: drop leftover markup and trailing annotations, and make
/// sentence-like text start upper-case and end with punctuation.
pub fn polish(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| !MARKUP_CHARS.contains(c)).collect();
    let stripped = TRAILING_ANNOTATION.replace(&stripped, "");
    let mut s = WHITESPACE.replace_all(&stripped, " ").trim().to_string();

    let starts_alpha = s.chars().next().is_some_and(char::is_alphabetic);
    if starts_alpha && s.split_whitespace().count() >= 4 {
        let mut chars = s.chars();
        if let Some(first) = chars.next() {
            s = first.to_uppercase().chain(chars).collect();
        }
        if !s.ends_with(['.', '!', '?']) {
            s.push('.');
        }
    }
    s
}

/// Remove an echoed `Field Name:` prefix, with or without emphasis markers.
pub fn strip_field_label(text: &str, field: &str) -> String {
    let pattern = format!(
        r"(?i)^[\s*_`'\x22]*{}[\s*_`'\x22]*\s*[:=\-–]\s*",
        regex::escape(field)
    );
    match Regex::new(&pattern) {
        Ok(label) => label.replace(text, "").into_owned(),
        Err(_) => text.to_string(),
    }
}

/// True when no markup characters remain.
pub fn is_markup_free(text: &str) -> bool {
    !text.contains(MARKUP_CHARS)
}

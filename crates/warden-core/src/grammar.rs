//! Grammar Normalizer
//!
//! Light, rule-based rewriting of user queries before they reach the prompt
//! composer: slang expansion, first-letter capitalization and question-mark
//! insertion. Normalization never fails; inputs that look like arithmetic are
//! returned untouched.

use lazy_static::lazy_static;
use regex::Regex;

/// Characters that mark a query as arithmetic or a comparison.
pub const MATH_SYMBOLS: [char; 8] = ['+', '-', '*', '/', '=', '<', '>', '%'];

/// Words that open a question.
pub const QUESTION_WORDS: [&str; 11] = [
    "what", "who", "where", "when", "why", "how", "is", "are", "can", "do", "does",
];

/// Slang and abbreviation table. Single-character entries are listed for
/// completeness but never applied: they would corrupt short tokens.
pub const CORRECTIONS: [(&str, &str); 17] = [
    ("wat is", "what is"),
    ("wats", "what is"),
    ("whats", "what is"),
    ("whos", "who is"),
    ("hows", "how is"),
    ("wheres", "where is"),
    ("whens", "when is"),
    ("whys", "why is"),
    ("ur", "your"),
    ("u", "you"),
    ("r", "are"),
    ("n", "and"),
    ("b4", "before"),
    ("plz", "please"),
    ("pls", "please"),
    ("thx", "thanks"),
    ("ty", "thank you"),
];

lazy_static! {
    /// Multi-character corrections compiled to case-insensitive whole-word patterns.
    static ref SUBSTITUTIONS: Vec<(Regex, &'static str)> = CORRECTIONS
        .iter()
        .filter(|(mistake, _)| mistake.chars().count() > 1)
        .map(|(mistake, correction)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(mistake));
            (Regex::new(&pattern).unwrap(), *correction)
        })
        .collect();
}

/// True when the query should be left alone: empty, arithmetic, or digits only.
pub fn should_skip(query: &str) -> bool {
    if query.trim().is_empty() || query.contains(&MATH_SYMBOLS[..]) {
        return true;
    }

    let compact: String = query.chars().filter(|c| !c.is_whitespace()).collect();
    compact.chars().all(|c| c.is_ascii_digit())
}

/// Normalize a raw query.
pub fn normalize(query: &str) -> String {
    if should_skip(query) {
        return query.to_string();
    }

    let mut corrected = query.trim().to_string();
    for (pattern, replacement) in SUBSTITUTIONS.iter() {
        if pattern.is_match(&corrected) {
            corrected = pattern.replace_all(&corrected, *replacement).into_owned();
        }
    }

    let corrected = capitalize_first(&corrected);
    let corrected = ensure_question_mark(corrected);

    if corrected != query {
        tracing::debug!(original = query, corrected = %corrected, "Normalized query");
    }
    corrected
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The first word, compared case-insensitively, is a question word.
pub fn starts_with_question_word(text: &str) -> bool {
    let first_word = text
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default()
        .to_lowercase();
    QUESTION_WORDS.contains(&first_word.as_str())
}

fn ensure_question_mark(mut text: String) -> String {
    if !starts_with_question_word(&text) || text.ends_with('?') {
        return text;
    }
    if text.ends_with('.') {
        text.pop();
    }
    text.push('?');
    text
}

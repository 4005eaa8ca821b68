//! Field classification
//!
//! Keyword rules that turn a text block into a field candidate: whether it
//! is a prompt at all, what kind of input it asks for, whether it is
//! required, and the identifier the field is stored under.

use serde::{Deserialize, Serialize};

use super::types::FieldKind;

/// Keyword rules for classification
///
/// Kind keywords match as case-insensitive substrings. Checkbox and answer
/// keywords match whole words only, so "no" does not fire on "November".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub signature: Vec<String>,
    pub date: Vec<String>,
    pub phone: Vec<String>,
    pub email: Vec<String>,
    /// Consent words that make a checkbox anywhere in the block
    pub checkbox: Vec<String>,
    /// Answer words: a checkbox only after the separator or when all appear,
    /// so "Policy No" stays a text field
    pub answers: Vec<String>,
    /// Letterhead patterns that never become fields
    pub boilerplate: Vec<String>,
    /// Label/value separators, searched in order
    pub separators: Vec<char>,
    pub required_marker: char,
    /// Labels longer than this are prose, not prompts
    pub max_label_chars: usize,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            signature: words(&["signature", "sign here"]),
            date: words(&["date", "dob", "birth"]),
            phone: words(&["phone", "mobile", "contact"]),
            email: words(&["email", "e-mail"]),
            checkbox: words(&["confirm", "agree", "accept", "understand"]),
            answers: words(&["yes", "no"]),
            boilerplate: words(&["tel:", "fax:", "www.", "http://", "https://"]),
            separators: vec![':', '?'],
            required_marker: '*',
            max_label_chars: 60,
        }
    }
}

/// Outcome of classifying one label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: FieldKind,
    pub required: bool,
}

impl Classification {
    pub fn is_checkbox(&self) -> bool {
        self.kind.is_checkbox()
    }

    pub fn is_signature(&self) -> bool {
        self.kind.is_signature()
    }
}

/// A text block split at its separator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelParts<'a> {
    /// Text before the separator, marker and whitespace trimmed
    pub label: &'a str,
    pub separator: char,
    /// Char position of the separator in the block
    pub separator_index: usize,
    /// Text after the separator
    pub remainder: &'a str,
}

/// A block that passed the exclusion rules
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrompt {
    pub name: String,
    pub label: String,
    pub classification: Classification,
    /// Char position of the separator in the block text
    pub separator_index: usize,
    pub suggested_value: Option<String>,
    /// The prompt offers inline yes/no options
    pub yes_no: bool,
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

fn contains_word(haystack: &str, needles: &[String]) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|w| needles.iter().any(|n| n == w))
}

fn contains_all_words(haystack: &str, needles: &[String]) -> bool {
    !needles.is_empty() && needles.iter().all(|n| contains_word(haystack, std::slice::from_ref(n)))
}

/// Answer words offered after the separator, or the full set anywhere
fn offers_answers(label: &str, full_text: &str, table: &KeywordTable) -> bool {
    let after_separator = split_label(full_text, table)
        .map(|parts| contains_word(parts.remainder, &table.answers))
        .unwrap_or(false);
    after_separator || contains_all_words(label, &table.answers) || contains_all_words(full_text, &table.answers)
}

/// Decide the field kind and required flag for a label
///
/// Priority: signature, date, phone, email, then checkbox, then plain text.
/// Typed keywords win over checkbox words so "Phone No" stays a phone field.
pub fn classify(label: &str, full_text: &str, table: &KeywordTable) -> Classification {
    let label_lower = label.to_lowercase();
    let text_lower = full_text.to_lowercase();

    let kind = if contains_any(&label_lower, &table.signature) {
        FieldKind::Signature
    } else if contains_any(&label_lower, &table.date) {
        FieldKind::Date
    } else if contains_any(&label_lower, &table.phone) {
        FieldKind::Tel
    } else if contains_any(&label_lower, &table.email) {
        FieldKind::Email
    } else if contains_word(&label_lower, &table.checkbox)
        || contains_word(&text_lower, &table.checkbox)
        || offers_answers(&label_lower, &text_lower, table)
    {
        FieldKind::Checkbox
    } else {
        FieldKind::Text
    };

    Classification {
        kind,
        required: label.contains(table.required_marker) || full_text.contains(table.required_marker),
    }
}

/// Classify a field that already exists in the PDF
pub fn classify_native(name: &str, native_checkbox: bool, table: &KeywordTable) -> Classification {
    if native_checkbox {
        return Classification {
            kind: FieldKind::Checkbox,
            required: name.contains(table.required_marker),
        };
    }
    classify(name, name, table)
}

/// Normalize free-form label text into a field identifier
///
/// Keeps ASCII letters, digits and underscores, turns whitespace runs into a
/// single underscore and lower-cases the result. Applying it twice gives the
/// same output.
pub fn normalize_field_name(label: &str) -> String {
    let kept: String = label
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '_')
        .collect();

    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_ascii_lowercase()
}

/// Split a block at the first separator found, trying separators in order
pub fn split_label<'a>(text: &'a str, table: &KeywordTable) -> Option<LabelParts<'a>> {
    table.separators.iter().find_map(|sep| {
        text.find(*sep).map(|index| LabelParts {
            label: text[..index]
                .trim()
                .trim_matches(table.required_marker)
                .trim(),
            separator: *sep,
            separator_index: text[..index].chars().count(),
            remainder: &text[index + sep.len_utf8()..],
        })
    })
}

/// Whether a block can never be a field
pub fn is_excluded(text: &str, table: &KeywordTable) -> bool {
    let lower = text.to_lowercase();
    if table.boilerplate.iter().any(|p| lower.contains(p.as_str())) {
        return true;
    }
    match split_label(text, table) {
        None => true,
        Some(parts) => parts.label.is_empty() || parts.label.chars().count() > table.max_label_chars,
    }
}

/// Pre-printed answer after the separator, without blank placeholders
pub fn suggested_value(remainder: &str) -> Option<String> {
    let value = remainder
        .trim()
        .trim_matches(|c: char| c == '_' || c == '.' || c.is_whitespace());
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// The remainder offers both "yes" and "no" as options
pub fn has_yes_no_options(remainder: &str) -> bool {
    let lower = remainder.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
    words.contains(&"yes") && words.contains(&"no")
}

/// Apply exclusion, classification and naming to one text block
pub fn parse_prompt(text: &str, table: &KeywordTable) -> Option<ParsedPrompt> {
    if is_excluded(text, table) {
        return None;
    }
    let parts = split_label(text, table)?;
    let name = normalize_field_name(parts.label);
    if name.is_empty() {
        return None;
    }

    let yes_no = has_yes_no_options(parts.remainder);
    let mut classification = classify(parts.label, text, table);
    let suggested = if yes_no {
        classification.kind = FieldKind::Checkbox;
        None
    } else {
        suggested_value(parts.remainder)
    };

    Some(ParsedPrompt {
        name,
        label: parts.label.to_string(),
        classification,
        separator_index: parts.separator_index,
        suggested_value: suggested,
        yes_no,
    })
}

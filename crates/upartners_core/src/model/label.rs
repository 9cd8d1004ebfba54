//! Message labels and keyword normalization.
//!
//! # Responsibility
//! - Define the label record mirrored from platform message labels.
//! - Normalize keyword input into the stored comma-separated form.
//!
//! # Invariants
//! - `keywords` is stored comma-separated and parsed on read.
//! - Stored keywords are lowercase, trimmed and unique.
//! - `name` fits 32 chars, `description` 255, joined `keywords` 1024.

use crate::model::org::OrgId;
use crate::model::text::parse_csv;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LabelId = i64;

pub const LABEL_NAME_MAX_CHARS: usize = 32;
pub const LABEL_DESCRIPTION_MAX_CHARS: usize = 255;
pub const LABEL_KEYWORDS_MAX_CHARS: usize = 1024;

static KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w[\w\- ']*$").expect("valid keyword regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub org_id: OrgId,
    pub name: String,
    pub description: String,
    /// Comma-separated keyword list, see [`Label::get_keywords`].
    pub keywords: String,
    pub is_active: bool,
}

impl Label {
    pub fn get_keywords(&self) -> Vec<String> {
        parse_csv(&self.keywords)
    }

    /// JSON projection; `count` is the optional message count.
    pub fn as_json(&self, count: Option<u64>) -> Value {
        json!({ "id": self.id, "name": self.name, "count": count })
    }
}

/// Label input validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelValidationError {
    EmptyName,
    NameTooLong(usize),
    DescriptionTooLong(usize),
    InvalidKeyword(String),
    KeywordsTooLong(usize),
}

impl Display for LabelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "label name must not be empty"),
            Self::NameTooLong(len) => write!(
                f,
                "label name has {len} chars, max is {LABEL_NAME_MAX_CHARS}"
            ),
            Self::DescriptionTooLong(len) => write!(
                f,
                "label description has {len} chars, max is {LABEL_DESCRIPTION_MAX_CHARS}"
            ),
            Self::InvalidKeyword(value) => write!(f, "invalid keyword: `{value}`"),
            Self::KeywordsTooLong(len) => write!(
                f,
                "label keywords take {len} chars, max is {LABEL_KEYWORDS_MAX_CHARS}"
            ),
        }
    }
}

impl Error for LabelValidationError {}

/// Validates label name/description and returns the stored keyword string.
pub fn validate_label_input(
    name: &str,
    description: &str,
    keywords: &[String],
) -> Result<String, LabelValidationError> {
    let name_len = name.trim().chars().count();
    if name_len == 0 {
        return Err(LabelValidationError::EmptyName);
    }
    if name_len > LABEL_NAME_MAX_CHARS {
        return Err(LabelValidationError::NameTooLong(name_len));
    }
    let description_len = description.chars().count();
    if description_len > LABEL_DESCRIPTION_MAX_CHARS {
        return Err(LabelValidationError::DescriptionTooLong(description_len));
    }

    let joined = normalize_keywords(keywords)?.join(",");
    let joined_len = joined.chars().count();
    if joined_len > LABEL_KEYWORDS_MAX_CHARS {
        return Err(LabelValidationError::KeywordsTooLong(joined_len));
    }
    Ok(joined)
}

/// Lowercases, trims and deduplicates keywords, keeping first-seen order.
///
/// Blank entries are skipped; anything else must be word characters,
/// spaces, hyphens or apostrophes starting with a word character.
pub fn normalize_keywords(keywords: &[String]) -> Result<Vec<String>, LabelValidationError> {
    let mut seen = BTreeSet::new();
    let mut normalized = Vec::new();
    for keyword in keywords {
        let value = keyword.trim().to_lowercase();
        if value.is_empty() {
            continue;
        }
        if value.contains(',') || !KEYWORD_RE.is_match(&value) {
            return Err(LabelValidationError::InvalidKeyword(keyword.clone()));
        }
        if seen.insert(value.clone()) {
            normalized.push(value);
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::{normalize_keywords, validate_label_input, Label, LabelValidationError};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn keywords_are_lowercased_and_deduplicated_in_order() {
        let normalized = normalize_keywords(&strings(&["Water", " tap ", "WATER", ""])).unwrap();
        assert_eq!(normalized, strings(&["water", "tap"]));
    }

    #[test]
    fn keywords_reject_punctuation() {
        let err = normalize_keywords(&strings(&["ok", "#fail"])).unwrap_err();
        assert_eq!(err, LabelValidationError::InvalidKeyword("#fail".to_string()));
    }

    #[test]
    fn label_input_rejects_long_names() {
        let err = validate_label_input(&"x".repeat(33), "", &[]).unwrap_err();
        assert_eq!(err, LabelValidationError::NameTooLong(33));
    }

    #[test]
    fn get_keywords_parses_stored_csv() {
        let label = Label {
            id: 1,
            org_id: 1,
            name: "Health".to_string(),
            description: String::new(),
            keywords: "clinic,hiv ,, nurse".to_string(),
            is_active: true,
        };
        assert_eq!(label.get_keywords(), strings(&["clinic", "hiv", "nurse"]));
        assert_eq!(label.as_json(None)["count"], serde_json::Value::Null);
    }
}

//! Format validators keyed by field-name heuristics
//!
//! A field is checked only when its name suggests a format (`email`,
//! `phone`, `url`, ...). Fields with no matching validator always pass.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Known field formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    Email,
    Phone,
    Url,
}

impl FieldFormat {
    /// Guess the expected format from a field name
    pub fn for_field(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.contains("email") || name.contains("e_mail") {
            Some(FieldFormat::Email)
        } else if name.contains("phone") || name.contains("mobile") || name == "tel" || name.starts_with("tel_") {
            Some(FieldFormat::Phone)
        } else if name.contains("url") || name.contains("website") || name.contains("link") {
            Some(FieldFormat::Url)
        } else {
            None
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            FieldFormat::Email => email(),
            FieldFormat::Phone => phone(),
            FieldFormat::Url => url(),
        }
    }

    /// Check a value against this format. Only strings can match.
    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.pattern().is_match(s.trim()),
            _ => false,
        }
    }
}

fn email() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
            .expect("Valid email regex")
    });
    &PATTERN
}

fn phone() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\+?[0-9][0-9\s().\-]{5,18}[0-9]$").expect("Valid phone regex")
    });
    &PATTERN
}

fn url() -> &'static Regex {
    static PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(https?|ftp)://[A-Za-z0-9\-._~%]+(:[0-9]+)?(/[^\s]*)?$")
            .expect("Valid URL regex")
    });
    &PATTERN
}

/// Validate one field. Null values and fields without a known format pass.
pub fn is_valid_field(name: &str, value: &Value) -> bool {
    if value.is_null() {
        return true;
    }
    match FieldFormat::for_field(name) {
        Some(format) => format.matches(value),
        None => true,
    }
}

//! Input validators for free-text dialog steps.

use std::sync::LazyLock;

use regex::Regex;

// Phone in international-ish form, at least 7 digits after the first.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?\d[\d\-\s]{6,}$").expect("phone regex"));

// Messenger handle: @ followed by at least 5 word characters.
static HANDLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@[A-Za-z0-9_]{5,}$").expect("handle regex"));

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

/// A contact is either a phone number or a messenger handle.
pub fn is_valid_contact(s: &str) -> bool {
    let s = s.trim();
    PHONE_RE.is_match(s) || HANDLE_RE.is_match(s)
}

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_RE.is_match(s.trim())
}

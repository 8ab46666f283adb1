//! Mandatory-field checks for imported contacts

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::CanonicalContact;

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid static email pattern"));

pub const LAST_NAME_REQUIRED: &str = "Nom obligatoire";
pub const FIRST_NAME_REQUIRED: &str = "Prénom obligatoire";
pub const EMAIL_REQUIRED: &str = "Email obligatoire et valide";

/// `local@domain.tld` shape check; not RFC 5322.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE.is_match(email)
}

/// Violations for an imported contact; empty when valid.
///
/// Only last name, first name and email are mandatory.
pub fn validate_contact(contact: &CanonicalContact) -> Vec<String> {
    let mut errors = Vec::new();

    if contact.last_name.trim().is_empty() {
        errors.push(LAST_NAME_REQUIRED.to_string());
    }
    if contact.first_name.trim().is_empty() {
        errors.push(FIRST_NAME_REQUIRED.to_string());
    }
    if !is_valid_email(&contact.email) {
        errors.push(EMAIL_REQUIRED.to_string());
    }

    errors
}

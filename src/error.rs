//! Error taxonomy shared by the import pipeline, the HTTP handlers and the CLI.

use thiserror::Error;

/// Provider rejected a contact write. Carries the message shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct UpstreamError(pub String);

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Application level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Upload could not be read as a spreadsheet. Fatal to the import run.
    #[error("{0}")]
    Parse(String),

    /// One or more mandatory fields are missing or malformed.
    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Missing or malformed credentials/identifiers. Fatal at startup.
    #[error("{0}")]
    Configuration(String),
}

impl AppError {
    pub fn parse(message: impl Into<String>) -> Self {
        AppError::Parse(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        AppError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_joins_reasons() {
        let err = AppError::Validation(vec![
            "Nom obligatoire".to_string(),
            "Email obligatoire et valide".to_string(),
        ]);
        assert_eq!(err.to_string(), "Nom obligatoire, Email obligatoire et valide");
    }

    #[test]
    fn upstream_error_is_transparent() {
        let err: AppError = UpstreamError::new("Failed to add contact to Brevo: boom").into();
        assert_eq!(err.to_string(), "Failed to add contact to Brevo: boom");
    }
}

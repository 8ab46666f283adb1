//! HTTP response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SUBMITTED_MESSAGE: &str = "Formulaire soumis avec succès";
pub const INVALID_FORM_MESSAGE: &str = "Données du formulaire invalides";
pub const GENERIC_FAILURE_MESSAGE: &str = "Une erreur est survenue. Veuillez réessayer.";
pub const DELIVERY_FAILED_MESSAGE: &str = "Erreur lors de l'envoi du formulaire. Veuillez réessayer.";

/// Contact echoed back after a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedContact {
    pub email: String,
    pub added_to_marketing: bool,
}

/// Generic success response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<SubmittedContact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl SubmitResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: SUBMITTED_MESSAGE.to_string(),
            contact: None,
            warnings: None,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: INVALID_FORM_MESSAGE.to_string(),
            errors: Some(errors),
            error: None,
        }
    }

    /// Every delivery channel of a lead failed
    pub fn undelivered(errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: DELIVERY_FAILED_MESSAGE.to_string(),
            errors: Some(errors),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: GENERIC_FAILURE_MESSAGE.to_string(),
            errors: None,
            error: Some(error.into()),
        }
    }
}

/// Connectivity of an external service as reported by health routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    Disconnected,
}

impl From<bool> for Connectivity {
    fn from(ok: bool) -> Self {
        if ok {
            Connectivity::Connected
        } else {
            Connectivity::Disconnected
        }
    }
}

/// `GET /api/submit-contact`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactHealthResponse {
    pub status: String,
    pub brevo: Connectivity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConnectivity {
    pub email: Connectivity,
    pub brevo: Connectivity,
    pub google_sheets: Connectivity,
}

/// `GET /api/submit-form`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadHealthResponse {
    pub status: String,
    pub services: ServiceConnectivity,
    pub timestamp: DateTime<Utc>,
}

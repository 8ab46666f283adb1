//! CRM contact-list provider
//!
//! `CrmProvider` is the seam between the contact logic and the remote CRM.
//! `BrevoCrmProvider` talks to the Brevo v3 REST API; tests use
//! `fake::FakeCrmProvider`, which keeps contacts in memory and records calls.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::CrmConfig;

/// Brevo error code for "contact already exists"
const DUPLICATE_CODE: &str = "duplicate_parameter";

/// Attribute bag and list membership sent with a contact write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactPayload {
    pub attributes: Map<String, Value>,
    pub list_ids: Vec<i64>,
}

/// Provider failure, classified for the callers that branch on it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrmError {
    /// Contact already exists and the provider did not update it
    #[error("{message}")]
    Duplicate { message: String },

    #[error("{message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("{0}")]
    Transport(String),
}

impl CrmError {
    pub fn status(&self) -> Option<u16> {
        match self {
            CrmError::Duplicate { .. } => Some(400),
            CrmError::Rejected { status, .. } => Some(*status),
            CrmError::Transport(_) => None,
        }
    }
}

/// Remote CRM operations used by the service
#[async_trait]
pub trait CrmProvider: Send + Sync {
    /// Create a contact, updating it in place when `update_enabled` is set.
    async fn create_contact(
        &self,
        email: &str,
        payload: &ContactPayload,
        update_enabled: bool,
    ) -> Result<(), CrmError>;

    /// Update an existing contact identified by email.
    async fn update_contact(&self, email: &str, payload: &ContactPayload) -> Result<(), CrmError>;

    /// Lightweight credential check.
    async fn verify_account(&self) -> Result<(), CrmError>;

    async fn verify_list(&self, list_id: i64) -> Result<(), CrmError>;
}

// =============================================================================
// Brevo
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateContactBody<'a> {
    email: &'a str,
    attributes: &'a Map<String, Value>,
    list_ids: &'a [i64],
    update_enabled: bool,
    email_blacklisted: bool,
    sms_blacklisted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateContactBody<'a> {
    attributes: &'a Map<String, Value>,
    list_ids: &'a [i64],
    email_blacklisted: bool,
    sms_blacklisted: bool,
}

#[derive(Debug, Default, Deserialize)]
struct BrevoErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Brevo v3 contacts API client
pub struct BrevoCrmProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl BrevoCrmProvider {
    pub fn new(config: &CrmConfig) -> Result<Self, CrmError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CrmError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn contact_url(&self, email: &str) -> String {
        self.url(&format!("/contacts/{}", urlencoding::encode(email)))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CrmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: BrevoErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = body
            .message
            .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), text));

        if status.as_u16() == 400 && body.code.as_deref() == Some(DUPLICATE_CODE) {
            return Err(CrmError::Duplicate { message });
        }

        Err(CrmError::Rejected {
            status: status.as_u16(),
            code: body.code,
            message,
        })
    }
}

fn transport(e: reqwest::Error) -> CrmError {
    if e.is_timeout() {
        CrmError::Transport(format!("Brevo request timed out: {}", e))
    } else {
        CrmError::Transport(e.to_string())
    }
}

#[async_trait]
impl CrmProvider for BrevoCrmProvider {
    async fn create_contact(
        &self,
        email: &str,
        payload: &ContactPayload,
        update_enabled: bool,
    ) -> Result<(), CrmError> {
        let body = CreateContactBody {
            email,
            attributes: &payload.attributes,
            list_ids: &payload.list_ids,
            update_enabled,
            email_blacklisted: false,
            sms_blacklisted: false,
        };

        let response = self
            .client
            .post(self.url("/contacts"))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;

        debug!(email = %email, "Brevo contact created or updated");
        Ok(())
    }

    async fn update_contact(&self, email: &str, payload: &ContactPayload) -> Result<(), CrmError> {
        let body = UpdateContactBody {
            attributes: &payload.attributes,
            list_ids: &payload.list_ids,
            email_blacklisted: false,
            sms_blacklisted: false,
        };

        let response = self
            .client
            .put(self.contact_url(email))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;

        debug!(email = %email, "Brevo contact updated");
        Ok(())
    }

    async fn verify_account(&self) -> Result<(), CrmError> {
        let response = self
            .client
            .get(self.url("/account"))
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn verify_list(&self, list_id: i64) -> Result<(), CrmError> {
        let response = self
            .client
            .get(self.url(&format!("/contacts/lists/{}", list_id)))
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(transport)?;
        Self::check(response).await?;
        Ok(())
    }
}

// =============================================================================
// FakeCrmProvider: in-memory contacts (tests)
// =============================================================================

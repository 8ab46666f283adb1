//! Lead spreadsheet (Google Sheets).
//!
//! Each captured lead is appended as one row to the configured spreadsheet.
//! Authentication uses a service account: a signed RS256 assertion is
//! exchanged for an access token, which is cached until shortly before it
//! expires.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Europe::Paris;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{ServiceAccountKey, SheetsConfig};
use crate::types::Lead;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const HEADER_RANGE: &str = "A1:G1";
const APPEND_RANGE: &str = "A:G";

/// Refresh the token this long before Google says it expires
const TOKEN_MARGIN_SECS: i64 = 60;

pub const HEADER_ROW: [&str; 7] = [
    "Date",
    "Nom complet",
    "Email",
    "Téléphone",
    "Ville/Code postal",
    "Type de bien",
    "Message",
];

/// Spreadsheet receiving captured leads
#[async_trait]
pub trait LeadSheet: Send + Sync {
    async fn append_lead(&self, lead: &Lead) -> Result<()>;

    async fn verify_access(&self) -> bool;
}

/// Paris wall-clock timestamp, `dd/mm/YYYY HH:MM:SS`.
pub fn paris_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Paris).format("%d/%m/%Y %H:%M:%S").to_string()
}

/// Sheet row for `lead`, in `HEADER_ROW` order.
pub fn lead_row(lead: &Lead, at: DateTime<Utc>) -> Vec<String> {
    vec![
        paris_timestamp(at),
        lead.name.clone(),
        lead.email.clone(),
        lead.phone.clone(),
        lead.city.clone(),
        lead.house_type.label().to_string(),
        lead.message.clone(),
    ]
}

// =============================================================================
// Google Sheets
// =============================================================================

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct GoogleSheetsClient {
    spreadsheet_id: String,
    credentials: ServiceAccountKey,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheetsClient {
    pub fn new(config: &SheetsConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            spreadsheet_id: config.spreadsheet_id.clone(),
            credentials: config.credentials.clone(),
            client,
            token: Mutex::new(None),
        })
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = AssertionClaims {
            iss: &self.credentials.client_email,
            scope: SCOPE,
            aud: &self.credentials.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .context("Invalid service account private key")?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }

    async fn access_token(&self) -> Result<String> {
        let now = Utc::now();
        if let Some(token) = self.token.lock().as_ref() {
            if token.expires_at > now {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.assertion(now)?;
        let response = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?
            .error_for_status()
            .context("Google token exchange failed")?;
        let token: TokenResponse = response.json().await?;

        let cached = CachedToken {
            value: token.access_token,
            expires_at: now + chrono::Duration::seconds(token.expires_in - TOKEN_MARGIN_SECS),
        };
        debug!("Google access token refreshed, valid until {}", cached.expires_at);
        let value = cached.value.clone();
        *self.token.lock() = Some(cached);
        Ok(value)
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/{}/values/{}", SHEETS_API, self.spreadsheet_id, range)
    }

    /// Write the header row when the sheet is empty. Failures are logged only.
    pub async fn ensure_header_row(&self) {
        if let Err(e) = self.try_ensure_header_row().await {
            warn!("Could not check or create sheet headers: {:#}", e);
        }
    }

    async fn try_ensure_header_row(&self) -> Result<()> {
        let token = self.access_token().await?;
        let existing: ValueRange = self
            .client
            .get(self.values_url(HEADER_RANGE))
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !existing.values.is_empty() {
            return Ok(());
        }

        self.client
            .put(self.values_url(HEADER_RANGE))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&token)
            .json(&json!({ "values": [HEADER_ROW] }))
            .send()
            .await?
            .error_for_status()?;
        info!("Sheet header row created");
        Ok(())
    }

    pub async fn append_row(&self, row: &[String]) -> Result<()> {
        let token = self.access_token().await?;
        self.client
            .post(format!("{}:append", self.values_url(APPEND_RANGE)))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&token)
            .json(&json!({ "values": [row] }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl LeadSheet for GoogleSheetsClient {
    async fn append_lead(&self, lead: &Lead) -> Result<()> {
        self.ensure_header_row().await;
        self.append_row(&lead_row(lead, Utc::now()))
            .await
            .map_err(|e| {
                warn!("Google Sheets API error: {:#}", e);
                anyhow::anyhow!("Failed to add lead to Google Sheets")
            })?;
        info!(email = %lead.email, "Lead appended to Google Sheets");
        Ok(())
    }

    async fn verify_access(&self) -> bool {
        let result = async {
            let token = self.access_token().await?;
            self.client
                .get(format!("{}/{}", SHEETS_API, self.spreadsheet_id))
                .bearer_auth(&token)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, anyhow::Error>(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Google Sheets access error: {:#}", e);
                false
            }
        }
    }
}

// =============================================================================
// FakeLeadSheet: in-memory rows (tests)
// =============================================================================

//! Transactional email sending abstraction.
//!
//! `EmailSender` is the core trait: `BrevoEmailSender` in production,
//! `LogEmailSender` in dev (logs to tracing), `FakeEmailSender` in tests.
//!
//! The trait is object-safe so callers can hold `Arc<dyn EmailSender>`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EmailConfig;

// =============================================================================
// Core trait
// =============================================================================

/// Represents a rendered email message ready to send.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Abstraction over an email transport.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, msg: EmailMessage) -> Result<()>;

    /// Whether the transport is usable; used by health routes.
    async fn verify(&self) -> bool;
}

// =============================================================================
// LogEmailSender: writes to tracing (dev)
// =============================================================================

pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, msg: EmailMessage) -> Result<()> {
        info!(
            to = %msg.to.join(", "),
            subject = %msg.subject,
            "[LogEmailSender] Would send email\n---TEXT---\n{}",
            msg.text,
        );
        Ok(())
    }

    async fn verify(&self) -> bool {
        true
    }
}

// =============================================================================
// FakeEmailSender: captures sent messages in a Vec (tests)
// =============================================================================


// =============================================================================
// BrevoEmailSender: Brevo transactional email API
// =============================================================================

#[derive(Debug, Serialize)]
struct Mailbox<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    sender: Mailbox<'a>,
    to: Vec<Mailbox<'a>>,
    subject: &'a str,
    html_content: &'a str,
    text_content: &'a str,
}

pub struct BrevoEmailSender {
    base_url: String,
    api_key: String,
    from_address: String,
    from_name: String,
    client: reqwest::Client,
}

impl BrevoEmailSender {
    pub fn new(base_url: &str, api_key: &str, config: &EmailConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
            client,
        })
    }
}

#[async_trait]
impl EmailSender for BrevoEmailSender {
    async fn send(&self, msg: EmailMessage) -> Result<()> {
        if msg.to.is_empty() {
            anyhow::bail!("No recipient configured");
        }

        let body = SendBody {
            sender: Mailbox {
                email: &self.from_address,
                name: Some(&self.from_name),
            },
            to: msg.to.iter().map(|email| Mailbox { email, name: None }).collect(),
            subject: &msg.subject,
            html_content: &msg.html,
            text_content: &msg.text,
        };

        let response = self
            .client
            .post(format!("{}/smtp/email", self.base_url))
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Brevo email API error {}: {}", status, body));
        }

        info!(to = %msg.to.join(", "), subject = %msg.subject, "Email sent via Brevo");
        Ok(())
    }

    async fn verify(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/account", self.base_url))
            .header("api-key", &self.api_key)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Email provider check failed: HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Email provider check failed: {}", e);
                false
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

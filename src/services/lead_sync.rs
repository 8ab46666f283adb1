//! CRM sync for landing-page leads.
//!
//! Leads carry fewer fields than imported contacts. Custom attributes must
//! exist in the CRM account; when the provider rejects them, the lead is
//! retried once with the standard attributes only.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::UpstreamError;
use crate::services::crm::{ContactPayload, CrmError, CrmProvider};
use crate::types::Lead;

pub const DEFAULT_LEAD_SOURCE: &str = "LP RAVALEMENT DE FAÇADE 2026";

/// How a lead reached the CRM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadSyncOutcome {
    Saved,
    AlreadyExisted,
    /// Saved without custom attributes
    StandardAttributesOnly,
}

pub struct LeadSync {
    provider: Arc<dyn CrmProvider>,
    list_id: i64,
}

/// CRM phone format: separators removed, French numbers prefixed with `+33`.
pub fn format_phone_for_crm(phone: &str) -> String {
    let cleaned: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '.' | '-' | '(' | ')'))
        .collect();

    if let Some(rest) = cleaned.strip_prefix('0') {
        format!("+33{}", rest)
    } else if cleaned.starts_with('+') {
        cleaned
    } else {
        format!("+33{}", cleaned)
    }
}

/// First word, then the rest of the name.
pub fn split_name(name: &str) -> (String, String) {
    let mut words = name.split(' ');
    let first = words.next().unwrap_or_default().to_string();
    let last = words.collect::<Vec<_>>().join(" ");
    (first, last)
}

fn is_attribute_error(error: &CrmError) -> bool {
    let message = error.to_string().to_lowercase();
    message.contains("attribute")
        || message.contains("invalid")
        || message.contains("400")
        || error.status() == Some(400)
}

impl LeadSync {
    pub fn new(provider: Arc<dyn CrmProvider>, list_id: i64) -> Self {
        Self { provider, list_id }
    }

    fn standard_attributes(lead: &Lead) -> Map<String, Value> {
        let (first, last) = split_name(&lead.name);
        let mut attributes = Map::new();
        attributes.insert("FIRSTNAME".into(), Value::from(first));
        attributes.insert("LASTNAME".into(), Value::from(last));
        attributes.insert("SMS".into(), Value::from(format_phone_for_crm(&lead.phone)));
        attributes
    }

    pub fn payload(&self, lead: &Lead, source: Option<&str>, with_custom: bool) -> ContactPayload {
        let mut attributes = Self::standard_attributes(lead);
        if with_custom {
            attributes.insert("VILLE".into(), Value::from(lead.city.as_str()));
            attributes.insert("TYPE_BIEN".into(), Value::from(lead.house_type.label()));
            attributes.insert("MESSAGE".into(), Value::from(lead.message.as_str()));
            attributes.insert(
                "SOURCE".into(),
                Value::from(source.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_LEAD_SOURCE)),
            );
        }
        ContactPayload {
            attributes,
            list_ids: vec![self.list_id],
        }
    }

    pub async fn sync(&self, lead: &Lead, source: Option<&str>) -> Result<LeadSyncOutcome, UpstreamError> {
        let payload = self.payload(lead, source, true);

        let error = match self.provider.create_contact(&lead.email, &payload, true).await {
            Ok(()) => {
                info!(email = %lead.email, "Lead saved in Brevo with all attributes");
                return Ok(LeadSyncOutcome::Saved);
            }
            Err(CrmError::Duplicate { .. }) => {
                info!(email = %lead.email, "Lead already exists in Brevo");
                return Ok(LeadSyncOutcome::AlreadyExisted);
            }
            Err(e) => e,
        };

        warn!(email = %lead.email, error = %error, status = ?error.status(), "Brevo rejected lead with custom attributes");

        if !is_attribute_error(&error) {
            return Err(UpstreamError::new(format!(
                "Failed to add/update contact in Brevo: {}",
                error
            )));
        }

        info!("Custom attributes not available, retrying with standard attributes only");
        let standard = self.payload(lead, source, false);
        match self.provider.create_contact(&lead.email, &standard, true).await {
            Ok(()) => {
                info!(email = %lead.email, "Lead saved in Brevo with standard attributes (custom attributes skipped)");
                Ok(LeadSyncOutcome::StandardAttributesOnly)
            }
            Err(CrmError::Duplicate { .. }) => Ok(LeadSyncOutcome::AlreadyExisted),
            Err(e) => Err(UpstreamError::new(format!(
                "Failed to create contact even with standard attributes: {}",
                e
            ))),
        }
    }
}

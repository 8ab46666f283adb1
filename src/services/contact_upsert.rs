//! Create-or-update of imported and submitted contacts in the CRM.
//!
//! An upsert is a two-step transition:
//!
//! 1. `Create` with update-on-create enabled.
//! 2. `UpdateAfterDuplicate`, taken only when the provider answers
//!    "duplicate" instead of updating. The update carries the exact payload
//!    built for step 1.
//!
//! Any other provider error ends the upsert; nothing is retried.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::UpstreamError;
use crate::services::crm::{ContactPayload, CrmError, CrmProvider};
use crate::types::CanonicalContact;

/// Path an upsert took to succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPath {
    Created,
    UpdatedAfterDuplicate,
}

/// Contact upsert client bound to the master and marketing lists
pub struct ContactUpsertClient {
    provider: Arc<dyn CrmProvider>,
    list_id: i64,
    marketing_list_id: Option<i64>,
}

impl ContactUpsertClient {
    pub fn new(provider: Arc<dyn CrmProvider>, list_id: i64, marketing_list_id: Option<i64>) -> Self {
        Self {
            provider,
            list_id,
            marketing_list_id,
        }
    }

    /// Master list always; marketing list when consent is given and configured.
    pub fn list_ids(&self, contact: &CanonicalContact) -> Vec<i64> {
        let mut ids = vec![self.list_id];
        if contact.accepts_marketing {
            if let Some(marketing) = self.marketing_list_id {
                ids.push(marketing);
            }
        }
        ids
    }

    /// Provider payload for `contact`, dated `enrolled_on`.
    pub fn payload(&self, contact: &CanonicalContact, source_url: &str, enrolled_on: NaiveDate) -> ContactPayload {
        let mut attributes = Map::new();
        attributes.insert("NOM".into(), Value::from(contact.last_name.as_str()));
        attributes.insert("PRENOM".into(), Value::from(contact.first_name.as_str()));
        attributes.insert("ADRESSE".into(), Value::from(contact.address.as_str()));
        attributes.insert("CODE_POSTAL".into(), Value::from(contact.postal_code.as_str()));
        attributes.insert("VILLE".into(), Value::from(contact.city.as_str()));
        attributes.insert("TEL_PORTABLE".into(), Value::from(contact.mobile_phone.as_str()));
        attributes.insert("TEL_DOMICILE".into(), Value::from(contact.home_phone.as_str()));
        attributes.insert("ACCEPTE_CGU".into(), Value::Bool(contact.accepts_terms));
        attributes.insert("ACCEPTE_MARKETING".into(), Value::Bool(contact.accepts_marketing));
        attributes.insert(
            "DATE_INSCRIPTION".into(),
            Value::from(enrolled_on.format("%Y-%m-%d").to_string()),
        );
        attributes.insert("SOURCE".into(), Value::from(source_url));

        ContactPayload {
            attributes,
            list_ids: self.list_ids(contact),
        }
    }

    /// Create or update `contact`, keyed by email.
    pub async fn upsert(&self, contact: &CanonicalContact, source_url: &str) -> Result<UpsertPath, UpstreamError> {
        let payload = self.payload(contact, source_url, Utc::now().date_naive());

        match self.provider.create_contact(&contact.email, &payload, true).await {
            Ok(()) => {
                info!(email = %contact.email, "Contact added/updated in Brevo");
                Ok(UpsertPath::Created)
            }
            Err(CrmError::Duplicate { .. }) => {
                warn!(email = %contact.email, "Contact already exists, updating");
                self.update_existing(&contact.email, &payload).await?;
                Ok(UpsertPath::UpdatedAfterDuplicate)
            }
            Err(e) => {
                warn!(email = %contact.email, error = %e, "Brevo rejected contact");
                Err(UpstreamError::new(format!("Failed to add contact to Brevo: {}", e)))
            }
        }
    }

    async fn update_existing(&self, email: &str, payload: &ContactPayload) -> Result<(), UpstreamError> {
        self.provider.update_contact(email, payload).await.map_err(|e| {
            warn!(email = %email, error = %e, "Brevo update failed");
            UpstreamError::new(format!("Failed to update contact in Brevo: {}", e))
        })?;
        info!(email = %email, "Contact updated in Brevo");
        Ok(())
    }

    /// Credential check for health endpoints. Never used by the import path.
    pub async fn verify_health(&self) -> bool {
        match self.provider.verify_account().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Brevo API key check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::crm::fake::{CrmCall, FakeCrmProvider};

    const SOURCE: &str = "https://ravalement.example.fr";

    fn contact(marketing: bool) -> CanonicalContact {
        CanonicalContact {
            last_name: "Dupont".into(),
            first_name: "Jean".into(),
            address: "1 rue de la Paix".into(),
            postal_code: "75002".into(),
            city: "Paris".into(),
            mobile_phone: "0611223344".into(),
            home_phone: "0123456789".into(),
            email: "jean@example.fr".into(),
            accepts_terms: true,
            accepts_marketing: marketing,
            honeypot: String::new(),
        }
    }

    fn client(crm: Arc<FakeCrmProvider>, marketing_list: Option<i64>) -> ContactUpsertClient {
        ContactUpsertClient::new(crm, 3, marketing_list)
    }

    #[test]
    fn marketing_list_requires_consent_and_configuration() {
        let crm = Arc::new(FakeCrmProvider::new());
        assert_eq!(client(crm.clone(), Some(9)).list_ids(&contact(true)), vec![3, 9]);
        assert_eq!(client(crm.clone(), Some(9)).list_ids(&contact(false)), vec![3]);
        assert_eq!(client(crm, None).list_ids(&contact(true)), vec![3]);
    }

    #[test]
    fn payload_carries_every_attribute() {
        let crm = Arc::new(FakeCrmProvider::new());
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let payload = client(crm, None).payload(&contact(false), SOURCE, date);

        let keys: Vec<_> = payload.attributes.keys().cloned().collect();
        for key in [
            "NOM", "PRENOM", "ADRESSE", "CODE_POSTAL", "VILLE", "TEL_PORTABLE", "TEL_DOMICILE",
            "ACCEPTE_CGU", "ACCEPTE_MARKETING", "DATE_INSCRIPTION", "SOURCE",
        ] {
            assert!(keys.iter().any(|k| k == key), "missing {}", key);
        }
        assert_eq!(payload.attributes["DATE_INSCRIPTION"], "2026-03-14");
        assert_eq!(payload.attributes["ACCEPTE_MARKETING"], Value::Bool(false));
        assert_eq!(payload.attributes["SOURCE"], SOURCE);
    }

    #[tokio::test]
    async fn create_path_makes_a_single_call() {
        let crm = Arc::new(FakeCrmProvider::new());
        let path = client(crm.clone(), Some(9)).upsert(&contact(true), SOURCE).await;

        tokio_test::assert_ok!(&path);
        assert_eq!(path.unwrap(), UpsertPath::Created);
        let calls = crm.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], CrmCall::Create { update_enabled: true, payload, .. } if payload.list_ids == vec![3, 9]));
    }

    #[tokio::test]
    async fn duplicate_falls_back_to_one_update_with_identical_payload() {
        let crm = Arc::new(FakeCrmProvider::rejecting_duplicates());
        crm.insert("jean@example.fr", ContactPayload::default());

        let path = client(crm.clone(), Some(9)).upsert(&contact(true), SOURCE).await.unwrap();
        assert_eq!(path, UpsertPath::UpdatedAfterDuplicate);

        let calls = crm.calls();
        assert_eq!(calls.len(), 2);
        let (created, updated) = match (&calls[0], &calls[1]) {
            (CrmCall::Create { payload: c, .. }, CrmCall::Update { email, payload: u }) => {
                assert_eq!(email, "jean@example.fr");
                (c.clone(), u.clone())
            }
            other => panic!("unexpected calls {:?}", other),
        };
        assert_eq!(created, updated);
        assert_eq!(crm.contact("jean@example.fr"), Some(updated));
    }

    #[tokio::test]
    async fn other_errors_propagate_without_update() {
        let crm = Arc::new(FakeCrmProvider::new());
        crm.fail_next_create(CrmError::Rejected {
            status: 400,
            code: Some("invalid_parameter".into()),
            message: "attributes NOM invalid".into(),
        });

        let err = client(crm.clone(), None).upsert(&contact(false), SOURCE).await.unwrap_err();
        assert_eq!(err.message(), "Failed to add contact to Brevo: attributes NOM invalid");
        assert_eq!(crm.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_update_after_duplicate_is_upstream_error() {
        let crm = Arc::new(FakeCrmProvider::rejecting_duplicates());
        crm.insert("jean@example.fr", ContactPayload::default());
        crm.fail_next_update(CrmError::Transport("connection reset".into()));

        let err = client(crm, None).upsert(&contact(false), SOURCE).await.unwrap_err();
        assert_eq!(err.message(), "Failed to update contact in Brevo: connection reset");
    }

    #[tokio::test]
    async fn upserting_twice_keeps_a_single_contact() {
        for crm in [Arc::new(FakeCrmProvider::new()), Arc::new(FakeCrmProvider::rejecting_duplicates())] {
            let upsert = client(crm.clone(), None);
            tokio_test::assert_ok!(upsert.upsert(&contact(false), SOURCE).await);
            tokio_test::assert_ok!(upsert.upsert(&contact(false), SOURCE).await);
            assert_eq!(crm.contact_count(), 1);
        }
    }

    #[tokio::test]
    async fn verify_health_reflects_provider() {
        let crm = Arc::new(FakeCrmProvider { healthy: false, ..FakeCrmProvider::new() });
        assert!(!client(crm, None).verify_health().await);
        assert!(client(Arc::new(FakeCrmProvider::new()), None).verify_health().await);
    }
}

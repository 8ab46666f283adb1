//! Contact and lead types

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

/// Normalized contact produced by the row transformer and accepted by the contact form.
///
/// Wire keys follow the existing landing-page consumers (`nom`, `prenom`, ...).
/// The English camelCase names are accepted as aliases on input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalContact {
    #[serde(rename = "nom", alias = "lastName")]
    pub last_name: String,
    #[serde(rename = "prenom", alias = "firstName")]
    pub first_name: String,
    #[serde(rename = "adresse", alias = "address")]
    pub address: String,
    #[serde(rename = "codePostal", alias = "postalCode")]
    pub postal_code: String,
    #[serde(rename = "ville", alias = "city")]
    pub city: String,
    #[serde(rename = "telephonePortable", alias = "mobilePhone")]
    pub mobile_phone: String,
    #[serde(rename = "telephoneDomicile", alias = "homePhone")]
    pub home_phone: String,
    pub email: String,
    #[serde(rename = "accepteCGU", alias = "acceptsTerms")]
    pub accepts_terms: bool,
    #[serde(rename = "accepteMarketing", alias = "acceptsMarketing")]
    pub accepts_marketing: bool,
    /// Honeypot, expected empty
    #[serde(rename = "website", alias = "honeypot")]
    pub honeypot: String,
}

// ============================================================================
// Single contact submission
// ============================================================================

/// Body of `POST /api/submit-contact`.
///
/// Stricter than the bulk import: terms must be explicitly accepted and
/// marketing consent is opt-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SubmitContactRequest {
    #[serde(rename = "nom", alias = "lastName")]
    #[validate(length(min = 1, message = "Le nom est obligatoire"))]
    pub last_name: String,
    #[serde(rename = "prenom", alias = "firstName")]
    #[validate(length(min = 1, message = "Le prénom est obligatoire"))]
    pub first_name: String,
    #[serde(rename = "email")]
    #[validate(email(message = "Email invalide"))]
    pub email: String,
    #[serde(rename = "accepteCGU", alias = "acceptsTerms")]
    #[validate(custom(function = "must_accept_terms"))]
    pub accepts_terms: bool,

    #[serde(rename = "adresse", alias = "address")]
    pub address: Option<String>,
    #[serde(rename = "codePostal", alias = "postalCode")]
    pub postal_code: Option<String>,
    #[serde(rename = "ville", alias = "city")]
    pub city: Option<String>,
    #[serde(rename = "telephonePortable", alias = "mobilePhone")]
    pub mobile_phone: Option<String>,
    #[serde(rename = "telephoneDomicile", alias = "homePhone")]
    pub home_phone: Option<String>,
    #[serde(rename = "accepteMarketing", alias = "acceptsMarketing")]
    #[validate(required(message = "Required"))]
    pub accepts_marketing: Option<bool>,

    #[serde(rename = "website", alias = "honeypot")]
    pub honeypot: Option<String>,
    #[serde(rename = "sourceUrl")]
    pub source_url: Option<String>,
}

fn must_accept_terms(accepted: &bool) -> Result<(), ValidationError> {
    if *accepted {
        return Ok(());
    }
    let mut error = ValidationError::new("must_accept");
    error.message = Some(Cow::Borrowed("Vous devez accepter les CGU"));
    Err(error)
}

impl SubmitContactRequest {
    pub fn into_contact(self) -> CanonicalContact {
        CanonicalContact {
            last_name: self.last_name,
            first_name: self.first_name,
            address: self.address.unwrap_or_default(),
            postal_code: self.postal_code.unwrap_or_default(),
            city: self.city.unwrap_or_default(),
            mobile_phone: self.mobile_phone.unwrap_or_default(),
            home_phone: self.home_phone.unwrap_or_default(),
            email: self.email,
            accepts_terms: self.accepts_terms,
            accepts_marketing: self.accepts_marketing.unwrap_or(false),
            honeypot: self.honeypot.unwrap_or_default(),
        }
    }
}

// ============================================================================
// Landing page lead form
// ============================================================================

/// Property type selected on the lead form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HouseType {
    Maison,
    Immeuble,
}

impl HouseType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "maison" => Some(HouseType::Maison),
            "immeuble" => Some(HouseType::Immeuble),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HouseType::Maison => "Maison individuelle",
            HouseType::Immeuble => "Immeuble",
        }
    }
}

/// Body of `POST /api/submit-form`
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct LeadRequest {
    #[validate(length(min = 2, message = "Le nom doit contenir au moins 2 caractères"))]
    pub name: String,
    #[validate(email(message = "Email invalide"))]
    pub email: String,
    #[validate(length(min = 10, message = "Téléphone invalide"))]
    pub phone: String,
    #[validate(length(min = 2, message = "Ville invalide"))]
    pub city: String,
    #[validate(custom(function = "known_house_type"))]
    pub house_type: String,
    pub message: Option<String>,
    #[validate(custom(function = "must_give_rgpd_consent"))]
    pub rgpd_consent: bool,
    pub website: Option<String>,
}

fn known_house_type(value: &str) -> Result<(), ValidationError> {
    if HouseType::parse(value).is_some() {
        return Ok(());
    }
    let mut error = ValidationError::new("house_type");
    error.message = Some(Cow::Borrowed("Type de bien invalide"));
    Err(error)
}

fn must_give_rgpd_consent(consent: &bool) -> Result<(), ValidationError> {
    if *consent {
        return Ok(());
    }
    let mut error = ValidationError::new("must_accept");
    error.message = Some(Cow::Borrowed("Le consentement RGPD est requis"));
    Err(error)
}

/// Validated lead ready for the notification channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub house_type: HouseType,
    pub message: String,
}

impl LeadRequest {
    /// Validate and convert. Errors are `field: message` strings.
    pub fn into_lead(self) -> Result<Lead, Vec<String>> {
        self.validate().map_err(|e| describe_errors(&e))?;
        let house_type = HouseType::parse(&self.house_type)
            .ok_or_else(|| vec!["houseType: Type de bien invalide".to_string()])?;
        Ok(Lead {
            name: self.name,
            email: self.email,
            phone: self.phone,
            city: self.city,
            house_type,
            message: self.message.unwrap_or_default(),
        })
    }
}

/// Request key reported for a validated field
fn wire_name(field: &str) -> &str {
    match field {
        "last_name" => "nom",
        "first_name" => "prenom",
        "accepts_terms" => "accepteCGU",
        "accepts_marketing" => "accepteMarketing",
        "house_type" => "houseType",
        "rgpd_consent" => "rgpdConsent",
        other => other,
    }
}

/// Flatten validator output into `field: message` lines, sorted by request key.
pub fn describe_errors(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<_> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| (wire_name(field.as_ref()).to_string(), errs))
        .collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{}: {}", field, message)
            })
        })
        .collect()
}

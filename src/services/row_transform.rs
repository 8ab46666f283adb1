//! Row transformer: spreadsheet row → [`CanonicalContact`]
//!
//! Column names vary from one export to the next ("Prénom", "PRENOM",
//! "prénom_prospect", ...). Every logical field owns an ordered alias list;
//! labels and aliases are compared after [`normalize_label`], so accents,
//! case, underscores and spacing do not matter. The first alias whose column
//! holds a non-empty value wins.

use crate::types::{CanonicalContact, CellValue, RawRow};

/// Logical contact fields that can be read from a spreadsheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    LastName,
    FirstName,
    Address,
    PostalCode,
    City,
    MobilePhone,
    HomePhone,
    Email,
    AcceptsTerms,
    AcceptsMarketing,
}

impl ContactField {
    /// Accepted column labels, in priority order
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ContactField::LastName => &[
                "Nom Prospect", "Nom", "nom", "NOM", "Nom_Prospect", "nom_prospect",
            ],
            ContactField::FirstName => &[
                "Prénom Prospect", "Prenom Prospect", "Prénom", "Prenom", "prenom", "PRENOM",
                "Prénom_Prospect", "Prenom_Prospect", "prénom_prospect",
            ],
            ContactField::Address => &[
                "Adresse 1 Prospect", "Adresse 1", "Adresse", "adresse", "ADRESSE",
                "Adresse_1_Prospect", "adresse_1_prospect",
            ],
            ContactField::PostalCode => &[
                "Code Postal Prospect", "Code Postal", "Code postal", "CodePostal", "code_postal",
                "CP", "Code_Postal_Prospect", "code_postal_prospect",
            ],
            ContactField::City => &[
                "Ville Prospect", "Ville", "ville", "VILLE", "Ville_Prospect", "ville_prospect",
            ],
            ContactField::MobilePhone => &[
                "Telephone Portable Prospect", "Téléphone Portable Prospect",
                "Téléphone Portable", "Téléphone portable", "TelPortable", "tel_portable",
                "Portable", "portable", "Téléphone_Portable_Prospect",
                "téléphone_portable_prospect",
            ],
            ContactField::HomePhone => &[
                "Telephone Domicile Prospect", "Téléphone Domicile Prospect",
                "Téléphone Domicile", "Téléphone domicile", "TelDomicile", "tel_domicile",
                "Fixe", "fixe", "Téléphone_Domicile_Prospect", "téléphone_domicile_prospect",
            ],
            ContactField::Email => &[
                "Adresse Mail Prospect", "Adresse Mail", "Email", "email", "EMAIL", "E-mail",
                "Adresse_Mail_Prospect", "adresse_mail_prospect",
            ],
            ContactField::AcceptsTerms => &["CGU", "cgu", "AccepteCGU", "accepte_cgu"],
            ContactField::AcceptsMarketing => &[
                "Marketing", "marketing", "AccepteMarketing", "accepte_marketing",
            ],
        }
    }
}

/// Canonical form used to compare column labels.
pub fn normalize_label(label: &str) -> String {
    let folded: String = label
        .chars()
        .map(fold_accent)
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .flat_map(char::to_lowercase)
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
        'À' | 'Â' | 'Ä' | 'Á' | 'Ã' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'î' | 'ï' | 'í' => 'i',
        'Î' | 'Ï' | 'Í' => 'I',
        'ô' | 'ö' | 'ó' | 'õ' => 'o',
        'Ô' | 'Ö' | 'Ó' | 'Õ' => 'O',
        'ù' | 'û' | 'ü' | 'ú' => 'u',
        'Ù' | 'Û' | 'Ü' | 'Ú' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ÿ' => 'y',
        'Ÿ' => 'Y',
        other => other,
    }
}

/// Row with pre-normalized labels, built once per row.
struct LabelledRow<'a> {
    cells: Vec<(String, &'a CellValue)>,
}

impl<'a> LabelledRow<'a> {
    fn new(row: &'a RawRow) -> Self {
        Self {
            cells: row
                .cells
                .iter()
                .map(|(label, value)| (normalize_label(label), value))
                .collect(),
        }
    }

    /// First non-blank cell matching the field's aliases, in alias order.
    fn find_cell(&self, field: ContactField) -> Option<&'a CellValue> {
        field.aliases().iter().find_map(|alias| {
            let alias = normalize_label(alias);
            self.cells
                .iter()
                .find(|(label, value)| *label == alias && !value.is_blank())
                .map(|(_, value)| *value)
        })
    }

    fn find_value(&self, field: ContactField) -> String {
        self.find_cell(field)
            .map(|value| value.as_text().trim().to_string())
            .unwrap_or_default()
    }

    /// Consent flags default to `true` when no column carries a value.
    fn find_consent(&self, field: ContactField) -> bool {
        self.find_cell(field).map(to_bool).unwrap_or(true)
    }
}

/// Value of `field` in `row`, trimmed; empty when no alias matches.
#[cfg(test)]
pub fn find_value(row: &RawRow, field: ContactField) -> String {
    LabelledRow::new(row).find_value(field)
}

/// Spreadsheet truthiness: `true`, `1`, "oui", "yes", "true", "1".
pub fn to_bool(value: &CellValue) -> bool {
    match value {
        CellValue::Bool(b) => *b,
        CellValue::Number(n) => *n == 1.0,
        CellValue::Text(s) => {
            matches!(s.trim().to_lowercase().as_str(), "oui" | "yes" | "true" | "1")
        }
    }
}

/// Strip whitespace only; no international rewriting at import time.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Map a loosely structured row to a complete contact. Never fails.
pub fn transform_row(row: &RawRow) -> CanonicalContact {
    let row = LabelledRow::new(row);

    let mobile = normalize_phone(&row.find_value(ContactField::MobilePhone));
    let home = normalize_phone(&row.find_value(ContactField::HomePhone));

    CanonicalContact {
        last_name: row.find_value(ContactField::LastName),
        first_name: row.find_value(ContactField::FirstName),
        address: row.find_value(ContactField::Address),
        postal_code: row.find_value(ContactField::PostalCode),
        city: row.find_value(ContactField::City),
        mobile_phone: if mobile.is_empty() { home.clone() } else { mobile },
        home_phone: home,
        email: row.find_value(ContactField::Email).to_lowercase(),
        accepts_terms: row.find_consent(ContactField::AcceptsTerms),
        accepts_marketing: row.find_consent(ContactField::AcceptsMarketing),
        honeypot: String::new(),
    }
}

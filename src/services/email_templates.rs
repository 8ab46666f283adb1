//! Transactional email templates.
//!
//! `LeadNotificationEmail` is sent to the sales inbox for every lead captured
//! by the landing-page form. `render()` returns an `EmailMessage` ready to
//! pass to `EmailSender::send`.

use chrono::{DateTime, Utc};
use chrono_tz::Europe::Paris;

use crate::services::email_sender::EmailMessage;
use crate::types::Lead;

pub const LEAD_SUBJECT: &str = "LP RAVALEMENT DE FAÇADE 2026 - Nouveau lead";

/// Minimal HTML escaping for user-supplied text.
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

// =============================================================================
// Lead notification
// =============================================================================

pub struct LeadNotificationEmail<'a> {
    pub to: &'a [String],
    pub lead: &'a Lead,
    pub received_at: DateTime<Utc>,
}

impl<'a> LeadNotificationEmail<'a> {
    fn field(label: &str, value: &str) -> String {
        format!(
            r#"<div class="field"><span class="label">{}</span><div class="value">{}</div></div>"#,
            label, value
        )
    }

    pub fn render(&self) -> EmailMessage {
        let lead = self.lead;
        let date = self.received_at.with_timezone(&Paris).format("%d/%m/%Y %H:%M").to_string();

        let name = escape_html(&lead.name);
        let email = escape_html(&lead.email);
        let phone = escape_html(&lead.phone);

        let mut fields = vec![
            Self::field("Nom complet", &name),
            Self::field("Email", &format!(r#"<a href="mailto:{0}">{0}</a>"#, email)),
            Self::field("Téléphone", &format!(r#"<a href="tel:{0}">{0}</a>"#, phone)),
            Self::field("Ville / Code postal", &escape_html(&lead.city)),
            Self::field("Type de bien", lead.house_type.label()),
        ];
        if !lead.message.is_empty() {
            fields.push(Self::field("Message", &escape_html(&lead.message).replace('\n', "<br>")));
        }

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <style>
    body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
    .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
    .header {{ background: #352c5b; color: white; padding: 20px; text-align: center; }}
    .field {{ margin-bottom: 20px; }}
    .label {{ font-weight: bold; color: #352c5b; display: block; }}
    .footer {{ text-align: center; color: #666; font-size: 12px; }}
  </style>
</head>
<body>
  <div class="container">
    <div class="header"><h1>LP RAVALEMENT DE FAÇADE 2026</h1><p>Nouveau lead reçu</p></div>
    <div class="content">
      {fields}
    </div>
    <div class="footer">
      <p>Email envoyé automatiquement depuis la Landing Page OEKO</p>
      <p>Date : {date}</p>
    </div>
  </div>
</body>
</html>"#,
            fields = fields.join("\n      "),
            date = date,
        );

        let mut text = format!(
            "LP RAVALEMENT DE FAÇADE 2026\nNouveau lead reçu\n\nNom complet : {}\nEmail : {}\nTéléphone : {}\nVille / Code postal : {}\nType de bien : {}\n",
            lead.name,
            lead.email,
            lead.phone,
            lead.city,
            lead.house_type.label()
        );
        if !lead.message.is_empty() {
            text.push_str(&format!("\nMessage :\n{}\n", lead.message));
        }
        text.push_str(&format!("\n---\nDate : {}", date));

        EmailMessage {
            to: self.to.to_vec(),
            subject: LEAD_SUBJECT.to_string(),
            html,
            text,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

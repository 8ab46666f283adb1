//! `/api/submit-form`: landing-page lead capture.
//!
//! A lead is delivered to three channels at once: a notification email, the
//! CRM and the lead spreadsheet. The request only fails when none of them
//! accepted it.

use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use tracing::{error, info, warn};

use super::AppState;
use crate::services::email_templates::LeadNotificationEmail;
use crate::types::{
    Connectivity, ErrorBody, Lead, LeadHealthResponse, LeadRequest, ServiceConnectivity, SubmitResponse,
};

async fn notify_by_email(state: &AppState, lead: &Lead) -> Result<(), String> {
    let message = LeadNotificationEmail {
        to: &state.email_recipients,
        lead,
        received_at: Utc::now(),
    }
    .render();
    state.email.send(message).await.map_err(|e| format!("Email: {}", e))
}

async fn sync_with_crm(state: &AppState, lead: &Lead) -> Result<(), String> {
    state
        .leads
        .sync(lead, None)
        .await
        .map(|outcome| info!(?outcome, "Lead synced with Brevo"))
        .map_err(|e| format!("Brevo: {}", e.message()))
}

async fn append_to_sheet(state: &AppState, lead: &Lead) -> Result<(), String> {
    match &state.sheets {
        Some(sheet) => sheet
            .append_lead(lead)
            .await
            .map_err(|e| format!("Google Sheets: {}", e)),
        None => Err("Google Sheets: non configuré".to_string()),
    }
}

#[post("/submit-form")]
pub async fn submit_form(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let request: LeadRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Invalid submit-form body: {}", e);
            return HttpResponse::BadRequest().json(ErrorBody::invalid(vec![format!("body: {}", e)]));
        }
    };

    if request.website.as_deref().is_some_and(|v| !v.is_empty()) {
        warn!("Spam detected via honeypot field");
        return HttpResponse::Ok().json(SubmitResponse::ok());
    }

    let lead = match request.into_lead() {
        Ok(lead) => lead,
        Err(errors) => return HttpResponse::BadRequest().json(ErrorBody::invalid(errors)),
    };

    let (email, crm, sheet) = tokio::join!(
        notify_by_email(&state, &lead),
        sync_with_crm(&state, &lead),
        append_to_sheet(&state, &lead),
    );

    let failures: Vec<String> = [email, crm, sheet].into_iter().filter_map(Result::err).collect();

    if failures.len() == 3 {
        error!(email = %lead.email, errors = ?failures, "Lead could not be delivered to any channel");
        return HttpResponse::InternalServerError().json(ErrorBody::undelivered(failures));
    }

    if failures.is_empty() {
        info!(email = %lead.email, "Lead delivered to every channel");
    } else {
        warn!(email = %lead.email, warnings = ?failures, "Lead partially delivered");
    }

    HttpResponse::Ok().json(SubmitResponse {
        warnings: (!failures.is_empty()).then_some(failures),
        ..SubmitResponse::ok()
    })
}

#[get("/submit-form")]
pub async fn lead_health(state: web::Data<AppState>) -> HttpResponse {
    let sheets = async {
        match &state.sheets {
            Some(sheet) => sheet.verify_access().await,
            None => false,
        }
    };
    let (email, brevo, google_sheets) =
        tokio::join!(state.email.verify(), state.upsert.verify_health(), sheets);

    HttpResponse::Ok().json(LeadHealthResponse {
        status: "ok".to_string(),
        services: ServiceConnectivity {
            email: Connectivity::from(email),
            brevo: Connectivity::from(brevo),
            google_sheets: Connectivity::from(google_sheets),
        },
        timestamp: Utc::now(),
    })
}

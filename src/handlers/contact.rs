//! `/api/submit-contact`: single contact submission and CRM health.

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use tracing::{error, info, warn};
use validator::Validate;

use super::{resolve_source_url, AppState};
use crate::types::{
    describe_errors, ContactHealthResponse, Connectivity, ErrorBody, SubmitContactRequest, SubmitResponse,
    SubmittedContact,
};

#[post("/submit-contact")]
pub async fn submit_contact(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let request: SubmitContactRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Invalid submit-contact body: {}", e);
            return HttpResponse::BadRequest().json(ErrorBody::invalid(vec![format!("body: {}", e)]));
        }
    };

    // Bots get the normal answer so the trap is not revealed
    if request.honeypot.as_deref().is_some_and(|v| !v.is_empty()) {
        warn!("Spam detected via honeypot field");
        return HttpResponse::Ok().json(SubmitResponse::ok());
    }

    if let Err(errors) = request.validate() {
        return HttpResponse::BadRequest().json(ErrorBody::invalid(describe_errors(&errors)));
    }

    let source_url = resolve_source_url(request.source_url.as_deref(), &req, &state.default_source_url)
        .trim_end_matches('/')
        .to_string();
    let contact = request.into_contact();

    match state.upsert.upsert(&contact, &source_url).await {
        Ok(path) => {
            info!(email = %contact.email, ?path, "Contact form submitted");
            HttpResponse::Ok().json(SubmitResponse {
                contact: Some(SubmittedContact {
                    email: contact.email.clone(),
                    added_to_marketing: contact.accepts_marketing,
                }),
                ..SubmitResponse::ok()
            })
        }
        Err(e) => {
            error!(email = %contact.email, "Form submission error: {}", e);
            HttpResponse::InternalServerError().json(ErrorBody::failure(e.message()))
        }
    }
}

#[get("/submit-contact")]
pub async fn contact_health(state: web::Data<AppState>) -> HttpResponse {
    let brevo = state.upsert.verify_health().await;
    HttpResponse::Ok().json(ContactHealthResponse {
        status: "ok".to_string(),
        brevo: Connectivity::from(brevo),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::Fakes;
    use crate::services::crm::CrmError;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    async fn submit(fakes: &Fakes, body: Value, origin: Option<&str>) -> (u16, Value) {
        let app = test::init_service(App::new().app_data(fakes.state()).configure(crate::handlers::configure)).await;
        let mut req = test::TestRequest::post().uri("/api/submit-contact").set_json(body);
        if let Some(origin) = origin {
            req = req.insert_header(("origin", origin));
        }
        let resp = test::call_service(&app, req.to_request()).await;
        let status = resp.status().as_u16();
        (status, test::read_body_json(resp).await)
    }

    fn valid_body() -> Value {
        json!({
            "nom": "Dupont",
            "prenom": "Jean",
            "email": "jean@example.fr",
            "accepteCGU": true,
            "accepteMarketing": true,
            "ville": "Lyon"
        })
    }

    #[actix_web::test]
    async fn valid_submission_upserts_contact() {
        let fakes = Fakes::new();
        let (status, body) = submit(&fakes, valid_body(), Some("https://lp.example.fr/")).await;

        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["contact"], json!({ "email": "jean@example.fr", "addedToMarketing": true }));

        let saved = fakes.crm.contact("jean@example.fr").unwrap();
        assert_eq!(saved.list_ids, vec![3, 9]);
        assert_eq!(saved.attributes["SOURCE"], "https://lp.example.fr");
        assert_eq!(saved.attributes["VILLE"], "Lyon");
    }

    #[actix_web::test]
    async fn honeypot_returns_success_without_crm_call() {
        let fakes = Fakes::new();
        let mut body = valid_body();
        body["website"] = json!("http://spam.example");
        let (status, body) = submit(&fakes, body, None).await;

        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert!(body.get("contact").is_none());
        assert!(fakes.crm.calls().is_empty());
    }

    #[actix_web::test]
    async fn terms_must_be_explicitly_accepted() {
        let fakes = Fakes::new();
        let mut body = valid_body();
        body["accepteCGU"] = json!(false);
        let (status, body) = submit(&fakes, body, None).await;

        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Données du formulaire invalides");
        let errors = body["errors"].as_array().unwrap();
        assert!(errors.iter().any(|e| e.as_str().unwrap().contains("Vous devez accepter les CGU")));
        assert!(fakes.crm.calls().is_empty());
    }

    #[actix_web::test]
    async fn missing_terms_is_rejected_unlike_bulk_import() {
        let fakes = Fakes::new();
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("accepteCGU");
        let (status, _) = submit(&fakes, body, None).await;
        assert_eq!(status, 400);
    }

    #[actix_web::test]
    async fn marketing_choice_is_required() {
        let fakes = Fakes::new();
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("accepteMarketing");
        let (status, body) = submit(&fakes, body, None).await;

        assert_eq!(status, 400);
        assert_eq!(body["errors"], json!(["accepteMarketing: Required"]));
        assert!(fakes.crm.calls().is_empty());
    }

    #[actix_web::test]
    async fn invalid_email_is_rejected() {
        let fakes = Fakes::new();
        let mut body = valid_body();
        body["email"] = json!("not-an-email");
        let (status, body) = submit(&fakes, body, None).await;
        assert_eq!(status, 400);
        assert!(body["errors"].as_array().unwrap().iter().any(|e| e.as_str().unwrap().contains("Email invalide")));
    }

    #[actix_web::test]
    async fn provider_failure_is_500_with_message() {
        let fakes = Fakes::new();
        fakes.crm.fail_next_create(CrmError::Transport("connection refused".into()));
        let (status, body) = submit(&fakes, valid_body(), None).await;

        assert_eq!(status, 500);
        assert_eq!(body["message"], "Une erreur est survenue. Veuillez réessayer.");
        assert_eq!(body["error"], "Failed to add contact to Brevo: connection refused");
    }

    #[actix_web::test]
    async fn default_source_url_is_used_without_headers() {
        let fakes = Fakes::new();
        submit(&fakes, valid_body(), None).await;
        let saved = fakes.crm.contact("jean@example.fr").unwrap();
        assert_eq!(saved.attributes["SOURCE"], "http://localhost:3000");
    }

    #[actix_web::test]
    async fn health_reports_crm_connectivity() {
        let fakes = Fakes::new();
        let app = test::init_service(App::new().app_data(fakes.state()).configure(crate::handlers::configure)).await;
        let req = test::TestRequest::get().uri("/api/submit-contact").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "ok");
        assert_eq!(body["brevo"], "connected");
    }
}

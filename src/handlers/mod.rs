//! HTTP handlers

pub mod contact;
pub mod import;
pub mod lead;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpRequest, HttpServer};
use anyhow::{Context, Result};
use tracing::info;

use crate::config::{Config, EmailBackend};
use crate::services::contact_upsert::ContactUpsertClient;
use crate::services::crm::{BrevoCrmProvider, CrmProvider};
use crate::services::email_sender::{BrevoEmailSender, EmailSender, LogEmailSender};
use crate::services::import_pipeline::ImportPipeline;
use crate::services::lead_sync::LeadSync;
use crate::services::sheets::{GoogleSheetsClient, LeadSheet};

/// Shared state of the HTTP routes
pub struct AppState {
    pub upsert: Arc<ContactUpsertClient>,
    pub pipeline: Arc<ImportPipeline>,
    pub leads: LeadSync,
    pub email: Arc<dyn EmailSender>,
    pub email_recipients: Vec<String>,
    /// `None` when no spreadsheet is configured
    pub sheets: Option<Arc<dyn LeadSheet>>,
    pub default_source_url: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let crm: Arc<dyn CrmProvider> =
            Arc::new(BrevoCrmProvider::new(&config.crm).context("Could not build the Brevo client")?);

        let email: Arc<dyn EmailSender> = match config.email.backend {
            EmailBackend::Brevo => Arc::new(BrevoEmailSender::new(
                &config.crm.base_url,
                &config.crm.api_key,
                &config.email,
                config.crm.timeout,
            )?),
            EmailBackend::Log => Arc::new(LogEmailSender),
        };

        let sheets = match &config.sheets {
            Some(sheets) => {
                Some(Arc::new(GoogleSheetsClient::new(sheets, config.crm.timeout)?) as Arc<dyn LeadSheet>)
            }
            None => None,
        };

        Ok(Self::new(crm, config, email, sheets))
    }

    /// Assemble the state around already-built providers.
    pub fn new(
        crm: Arc<dyn CrmProvider>,
        config: &Config,
        email: Arc<dyn EmailSender>,
        sheets: Option<Arc<dyn LeadSheet>>,
    ) -> Self {
        let upsert = Arc::new(ContactUpsertClient::new(
            crm.clone(),
            config.crm.list_id,
            config.crm.marketing_list_id,
        ));
        Self {
            pipeline: Arc::new(ImportPipeline::new(upsert.clone(), config.import)),
            upsert,
            leads: LeadSync::new(crm, config.crm.list_id),
            email,
            email_recipients: config.email.recipients.clone(),
            sheets,
            default_source_url: config.default_source_url.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Source URL recorded on contacts: explicit value, else Origin, else Referer,
/// else the configured default. Blank values count as missing.
pub fn resolve_source_url(explicit: Option<&str>, req: &HttpRequest, default: &str) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| header("origin"))
        .or_else(|| header("referer"))
        .unwrap_or_else(|| default.to_string())
}

/// Register every `/api` route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(import::import_excel)
            .service(contact::submit_contact)
            .service(contact::contact_health)
            .service(lead::submit_form)
            .service(lead::lead_health),
    );
}

/// Run the HTTP server until shutdown.
pub async fn run_server(config: &Config) -> Result<()> {
    let state = web::Data::new(AppState::from_config(config)?);
    let json_limit = 64 * 1024;

    info!("Listening on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(json_limit))
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn source_url_prefers_explicit_value_as_given() {
        let req = TestRequest::default()
            .insert_header(("origin", "https://origin.example.fr"))
            .to_http_request();
        assert_eq!(
            resolve_source_url(Some("https://lp.example.fr/"), &req, "http://localhost:3000"),
            "https://lp.example.fr/"
        );
    }

    #[test]
    fn source_url_falls_back_to_origin_then_referer_then_default() {
        let req = TestRequest::default()
            .insert_header(("origin", "https://origin.example.fr"))
            .insert_header(("referer", "https://referer.example.fr/page"))
            .to_http_request();
        assert_eq!(resolve_source_url(Some("  "), &req, "d"), "https://origin.example.fr");

        let req = TestRequest::default()
            .insert_header(("referer", "https://referer.example.fr/"))
            .to_http_request();
        assert_eq!(resolve_source_url(None, &req, "d"), "https://referer.example.fr/");

        let req = TestRequest::default()
            .insert_header(("origin", ""))
            .insert_header(("referer", "https://referer.example.fr"))
            .to_http_request();
        assert_eq!(resolve_source_url(None, &req, "d"), "https://referer.example.fr");

        let req = TestRequest::default().to_http_request();
        assert_eq!(resolve_source_url(None, &req, "http://localhost:3000"), "http://localhost:3000");
    }
}

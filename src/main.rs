//! Facade Leads - Backend for the façade renovation landing page
//!
//! Serves the contact and lead forms, imports contact spreadsheets into Brevo
//! with live progress, and provides a command-line importer.

mod cli;
mod config;
mod error;
mod handlers;
mod services;
mod types;

use std::path::Path;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use services::crm::{BrevoCrmProvider, CrmProvider};
use services::import_client::{self, ImportClient};

#[actix_web::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ./logs
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "facade-leads.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,facade_leads=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Import {
            file,
            server,
            source_url,
            report,
        } => import(&file, &server, source_url.as_deref(), report.as_deref()).await,
        Command::Check => check().await,
    }
}

async fn serve() -> Result<()> {
    info!("Starting Facade Leads...");

    let config = config::Config::from_env()?;
    info!("Configuration loaded");
    if config.sheets.is_none() {
        warn!("Google Sheets not configured, leads will not be appended to a sheet");
    }

    if let Err(e) = handlers::run_server(&config).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}

async fn import(file: &Path, server: &str, source_url: Option<&str>, report: Option<&Path>) -> Result<()> {
    let client = ImportClient::new(server)?;
    let result = client.import_file(file, source_url).await?;

    println!("{}", import_client::summary(&result));

    let path = report
        .map(Path::to_path_buf)
        .unwrap_or_else(import_client::default_report_path);
    import_client::write_report(&path, &result).await?;
    info!("Report written to {}", path.display());

    Ok(())
}

async fn check() -> Result<()> {
    let config = config::Config::from_env()?;
    let state = handlers::AppState::from_config(&config)?;

    let crm = BrevoCrmProvider::new(&config.crm)?;
    let account = crm.verify_account().await;
    let list = crm.verify_list(config.crm.list_id).await;
    let email = state.email.verify().await;
    let sheets = match &state.sheets {
        Some(sheet) => Some(sheet.verify_access().await),
        None => None,
    };

    let status = |ok: bool| if ok { "OK" } else { "ÉCHEC" };
    println!("Brevo (clé API)   : {}", status(account.is_ok()));
    println!("Brevo (liste {})   : {}", config.crm.list_id, status(list.is_ok()));
    println!("Email             : {}", status(email));
    match sheets {
        Some(ok) => println!("Google Sheets     : {}", status(ok)),
        None => println!("Google Sheets     : non configuré"),
    }

    if let Err(e) = account.and(list) {
        bail!("Brevo is not reachable: {}", e);
    }
    Ok(())
}

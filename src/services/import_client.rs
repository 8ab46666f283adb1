//! Command-line importer.
//!
//! Uploads a spreadsheet to a running server's `/api/import-excel`, follows
//! the progress stream as it arrives and turns it into an `ImportReport`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use tracing::{error, info, warn};

use crate::services::progress_stream::{ProgressDecoder, ProgressTally};
use crate::types::{ImportEvent, ImportReport, ImportRunStats, RowStatus};

pub struct ImportClient {
    server: String,
    client: reqwest::Client,
}

impl ImportClient {
    pub fn new(server: &str) -> Result<Self> {
        // Runs are paced server-side, so only the connection gets a timeout
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            server: server.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Upload `path` and follow the run to its end.
    pub async fn import_file(&self, path: &Path, source_url: Option<&str>) -> Result<ImportReport> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Fichier non trouvé: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.xlsx".to_string());

        info!("Uploading {} ({} bytes) to {}", file_name, bytes.len(), self.server);

        let mut form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.clone()));
        if let Some(source_url) = source_url {
            form = form.text("sourceUrl", source_url.to_string());
        }

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/import-excel", self.server))
            .multipart(form)
            .send()
            .await
            .context("Import server unreachable")?
            .error_for_status()?;

        let mut decoder = ProgressDecoder::new();
        let mut tally = ProgressTally::default();
        let mut body = response.bytes_stream();

        while !tally.is_finished() {
            let Some(chunk) = body.next().await else { break };
            let chunk = chunk.context("Progress stream interrupted")?;
            for event in decoder.push(&chunk) {
                log_event(&event, &tally);
                tally.apply(&event);
            }
        }
        if let Some(event) = decoder.finish()? {
            log_event(&event, &tally);
            tally.apply(&event);
        }

        build_report(file_name, started.elapsed(), tally)
    }
}

fn log_event(event: &ImportEvent, tally: &ProgressTally) {
    match event {
        ImportEvent::Row { data } => {
            info!("[{}] {} {} <{}>", tally.total + 1, data.first_name, data.last_name, data.email)
        }
        ImportEvent::Result { result } => match result.status {
            RowStatus::Success => info!(
                "Ligne {}: {}{}",
                result.row_number,
                result.message,
                if result.added_to_marketing { " (marketing)" } else { "" }
            ),
            RowStatus::Error => warn!("Ligne {}: {}", result.row_number, result.message),
        },
        ImportEvent::Complete { stats } => info!(
            "Import terminé: {} succès, {} échecs, {} marketing",
            stats.success, stats.failed, stats.marketing
        ),
        ImportEvent::Error { message } => error!("Import interrompu: {}", message),
    }
}

/// Turn a finished tally into a report; fails when the run reported an error
/// or the stream ended before its `complete` event.
pub fn build_report(file: String, elapsed: Duration, tally: ProgressTally) -> Result<ImportReport> {
    if let Some(message) = tally.error {
        anyhow::bail!("Import failed: {}", message);
    }
    let stats: ImportRunStats = tally
        .final_stats
        .context("Progress stream ended before the import completed")?;

    Ok(ImportReport {
        timestamp: Utc::now(),
        file,
        duration_secs: elapsed.as_secs_f64(),
        stats,
        results: tally.results,
    })
}

/// Default report location: `import-report-<timestamp>.json` in the working directory.
pub fn default_report_path() -> PathBuf {
    PathBuf::from(format!("import-report-{}.json", Utc::now().format("%Y%m%dT%H%M%S")))
}

pub async fn write_report(path: &Path, report: &ImportReport) -> Result<()> {
    let json = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Could not write report to {}", path.display()))?;
    Ok(())
}

/// Human summary printed at the end of a CLI import.
pub fn summary(report: &ImportReport) -> String {
    let stats = &report.stats;
    let mut lines = vec![
        "=".repeat(60),
        format!("Fichier        : {}", report.file),
        format!("Total          : {}", stats.total),
        format!("Succès         : {}", stats.success),
        format!("Échecs         : {}", stats.failed),
        format!("Marketing      : {}", stats.marketing),
        format!("Durée          : {:.1}s", report.duration_secs),
    ];
    let failures: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.status == RowStatus::Error)
        .map(|r| format!("  ligne {} ({}): {}", r.row_number, r.email, r.message))
        .collect();
    if !failures.is_empty() {
        lines.push("Erreurs :".to_string());
        lines.extend(failures);
    }
    lines.push("=".repeat(60));
    lines.join("\n")
}

//! Bulk import orchestration.
//!
//! One run reads the uploaded spreadsheet, then walks the rows strictly in
//! order: transform, echo, validate, upsert. Every row yields exactly one
//! `result` event and the run ends with a single `complete` event, or a single
//! `error` event when the file cannot be read.
//!
//! A run stops early, before any further CRM call, when the event sink is
//! closed or the run token is cancelled (consumer went away).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ImportSettings;
use crate::error::AppError;
use crate::services::contact_upsert::ContactUpsertClient;
use crate::services::contact_validation::validate_contact;
use crate::services::row_transform::transform_row;
use crate::services::spreadsheet::read_rows;
use crate::types::{CanonicalContact, ImportEvent, ImportRowOutcome, ImportRunStats, RawRow, RowStatus};

pub const ROW_SUCCESS_MESSAGE: &str = "Contact ajouté avec succès";
const UPSTREAM_FALLBACK_MESSAGE: &str = "Erreur Brevo";
const MISSING: &str = "N/A";

/// The consumer of a run's events is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Destination of progress events
#[async_trait]
pub trait EventSink: Send {
    async fn emit(&mut self, event: ImportEvent) -> Result<(), SinkClosed>;
}

/// Sink feeding a bounded channel; closed once the receiver is dropped.
pub struct ChannelSink {
    tx: mpsc::Sender<ImportEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ImportEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&mut self, event: ImportEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).await.map_err(|_| SinkClosed)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(ImportRunStats),
    /// The upload could not be read; an `error` event was emitted
    Failed(String),
    /// Consumer disconnected; stats cover the rows finished before that
    Abandoned(ImportRunStats),
}

pub struct ImportPipeline {
    upsert: Arc<ContactUpsertClient>,
    settings: ImportSettings,
}

/// Sleep for `delay` unless the run is cancelled first. Returns `false` on cancellation.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn or_missing(value: &str) -> String {
    if value.is_empty() {
        MISSING.to_string()
    } else {
        value.to_string()
    }
}

fn invalid_outcome(row_number: u32, contact: &CanonicalContact, error: &AppError) -> ImportRowOutcome {
    ImportRowOutcome {
        row_number,
        email: or_missing(&contact.email),
        last_name: or_missing(&contact.last_name),
        first_name: or_missing(&contact.first_name),
        status: RowStatus::Error,
        message: error.to_string(),
        added_to_marketing: false,
    }
}

impl ImportPipeline {
    pub fn new(upsert: Arc<ContactUpsertClient>, settings: ImportSettings) -> Self {
        Self { upsert, settings }
    }

    /// Read the uploaded file, then run the import over its rows.
    pub async fn run_upload(
        &self,
        bytes: Vec<u8>,
        file_name: String,
        source_url: &str,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let read = tokio::task::spawn_blocking(move || read_rows(&bytes, Some(&file_name))).await;

        let rows = match read {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return Self::fail(e.to_string(), sink).await,
            Err(e) => return Self::fail(format!("Lecture du fichier interrompue: {}", e), sink).await,
        };

        self.run(rows, source_url, sink, cancel).await
    }

    async fn fail(message: String, sink: &mut dyn EventSink) -> RunOutcome {
        warn!("Import failed while reading the file: {}", message);
        // Nothing left to do if the consumer is already gone
        let _ = sink.emit(ImportEvent::Error { message: message.clone() }).await;
        RunOutcome::Failed(message)
    }

    /// Process `rows` in order, emitting progress to `sink`.
    pub async fn run(
        &self,
        rows: Vec<RawRow>,
        source_url: &str,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let span = info_span!("import", run_id = %Uuid::new_v4(), rows = rows.len());
        self.run_rows(rows, source_url, sink, cancel).instrument(span).await
    }

    async fn run_rows(
        &self,
        rows: Vec<RawRow>,
        source_url: &str,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let started = Instant::now();
        let mut stats = ImportRunStats::new(rows.len() as u32);
        info!(source_url = %source_url, "Import started with {} rows", rows.len());

        for (index, row) in rows.iter().enumerate() {
            let row_number = index as u32 + 2;

            if cancel.is_cancelled() {
                return Self::abandon(stats);
            }

            let contact = transform_row(row);
            debug!(row = row_number, email = %contact.email, "Row transformed");

            if sink.emit(ImportEvent::Row { data: contact.clone() }).await.is_err() {
                return Self::abandon(stats);
            }
            if !pause(self.settings.echo_delay, cancel).await {
                return Self::abandon(stats);
            }

            let errors = validate_contact(&contact);
            if !errors.is_empty() {
                let outcome = invalid_outcome(row_number, &contact, &AppError::Validation(errors));
                stats.record(&outcome);
                if sink.emit(ImportEvent::Result { result: outcome }).await.is_err() {
                    return Self::abandon(stats);
                }
                continue;
            }

            let outcome = match self.upsert.upsert(&contact, source_url).await {
                Ok(path) => {
                    debug!(row = row_number, ?path, "Row imported");
                    ImportRowOutcome {
                        row_number,
                        email: contact.email.clone(),
                        last_name: contact.last_name.clone(),
                        first_name: contact.first_name.clone(),
                        status: RowStatus::Success,
                        message: ROW_SUCCESS_MESSAGE.to_string(),
                        added_to_marketing: contact.accepts_marketing,
                    }
                }
                Err(e) => {
                    let message = if e.message().is_empty() {
                        UPSTREAM_FALLBACK_MESSAGE.to_string()
                    } else {
                        e.message().to_string()
                    };
                    ImportRowOutcome {
                        row_number,
                        email: contact.email.clone(),
                        last_name: contact.last_name.clone(),
                        first_name: contact.first_name.clone(),
                        status: RowStatus::Error,
                        message,
                        added_to_marketing: false,
                    }
                }
            };

            stats.record(&outcome);
            if sink.emit(ImportEvent::Result { result: outcome }).await.is_err() {
                return Self::abandon(stats);
            }

            if !pause(self.settings.row_delay, cancel).await {
                return Self::abandon(stats);
            }
        }

        // The run is over either way; a closed sink only means nobody sees the summary
        let _ = sink.emit(ImportEvent::Complete { stats }).await;
        info!(
            total = stats.total,
            success = stats.success,
            failed = stats.failed,
            marketing = stats.marketing,
            "Import completed in {:.1}s",
            started.elapsed().as_secs_f64()
        );
        RunOutcome::Completed(stats)
    }

    fn abandon(stats: ImportRunStats) -> RunOutcome {
        warn!(processed = stats.processed, total = stats.total, "Import abandoned, consumer disconnected");
        RunOutcome::Abandoned(stats)
    }
}

//! Progress stream framing.
//!
//! Every event is one frame: `data: <json>\n\n`. Frames may reach the
//! consumer split at any byte, so the decoder buffers raw bytes and only
//! interprets complete lines. A multi-byte character or a JSON object cut in
//! two by the network is reassembled before parsing.

use thiserror::Error;
use tracing::warn;

use crate::types::{ImportEvent, ImportRowOutcome, ImportRunStats, RowStatus};

const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed progress event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("progress stream is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Encode one event as a stream frame.
pub fn encode_event(event: &ImportEvent) -> String {
    frame(serde_json::to_string(event))
}

const ENCODING_FAILED_MESSAGE: &str = "Erreur lors de l'encodage de la progression";

fn frame(json: serde_json::Result<String>) -> String {
    let json = json.unwrap_or_else(|e| {
        warn!("Could not encode progress event: {}", e);
        serde_json::json!({ "type": "error", "message": ENCODING_FAILED_MESSAGE }).to_string()
    });
    format!("{}{}\n\n", DATA_PREFIX, json)
}

/// Incremental decoder for the progress stream
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    buffer: Vec<u8>,
}

impl ProgressDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it, in order.
    ///
    /// A line that is not valid JSON is skipped with a warning so one bad
    /// frame does not end the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ImportEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match parse_line(&line[..line.len() - 1]) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => warn!("Skipping progress frame: {}", e),
            }
        }
        events
    }

    /// Flush a final line left without a trailing newline.
    pub fn finish(&mut self) -> Result<Option<ImportEvent>, DecodeError> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Result<Option<ImportEvent>, DecodeError> {
    let line = std::str::from_utf8(line)?.trim_end_matches('\r');
    match line.strip_prefix(DATA_PREFIX) {
        Some(json) if !json.trim().is_empty() => Ok(Some(serde_json::from_str(json)?)),
        _ => Ok(None),
    }
}

/// Running totals kept by a stream consumer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressTally {
    pub total: u32,
    pub success: u32,
    pub failed: u32,
    pub marketing: u32,
    pub results: Vec<ImportRowOutcome>,
    /// Stats reported by the `complete` event
    pub final_stats: Option<ImportRunStats>,
    pub error: Option<String>,
}

impl ProgressTally {
    pub fn apply(&mut self, event: &ImportEvent) {
        match event {
            ImportEvent::Row { .. } => {}
            ImportEvent::Result { result } => {
                self.total += 1;
                match result.status {
                    RowStatus::Success => self.success += 1,
                    RowStatus::Error => self.failed += 1,
                }
                if result.added_to_marketing {
                    self.marketing += 1;
                }
                self.results.push(result.clone());
            }
            ImportEvent::Complete { stats } => self.final_stats = Some(*stats),
            ImportEvent::Error { message } => self.error = Some(message.clone()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.final_stats.is_some() || self.error.is_some()
    }
}

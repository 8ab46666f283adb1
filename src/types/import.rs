//! Bulk import types: spreadsheet rows, per-row outcomes, run statistics and
//! the progress events streamed back to the importing client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::contact::CanonicalContact;

// =============================================================================
// RAW ROWS
// =============================================================================

/// Single spreadsheet cell, typed by the source file
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Text rendering of the cell. Integral numbers lose their fractional part
    /// so postal codes and phone numbers read back the way they were typed.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim().is_empty())
    }
}

/// One data row: `(column label, value)` pairs in sheet order. Empty cells are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with(mut self, label: impl Into<String>, value: CellValue) -> Self {
        self.cells.push((label.into(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// =============================================================================
// OUTCOMES AND STATS
// =============================================================================

/// Final status of one imported row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Success,
    Error,
}

/// Result of one spreadsheet row, emitted exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowOutcome {
    /// Spreadsheet row number (first data row is 2)
    #[serde(rename = "row")]
    pub row_number: u32,
    pub email: String,
    #[serde(rename = "nom")]
    pub last_name: String,
    #[serde(rename = "prenom")]
    pub first_name: String,
    pub status: RowStatus,
    pub message: String,
    pub added_to_marketing: bool,
}

/// Running aggregate for one import run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRunStats {
    pub total: u32,
    pub processed: u32,
    pub success: u32,
    pub failed: u32,
    pub marketing: u32,
}

impl ImportRunStats {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &ImportRowOutcome) {
        self.processed += 1;
        match outcome.status {
            RowStatus::Success => {
                self.success += 1;
                if outcome.added_to_marketing {
                    self.marketing += 1;
                }
            }
            RowStatus::Error => self.failed += 1,
        }
    }
}

// =============================================================================
// PROGRESS EVENTS
// =============================================================================

/// Progress stream event, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImportEvent {
    /// Transformed row, sent before validation so the UI can mirror it
    Row { data: CanonicalContact },
    Result { result: ImportRowOutcome },
    Complete { stats: ImportRunStats },
    /// Fatal; the stream closes right after
    Error { message: String },
}

/// JSON report written by the command-line importer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub timestamp: DateTime<Utc>,
    pub file: String,
    pub duration_secs: f64,
    pub stats: ImportRunStats,
    pub results: Vec<ImportRowOutcome>,
}

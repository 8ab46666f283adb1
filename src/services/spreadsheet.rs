//! Uploaded spreadsheet decoding
//!
//! Turns the raw bytes of an uploaded `.xlsx`/`.xls`/`.ods` workbook or `.csv`
//! file into ordered [`RawRow`]s. The first row is the header; the first sheet
//! of a workbook is used.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::types::{CellValue, RawRow};

const EMPTY_HEADER: &str = "__EMPTY";

/// Source format of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    Workbook,
    Csv,
}

impl UploadFormat {
    /// Decide from the file name, falling back to the leading magic bytes.
    pub fn detect(file_name: Option<&str>, bytes: &[u8]) -> Self {
        if let Some(name) = file_name {
            if name.to_lowercase().ends_with(".csv") {
                return UploadFormat::Csv;
            }
            let lower = name.to_lowercase();
            if lower.ends_with(".xlsx") || lower.ends_with(".xls") || lower.ends_with(".ods") {
                return UploadFormat::Workbook;
            }
        }

        // ZIP container (xlsx/ods) or OLE compound file (xls)
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
            UploadFormat::Workbook
        } else {
            UploadFormat::Csv
        }
    }
}

/// Decode an upload into data rows.
pub fn read_rows(bytes: &[u8], file_name: Option<&str>) -> Result<Vec<RawRow>> {
    if bytes.is_empty() {
        return Err(AppError::parse("Le fichier est vide"));
    }

    let rows = match UploadFormat::detect(file_name, bytes) {
        UploadFormat::Workbook => read_workbook(bytes)?,
        UploadFormat::Csv => read_csv(bytes)?,
    };

    debug!("Decoded {} data rows from upload", rows.len());
    Ok(rows)
}

fn read_workbook(bytes: &[u8]) -> Result<Vec<RawRow>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| AppError::parse(format!("Impossible de lire le fichier Excel: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::parse("Le fichier ne contient aucune feuille"))?
        .map_err(|e| AppError::parse(format!("Impossible de lire la feuille: {}", e)))?;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(header) => header_labels(header.iter().map(|c| cell_value(c).map(|v| v.as_text()))),
        None => return Ok(Vec::new()),
    };

    Ok(rows
        .map(|row| build_row(&header, row.iter().map(cell_value)))
        .filter(|row| !row.is_empty())
        .collect())
}

fn read_csv(bytes: &[u8]) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let header = reader
        .headers()
        .map_err(|e| AppError::parse(format!("Impossible de lire le fichier CSV: {}", e)))?
        .clone();
    let header = header_labels(header.iter().map(|h| Some(h.to_string())));

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| AppError::parse(format!("Impossible de lire le fichier CSV: {}", e)))?;
        let row = build_row(
            &header,
            record.iter().map(|field| {
                if field.is_empty() {
                    None
                } else {
                    Some(CellValue::Text(field.to_string()))
                }
            }),
        );
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn cell_value(cell: &Data) -> Option<CellValue> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(CellValue::Text(s.clone())),
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Bool(b) => Some(CellValue::Bool(*b)),
        other => Some(CellValue::Text(other.to_string())),
    }
}

/// Header labels, with blank headers named like the spreadsheet-to-JSON convention.
fn header_labels(cells: impl Iterator<Item = Option<String>>) -> Vec<String> {
    let mut empty_count = 0;
    cells
        .map(|label| match label {
            Some(label) if !label.trim().is_empty() => label.trim().to_string(),
            _ => {
                let name = if empty_count == 0 {
                    EMPTY_HEADER.to_string()
                } else {
                    format!("{}_{}", EMPTY_HEADER, empty_count)
                };
                empty_count += 1;
                name
            }
        })
        .collect()
}

fn build_row(header: &[String], cells: impl Iterator<Item = Option<CellValue>>) -> RawRow {
    let mut row = RawRow::new();
    for (label, value) in header.iter().zip(cells) {
        if let Some(value) = value {
            row.cells.push((label.clone(), value));
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn xlsx_bytes(rows: &[&[&str]]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                sheet.write_string(r as u32, c as u16, *value).unwrap();
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn detect_by_extension_then_magic() {
        assert_eq!(UploadFormat::detect(Some("contacts.CSV"), b"PK\x03\x04"), UploadFormat::Csv);
        assert_eq!(UploadFormat::detect(Some("contacts.xlsx"), b"Nom"), UploadFormat::Workbook);
        assert_eq!(UploadFormat::detect(None, b"PK\x03\x04rest"), UploadFormat::Workbook);
        assert_eq!(UploadFormat::detect(None, b"Nom;Prenom"), UploadFormat::Csv);
    }

    #[test]
    fn reads_xlsx_rows_in_order_and_skips_empty_cells() {
        let bytes = xlsx_bytes(&[
            &["Nom", "Prénom", "Email"],
            &["Dupont", "Jean", "jean@example.fr"],
            &["Martin", "", "lea@example.fr"],
        ]);
        let rows = read_rows(&bytes, Some("contacts.xlsx")).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells[0], ("Nom".to_string(), CellValue::Text("Dupont".into())));
        assert_eq!(rows[1].cells.len(), 2);
        assert_eq!(rows[1].cells[1].0, "Email");
    }

    #[test]
    fn reads_xlsx_numbers_as_numbers() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Code Postal").unwrap();
        sheet.write_number(1, 0, 75001.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let rows = read_rows(&bytes, Some("cp.xlsx")).unwrap();
        assert_eq!(rows[0].cells[0].1, CellValue::Number(75001.0));
        assert_eq!(rows[0].cells[0].1.as_text(), "75001");
    }

    #[test]
    fn reads_csv_and_skips_blank_lines() {
        let csv = "Nom,Prénom,Email\nDupont,Jean,jean@example.fr\n,,\nMartin,Léa,lea@example.fr\n";
        let rows = read_rows(csv.as_bytes(), Some("contacts.csv")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].cells[1], ("Prénom".to_string(), CellValue::Text("Léa".into())));
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let rows = read_rows(b"Nom,Email\n", Some("empty.csv")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn corrupt_workbook_is_a_parse_error() {
        let err = read_rows(b"PK\x03\x04not really a zip", Some("broken.xlsx")).unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn empty_upload_is_a_parse_error() {
        assert!(matches!(read_rows(b"", None), Err(AppError::Parse(_))));
    }

    #[test]
    fn blank_headers_get_placeholder_labels() {
        let labels = header_labels(vec![Some("Nom".into()), None, Some(" ".into())].into_iter());
        assert_eq!(labels, vec!["Nom", "__EMPTY", "__EMPTY_1"]);
    }
}

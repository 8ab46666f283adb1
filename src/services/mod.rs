//! Business logic services

pub mod contact_upsert;
pub mod contact_validation;
pub mod crm;
pub mod email_sender;
pub mod email_templates;
pub mod import_client;
pub mod import_pipeline;
pub mod lead_sync;
pub mod progress_stream;
pub mod row_transform;
pub mod sheets;
pub mod spreadsheet;

//! GST invoice field extraction: OCR lines in, scored and classified invoice records out.

pub mod assembler;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod excel;
pub mod export;
pub mod ocr;
pub mod patterns;
pub mod resolver;
pub mod scoring;
pub mod services;
pub mod types;

pub use assembler::{GstinStatus, Pipeline};
pub use cache::{InMemoryVendorRoles, NoVendorRoles, PartyRole, VendorProfile, VendorRoleCache};
pub use config::ExtractionConfig;
pub use db::VendorDb;
pub use error::{Result, ScanError};
pub use excel::XlsxReportWriter;
pub use export::{JsonReportWriter, RecordWriter};
pub use ocr::{LineIndex, RawOcrLine};
pub use resolver::Thresholds;
pub use types::{
    BatchScanResult, BatchSummary, Candidate, CandidateValue, Correction, FailedScan, Field, InvoiceRecord,
    LineItem, MatchOrigin, PartyNames, Provenance, RejectionReason, ResolvedField, Status, TextLine,
};

use std::io;

use thiserror::Error;

/// Result alias used by the I/O edges of the crate (config, OCR files, stores, writers).
pub type Result<T> = std::result::Result<T, ScanError>;

/// Failures outside the extraction core. Field-level problems never surface here;
/// they become `Except` fields on the record instead.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("vendor store failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("excel export failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unsupported OCR output in '{source_name}': {reason}")]
    UnsupportedOcrFormat { source_name: String, reason: String },
    #[error("vendor cache lock poisoned")]
    CachePoisoned,
}

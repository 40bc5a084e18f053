use crate::error::Result;
use crate::types::InvoiceRecord;
use std::fs;
use std::path::{Path, PathBuf};

/// A sink for finished records. Writers never touch the pipeline; they only see records.
pub trait RecordWriter {
    /// Write `records` to `path` and return the path actually written.
    fn write(&self, records: &[InvoiceRecord], path: &Path) -> Result<PathBuf>;
}

/// Force `ext` onto a user-supplied output path ("report" -> "report.json").
pub(crate) fn with_extension(path: &Path, ext: &str) -> PathBuf {
    let mut pb = path.to_path_buf();
    if pb.extension().and_then(|e| e.to_str()) != Some(ext) {
        pb.set_extension(ext);
    }
    pb
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Pretty-printed JSON array of records.
#[derive(Debug, Clone, Default)]
pub struct JsonReportWriter {
    /// Keep the candidate trail in the output.
    pub include_trail: bool,
}

impl RecordWriter for JsonReportWriter {
    fn write(&self, records: &[InvoiceRecord], path: &Path) -> Result<PathBuf> {
        let path = with_extension(path, "json");
        ensure_parent(&path)?;
        let json = if self.include_trail {
            serde_json::to_string_pretty(records)?
        } else {
            let slim: Vec<InvoiceRecord> = records
                .iter()
                .cloned()
                .map(|mut r| {
                    r.trail.clear();
                    r
                })
                .collect();
            serde_json::to_string_pretty(&slim)?
        };
        fs::write(&path, json)?;
        log::info!("wrote {} record(s) to {}", records.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, PartyNames, ResolvedField, Status};

    fn record(id: &str) -> InvoiceRecord {
        InvoiceRecord {
            document_id: id.to_string(),
            invoice_number: ResolvedField::missing(Field::InvoiceNumber),
            invoice_date: ResolvedField::missing(Field::InvoiceDate),
            supplier_tax_id: ResolvedField::missing(Field::SupplierTaxId),
            buyer_tax_id: ResolvedField::missing(Field::BuyerTaxId),
            total_amount: ResolvedField::missing(Field::TotalAmount),
            line_items: vec![],
            parties: PartyNames::default(),
            status: Status::Except,
            trail: vec![],
        }
    }

    #[test]
    fn extension_is_forced() {
        assert_eq!(with_extension(Path::new("out/report"), "json"), PathBuf::from("out/report.json"));
        assert_eq!(with_extension(Path::new("a.xlsx"), "xlsx"), PathBuf::from("a.xlsx"));
    }

    #[test]
    fn json_writer_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let written = JsonReportWriter::default()
            .write(&[record("a.json"), record("b.json")], &dir.path().join("nested/report"))
            .unwrap();
        assert!(written.ends_with("nested/report.json"));
        let back: Vec<InvoiceRecord> = serde_json::from_str(&fs::read_to_string(&written).unwrap()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].document_id, "b.json");
        assert_eq!(back[0].status, Status::Except);
    }
}

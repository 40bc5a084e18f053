//! The SQLite vendor-role store as the pipeline's cache, across process restarts.

use gst_invoice_lib::{
    ExtractionConfig, LineIndex, PartyRole, Pipeline, RawOcrLine, VendorDb, VendorProfile, VendorRoleCache,
};
use std::sync::Arc;

const SUPPLIER: &str = "27AAPFU0939F1ZV";
const BUYER: &str = "29ABCDE1234F1Z5";

fn doc(lines: &[(&str, f64)]) -> LineIndex {
    LineIndex::build(lines.iter().map(|(t, y)| RawOcrLine::new(*t, *y, 95.0)).collect())
}

#[test]
fn learned_roles_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache/vendors.db");

    {
        let db = Arc::new(VendorDb::open(&path).unwrap());
        let pipeline = Pipeline::new(ExtractionConfig::default(), db.clone());
        let record = pipeline.process(
            "first",
            &doc(&[
                ("Kiran Steels", 0.02),
                ("GSTIN: 27AAPFU0939F1ZV", 0.06),
                ("Invoice No: KS-1042", 0.10),
                ("Buyer: Om Hardware GSTIN 29ABCDE1234F1Z5", 0.25),
                ("Grand Total: 5,900.00", 0.90),
            ]),
        );
        assert_eq!(record.buyer_tax_id.text(), Some(BUYER));
        assert_eq!(db.len().unwrap(), 2);
    }

    let db = Arc::new(VendorDb::open(&path).unwrap());
    let row = db.get(BUYER).unwrap().unwrap();
    assert_eq!(row.profile, VendorProfile::new("Om Hardware", PartyRole::Buyer));
    assert_eq!(row.usage_count, 1);

    let pipeline = Pipeline::new(ExtractionConfig::default(), db.clone());
    let record = pipeline.process("second", &doc(&[(BUYER, 0.05), (SUPPLIER, 0.95)]));
    assert_eq!(record.buyer_tax_id.text(), Some(BUYER));
    assert_eq!(record.supplier_tax_id.text(), Some(SUPPLIER));
    assert_eq!(record.parties.supplier.as_deref(), Some("Kiran Steels"));
    assert_eq!(db.get(BUYER).unwrap().unwrap().usage_count, 2);
}

#[test]
fn last_writer_wins() {
    let dir = tempfile::tempdir().unwrap();
    let db = VendorDb::open(dir.path().join("vendors.db")).unwrap();
    db.remember(SUPPLIER, VendorProfile::new("Acme", PartyRole::Supplier)).unwrap();
    db.remember(SUPPLIER, VendorProfile::new("Acme Ltd", PartyRole::Buyer)).unwrap();
    assert_eq!(db.lookup(SUPPLIER), Some(VendorProfile::new("Acme Ltd", PartyRole::Buyer)));
    assert_eq!(db.all().unwrap().len(), 1);
}

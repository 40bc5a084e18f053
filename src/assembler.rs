//! Builds one [`InvoiceRecord`] per document and keeps the vendor-role cache current.

use crate::cache::{PartyRole, VendorProfile, VendorRoleCache};
use crate::config::ExtractionConfig;
use crate::ocr::LineIndex;
use crate::patterns;
use crate::resolver::{resolve_field, resolve_line_items, FieldResolution};
use crate::scoring::Scorer;
use crate::services::{
    extract_party_names, CandidateGenerator, InvoiceDateGenerator, InvoiceNumberGenerator, LineItemGenerator,
    TaxIdGenerator, TotalAmountGenerator,
};
use crate::types::{Candidate, Correction, Field, InvoiceRecord, PartyNames, ResolvedField, Status};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Format-only GSTIN check for reports (no checksum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GstinStatus {
    Valid,
    Invalid,
    Missing,
}

impl GstinStatus {
    pub fn of(field: &ResolvedField) -> Self {
        match field.text() {
            None => GstinStatus::Missing,
            Some(v) if patterns::is_gstin(v) => GstinStatus::Valid,
            Some(_) => GstinStatus::Invalid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GstinStatus::Valid => "Valid",
            GstinStatus::Invalid => "Invalid",
            GstinStatus::Missing => "Missing",
        }
    }
}

/// Worst per-field status over the scalar fields.
pub fn overall_status(fields: &[&ResolvedField]) -> Status {
    fields.iter().map(|f| f.status).max().unwrap_or(Status::Except)
}

/// Per-field resolutions for one document, before cache updates and assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFields {
    pub invoice_number: FieldResolution,
    pub invoice_date: FieldResolution,
    pub supplier_tax_id: FieldResolution,
    pub buyer_tax_id: FieldResolution,
    pub total_amount: FieldResolution,
    pub line_items: Vec<crate::types::LineItem>,
    pub line_item_trail: Vec<Candidate>,
}

/// The extraction pipeline: generators, scorer, resolver and assembler, with an
/// explicit vendor-role cache handle instead of process-wide state.
pub struct Pipeline {
    config: ExtractionConfig,
    roles: Arc<dyn VendorRoleCache>,
}

impl Pipeline {
    pub fn new(config: ExtractionConfig, roles: Arc<dyn VendorRoleCache>) -> Self {
        Self { config, roles }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn roles(&self) -> &Arc<dyn VendorRoleCache> {
        &self.roles
    }

    /// Generators → scorer → resolver. Reads the cache, never writes it.
    pub fn resolve_fields(&self, index: &LineIndex) -> ResolvedFields {
        let cfg = &self.config;
        let kw = &cfg.keywords;
        let scorer = Scorer::new(cfg);
        let margin = cfg.scoring.tie_break_margin;

        let generators: [Box<dyn CandidateGenerator + '_>; 5] = [
            Box::new(InvoiceNumberGenerator::new(kw)),
            Box::new(InvoiceDateGenerator::new(kw)),
            Box::new(TaxIdGenerator::new(kw, &cfg.tax_ids, self.roles.as_ref())),
            Box::new(TotalAmountGenerator::new(kw, &cfg.amounts)),
            Box::new(LineItemGenerator::new(kw, &cfg.line_items)),
        ];
        let mut candidates: Vec<Candidate> = generators.iter().flat_map(|g| g.generate(index)).collect();
        scorer.score_all(&mut candidates, index);

        let take = |field: Field| -> Vec<Candidate> {
            candidates.iter().filter(|c| c.field == field).cloned().collect()
        };
        let resolve = |field: Field| resolve_field(field, take(field), cfg.thresholds.for_field(field), margin);
        let (line_items, line_item_trail) =
            resolve_line_items(take(Field::LineItem), cfg.thresholds.for_field(Field::LineItem));

        ResolvedFields {
            invoice_number: resolve(Field::InvoiceNumber),
            invoice_date: resolve(Field::InvoiceDate),
            supplier_tax_id: resolve(Field::SupplierTaxId),
            buyer_tax_id: resolve(Field::BuyerTaxId),
            total_amount: resolve(Field::TotalAmount),
            line_items,
            line_item_trail,
        }
    }

    /// Full run for one document. Never fails: missing data shows up as `Except` fields.
    pub fn process(&self, document_id: &str, index: &LineIndex) -> InvoiceRecord {
        let fields = self.resolve_fields(index);
        let mut parties = extract_party_names(index, &self.config.keywords, &self.config.tax_ids);

        self.remember_roles(&fields, &mut parties);

        let ResolvedFields {
            invoice_number,
            invoice_date,
            supplier_tax_id,
            buyer_tax_id,
            total_amount,
            line_items,
            line_item_trail,
        } = fields;

        let status = overall_status(&[
            &invoice_number.resolved,
            &invoice_date.resolved,
            &supplier_tax_id.resolved,
            &buyer_tax_id.resolved,
            &total_amount.resolved,
        ]);

        let mut trail = Vec::new();
        for resolution in [&invoice_number, &invoice_date, &supplier_tax_id, &buyer_tax_id, &total_amount] {
            trail.extend(resolution.trail.iter().cloned());
        }
        trail.extend(line_item_trail);

        log::info!(
            "{}: {} (invoice no {:?}, total {:?}, {} item(s))",
            document_id,
            status,
            invoice_number.resolved.text(),
            total_amount.resolved.amount(),
            line_items.len()
        );

        InvoiceRecord {
            document_id: document_id.to_string(),
            invoice_number: invoice_number.resolved,
            invoice_date: invoice_date.resolved,
            supplier_tax_id: supplier_tax_id.resolved,
            buyer_tax_id: buyer_tax_id.resolved,
            total_amount: total_amount.resolved,
            line_items,
            parties,
            status,
            trail,
        }
    }

    /// Cache tax IDs that resolved to `Auto` or `Review`, and back-fill names the
    /// page did not yield from earlier documents.
    fn remember_roles(&self, fields: &ResolvedFields, parties: &mut PartyNames) {
        let sides = [
            (&fields.supplier_tax_id.resolved, PartyRole::Supplier),
            (&fields.buyer_tax_id.resolved, PartyRole::Buyer),
        ];
        for (resolved, role) in sides {
            let Some(tax_id) = resolved.text() else {
                continue;
            };
            let name_slot = match role {
                PartyRole::Supplier => &mut parties.supplier,
                PartyRole::Buyer => &mut parties.buyer,
            };
            if name_slot.is_none() {
                *name_slot = self
                    .roles
                    .lookup(tax_id)
                    .map(|p| p.display_name)
                    .filter(|n| !n.is_empty());
            }
            if resolved.status == Status::Except {
                continue;
            }
            let profile = VendorProfile::new(name_slot.clone().unwrap_or_default(), role);
            if let Err(e) = self.roles.remember(tax_id, profile) {
                log::warn!("could not cache role for {}: {}", tax_id, e);
            }
        }
    }
}

impl InvoiceRecord {
    /// One follow-up per `Except` field. A missing total is suggested from the line items.
    pub fn corrections(&self) -> Vec<Correction> {
        self.scalar_fields()
            .into_iter()
            .filter(|f| f.status == Status::Except)
            .map(|f| {
                let observation = match f.field {
                    Field::TotalAmount if !self.line_items.is_empty() => format!(
                        "Total not found; line items sum to {:.2}",
                        self.line_item_total()
                    ),
                    Field::SupplierTaxId | Field::BuyerTaxId if f.value.is_some() => {
                        format!("{} is unclear; verify manually", f.field)
                    }
                    _ if f.value.is_some() => format!("{} has low confidence; verify manually", f.field),
                    _ => format!("{} not found", f.field),
                };
                Correction {
                    document_id: self.document_id.clone(),
                    field: f.field,
                    observation,
                }
            })
            .collect()
    }

    pub fn supplier_gstin_status(&self) -> GstinStatus {
        GstinStatus::of(&self.supplier_tax_id)
    }

    pub fn buyer_gstin_status(&self) -> GstinStatus {
        GstinStatus::of(&self.buyer_tax_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryVendorRoles, NoVendorRoles};
    use crate::ocr::RawOcrLine;
    use crate::types::Provenance;

    fn pipeline_with(roles: Arc<dyn VendorRoleCache>) -> Pipeline {
        Pipeline::new(ExtractionConfig::default(), roles)
    }

    fn sample_invoice() -> LineIndex {
        LineIndex::build(vec![
            RawOcrLine::new("ACME TRADERS PVT LTD", 0.02, 97.0),
            RawOcrLine::new("GSTIN: 27AAPFU0939F1ZV", 0.06, 95.0),
            RawOcrLine::new("Invoice No: INV/2024/00123", 0.10, 94.0).with_provenance(Provenance::FormKeyValue),
            RawOcrLine::new("Invoice Date: 31/03/2024", 0.13, 93.0).with_provenance(Provenance::FormKeyValue),
            RawOcrLine::new("Bill To:", 0.18, 92.0),
            RawOcrLine::new("Beta Stores", 0.21, 92.0),
            RawOcrLine::new("GSTIN: 29ABCDE1234F1Z5", 0.24, 92.0),
            RawOcrLine::new("Sr Description Qty Rate Amount", 0.35, 90.0),
            RawOcrLine::new("1 Widget 2 250.00 500.00", 0.40, 90.0),
            RawOcrLine::new("2 Gadget 1 300.00 300.00", 0.45, 90.0),
            RawOcrLine::new("Subtotal: 800.00", 0.70, 90.0),
            RawOcrLine::new("GST 18%: 144.00", 0.75, 90.0),
            RawOcrLine::new("Grand Total: 944.00", 0.85, 95.0),
        ])
    }

    #[test]
    fn complete_invoice_is_auto() {
        let record = pipeline_with(Arc::new(NoVendorRoles)).process("inv-1", &sample_invoice());
        assert_eq!(record.invoice_number.text(), Some("INV/2024/00123"));
        assert_eq!(record.invoice_date.text(), Some("2024-03-31"));
        assert_eq!(record.supplier_tax_id.text(), Some("27AAPFU0939F1ZV"));
        assert_eq!(record.buyer_tax_id.text(), Some("29ABCDE1234F1Z5"));
        assert_eq!(record.total_amount.amount(), Some(944.0));
        assert_eq!(record.line_items.len(), 2);
        assert_eq!(record.parties.supplier.as_deref(), Some("ACME TRADERS PVT LTD"));
        assert_eq!(record.parties.buyer.as_deref(), Some("Beta Stores"));
        assert_eq!(record.status, Status::Auto);
        assert!(record.corrections().is_empty());
    }

    #[test]
    fn resolved_tax_ids_are_cached_with_names() {
        let roles = Arc::new(InMemoryVendorRoles::new());
        pipeline_with(roles.clone()).process("inv-1", &sample_invoice());
        let supplier = roles.lookup("27AAPFU0939F1ZV").unwrap();
        assert_eq!(supplier.role, PartyRole::Supplier);
        assert_eq!(supplier.display_name, "ACME TRADERS PVT LTD");
        assert_eq!(roles.lookup("29ABCDE1234F1Z5").unwrap().role, PartyRole::Buyer);
    }

    #[test]
    fn empty_document_is_a_well_formed_except_record() {
        let record = pipeline_with(Arc::new(NoVendorRoles)).process("blank", &LineIndex::default());
        assert_eq!(record.status, Status::Except);
        assert!(record.scalar_fields().iter().all(|f| f.value.is_none()));
        assert_eq!(record.corrections().len(), 5);
        assert_eq!(record.supplier_gstin_status(), GstinStatus::Missing);
    }

    #[test]
    fn low_confidence_two_number_rows_are_kept() {
        let index = LineIndex::build(vec![
            RawOcrLine::new("Description Qty Rate Amount", 0.3, 90.0),
            RawOcrLine::new("Freight charges 1 250.00", 0.4, 60.0),
        ]);
        let record = pipeline_with(Arc::new(NoVendorRoles)).process("freight", &index);
        assert_eq!(record.line_items.len(), 1);
        assert_eq!(record.line_items[0].description, "Freight charges");
        assert_eq!(record.line_items[0].amount, 250.0);
        assert!(record.trail.iter().all(|c| c.field != Field::LineItem));
    }

    #[test]
    fn missing_total_is_suggested_from_items() {
        let index = LineIndex::build(vec![
            RawOcrLine::new("Description Qty Rate Amount", 0.3, 90.0),
            RawOcrLine::new("Widget 2 2.50 5.00", 0.4, 90.0),
            RawOcrLine::new("Gadget 1 4.00 4.00", 0.5, 90.0),
        ]);
        let record = pipeline_with(Arc::new(NoVendorRoles)).process("items-only", &index);
        let total = record
            .corrections()
            .into_iter()
            .find(|c| c.field == Field::TotalAmount)
            .unwrap();
        assert!(total.observation.contains("9.00"));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural origin of an OCR line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    PlainLine,
    FormKeyValue,
    TableCell,
}

impl Default for Provenance {
    fn default() -> Self {
        Provenance::PlainLine
    }
}

/// One recognized line, owned by the line index for the lifetime of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// Normalized top-of-page offset in [0, 1].
    pub vertical_position: f64,
    /// Recognition confidence in [0, 100]; 0 when the backend did not report one.
    pub confidence: f64,
    pub provenance: Provenance,
    /// Normalized left offset, used only to order cells inside a visual row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_position: Option<f64>,
}

impl TextLine {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    InvoiceNumber,
    InvoiceDate,
    SupplierTaxId,
    BuyerTaxId,
    TotalAmount,
    LineItem,
}

impl Field {
    /// The five fields that carry one resolved value each.
    pub const SCALAR: [Field; 5] = [
        Field::InvoiceNumber,
        Field::InvoiceDate,
        Field::SupplierTaxId,
        Field::BuyerTaxId,
        Field::TotalAmount,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Field::InvoiceNumber => "Invoice No",
            Field::InvoiceDate => "Invoice Date",
            Field::SupplierTaxId => "Supplier GSTIN",
            Field::BuyerTaxId => "Buyer GSTIN",
            Field::TotalAmount => "Total Amount",
            Field::LineItem => "Line Item",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single invoice table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_rate: Option<f64>,
    /// Percentage, e.g. 18.0 for "18%".
    pub tax_rate: Option<f64>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateValue {
    Text(String),
    Amount(f64),
    Item(LineItem),
}

impl CandidateValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CandidateValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_amount(&self) -> Option<f64> {
        match self {
            CandidateValue::Amount(v) => Some(*v),
            CandidateValue::Item(item) => Some(item.amount),
            CandidateValue::Text(_) => None,
        }
    }

    pub fn as_item(&self) -> Option<&LineItem> {
        match self {
            CandidateValue::Item(item) => Some(item),
            _ => None,
        }
    }

    /// Display length used by the shortest-value tie-break.
    pub fn text_len(&self) -> usize {
        match self {
            CandidateValue::Text(s) => s.chars().count(),
            CandidateValue::Amount(v) => format!("{:.2}", v).len(),
            CandidateValue::Item(item) => item.description.chars().count(),
        }
    }
}

impl fmt::Display for CandidateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateValue::Text(s) => f.write_str(s),
            CandidateValue::Amount(v) => write!(f, "{:.2}", v),
            CandidateValue::Item(item) => write!(f, "{} ({:.2})", item.description, item.amount),
        }
    }
}

/// How a generator arrived at a candidate. Feeds the scorer's origin weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrigin {
    /// Value sits on the same line as a field label.
    Label,
    /// Value is on the line right after a label line.
    FollowsLabel,
    /// Bare shape match with no label context.
    Shape,
    /// Tax-ID role taken from the vendor-role cache.
    Cached,
    /// Tax-ID role decided by buyer/supplier keywords near the match.
    Keyword,
    /// Tax-ID role decided by position on the page.
    Position,
}

/// Why the scorer's hard filter eliminated a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    DateShape,
    TaxIdShape,
    CurrencyShape,
    VehicleShape,
    /// A total-amount candidate whose value is not a number.
    NotAnAmount,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::DateShape => "date_pattern",
            RejectionReason::TaxIdShape => "gstin_pattern",
            RejectionReason::CurrencyShape => "amount_pattern",
            RejectionReason::VehicleShape => "vehicle_number",
            RejectionReason::NotAnAmount => "not_an_amount",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed value for one field. `source_line` indexes into the line index and never owns the line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub field: Field,
    pub value: CandidateValue,
    /// The literal as it appeared on the page.
    pub raw: String,
    pub source_line: usize,
    pub origin: MatchOrigin,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<RejectionReason>,
}

impl Candidate {
    pub fn new(
        field: Field,
        value: CandidateValue,
        raw: impl Into<String>,
        source_line: usize,
        origin: MatchOrigin,
    ) -> Self {
        Self {
            field,
            value,
            raw: raw.into(),
            source_line,
            origin,
            score: 0.0,
            rejection_reason: None,
        }
    }

    pub fn text(field: Field, value: &str, source_line: usize, origin: MatchOrigin) -> Self {
        Self::new(field, CandidateValue::Text(value.to_string()), value, source_line, origin)
    }

    pub fn is_rejected(&self) -> bool {
        self.rejection_reason.is_some()
    }
}

/// Three-tier confidence classification. Ordered by severity: `Except` is the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Auto,
    Review,
    Except,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Auto => "AUTO",
            Status::Review => "REVIEW",
            Status::Except => "EXCEPT",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub field: Field,
    pub value: Option<CandidateValue>,
    pub status: Status,
    pub score: f64,
}

impl ResolvedField {
    pub fn missing(field: Field) -> Self {
        Self {
            field,
            value: None,
            status: Status::Except,
            score: 0.0,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.value.as_ref().and_then(|v| v.as_text())
    }

    pub fn amount(&self) -> Option<f64> {
        self.value.as_ref().and_then(|v| v.as_amount())
    }
}

/// Supplier/buyer display names. Informational only; they never affect the record status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyNames {
    pub supplier: Option<String>,
    pub buyer: Option<String>,
}

/// The assembled result for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub document_id: String,
    pub invoice_number: ResolvedField,
    pub invoice_date: ResolvedField,
    pub supplier_tax_id: ResolvedField,
    pub buyer_tax_id: ResolvedField,
    pub total_amount: ResolvedField,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub parties: PartyNames,
    pub status: Status,
    /// Rejected and non-winning candidates, kept for diagnostics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trail: Vec<Candidate>,
}

impl InvoiceRecord {
    pub fn field(&self, field: Field) -> Option<&ResolvedField> {
        match field {
            Field::InvoiceNumber => Some(&self.invoice_number),
            Field::InvoiceDate => Some(&self.invoice_date),
            Field::SupplierTaxId => Some(&self.supplier_tax_id),
            Field::BuyerTaxId => Some(&self.buyer_tax_id),
            Field::TotalAmount => Some(&self.total_amount),
            Field::LineItem => None,
        }
    }

    pub fn scalar_fields(&self) -> [&ResolvedField; 5] {
        [
            &self.invoice_number,
            &self.invoice_date,
            &self.supplier_tax_id,
            &self.buyer_tax_id,
            &self.total_amount,
        ]
    }

    /// Sum of line-item amounts, rounded to paise.
    pub fn line_item_total(&self) -> f64 {
        let sum: f64 = self.line_items.iter().map(|i| i.amount).sum();
        (sum * 100.0).round() / 100.0
    }
}

/// Suggested follow-up for one field that could not be extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub document_id: String,
    pub field: Field,
    pub observation: String,
}

/// Per-status counts over a batch of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub auto: usize,
    pub review: usize,
    pub except: usize,
}

impl BatchSummary {
    pub fn from_records(records: &[InvoiceRecord]) -> Self {
        let mut summary = BatchSummary::default();
        for record in records {
            summary.total += 1;
            match record.status {
                Status::Auto => summary.auto += 1,
                Status::Review => summary.review += 1,
                Status::Except => summary.except += 1,
            }
        }
        summary
    }
}

/// A file that could not be turned into a record (unreadable or unrecognised OCR output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedScan {
    pub file_path: String,
    pub file_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchScanResult {
    pub successes: Vec<InvoiceRecord>,
    pub failures: Vec<FailedScan>,
}

use crate::error::{Result, ScanError};
use crate::resolver::Thresholds;
use crate::types::Field;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

/// Path of a TOML config file.
pub const CONFIG_ENV: &str = "GST_SCAN_CONFIG";
/// Path of the SQLite vendor-role store.
pub const VENDOR_CACHE_ENV: &str = "GST_SCAN_VENDOR_CACHE";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Every tunable the pipeline reads. All sections default, so a config file only
/// needs the keys it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub thresholds: FieldThresholds,
    pub scoring: ScoringWeights,
    pub keywords: KeywordConfig,
    pub amounts: AmountBounds,
    pub line_items: LineItemConfig,
    pub tax_ids: TaxIdConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_cache_path: Option<PathBuf>,
}

impl ExtractionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let cfg: ExtractionConfig = toml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults, overridden by `GST_SCAN_CONFIG` / `GST_SCAN_VENDOR_CACHE` (a `.env` file is honoured).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = match env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim())?,
            _ => Self::default(),
        };
        if let Ok(path) = env::var(VENDOR_CACHE_ENV) {
            if !path.trim().is_empty() {
                cfg.vendor_cache_path = Some(PathBuf::from(path.trim()));
            }
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for field in Field::SCALAR.iter().chain(std::iter::once(&Field::LineItem)) {
            let t = self.thresholds.for_field(*field);
            if !(t.auto > t.review) || t.review < 0.0 || t.auto > 100.0 {
                return Err(ScanError::Config(format!(
                    "{} thresholds must satisfy 0 <= review < auto <= 100 (got auto={}, review={})",
                    field, t.auto, t.review
                )));
            }
        }
        if self.line_items.row_tolerance < 0.0 {
            return Err(ScanError::Config("line_items.row_tolerance must not be negative".into()));
        }
        if self.amounts.min_total > self.amounts.max_total {
            return Err(ScanError::Config("amounts.min_total exceeds amounts.max_total".into()));
        }
        if !(0.0..=1.0).contains(&self.tax_ids.supplier_position_cutoff) {
            return Err(ScanError::Config("tax_ids.supplier_position_cutoff must be within [0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.scoring.top_region) || !(0.0..=1.0).contains(&self.scoring.total_bottom_region) {
            return Err(ScanError::Config(
                "scoring.top_region and scoring.total_bottom_region must be within [0, 1]".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.scoring.tie_break_margin) {
            return Err(ScanError::Config("scoring.tie_break_margin must be within [0, 1)".into()));
        }
        if self.scoring.confidence_divisor <= 0.0 {
            return Err(ScanError::Config("scoring.confidence_divisor must be positive".into()));
        }
        Ok(())
    }
}

/// Auto/review thresholds per field family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldThresholds {
    pub invoice_number: Thresholds,
    pub invoice_date: Thresholds,
    pub tax_id: Thresholds,
    pub total_amount: Thresholds,
    pub line_item: Thresholds,
}

impl Default for FieldThresholds {
    fn default() -> Self {
        Self {
            invoice_number: Thresholds::new(65.0, 45.0),
            invoice_date: Thresholds::new(65.0, 45.0),
            tax_id: Thresholds::new(65.0, 45.0),
            total_amount: Thresholds::new(60.0, 40.0),
            line_item: Thresholds::new(60.0, 30.0),
        }
    }
}

impl FieldThresholds {
    pub fn for_field(&self, field: Field) -> Thresholds {
        match field {
            Field::InvoiceNumber => self.invoice_number,
            Field::InvoiceDate => self.invoice_date,
            Field::SupplierTaxId | Field::BuyerTaxId => self.tax_id,
            Field::TotalAmount => self.total_amount,
            Field::LineItem => self.line_item,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub form_key_value_base: f64,
    pub table_cell_base: f64,
    pub plain_line_base: f64,
    /// OCR confidence is divided by this, then capped at `confidence_cap`.
    pub confidence_divisor: f64,
    pub confidence_cap: f64,

    pub label_origin: f64,
    pub follows_label_origin: f64,
    pub shape_origin: f64,
    pub cached_origin: f64,
    pub keyword_origin: f64,
    pub position_origin: f64,

    pub keyword_bonus: f64,
    /// Keyword search window (lines either side) for invoice numbers.
    pub invoice_number_window: usize,
    /// Keyword search window for every other field.
    pub default_window: usize,

    /// Fraction of the document counted as "top".
    pub top_region: f64,
    pub top_bonus: f64,
    pub bottom_penalty: f64,
    /// Totals at or below this fraction of the page get `total_bottom_bonus`.
    pub total_bottom_region: f64,
    pub total_bottom_bonus: f64,
    pub total_top_penalty: f64,
    pub total_strong_keyword: f64,
    pub total_weak_keyword: f64,
    pub total_context_keyword: f64,
    pub total_negative_penalty: f64,
    pub item_consistency_bonus: f64,
    pub item_short_description_penalty: f64,

    /// Candidates within this relative margin of the best score go to the tie-break.
    pub tie_break_margin: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            form_key_value_base: 45.0,
            table_cell_base: 35.0,
            plain_line_base: 30.0,
            confidence_divisor: 5.0,
            confidence_cap: 20.0,
            label_origin: 15.0,
            follows_label_origin: 10.0,
            shape_origin: 0.0,
            cached_origin: 20.0,
            keyword_origin: 15.0,
            position_origin: 5.0,
            keyword_bonus: 20.0,
            invoice_number_window: 2,
            default_window: 1,
            top_region: 0.3,
            top_bonus: 10.0,
            bottom_penalty: 10.0,
            total_bottom_region: 2.0 / 3.0,
            total_bottom_bonus: 15.0,
            total_top_penalty: 10.0,
            total_strong_keyword: 30.0,
            total_weak_keyword: 15.0,
            total_context_keyword: 10.0,
            total_negative_penalty: 25.0,
            item_consistency_bonus: 15.0,
            item_short_description_penalty: 10.0,
            tie_break_margin: 0.05,
        }
    }
}

impl ScoringWeights {
    pub fn window_for(&self, field: Field) -> usize {
        match field {
            Field::InvoiceNumber => self.invoice_number_window,
            _ => self.default_window,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Checked in order; longer labels must precede their prefixes.
    pub invoice_number_labels: Vec<String>,
    pub invoice_noise_tokens: Vec<String>,
    pub date_labels: Vec<String>,
    pub date_excluded_labels: Vec<String>,
    pub tax_id_labels: Vec<String>,
    pub buyer_keywords: Vec<String>,
    pub supplier_keywords: Vec<String>,
    pub total_strong: Vec<String>,
    pub total_weak: Vec<String>,
    pub total_negative: Vec<String>,
    pub table_header: Vec<String>,
    pub table_footer: Vec<String>,
    pub party_noise: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            invoice_number_labels: strings(&[
                "tax invoice no",
                "tax invoice number",
                "invoice number",
                "invoice no",
                "invoice #",
                "invoice#",
                "inv. no",
                "inv no",
                "inv#",
                "bill number",
                "bill no",
                "bill#",
                "document no",
                "doc no",
                "voucher number",
                "voucher no",
                "receipt no",
                "invoice ref",
                "tax invoice",
            ]),
            invoice_noise_tokens: strings(&[
                "invoice", "tax invoice", "signature", "authorised", "authorized", "gst invoice",
                "bill", "total", "subtotal", "grand total", "page", "copy", "original",
                "duplicate", "triplicate", "no", "number", "date", "gstin", "n/a", "na",
            ]),
            date_labels: strings(&["date", "dated", "dt"]),
            date_excluded_labels: strings(&["due date", "due on", "expiry date", "valid till", "valid upto"]),
            tax_id_labels: strings(&["gstin", "gstin/uin", "gst no", "gst number", "gst in", "gst"]),
            buyer_keywords: strings(&[
                "buyer", "bill to", "billed to", "ship to", "shipped to", "consignee", "customer",
                "recipient",
            ]),
            supplier_keywords: strings(&["supplier", "seller", "from", "sold by", "vendor", "consignor"]),
            total_strong: strings(&[
                "grand total",
                "net payable",
                "total payable",
                "amount payable",
                "total amount",
                "invoice total",
                "balance due",
            ]),
            total_weak: strings(&["total", "payable", "net amount", "amount due", "sum total"]),
            total_negative: strings(&[
                "subtotal", "sub total", "sub-total", "cgst", "sgst", "igst", "gst", "tax",
                "discount", "advance", "rate", "price", "unit price", "taxable value", "round off",
            ]),
            table_header: strings(&[
                "description", "particulars", "item", "items", "product", "qty", "quantity",
                "rate", "price", "amount", "hsn", "hsn/sac", "uom",
            ]),
            table_footer: strings(&[
                "total", "sub total", "subtotal", "grand total", "amount in words", "bank details",
                "bank", "taxable value", "cgst", "sgst", "igst", "round off",
            ]),
            party_noise: strings(&[
                "invoice", "tax", "gst", "gstin", "date", "original", "duplicate", "bill to",
                "buyer", "consignee", "ship to", "copy", "page", "phone", "email",
            ]),
        }
    }
}

/// Plausibility bounds for total-amount literals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountBounds {
    pub min_total: f64,
    pub max_total: f64,
}

impl Default for AmountBounds {
    fn default() -> Self {
        Self {
            min_total: 10.0,
            max_total: 100_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineItemConfig {
    /// Lines whose vertical positions differ by at most this much share a row.
    pub row_tolerance: f64,
    /// Minimum distinct header keywords for a row to open the item table.
    pub min_header_keywords: usize,
}

impl Default for LineItemConfig {
    fn default() -> Self {
        Self {
            row_tolerance: 0.01,
            min_header_keywords: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxIdConfig {
    /// Matches above this fraction of the document (by line index) lean supplier-side.
    pub supplier_position_cutoff: f64,
    /// How many top lines the supplier-name heuristic looks at.
    pub supplier_name_lines: usize,
    /// How many lines after a buyer keyword the buyer-name heuristic looks at.
    pub buyer_name_lines: usize,
}

impl Default for TaxIdConfig {
    fn default() -> Self {
        Self {
            supplier_position_cutoff: 0.4,
            supplier_name_lines: 7,
            buyer_name_lines: 4,
        }
    }
}

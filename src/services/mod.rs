//! Candidate generators, one per field family.
//!
//! Every generator is a pure function of the [`LineIndex`]: no side effects, and
//! calling it twice yields the same candidates in the same order. Blank lines are
//! never candidate sources.

pub mod invoice_date;
pub mod invoice_number;
pub mod line_items;
pub mod party_names;
pub mod tax_id;
pub mod total_amount;

use crate::ocr::LineIndex;
use crate::types::Candidate;

pub use invoice_date::InvoiceDateGenerator;
pub use invoice_number::InvoiceNumberGenerator;
pub use line_items::LineItemGenerator;
pub use party_names::extract_party_names;
pub use tax_id::TaxIdGenerator;
pub use total_amount::TotalAmountGenerator;

pub trait CandidateGenerator {
    fn generate(&self, index: &LineIndex) -> Vec<Candidate>;
}

/// Split on whitespace and strip surrounding punctuation, keeping internal `/`, `-` and `.`.
pub(crate) fn clean_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
}

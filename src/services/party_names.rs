//! Supplier and buyer display names. Best effort: nothing here affects a record's status.

use crate::config::{KeywordConfig, TaxIdConfig};
use crate::ocr::LineIndex;
use crate::patterns;
use crate::types::PartyNames;

fn clean_name(raw: &str) -> Option<String> {
    let name = raw
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | ',' | '|' | '.'))
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let letters = name.chars().filter(|c| c.is_alphabetic()).count();
    (letters >= 3).then_some(name)
}

fn is_noise(text: &str, keywords: &KeywordConfig) -> bool {
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    patterns::contains_any_keyword(text, &keywords.party_noise)
        || patterns::contains_gstin(text)
        || patterns::is_date_shaped(text)
        || !patterns::find_amounts(text).is_empty()
        || digits * 2 > text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Text after the first of `role_keywords` on the line, if it reads like a name.
fn name_after_keyword(text: &str, role_keywords: &[String], keywords: &KeywordConfig) -> Option<String> {
    let end = role_keywords
        .iter()
        .find_map(|k| patterns::find_keyword(text, k).map(|(_, end)| end))?;
    let rest = &text[end..];
    // Stop before a GSTIN (or its label) printed on the same line.
    let cut = keywords
        .tax_id_labels
        .iter()
        .filter_map(|k| patterns::find_keyword(rest, k).map(|(start, _)| start))
        .chain(patterns::find_gstin_spans(rest).first().map(|m| m.start))
        .min()
        .unwrap_or(rest.len());
    clean_name(&rest[..cut])
}

fn supplier_name(index: &LineIndex, keywords: &KeywordConfig, settings: &TaxIdConfig) -> Option<String> {
    let explicit = index
        .candidate_lines()
        .find_map(|(_, l)| name_after_keyword(&l.text, &keywords.supplier_keywords, keywords));
    explicit.or_else(|| {
        index
            .candidate_lines()
            .take(settings.supplier_name_lines)
            .filter(|(_, l)| !is_noise(&l.text, keywords))
            .find_map(|(_, l)| clean_name(&l.text))
    })
}

fn buyer_name(index: &LineIndex, keywords: &KeywordConfig, settings: &TaxIdConfig) -> Option<String> {
    let (idx, line) = index
        .candidate_lines()
        .find(|(_, l)| patterns::contains_any_keyword(&l.text, &keywords.buyer_keywords))?;
    if let Some(name) = name_after_keyword(&line.text, &keywords.buyer_keywords, keywords).filter(|n| !is_noise(n, keywords)) {
        return Some(name);
    }
    index
        .candidate_lines()
        .skip_while(|(i, _)| *i <= idx)
        .take(settings.buyer_name_lines)
        .filter(|(_, l)| !is_noise(&l.text, keywords))
        .find_map(|(_, l)| clean_name(&l.text))
}

pub fn extract_party_names(index: &LineIndex, keywords: &KeywordConfig, settings: &TaxIdConfig) -> PartyNames {
    let supplier = supplier_name(index, keywords, settings);
    let buyer = buyer_name(index, keywords, settings).filter(|b| supplier.as_deref() != Some(b.as_str()));
    PartyNames { supplier, buyer }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::RawOcrLine;

    fn names(lines: &[&str]) -> PartyNames {
        let raw = lines
            .iter()
            .enumerate()
            .map(|(i, t)| RawOcrLine::new(*t, i as f64 / 20.0, 90.0))
            .collect();
        extract_party_names(&LineIndex::build(raw), &KeywordConfig::default(), &TaxIdConfig::default())
    }

    #[test]
    fn supplier_from_letterhead_and_buyer_after_bill_to() {
        let got = names(&[
            "TAX INVOICE",
            "Acme Traders Pvt Ltd",
            "GSTIN: 27AAPFU0939F1ZV",
            "Bill To:",
            "Beta Stores",
            "Pune 411001",
        ]);
        assert_eq!(got.supplier.as_deref(), Some("Acme Traders Pvt Ltd"));
        assert_eq!(got.buyer.as_deref(), Some("Beta Stores"));
    }

    #[test]
    fn explicit_labels_take_the_rest_of_the_line() {
        let got = names(&["Seller: Kiran Steels GSTIN 27AAPFU0939F1ZV", "Buyer: Om Hardware"]);
        assert_eq!(got.supplier.as_deref(), Some("Kiran Steels"));
        assert_eq!(got.buyer.as_deref(), Some("Om Hardware"));
    }

    #[test]
    fn empty_document_has_no_names() {
        assert_eq!(names(&[]), PartyNames::default());
    }
}

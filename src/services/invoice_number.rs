use super::{clean_tokens, CandidateGenerator};
use crate::config::KeywordConfig;
use crate::ocr::LineIndex;
use crate::patterns;
use crate::types::{Candidate, Field, MatchOrigin};
use regex::Regex;
use std::sync::OnceLock;

fn code_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Z]{1,5}[-/]?\d{1,8}(?:[-/][A-Z0-9]{1,8})*|\d{3,10})$").expect("static pattern compiles")
    })
}

/// Tokens looked at after a label before giving up.
const LABEL_LOOKAHEAD: usize = 3;

pub struct InvoiceNumberGenerator<'a> {
    keywords: &'a KeywordConfig,
}

impl<'a> InvoiceNumberGenerator<'a> {
    pub fn new(keywords: &'a KeywordConfig) -> Self {
        Self { keywords }
    }

    fn is_noise(&self, token: &str) -> bool {
        self.keywords
            .invoice_noise_tokens
            .iter()
            .any(|n| n.eq_ignore_ascii_case(token))
    }

    /// Values that look like something else are dropped here, before scoring.
    fn acceptable(&self, token: &str) -> bool {
        let len = token.chars().count();
        (3..=50).contains(&len)
            && token.chars().any(|c| c.is_ascii_digit())
            && !self.is_noise(token)
            && !patterns::is_date_shaped(token)
            && !patterns::contains_gstin(token)
            && !patterns::is_amount_shaped(token)
            && !patterns::is_vehicle_shaped(token)
    }

    /// End offset of the first configured label on the line.
    fn label_end(&self, text: &str) -> Option<usize> {
        self.keywords
            .invoice_number_labels
            .iter()
            .find_map(|label| patterns::find_keyword(text, label).map(|(_, end)| end))
    }

    fn first_acceptable<'t>(&self, text: &'t str) -> Option<&'t str> {
        clean_tokens(text)
            .take(LABEL_LOOKAHEAD)
            .find(|t| self.acceptable(t))
    }

    fn label_pass(&self, index: &LineIndex, out: &mut Vec<Candidate>) {
        for (idx, line) in index.candidate_lines() {
            let Some(end) = self.label_end(&line.text) else {
                continue;
            };
            if let Some(value) = self.first_acceptable(&line.text[end..]) {
                out.push(Candidate::text(Field::InvoiceNumber, value, idx, MatchOrigin::Label));
                continue;
            }
            // Label with its value on the next line ("Invoice No." / "INV-77").
            if line.text[end..].trim_matches(|c: char| !c.is_alphanumeric()).is_empty() {
                if let Some((next_idx, next)) = index.next_text_line(idx) {
                    if self.label_end(&next.text).is_none() {
                        if let Some(value) = self.first_acceptable(&next.text) {
                            out.push(Candidate::text(
                                Field::InvoiceNumber,
                                value,
                                next_idx,
                                MatchOrigin::FollowsLabel,
                            ));
                        }
                    }
                }
            }
        }
    }

    fn shape_pass(&self, index: &LineIndex, out: &mut Vec<Candidate>) {
        for (idx, line) in index.candidate_lines() {
            if !patterns::find_amounts(&line.text).is_empty()
                || patterns::contains_any_keyword(&line.text, &self.keywords.total_weak)
            {
                continue;
            }
            for token in clean_tokens(&line.text) {
                let upper = token.to_ascii_uppercase();
                if !code_shape_re().is_match(&upper)
                    || patterns::is_phone_number(token)
                    || patterns::is_pincode(token)
                    || !self.acceptable(token)
                {
                    continue;
                }
                let seen = out
                    .iter()
                    .any(|c| c.source_line == idx && c.value.as_text() == Some(token));
                if !seen {
                    out.push(Candidate::text(Field::InvoiceNumber, token, idx, MatchOrigin::Shape));
                }
            }
        }
    }
}

impl CandidateGenerator for InvoiceNumberGenerator<'_> {
    fn generate(&self, index: &LineIndex) -> Vec<Candidate> {
        let mut out = Vec::new();
        self.label_pass(index, &mut out);
        self.shape_pass(index, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::RawOcrLine;

    fn generate(lines: &[&str]) -> Vec<Candidate> {
        let raw = lines
            .iter()
            .enumerate()
            .map(|(i, t)| RawOcrLine::new(*t, i as f64 / 10.0, 90.0))
            .collect();
        let keywords = KeywordConfig::default();
        InvoiceNumberGenerator::new(&keywords).generate(&LineIndex::build(raw))
    }

    fn values(cands: &[Candidate]) -> Vec<(&str, MatchOrigin)> {
        cands.iter().map(|c| (c.value.as_text().unwrap(), c.origin)).collect()
    }

    #[test]
    fn label_on_the_same_line() {
        let c = generate(&["Invoice No: INV/2024/00123"]);
        assert_eq!(values(&c), vec![("INV/2024/00123", MatchOrigin::Label)]);
    }

    #[test]
    fn most_specific_label_wins() {
        let c = generate(&["Tax Invoice No. : GST-118"]);
        assert_eq!(values(&c), vec![("GST-118", MatchOrigin::Label)]);
    }

    #[test]
    fn value_on_the_following_line() {
        let c = generate(&["Bill No.", "", "A/552"]);
        assert_eq!(c[0].origin, MatchOrigin::FollowsLabel);
        assert_eq!(c[0].source_line, 2);
        assert_eq!(c[0].value.as_text(), Some("A/552"));
    }

    #[test]
    fn shaped_impostors_are_never_emitted() {
        assert!(generate(&["GSTIN: 27AAPFU0939F1ZV"]).is_empty());
        assert!(generate(&["Invoice No: 31/03/2024"]).is_empty());
        assert!(generate(&["Invoice No: MH12AB1234"]).is_empty());
        assert!(generate(&["Invoice No: Signature"]).is_empty());
    }

    #[test]
    fn shape_fallback_skips_phones_pincodes_and_amount_lines() {
        let c = generate(&["Ph 9876543210 Pin 411001", "Ref INV-889", "Total 1200.00 1200"]);
        assert_eq!(values(&c), vec![("INV-889", MatchOrigin::Shape)]);
    }

    #[test]
    fn generation_is_idempotent() {
        let lines = ["Invoice No: INV-9", "Order 4410"];
        assert_eq!(generate(&lines), generate(&lines));
    }
}

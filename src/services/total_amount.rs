use super::CandidateGenerator;
use crate::config::{AmountBounds, KeywordConfig};
use crate::ocr::LineIndex;
use crate::patterns;
use crate::types::{Candidate, CandidateValue, Field, MatchOrigin};

/// Every plausible currency literal is a total candidate; the scorer sorts out
/// which one is the grand total.
pub struct TotalAmountGenerator<'a> {
    keywords: &'a KeywordConfig,
    bounds: &'a AmountBounds,
}

impl<'a> TotalAmountGenerator<'a> {
    pub fn new(keywords: &'a KeywordConfig, bounds: &'a AmountBounds) -> Self {
        Self { keywords, bounds }
    }

    fn is_total_line(&self, text: &str) -> bool {
        patterns::contains_any_keyword(text, &self.keywords.total_strong)
            || patterns::contains_any_keyword(text, &self.keywords.total_weak)
    }
}

impl CandidateGenerator for TotalAmountGenerator<'_> {
    fn generate(&self, index: &LineIndex) -> Vec<Candidate> {
        let mut out = Vec::new();
        for (idx, line) in index.candidate_lines() {
            let origin = if self.is_total_line(&line.text) {
                MatchOrigin::Label
            } else {
                MatchOrigin::Shape
            };
            for literal in patterns::find_amounts(&line.text) {
                if literal.value < self.bounds.min_total || literal.value > self.bounds.max_total {
                    log::debug!("line {}: {} outside plausible total range", idx, literal.raw);
                    continue;
                }
                out.push(Candidate::new(
                    Field::TotalAmount,
                    CandidateValue::Amount(literal.value),
                    literal.raw,
                    idx,
                    origin,
                ));
            }
        }
        out
    }
}

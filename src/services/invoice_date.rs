use super::CandidateGenerator;
use crate::config::KeywordConfig;
use crate::ocr::LineIndex;
use crate::patterns;
use crate::types::{Candidate, CandidateValue, Field, MatchOrigin};

pub struct InvoiceDateGenerator<'a> {
    keywords: &'a KeywordConfig,
}

impl<'a> InvoiceDateGenerator<'a> {
    pub fn new(keywords: &'a KeywordConfig) -> Self {
        Self { keywords }
    }

    /// "Date" / "Dated" count; "Due Date" does not.
    pub fn is_label_line(&self, text: &str) -> bool {
        patterns::contains_any_keyword(text, &self.keywords.date_labels)
            && !patterns::contains_any_keyword(text, &self.keywords.date_excluded_labels)
    }
}

impl CandidateGenerator for InvoiceDateGenerator<'_> {
    fn generate(&self, index: &LineIndex) -> Vec<Candidate> {
        let mut out = Vec::new();
        for (idx, line) in index.candidate_lines() {
            let matches = patterns::find_dates(&line.text);
            if matches.is_empty() {
                continue;
            }
            let labelled = if self.is_label_line(&line.text) {
                Some(MatchOrigin::Label)
            } else {
                index
                    .previous_text_line(idx)
                    .filter(|(_, prev)| self.is_label_line(&prev.text) && patterns::find_dates(&prev.text).is_empty())
                    .map(|_| MatchOrigin::FollowsLabel)
            };

            for m in matches {
                let Some(date) = m.date else {
                    log::debug!("line {}: '{}' is not a calendar date", idx, m.text);
                    continue;
                };
                let value = CandidateValue::Text(date.format("%Y-%m-%d").to_string());
                if let Some(origin) = labelled {
                    out.push(Candidate::new(Field::InvoiceDate, value.clone(), m.text.as_str(), idx, origin));
                }
                // Every literal is also a low-weight fallback.
                out.push(Candidate::new(Field::InvoiceDate, value, m.text.as_str(), idx, MatchOrigin::Shape));
            }
        }
        out
    }
}

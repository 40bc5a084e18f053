//! Plausibility scoring for candidates.
//!
//! A score is the sum of a provenance base weight, a capped OCR-confidence share,
//! an origin weight, keyword proximity and field-specific position signals,
//! clamped to `[0, 100]`. Candidates whose value has the shape of a different
//! field are hard-rejected: score 0 plus a [`RejectionReason`].

use crate::config::{ExtractionConfig, KeywordConfig, ScoringWeights};
use crate::ocr::LineIndex;
use crate::patterns;
use crate::types::{Candidate, CandidateValue, Field, MatchOrigin, Provenance, RejectionReason};
use std::cmp::Ordering;

pub const MAX_SCORE: f64 = 100.0;

pub struct Scorer<'a> {
    weights: &'a ScoringWeights,
    keywords: &'a KeywordConfig,
}

impl<'a> Scorer<'a> {
    pub fn new(config: &'a ExtractionConfig) -> Self {
        Self {
            weights: &config.scoring,
            keywords: &config.keywords,
        }
    }

    /// Why `candidate` must not be promoted, if its value looks like another field.
    pub fn hard_filter(&self, candidate: &Candidate) -> Option<RejectionReason> {
        let raw = candidate.raw.trim();
        match (&candidate.field, &candidate.value) {
            (Field::InvoiceNumber, value) => {
                let text = value.as_text().unwrap_or(raw);
                if patterns::is_date_shaped(text) {
                    Some(RejectionReason::DateShape)
                } else if patterns::contains_gstin(text) {
                    Some(RejectionReason::TaxIdShape)
                } else if patterns::is_amount_shaped(text) {
                    Some(RejectionReason::CurrencyShape)
                } else if patterns::is_vehicle_shaped(text) {
                    Some(RejectionReason::VehicleShape)
                } else {
                    None
                }
            }
            (Field::InvoiceDate, _) => {
                if patterns::contains_gstin(raw) {
                    Some(RejectionReason::TaxIdShape)
                } else if patterns::is_amount_shaped(raw) {
                    Some(RejectionReason::CurrencyShape)
                } else if patterns::is_vehicle_shaped(raw) {
                    Some(RejectionReason::VehicleShape)
                } else {
                    None
                }
            }
            (Field::SupplierTaxId | Field::BuyerTaxId, value) => {
                let text = value.as_text().unwrap_or(raw);
                if patterns::is_date_shaped(text) {
                    Some(RejectionReason::DateShape)
                } else if patterns::is_amount_shaped(text) {
                    Some(RejectionReason::CurrencyShape)
                } else if patterns::is_vehicle_shaped(text) {
                    Some(RejectionReason::VehicleShape)
                } else if !patterns::is_gstin(text) {
                    Some(RejectionReason::TaxIdShape)
                } else {
                    None
                }
            }
            (Field::TotalAmount, value) => {
                if patterns::is_date_shaped(raw) {
                    Some(RejectionReason::DateShape)
                } else if patterns::contains_gstin(raw) {
                    Some(RejectionReason::TaxIdShape)
                } else if patterns::is_vehicle_shaped(raw) {
                    Some(RejectionReason::VehicleShape)
                } else if !matches!(value, CandidateValue::Amount(_)) {
                    Some(RejectionReason::NotAnAmount)
                } else {
                    None
                }
            }
            (Field::LineItem, value) => {
                let description = value.as_item().map_or(raw, |i| i.description.as_str());
                if patterns::contains_gstin(description) {
                    Some(RejectionReason::TaxIdShape)
                } else if patterns::is_date_shaped(description) {
                    Some(RejectionReason::DateShape)
                } else {
                    None
                }
            }
        }
    }

    /// Score one candidate against the lines it came from. Rejected candidates score 0.
    pub fn score(&self, candidate: &Candidate, index: &LineIndex) -> f64 {
        if self.hard_filter(candidate).is_some() {
            return 0.0;
        }
        let Some(line) = index.get(candidate.source_line) else {
            return 0.0;
        };
        let w = self.weights;

        let mut score = match line.provenance {
            Provenance::FormKeyValue => w.form_key_value_base,
            Provenance::TableCell => w.table_cell_base,
            Provenance::PlainLine => w.plain_line_base,
        };
        score += (line.confidence / w.confidence_divisor).min(w.confidence_cap);
        score += match candidate.origin {
            MatchOrigin::Label => w.label_origin,
            MatchOrigin::FollowsLabel => w.follows_label_origin,
            MatchOrigin::Shape => w.shape_origin,
            MatchOrigin::Cached => w.cached_origin,
            MatchOrigin::Keyword => w.keyword_origin,
            MatchOrigin::Position => w.position_origin,
        };
        if self.label_nearby(candidate, index) {
            score += w.keyword_bonus;
        }
        score += self.position_signal(candidate.field, line.vertical_position);

        match candidate.field {
            Field::TotalAmount => score += self.total_context(candidate.source_line, index),
            Field::LineItem => {
                if let Some(item) = candidate.value.as_item() {
                    if let (Some(q), Some(r)) = (item.quantity, item.unit_rate) {
                        let expected = q * r;
                        if expected > 0.0 && ((expected - item.amount).abs() / item.amount.max(0.01)) <= 0.01 {
                            score += w.item_consistency_bonus;
                        }
                    }
                    if item.description.chars().filter(|c| c.is_alphabetic()).count() < 3 {
                        score -= w.item_short_description_penalty;
                    }
                }
            }
            _ => {}
        }

        let clamped = score.clamp(0.0, MAX_SCORE);
        (clamped * 10.0).round() / 10.0
    }

    /// Score every candidate in place, recording rejections.
    pub fn score_all(&self, candidates: &mut [Candidate], index: &LineIndex) {
        for candidate in candidates.iter_mut() {
            candidate.rejection_reason = self.hard_filter(candidate);
            candidate.score = self.score(candidate, index);
            match candidate.rejection_reason {
                Some(reason) => log::debug!(
                    "{} '{}' (line {}) rejected: {}",
                    candidate.field,
                    candidate.raw,
                    candidate.source_line,
                    reason
                ),
                None => log::debug!(
                    "{} '{}' (line {}) scored {:.1}",
                    candidate.field,
                    candidate.raw,
                    candidate.source_line,
                    candidate.score
                ),
            }
        }
    }

    fn field_labels(&self, field: Field) -> &[String] {
        match field {
            Field::InvoiceNumber => self.keywords.invoice_number_labels.as_slice(),
            Field::InvoiceDate => self.keywords.date_labels.as_slice(),
            Field::SupplierTaxId | Field::BuyerTaxId => self.keywords.tax_id_labels.as_slice(),
            // Totals weigh their own keywords; items have no label.
            Field::TotalAmount | Field::LineItem => &[],
        }
    }

    fn label_nearby(&self, candidate: &Candidate, index: &LineIndex) -> bool {
        let labels = self.field_labels(candidate.field);
        if labels.is_empty() {
            return false;
        }
        index
            .window(candidate.source_line, self.weights.window_for(candidate.field))
            .filter_map(|i| index.get(i))
            .any(|l| {
                patterns::contains_any_keyword(&l.text, labels)
                    && !(candidate.field == Field::InvoiceDate
                        && patterns::contains_any_keyword(&l.text, &self.keywords.date_excluded_labels))
            })
    }

    fn position_signal(&self, field: Field, y: f64) -> f64 {
        let w = self.weights;
        let top = y < w.top_region;
        match field {
            Field::InvoiceNumber if top => w.top_bonus,
            Field::InvoiceNumber if y > 1.0 - w.top_region => -w.bottom_penalty,
            Field::InvoiceDate | Field::SupplierTaxId if top => w.top_bonus,
            Field::TotalAmount if y >= w.total_bottom_region => w.total_bottom_bonus,
            Field::TotalAmount if top => -w.total_top_penalty,
            _ => 0.0,
        }
    }

    /// "Grand total" outranks "total"; subtotal, tax and rate lines are penalised but not rejected.
    fn total_context(&self, line_idx: usize, index: &LineIndex) -> f64 {
        let w = self.weights;
        let k = self.keywords;
        let Some(line) = index.get(line_idx) else {
            return 0.0;
        };
        let strong = patterns::contains_any_keyword(&line.text, &k.total_strong);
        let mut bonus = if strong {
            w.total_strong_keyword
        } else if patterns::contains_any_keyword(&line.text, &k.total_weak) {
            w.total_weak_keyword
        } else if index
            .window(line_idx, w.default_window)
            .filter(|i| *i != line_idx)
            .filter_map(|i| index.get(i))
            .any(|l| {
                patterns::contains_any_keyword(&l.text, &k.total_strong)
                    || patterns::contains_any_keyword(&l.text, &k.total_weak)
            })
        {
            w.total_context_keyword
        } else {
            0.0
        };
        if !strong && patterns::contains_any_keyword(&line.text, &k.total_negative) {
            bonus -= w.total_negative_penalty;
        }
        bonus
    }
}

/// Pick the winner among scored, non-rejected candidates. Candidates within
/// `margin` (relative) of the top score are tied; ties go to the shortest value
/// for invoice numbers, the largest value for amounts and the earliest line
/// otherwise. Fully equal candidates keep generation order.
pub fn select_best(candidates: &[Candidate], margin: f64) -> Option<usize> {
    let top = candidates
        .iter()
        .filter(|c| !c.is_rejected())
        .map(|c| c.score)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))?;
    let floor = top * (1.0 - margin);

    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_rejected() && c.score >= floor)
        .min_by(|(ia, a), (ib, b)| tie_break(a, b).then(ia.cmp(ib)))
        .map(|(i, _)| i)
}

fn tie_break(a: &Candidate, b: &Candidate) -> Ordering {
    let preferred = match a.field {
        Field::InvoiceNumber => a.value.text_len().cmp(&b.value.text_len()),
        Field::TotalAmount => {
            let av = a.value.as_amount().unwrap_or(0.0);
            let bv = b.value.as_amount().unwrap_or(0.0);
            bv.total_cmp(&av)
        }
        _ => Ordering::Equal,
    };
    preferred.then(a.source_line.cmp(&b.source_line))
}

use crate::scoring::select_best;
use crate::types::{Candidate, Field, LineItem, ResolvedField, Status};
use serde::{Deserialize, Serialize};

/// Two-threshold classification shared by every field family. `auto > review`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub auto: f64,
    pub review: f64,
}

impl Thresholds {
    pub const fn new(auto: f64, review: f64) -> Self {
        Self { auto, review }
    }

    pub fn classify(&self, score: f64) -> Status {
        if score >= self.auto {
            Status::Auto
        } else if score >= self.review {
            Status::Review
        } else {
            Status::Except
        }
    }
}

/// A resolved field plus every candidate that did not win, rejected ones included.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldResolution {
    pub resolved: ResolvedField,
    pub trail: Vec<Candidate>,
}

/// Resolve one scalar field from its scored candidates.
///
/// The value is the tie-break winner; the recorded score (and therefore the status)
/// is the top surviving score, so raising any candidate's score can only improve
/// the status.
pub fn resolve_field(field: Field, candidates: Vec<Candidate>, thresholds: Thresholds, margin: f64) -> FieldResolution {
    let candidates: Vec<Candidate> = candidates.into_iter().filter(|c| c.field == field).collect();
    let Some(winner) = select_best(&candidates, margin) else {
        return FieldResolution {
            resolved: ResolvedField::missing(field),
            trail: candidates,
        };
    };

    let top = candidates
        .iter()
        .filter(|c| !c.is_rejected())
        .map(|c| c.score)
        .fold(0.0_f64, f64::max);
    let mut trail = candidates;
    let chosen = trail.remove(winner);
    let status = thresholds.classify(top);
    log::debug!("{}: '{}' score {:.1} -> {}", field, chosen.raw, top, status);

    FieldResolution {
        resolved: ResolvedField {
            field,
            value: Some(chosen.value),
            status,
            score: top,
        },
        trail,
    }
}

/// Keep non-rejected items that reach the review threshold, in row order.
pub fn resolve_line_items(candidates: Vec<Candidate>, thresholds: Thresholds) -> (Vec<LineItem>, Vec<Candidate>) {
    let mut kept: Vec<(usize, LineItem)> = Vec::new();
    let mut trail = Vec::new();
    for candidate in candidates.into_iter().filter(|c| c.field == Field::LineItem) {
        let accepted = !candidate.is_rejected() && thresholds.classify(candidate.score) != Status::Except;
        if accepted {
            if let Some(item) = candidate.value.as_item() {
                kept.push((candidate.source_line, item.clone()));
                continue;
            }
        }
        trail.push(candidate);
    }
    kept.sort_by_key(|(line, _)| *line);
    (kept.into_iter().map(|(_, item)| item).collect(), trail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateValue, MatchOrigin, RejectionReason};

    fn scored(value: &str, line: usize, score: f64) -> Candidate {
        let mut c = Candidate::text(Field::InvoiceNumber, value, line, MatchOrigin::Label);
        c.score = score;
        c
    }

    #[test]
    fn classify_boundaries() {
        let t = Thresholds::new(65.0, 45.0);
        assert_eq!(t.classify(65.0), Status::Auto);
        assert_eq!(t.classify(64.9), Status::Review);
        assert_eq!(t.classify(45.0), Status::Review);
        assert_eq!(t.classify(44.9), Status::Except);
    }

    #[test]
    fn no_candidates_is_except_with_null_value() {
        let r = resolve_field(Field::InvoiceNumber, vec![], Thresholds::new(65.0, 45.0), 0.05);
        assert_eq!(r.resolved, ResolvedField::missing(Field::InvoiceNumber));
    }

    #[test]
    fn only_rejected_candidates_is_except() {
        let mut c = scored("31/03/2024", 0, 0.0);
        c.rejection_reason = Some(RejectionReason::DateShape);
        let r = resolve_field(Field::InvoiceNumber, vec![c], Thresholds::new(65.0, 45.0), 0.05);
        assert_eq!(r.resolved.status, Status::Except);
        assert!(r.resolved.value.is_none());
        assert_eq!(r.trail.len(), 1);
    }

    #[test]
    fn winner_leaves_the_rest_in_the_trail() {
        let r = resolve_field(
            Field::InvoiceNumber,
            vec![scored("INV-1", 0, 90.0), scored("4410", 5, 40.0)],
            Thresholds::new(65.0, 45.0),
            0.05,
        );
        assert_eq!(r.resolved.text(), Some("INV-1"));
        assert_eq!(r.resolved.status, Status::Auto);
        assert_eq!(r.trail.len(), 1);
    }

    #[test]
    fn resolution_is_repeatable() {
        let cands = vec![scored("A-100", 0, 70.0), scored("B-2", 1, 69.0)];
        let t = Thresholds::new(65.0, 45.0);
        assert_eq!(
            resolve_field(Field::InvoiceNumber, cands.clone(), t, 0.05),
            resolve_field(Field::InvoiceNumber, cands, t, 0.05)
        );
    }

    #[test]
    fn weak_items_are_dropped_and_order_follows_rows() {
        let item = |name: &str, line: usize, score: f64| {
            let mut c = Candidate::new(
                Field::LineItem,
                CandidateValue::Item(LineItem {
                    description: name.into(),
                    quantity: None,
                    unit_rate: None,
                    tax_rate: None,
                    amount: 10.0,
                }),
                name,
                line,
                MatchOrigin::Shape,
            );
            c.score = score;
            c
        };
        let (items, trail) = resolve_line_items(
            vec![item("B", 4, 70.0), item("A", 2, 50.0), item("C", 6, 20.0)],
            Thresholds::new(65.0, 45.0),
        );
        let names: Vec<&str> = items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(trail.len(), 1);
    }
}

use super::CandidateGenerator;
use crate::cache::{PartyRole, VendorRoleCache};
use crate::config::{KeywordConfig, TaxIdConfig};
use crate::ocr::LineIndex;
use crate::patterns;
use crate::types::{Candidate, Field, MatchOrigin};

/// One distinct GSTIN on the page, at its first occurrence.
#[derive(Debug, Clone)]
struct Hit {
    value: String,
    line: usize,
    /// Text on the same line between the previous GSTIN and this one.
    prefix: String,
}

/// Finds GSTINs and decides which side of the invoice each belongs to:
/// vendor-role cache, then buyer/supplier keywords, then page position.
pub struct TaxIdGenerator<'a> {
    keywords: &'a KeywordConfig,
    settings: &'a TaxIdConfig,
    roles: &'a dyn VendorRoleCache,
}

impl<'a> TaxIdGenerator<'a> {
    pub fn new(keywords: &'a KeywordConfig, settings: &'a TaxIdConfig, roles: &'a dyn VendorRoleCache) -> Self {
        Self {
            keywords,
            settings,
            roles,
        }
    }

    fn hits(&self, index: &LineIndex) -> Vec<Hit> {
        let mut hits: Vec<Hit> = Vec::new();
        for (idx, line) in index.candidate_lines() {
            let mut cursor = 0;
            for m in patterns::find_gstin_spans(&line.text) {
                let prefix = line.text.get(cursor..m.start).unwrap_or("").to_string();
                cursor = m.end;
                if hits.iter().any(|h| h.value == m.value) {
                    continue;
                }
                hits.push(Hit {
                    value: m.value,
                    line: idx,
                    prefix,
                });
            }
        }
        hits
    }

    fn role_in_text(&self, text: &str) -> Option<PartyRole> {
        if patterns::contains_any_keyword(text, &self.keywords.buyer_keywords) {
            Some(PartyRole::Buyer)
        } else if patterns::contains_any_keyword(text, &self.keywords.supplier_keywords) {
            Some(PartyRole::Supplier)
        } else {
            None
        }
    }

    /// Same line before the match first, then one line either side.
    fn keyword_role(&self, index: &LineIndex, hit: &Hit) -> Option<PartyRole> {
        if let Some(role) = self.role_in_text(&hit.prefix) {
            return Some(role);
        }
        index
            .window(hit.line, 1)
            .filter(|i| *i != hit.line)
            .filter_map(|i| index.get(i))
            .find_map(|l| self.role_in_text(&l.text))
    }
}

fn field_for(role: PartyRole) -> Field {
    match role {
        PartyRole::Supplier => Field::SupplierTaxId,
        PartyRole::Buyer => Field::BuyerTaxId,
    }
}

impl CandidateGenerator for TaxIdGenerator<'_> {
    fn generate(&self, index: &LineIndex) -> Vec<Candidate> {
        let hits = self.hits(index);
        let mut decided: Vec<Option<(PartyRole, MatchOrigin)>> = hits
            .iter()
            .map(|hit| {
                if let Some(profile) = self.roles.lookup(&hit.value) {
                    log::debug!("{}: role {} from vendor cache", hit.value, profile.role);
                    return Some((profile.role, MatchOrigin::Cached));
                }
                self.keyword_role(index, hit).map(|role| (role, MatchOrigin::Keyword))
            })
            .collect();

        if hits.len() == 1 && decided[0].is_none() {
            decided[0] = Some((PartyRole::Supplier, MatchOrigin::Shape));
        }

        let taken = |decided: &[Option<(PartyRole, MatchOrigin)>], role: PartyRole| {
            decided.iter().flatten().any(|(r, _)| *r == role)
        };
        // Hits are in page order: an undecided hit takes whichever role is still free,
        // the topmost of several undecided hits is the supplier, and page position only
        // settles hits left over once both roles are taken.
        for i in 0..hits.len() {
            if decided[i].is_some() {
                continue;
            }
            let more_undecided = decided[i + 1..].iter().any(Option::is_none);
            let upper_part = index.relative_index(hits[i].line) < self.settings.supplier_position_cutoff;
            let role = match (taken(&decided, PartyRole::Supplier), taken(&decided, PartyRole::Buyer)) {
                (false, true) => PartyRole::Supplier,
                (true, false) => PartyRole::Buyer,
                (false, false) if more_undecided => PartyRole::Supplier,
                _ if upper_part => PartyRole::Supplier,
                _ => PartyRole::Buyer,
            };
            decided[i] = Some((role, MatchOrigin::Position));
        }

        hits.into_iter()
            .zip(decided)
            .filter_map(|(hit, decision)| {
                let (role, origin) = decision?;
                Some(Candidate::text(field_for(role), &hit.value, hit.line, origin))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryVendorRoles, NoVendorRoles, VendorProfile};
    use crate::ocr::RawOcrLine;

    const A: &str = "27AAPFU0939F1ZV";
    const B: &str = "29ABCDE1234F1Z5";

    fn index(lines: &[(&str, f64)]) -> LineIndex {
        LineIndex::build(lines.iter().map(|(t, y)| RawOcrLine::new(*t, *y, 90.0)).collect())
    }

    fn run(index: &LineIndex, roles: &dyn VendorRoleCache) -> Vec<(Field, String, MatchOrigin)> {
        let keywords = KeywordConfig::default();
        let settings = TaxIdConfig::default();
        TaxIdGenerator::new(&keywords, &settings, roles)
            .generate(index)
            .into_iter()
            .map(|c| (c.field, c.raw, c.origin))
            .collect()
    }

    #[test]
    fn a_single_gstin_is_the_supplier() {
        let got = run(&index(&[("GSTIN: 27aapfu0939f1zv", 0.5)]), &NoVendorRoles);
        assert_eq!(got, vec![(Field::SupplierTaxId, A.to_string(), MatchOrigin::Shape)]);
    }

    #[test]
    fn position_splits_two_unlabelled_gstins() {
        let got = run(&index(&[(A, 0.1), (B, 0.9)]), &NoVendorRoles);
        assert_eq!(got[0].0, Field::SupplierTaxId);
        assert_eq!(got[1].0, Field::BuyerTaxId);
        assert!(got.iter().all(|g| g.2 == MatchOrigin::Position));
    }

    #[test]
    fn two_gstins_low_on_the_page_still_split() {
        let got = run(
            &index(&[
                ("Acme Traders", 0.0),
                ("Some Road", 0.1),
                ("Pune", 0.2),
                ("Invoice No: INV-1", 0.3),
                ("Date: 01/04/2024", 0.4),
                ("Item 1 10.00", 0.5),
                (A, 0.6),
                ("Thank you", 0.7),
                (B, 0.8),
                ("Signature", 0.9),
            ]),
            &NoVendorRoles,
        );
        assert_eq!(got[0], (Field::SupplierTaxId, A.to_string(), MatchOrigin::Position));
        assert_eq!(got[1], (Field::BuyerTaxId, B.to_string(), MatchOrigin::Position));
    }

    #[test]
    fn unlabelled_gstin_takes_the_free_role() {
        let line = format!("Bill To: Beta Stores GSTIN {}", B);
        let got = run(&index(&[(line.as_str(), 0.1), ("Thanks", 0.5), (A, 0.9)]), &NoVendorRoles);
        assert_eq!(got[0], (Field::BuyerTaxId, B.to_string(), MatchOrigin::Keyword));
        assert_eq!(got[1], (Field::SupplierTaxId, A.to_string(), MatchOrigin::Position));
    }

    #[test]
    fn extra_gstins_fall_back_to_position() {
        let c = "07AAACR5055K1Z6";
        let got = run(&index(&[(A, 0.1), ("x", 0.3), ("y", 0.5), (B, 0.7), (c, 0.9)]), &NoVendorRoles);
        let fields: Vec<Field> = got.iter().map(|g| g.0).collect();
        assert_eq!(fields, vec![Field::SupplierTaxId, Field::BuyerTaxId, Field::BuyerTaxId]);
    }

    #[test]
    fn keywords_beat_position() {
        let got = run(
            &index(&[("Bill To: Beta Stores", 0.1), (A, 0.15), ("Supplier: Acme", 0.8), (B, 0.85)]),
            &NoVendorRoles,
        );
        assert_eq!(got[0], (Field::BuyerTaxId, A.to_string(), MatchOrigin::Keyword));
        assert_eq!(got[1], (Field::SupplierTaxId, B.to_string(), MatchOrigin::Keyword));
    }

    #[test]
    fn two_gstins_on_one_line_use_their_own_prefix() {
        let line = format!("Seller GSTIN {} Buyer GSTIN {}", A, B);
        let got = run(&index(&[(line.as_str(), 0.2)]), &NoVendorRoles);
        assert_eq!(got[0].0, Field::SupplierTaxId);
        assert_eq!(got[1].0, Field::BuyerTaxId);
    }

    #[test]
    fn cache_beats_keywords() {
        let cache = InMemoryVendorRoles::new();
        cache.remember(A, VendorProfile::new("Acme", PartyRole::Supplier)).unwrap();
        let got = run(&index(&[("Buyer", 0.1), (A, 0.15), (B, 0.9)]), &cache);
        assert_eq!(got[0], (Field::SupplierTaxId, A.to_string(), MatchOrigin::Cached));
        assert_eq!(got[1].0, Field::BuyerTaxId);
    }

    #[test]
    fn repeated_gstin_is_reported_once() {
        let got = run(&index(&[(A, 0.1), (A, 0.9)]), &NoVendorRoles);
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn dates_are_never_tax_ids() {
        assert!(run(&index(&[("31/03/2024", 0.1)]), &NoVendorRoles).is_empty());
    }
}

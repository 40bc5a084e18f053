use super::CandidateGenerator;
use crate::config::{KeywordConfig, LineItemConfig};
use crate::ocr::LineIndex;
use crate::patterns::{self, NumberToken};
use crate::types::{Candidate, CandidateValue, Field, LineItem, MatchOrigin, Provenance};

/// Lines sharing one visual row.
#[derive(Debug, Clone)]
pub struct Row {
    pub first_line: usize,
    pub text: String,
}

/// Groups non-blank lines into rows: a line joins the current row when its vertical
/// position is within `tolerance` of the row's first line.
pub fn group_rows(index: &LineIndex, tolerance: f64) -> Vec<Row> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (idx, line) in index.candidate_lines() {
        let joins = groups.last().and_then(|g| index.get(g[0])).map_or(false, |anchor| {
            (line.vertical_position - anchor.vertical_position).abs() <= tolerance
        });
        match groups.last_mut() {
            Some(group) if joins => group.push(idx),
            _ => groups.push(vec![idx]),
        }
    }

    groups
        .into_iter()
        .map(|mut members| {
            // Table cells repeat the text of the plain line they sit on.
            let has_cells = members
                .iter()
                .any(|i| index.get(*i).map_or(false, |l| l.provenance == Provenance::TableCell));
            if has_cells {
                members.retain(|i| index.get(*i).map_or(false, |l| l.provenance == Provenance::TableCell));
            }
            if members.iter().all(|i| index.get(*i).map_or(false, |l| l.horizontal_position.is_some())) {
                members.sort_by(|a, b| {
                    let ax = index.get(*a).and_then(|l| l.horizontal_position).unwrap_or(0.0);
                    let bx = index.get(*b).and_then(|l| l.horizontal_position).unwrap_or(0.0);
                    ax.total_cmp(&bx).then(a.cmp(b))
                });
            }
            let text = members
                .iter()
                .filter_map(|i| index.get(*i))
                .map(|l| l.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            Row {
                first_line: members.iter().copied().min().unwrap_or(0),
                text,
            }
        })
        .collect()
}

/// Reads one table row as "description … numbers". Returns `None` for rows without a
/// description or without any number.
pub fn parse_item_row(text: &str) -> Option<LineItem> {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();

    // Leading serial number: "1", "1." or "1)" followed by text.
    if tokens.len() > 1 {
        let serial = tokens[0].trim_end_matches(['.', ')']);
        let next_is_text = patterns::parse_number_token(tokens[1]).is_none();
        if next_is_text && serial.len() <= 3 && !serial.is_empty() && serial.chars().all(|c| c.is_ascii_digit()) {
            tokens.remove(0);
        }
    }

    let first_numeric = tokens.iter().position(|t| patterns::parse_number_token(t).is_some())?;
    let description = tokens[..first_numeric]
        .join(" ")
        .trim_matches(|c: char| c == '-' || c == ':' || c == '|' || c.is_whitespace())
        .to_string();
    if !description.chars().any(|c| c.is_alphabetic()) {
        return None;
    }

    let mut tax_rate = None;
    let mut numbers: Vec<NumberToken> = Vec::new();
    for token in &tokens[first_numeric..] {
        match patterns::parse_number_token(token) {
            Some(n) if n.is_percent => {
                tax_rate.get_or_insert(n.value);
            }
            Some(n) => numbers.push(n),
            None => {}
        }
    }
    // A 4-8 digit integer ahead of qty/rate/amount is an HSN/SAC code.
    if numbers.len() >= 4 && !numbers[0].has_decimals && (4..=8).contains(&numbers[0].integer_digits) {
        numbers.remove(0);
    }

    let amount = numbers.last()?.value;
    if amount <= 0.0 {
        return None;
    }
    let (quantity, unit_rate) = if numbers.len() >= 3 {
        (Some(numbers[0].value), Some(numbers[1].value))
    } else {
        (None, None)
    };

    Some(LineItem {
        description,
        quantity,
        unit_rate,
        tax_rate,
        amount,
    })
}

/// Emits at most one item per row between the header row and the first totals row.
pub struct LineItemGenerator<'a> {
    keywords: &'a KeywordConfig,
    settings: &'a LineItemConfig,
}

impl<'a> LineItemGenerator<'a> {
    pub fn new(keywords: &'a KeywordConfig, settings: &'a LineItemConfig) -> Self {
        Self { keywords, settings }
    }

    fn is_header(&self, text: &str) -> bool {
        let hits = self
            .keywords
            .table_header
            .iter()
            .filter(|k| patterns::contains_keyword(text, k))
            .count();
        hits >= self.settings.min_header_keywords
    }

    fn is_footer(&self, text: &str) -> bool {
        patterns::contains_any_keyword(text, &self.keywords.table_footer)
    }
}

impl CandidateGenerator for LineItemGenerator<'_> {
    fn generate(&self, index: &LineIndex) -> Vec<Candidate> {
        let rows = group_rows(index, self.settings.row_tolerance);
        let Some(header) = rows.iter().position(|r| self.is_header(&r.text)) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for row in &rows[header + 1..] {
            if self.is_footer(&row.text) {
                break;
            }
            match parse_item_row(&row.text) {
                Some(item) => out.push(Candidate::new(
                    Field::LineItem,
                    CandidateValue::Item(item),
                    row.text.as_str(),
                    row.first_line,
                    MatchOrigin::Shape,
                )),
                None => log::debug!("line {}: no item in '{}'", row.first_line, row.text),
            }
        }
        out
    }
}

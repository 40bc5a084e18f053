//! Shape recognisers shared by the generators and the scorer's hard filter.
//!
//! Regexes are compiled once and kept in `OnceLock`s.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

fn gstin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\b\d{2}[A-Z]{5}\d{4}[A-Z][A-Z\d]Z[A-Z\d]\b")
}

fn gstin_full_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^\d{2}[A-Z]{5}\d{4}[A-Z][A-Z\d]Z[A-Z\d]$")
}

fn dmy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4}|\d{2})\b")
}

fn ymd_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"\b(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})\b")
}

fn day_month_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?[\s\-/.,]*(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?[\s\-/.,]*(\d{4}|\d{2})\b",
    )
}

fn month_name_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
    )
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r"(?i)(?:(?:₹|rs\.?|inr)\s*)?((?:\d{1,3}(?:,\d{2,3})+|\d+)\.\d{2})",
    )
}

fn amount_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r"(?i)^(?:(?:₹|rs\.?|inr)\s*[\d,]+(?:\.\d{1,2})?|(?:\d{1,3}(?:,\d{2,3})+|\d+)\.\d{2}|\d{1,3}(?:,\d{2,3})+)$",
    )
}

fn vehicle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(&RE, r"^[A-Z]{2}\d{1,2}[A-Z]{1,3}\d{3,4}$")
}

fn number_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compiled(
        &RE,
        r"^(?:₹|rs\.?)?((?:\d{1,3}(?:,\d{2,3})+|\d+)(?:\.\d+)?)(%?)$",
    )
}

/// A GSTIN-shaped substring with its byte span in the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GstinMatch {
    pub value: String,
    pub start: usize,
    pub end: usize,
}

/// All GSTIN-shaped substrings, matched case-insensitively and returned upper-cased.
pub fn find_gstin_spans(text: &str) -> Vec<GstinMatch> {
    let upper = text.to_ascii_uppercase();
    gstin_re()
        .find_iter(&upper)
        .map(|m| GstinMatch {
            value: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

pub fn find_gstins(text: &str) -> Vec<String> {
    find_gstin_spans(text).into_iter().map(|m| m.value).collect()
}

pub fn contains_gstin(text: &str) -> bool {
    gstin_re().is_match(&text.to_ascii_uppercase())
}

pub fn is_gstin(text: &str) -> bool {
    gstin_full_re().is_match(text.trim())
}

/// A date literal found in a line. `date` is `None` when the shape matched but the
/// calendar date does not exist (e.g. 31/02/2024).
#[derive(Debug, Clone, PartialEq)]
pub struct DateMatch {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub date: Option<NaiveDate>,
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let idx = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| *m == prefix)?;
    Some(idx as u32 + 1)
}

fn full_year(raw: &str) -> Option<i32> {
    let y: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + y } else { y })
}

fn calendar_date(year: Option<i32>, month: Option<u32>, day: Option<u32>) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year?, month?, day?)
}

/// Every date literal in `text` in the supported shapes (DD-MM-YYYY, DD/MM/YYYY,
/// DD.MM.YYYY, YYYY-MM-DD and month-name variants). Overlapping matches keep the
/// leftmost, longest one.
pub fn find_dates(text: &str) -> Vec<DateMatch> {
    let mut found: Vec<DateMatch> = Vec::new();

    for c in dmy_re().captures_iter(text) {
        let m = c.get(0).expect("group 0");
        let date = calendar_date(
            full_year(&c[3]),
            c[2].parse().ok(),
            c[1].parse().ok(),
        );
        found.push(DateMatch {
            text: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
            date,
        });
    }
    for c in ymd_re().captures_iter(text) {
        let m = c.get(0).expect("group 0");
        let date = calendar_date(c[1].parse().ok(), c[2].parse().ok(), c[3].parse().ok());
        found.push(DateMatch {
            text: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
            date,
        });
    }
    for c in day_month_name_re().captures_iter(text) {
        let m = c.get(0).expect("group 0");
        let date = calendar_date(full_year(&c[3]), month_number(&c[2]), c[1].parse().ok());
        found.push(DateMatch {
            text: m.as_str().trim().to_string(),
            start: m.start(),
            end: m.end(),
            date,
        });
    }
    for c in month_name_day_re().captures_iter(text) {
        let m = c.get(0).expect("group 0");
        let date = calendar_date(full_year(&c[3]), month_number(&c[1]), c[2].parse().ok());
        found.push(DateMatch {
            text: m.as_str().to_string(),
            start: m.start(),
            end: m.end(),
            date,
        });
    }

    found.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut kept: Vec<DateMatch> = Vec::with_capacity(found.len());
    for m in found {
        if kept.last().map_or(true, |last| m.start >= last.end) {
            kept.push(m);
        }
    }
    kept
}

pub fn is_date_shaped(text: &str) -> bool {
    !find_dates(text).is_empty()
}

/// A currency-shaped literal (two decimal places, optional separators and ₹/Rs/INR prefix).
#[derive(Debug, Clone, PartialEq)]
pub struct AmountLiteral {
    pub raw: String,
    pub value: f64,
    pub start: usize,
    pub end: usize,
}

fn blank_spans(text: &str, spans: &[(usize, usize)]) -> String {
    let mut bytes = text.as_bytes().to_vec();
    for &(start, end) in spans {
        for b in &mut bytes[start..end] {
            *b = b' ';
        }
    }
    // Spans come from ASCII-only matches, so the buffer is still UTF-8.
    String::from_utf8(bytes).unwrap_or_else(|_| text.to_string())
}

fn is_number_glue(c: Option<char>) -> bool {
    matches!(c, Some(ch) if ch.is_ascii_digit() || ch == '.' || ch == ',')
}

/// Currency literals in `text`, ignoring digits that belong to dates or GSTINs.
pub fn find_amounts(text: &str) -> Vec<AmountLiteral> {
    let mut masked: Vec<(usize, usize)> = find_dates(text)
        .iter()
        .filter(|d| d.text.is_ascii())
        .map(|d| (d.start, d.end))
        .collect();
    masked.extend(find_gstin_spans(text).iter().map(|m| (m.start, m.end)));
    let scan = blank_spans(text, &masked);

    let mut out = Vec::new();
    for c in amount_re().captures_iter(&scan) {
        let whole = c.get(0).expect("group 0");
        let number = c.get(1).expect("group 1");
        let before = scan[..whole.start()].chars().next_back();
        if is_number_glue(before) {
            continue;
        }
        let mut after = scan[number.end()..].chars();
        let next = after.next();
        let next_next = after.next();
        if matches!(next, Some(ch) if ch.is_ascii_digit())
            || (matches!(next, Some('.') | Some(',')) && matches!(next_next, Some(ch) if ch.is_ascii_digit()))
        {
            continue;
        }
        if let Some(value) = parse_amount(number.as_str()) {
            out.push(AmountLiteral {
                raw: whole.as_str().trim().to_string(),
                value,
                start: whole.start(),
                end: whole.end(),
            });
        }
    }
    out
}

/// Parse "1,23,456.78", "₹ 944.00" or "Rs. 12" to a number rounded to two decimals.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let lower = raw.trim().to_lowercase();
    let stripped = lower
        .trim_start_matches('₹')
        .trim_start_matches("inr")
        .trim_start_matches("rs")
        .trim_start_matches('.')
        .trim();
    let cleaned: String = stripped.chars().filter(|c| *c != ',' && *c != ' ').collect();
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((value * 100.0).round() / 100.0)
}

/// Whole token looks like money: "944.00", "1,200", "₹500", "Rs. 12.5".
pub fn is_amount_shaped(token: &str) -> bool {
    amount_shape_re().is_match(token.trim())
}

/// Indian vehicle registration such as "MH12AB1234" (spaces and dashes ignored).
pub fn is_vehicle_shaped(token: &str) -> bool {
    let compact: String = token
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase();
    vehicle_re().is_match(&compact)
}

pub fn is_phone_number(token: &str) -> bool {
    token.len() == 10 && token.chars().all(|c| c.is_ascii_digit())
}

pub fn is_pincode(token: &str) -> bool {
    token.len() == 6 && token.chars().all(|c| c.is_ascii_digit())
}

/// Byte span of the first occurrence of `keyword` in `haystack`, compared in ASCII
/// lowercase. An alphanumeric edge of the keyword must meet a non-alphanumeric
/// neighbour, so "total" is not found in "Subtotal".
pub fn find_keyword(haystack: &str, keyword: &str) -> Option<(usize, usize)> {
    let hay = haystack.to_ascii_lowercase();
    let kw = keyword.trim().to_ascii_lowercase();
    let first_alnum = kw.chars().next()?.is_alphanumeric();
    let last_alnum = kw.chars().next_back().map_or(false, |c| c.is_alphanumeric());
    let mut from = 0;
    while let Some(pos) = hay[from..].find(&kw) {
        let start = from + pos;
        let end = start + kw.len();
        let before_ok = !first_alnum
            || hay[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        let after_ok = !last_alnum || hay[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return Some((start, end));
        }
        from = start + kw.chars().next().map_or(1, char::len_utf8);
        if from >= hay.len() {
            break;
        }
    }
    None
}

pub fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    find_keyword(haystack, keyword).is_some()
}

pub fn contains_any_keyword<S: AsRef<str>>(haystack: &str, keywords: &[S]) -> bool {
    keywords.iter().any(|k| contains_keyword(haystack, k.as_ref()))
}

/// A numeric token in a table row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberToken {
    pub value: f64,
    pub is_percent: bool,
    pub has_decimals: bool,
    pub integer_digits: usize,
}

pub fn parse_number_token(token: &str) -> Option<NumberToken> {
    let t = token.trim().trim_end_matches([',', ';', ':']).to_lowercase();
    let c = number_token_re().captures(&t)?;
    let number = c.get(1)?.as_str();
    let is_percent = !c.get(2).map_or("", |m| m.as_str()).is_empty();
    let (int_part, has_decimals) = match number.split_once('.') {
        Some((i, _)) => (i, true),
        None => (number, false),
    };
    let value: f64 = number.replace(',', "").parse().ok()?;
    Some(NumberToken {
        value,
        is_percent,
        has_decimals,
        integer_digits: int_part.chars().filter(|c| c.is_ascii_digit()).count(),
    })
}

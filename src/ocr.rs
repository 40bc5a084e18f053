//! Line Index and the adapters that turn OCR backend JSON into it.
//!
//! The crate never calls an OCR service. It reads the JSON a backend already
//! produced: AWS Textract `Blocks`, Azure Document Intelligence `analyzeResult`,
//! or a plain array of [`RawOcrLine`] records.

use crate::error::{Result, ScanError};
use crate::types::{Provenance, TextLine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Range;

/// One line as handed over by an OCR backend. Position and confidence may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOcrLine {
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "verticalPosition", alias = "top", alias = "y")]
    pub vertical_position: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub provenance: Provenance,
    #[serde(default, alias = "horizontalPosition", alias = "left", alias = "x")]
    pub horizontal_position: Option<f64>,
}

impl RawOcrLine {
    pub fn new(text: impl Into<String>, vertical_position: f64, confidence: f64) -> Self {
        Self {
            text: text.into(),
            vertical_position: Some(vertical_position),
            confidence: Some(confidence),
            ..Self::default()
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn with_horizontal(mut self, left: f64) -> Self {
        self.horizontal_position = Some(left);
        self
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn text_line(r: RawOcrLine, vertical_position: f64) -> TextLine {
    TextLine {
        text: r.text,
        vertical_position,
        confidence: finite(r.confidence).map_or(0.0, |c| c.clamp(0.0, 100.0)),
        provenance: r.provenance,
        horizontal_position: finite(r.horizontal_position).map(|x| x.clamp(0.0, 1.0)),
    }
}

/// Immutable, top-to-bottom ordered lines of one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineIndex {
    lines: Vec<TextLine>,
}

impl LineIndex {
    /// Positioned lines are sorted top to bottom (stable on ties). A line without a
    /// position stays right after the line emitted before it and takes that line's
    /// position; unpositioned lines at the very start sit at the top.
    pub fn build(raw: Vec<RawOcrLine>) -> Self {
        let mut leading: Vec<TextLine> = Vec::new();
        let mut anchored: Vec<(TextLine, Vec<TextLine>)> = Vec::new();
        for r in raw {
            match finite(r.vertical_position) {
                Some(p) => anchored.push((text_line(r, p.clamp(0.0, 1.0)), Vec::new())),
                None => match anchored.last_mut() {
                    Some((anchor, followers)) => {
                        let position = anchor.vertical_position;
                        followers.push(text_line(r, position));
                    }
                    None => leading.push(text_line(r, 0.0)),
                },
            }
        }
        anchored.sort_by(|a, b| a.0.vertical_position.total_cmp(&b.0.vertical_position));
        let lines = leading
            .into_iter()
            .chain(
                anchored
                    .into_iter()
                    .flat_map(|(anchor, followers)| std::iter::once(anchor).chain(followers)),
            )
            .collect();
        Self { lines }
    }

    pub fn from_lines(lines: Vec<TextLine>) -> Self {
        Self::build(
            lines
                .into_iter()
                .map(|l| RawOcrLine {
                    text: l.text,
                    vertical_position: Some(l.vertical_position),
                    confidence: Some(l.confidence),
                    provenance: l.provenance,
                    horizontal_position: l.horizontal_position,
                })
                .collect(),
        )
    }

    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }

    pub fn get(&self, idx: usize) -> Option<&TextLine> {
        self.lines.get(idx)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &TextLine)> {
        self.lines.iter().enumerate()
    }

    /// Non-blank lines only; blank lines are never candidate sources.
    pub fn candidate_lines(&self) -> impl Iterator<Item = (usize, &TextLine)> {
        self.iter().filter(|(_, l)| !l.is_blank())
    }

    /// Indices within `window` lines of `idx`, clamped to the document.
    pub fn window(&self, idx: usize, window: usize) -> Range<usize> {
        let start = idx.saturating_sub(window);
        let end = (idx + window + 1).min(self.lines.len());
        start..end.max(start)
    }

    /// Fraction of the document above `idx`, by line index.
    pub fn relative_index(&self, idx: usize) -> f64 {
        if self.lines.len() <= 1 {
            return 0.0;
        }
        idx as f64 / self.lines.len() as f64
    }

    /// Closest non-blank line after `idx`.
    pub fn next_text_line(&self, idx: usize) -> Option<(usize, &TextLine)> {
        self.lines
            .iter()
            .enumerate()
            .skip(idx + 1)
            .find(|(_, l)| !l.is_blank())
    }

    /// Closest non-blank line before `idx`.
    pub fn previous_text_line(&self, idx: usize) -> Option<(usize, &TextLine)> {
        self.lines[..idx.min(self.lines.len())]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| !l.is_blank())
    }
}

/// Merge word-level records into lines: words whose vertical positions lie within
/// `tolerance` of the first word of a row are joined left to right.
pub fn group_words_into_lines(words: Vec<RawOcrLine>, tolerance: f64) -> Vec<RawOcrLine> {
    let mut words: Vec<RawOcrLine> = words.into_iter().filter(|w| !w.text.trim().is_empty()).collect();
    words.sort_by(|a, b| {
        let ay = a.vertical_position.unwrap_or(0.0);
        let by = b.vertical_position.unwrap_or(0.0);
        ay.total_cmp(&by)
    });

    let mut rows: Vec<Vec<RawOcrLine>> = Vec::new();
    for word in words {
        let y = word.vertical_position.unwrap_or(0.0);
        match rows.last_mut() {
            Some(row) if (row[0].vertical_position.unwrap_or(0.0) - y).abs() <= tolerance => row.push(word),
            _ => rows.push(vec![word]),
        }
    }

    rows.into_iter()
        .map(|mut row| {
            row.sort_by(|a, b| {
                a.horizontal_position
                    .unwrap_or(0.0)
                    .total_cmp(&b.horizontal_position.unwrap_or(0.0))
            });
            let confidences: Vec<f64> = row.iter().filter_map(|w| w.confidence).collect();
            let confidence = if confidences.is_empty() {
                None
            } else {
                Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
            };
            RawOcrLine {
                text: row.iter().map(|w| w.text.trim()).collect::<Vec<_>>().join(" "),
                vertical_position: row[0].vertical_position,
                confidence,
                provenance: Provenance::PlainLine,
                horizontal_position: row[0].horizontal_position,
            }
        })
        .collect()
}

/// Which backend produced a JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrFormat {
    Textract,
    Azure,
    RawLines,
}

pub fn detect_format(doc: &Value) -> Option<OcrFormat> {
    if doc.get("Blocks").map_or(false, Value::is_array) {
        return Some(OcrFormat::Textract);
    }
    if doc.get("analyzeResult").is_some() || doc.get("pages").map_or(false, Value::is_array) {
        return Some(OcrFormat::Azure);
    }
    if doc.is_array() || doc.get("lines").map_or(false, Value::is_array) {
        return Some(OcrFormat::RawLines);
    }
    None
}

/// Parse any supported OCR JSON document into raw lines.
pub fn parse_document(source_name: &str, doc: &Value, word_tolerance: f64) -> Result<Vec<RawOcrLine>> {
    match detect_format(doc) {
        Some(OcrFormat::Textract) => Ok(parse_textract(doc, word_tolerance)),
        Some(OcrFormat::Azure) => Ok(parse_azure(doc)),
        Some(OcrFormat::RawLines) => {
            let lines = doc.get("lines").unwrap_or(doc);
            Ok(serde_json::from_value(lines.clone())?)
        }
        None => Err(ScanError::UnsupportedOcrFormat {
            source_name: source_name.to_string(),
            reason: "expected Textract Blocks, Azure analyzeResult or an array of lines".into(),
        }),
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(|s| s.as_str()).unwrap_or("")
}

fn bbox(block: &Value, key: &str) -> Option<f64> {
    block
        .get("Geometry")
        .and_then(|g| g.get("BoundingBox"))
        .and_then(|b| b.get(key))
        .and_then(|x| x.as_f64())
}

fn related_ids<'a>(block: &'a Value, kind: &str) -> Vec<&'a str> {
    block
        .get("Relationships")
        .and_then(|r| r.as_array())
        .into_iter()
        .flatten()
        .filter(|r| str_field(r, "Type") == kind)
        .flat_map(|r| {
            r.get("Ids")
                .and_then(|ids| ids.as_array())
                .map(|ids| ids.iter().filter_map(|i| i.as_str()).collect::<Vec<_>>())
                .unwrap_or_default()
        })
        .collect()
}

fn child_text(block: &Value, by_id: &HashMap<&str, &Value>) -> String {
    related_ids(block, "CHILD")
        .into_iter()
        .filter_map(|id| by_id.get(id))
        .filter(|b| str_field(b, "BlockType") == "WORD")
        .map(|b| str_field(b, "Text"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn textract_line(text: String, block: &Value, provenance: Provenance) -> RawOcrLine {
    RawOcrLine {
        text,
        vertical_position: bbox(block, "Top"),
        confidence: block.get("Confidence").and_then(|c| c.as_f64()),
        provenance,
        horizontal_position: bbox(block, "Left"),
    }
}

/// AWS Textract `AnalyzeDocument` / `DetectDocumentText` response.
pub fn parse_textract(doc: &Value, word_tolerance: f64) -> Vec<RawOcrLine> {
    let empty: Vec<Value> = Vec::new();
    let blocks = doc.get("Blocks").and_then(|b| b.as_array()).unwrap_or(&empty);
    let by_id: HashMap<&str, &Value> = blocks
        .iter()
        .filter_map(|b| b.get("Id").and_then(|i| i.as_str()).map(|id| (id, b)))
        .collect();

    let mut out = Vec::new();
    let mut words = Vec::new();
    let mut saw_line = false;
    for block in blocks {
        match str_field(block, "BlockType") {
            "LINE" => {
                saw_line = true;
                out.push(textract_line(str_field(block, "Text").to_string(), block, Provenance::PlainLine));
            }
            "WORD" => words.push(textract_line(str_field(block, "Text").to_string(), block, Provenance::PlainLine)),
            "KEY_VALUE_SET" => {
                let is_key = block
                    .get("EntityTypes")
                    .and_then(|e| e.as_array())
                    .map_or(false, |types| types.iter().any(|t| t.as_str() == Some("KEY")));
                if !is_key {
                    continue;
                }
                let key = child_text(block, &by_id);
                let value = related_ids(block, "VALUE")
                    .into_iter()
                    .filter_map(|id| by_id.get(id))
                    .map(|v| child_text(v, &by_id))
                    .collect::<Vec<_>>()
                    .join(" ");
                if key.trim().is_empty() && value.trim().is_empty() {
                    continue;
                }
                let text = format!("{}: {}", key.trim().trim_end_matches(':'), value.trim());
                out.push(textract_line(text, block, Provenance::FormKeyValue));
            }
            "CELL" => {
                let text = child_text(block, &by_id);
                if !text.trim().is_empty() {
                    out.push(textract_line(text, block, Provenance::TableCell));
                }
            }
            _ => {}
        }
    }

    if !saw_line && !words.is_empty() {
        log::debug!("textract response has no LINE blocks; grouping {} words", words.len());
        out.extend(group_words_into_lines(words, word_tolerance));
    }
    out
}

fn polygon_extent(polygon: Option<&Value>, axis: usize) -> Option<f64> {
    let points = polygon?.as_array()?;
    points
        .iter()
        .skip(axis)
        .step_by(2)
        .filter_map(|p| p.as_f64())
        .reduce(f64::min)
}

fn azure_confidence(v: &Value) -> Option<f64> {
    // Azure reports 0..1.
    v.get("confidence").and_then(|c| c.as_f64()).map(|c| c * 100.0)
}

/// Azure Document Intelligence read/layout result. Page offsets are folded into one
/// [0, 1] position across the whole document.
pub fn parse_azure(doc: &Value) -> Vec<RawOcrLine> {
    let result = doc.get("analyzeResult").unwrap_or(doc);
    let empty: Vec<Value> = Vec::new();
    let pages = result.get("pages").and_then(|p| p.as_array()).unwrap_or(&empty);
    let page_count = pages.len().max(1) as f64;

    let mut page_dims: HashMap<u64, (usize, f64, f64)> = HashMap::new();
    let mut out = Vec::new();
    for (page_idx, page) in pages.iter().enumerate() {
        let height = page.get("height").and_then(|h| h.as_f64()).filter(|h| *h > 0.0).unwrap_or(1.0);
        let width = page.get("width").and_then(|w| w.as_f64()).filter(|w| *w > 0.0).unwrap_or(1.0);
        let number = page.get("pageNumber").and_then(|n| n.as_u64()).unwrap_or(page_idx as u64 + 1);
        page_dims.insert(number, (page_idx, height, width));

        let lines = page.get("lines").and_then(|l| l.as_array()).unwrap_or(&empty);
        for line in lines {
            let top = polygon_extent(line.get("polygon"), 1).map(|y| (page_idx as f64 + y / height) / page_count);
            let left = polygon_extent(line.get("polygon"), 0).map(|x| x / width);
            out.push(RawOcrLine {
                text: str_field(line, "content").to_string(),
                vertical_position: top,
                confidence: azure_confidence(line),
                provenance: Provenance::PlainLine,
                horizontal_position: left,
            });
        }
    }

    let region_position = |element: &Value| -> (Option<f64>, Option<f64>) {
        let region = element
            .get("boundingRegions")
            .and_then(|r| r.as_array())
            .and_then(|r| r.first());
        let Some(region) = region else {
            return (None, None);
        };
        let number = region.get("pageNumber").and_then(|n| n.as_u64()).unwrap_or(1);
        let (page_idx, height, width) = page_dims.get(&number).copied().unwrap_or((0, 1.0, 1.0));
        let top = polygon_extent(region.get("polygon"), 1).map(|y| (page_idx as f64 + y / height) / page_count);
        let left = polygon_extent(region.get("polygon"), 0).map(|x| x / width);
        (top, left)
    };

    let pairs = result.get("keyValuePairs").and_then(|k| k.as_array()).unwrap_or(&empty);
    for pair in pairs {
        let key = pair.get("key").map(|k| str_field(k, "content")).unwrap_or("");
        let value = pair.get("value").map(|v| str_field(v, "content")).unwrap_or("");
        if key.trim().is_empty() && value.trim().is_empty() {
            continue;
        }
        let (top, left) = pair.get("key").map(&region_position).unwrap_or((None, None));
        out.push(RawOcrLine {
            text: format!("{}: {}", key.trim().trim_end_matches(':'), value.trim()),
            vertical_position: top,
            confidence: azure_confidence(pair),
            provenance: Provenance::FormKeyValue,
            horizontal_position: left,
        });
    }

    let tables = result.get("tables").and_then(|t| t.as_array()).unwrap_or(&empty);
    for table in tables {
        let cells = table.get("cells").and_then(|c| c.as_array()).unwrap_or(&empty);
        for cell in cells {
            let content = str_field(cell, "content");
            if content.trim().is_empty() {
                continue;
            }
            let (top, left) = region_position(cell);
            out.push(RawOcrLine {
                text: content.to_string(),
                vertical_position: top,
                confidence: azure_confidence(cell),
                provenance: Provenance::TableCell,
                horizontal_position: left,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lines_are_sorted_and_unpositioned_lines_keep_their_slot() {
        let index = LineIndex::build(vec![
            RawOcrLine::new("bottom", 0.9, 90.0),
            RawOcrLine::new("top", 0.1, 90.0),
            RawOcrLine {
                text: "after bottom".into(),
                ..RawOcrLine::default()
            },
        ]);
        let texts: Vec<&str> = index.lines().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["top", "bottom", "after bottom"]);
    }

    #[test]
    fn unpositioned_lines_follow_their_emission_predecessor_after_sorting() {
        let unpositioned = |text: &str| RawOcrLine {
            text: text.into(),
            ..RawOcrLine::default()
        };
        let index = LineIndex::build(vec![
            unpositioned("header"),
            RawOcrLine::new("footer", 0.95, 90.0),
            unpositioned("footer note"),
            RawOcrLine::new("middle", 0.5, 90.0),
            unpositioned("middle a"),
            unpositioned("middle b"),
            RawOcrLine::new("top", 0.1, 90.0),
        ]);
        let texts: Vec<&str> = index.lines().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["header", "top", "middle", "middle a", "middle b", "footer", "footer note"]
        );
        assert_eq!(index.lines()[4].vertical_position, 0.5);
        assert_eq!(index.lines()[6].vertical_position, 0.95);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let index = LineIndex::build(vec![RawOcrLine {
            text: "x".into(),
            vertical_position: Some(1.7),
            confidence: Some(f64::NAN),
            ..RawOcrLine::default()
        }]);
        let line = &index.lines()[0];
        assert_eq!(line.vertical_position, 1.0);
        assert_eq!(line.confidence, 0.0);
    }

    #[test]
    fn blank_lines_are_kept_but_not_candidate_sources() {
        let index = LineIndex::build(vec![
            RawOcrLine::new("  ", 0.1, 90.0),
            RawOcrLine::new("Invoice", 0.2, 90.0),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.candidate_lines().count(), 1);
        assert_eq!(index.next_text_line(0).map(|(i, _)| i), Some(1));
    }

    #[test]
    fn rebuilding_from_lines_is_stable() {
        let index = LineIndex::build(vec![
            RawOcrLine::new("b", 0.6, 80.0).with_horizontal(0.3),
            RawOcrLine::new("a", 0.2, 90.0),
        ]);
        assert_eq!(LineIndex::from_lines(index.lines().to_vec()), index);
    }

    #[test]
    fn textract_blocks_become_lines_pairs_and_cells() {
        let doc = json!({
            "Blocks": [
                {"Id": "l1", "BlockType": "LINE", "Text": "TAX INVOICE", "Confidence": 99.1,
                 "Geometry": {"BoundingBox": {"Top": 0.05, "Left": 0.4}}},
                {"Id": "w1", "BlockType": "WORD", "Text": "Invoice"},
                {"Id": "w2", "BlockType": "WORD", "Text": "No"},
                {"Id": "w3", "BlockType": "WORD", "Text": "INV-77"},
                {"Id": "k1", "BlockType": "KEY_VALUE_SET", "EntityTypes": ["KEY"], "Confidence": 92.0,
                 "Geometry": {"BoundingBox": {"Top": 0.1, "Left": 0.1}},
                 "Relationships": [{"Type": "CHILD", "Ids": ["w1", "w2"]}, {"Type": "VALUE", "Ids": ["v1"]}]},
                {"Id": "v1", "BlockType": "KEY_VALUE_SET", "EntityTypes": ["VALUE"],
                 "Relationships": [{"Type": "CHILD", "Ids": ["w3"]}]},
                {"Id": "c1", "BlockType": "CELL", "Confidence": 80.0,
                 "Geometry": {"BoundingBox": {"Top": 0.5, "Left": 0.2}},
                 "Relationships": [{"Type": "CHILD", "Ids": ["w3"]}]}
            ]
        });
        assert_eq!(detect_format(&doc), Some(OcrFormat::Textract));
        let lines = parse_document("t.json", &doc, 0.01).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].text, "Invoice No: INV-77");
        assert_eq!(lines[1].provenance, Provenance::FormKeyValue);
        assert_eq!(lines[2].provenance, Provenance::TableCell);
    }

    #[test]
    fn textract_words_are_grouped_when_lines_are_absent() {
        let doc = json!({
            "Blocks": [
                {"Id": "a", "BlockType": "WORD", "Text": "Total", "Confidence": 90.0,
                 "Geometry": {"BoundingBox": {"Top": 0.800, "Left": 0.1}}},
                {"Id": "b", "BlockType": "WORD", "Text": "944.00", "Confidence": 80.0,
                 "Geometry": {"BoundingBox": {"Top": 0.805, "Left": 0.7}}},
                {"Id": "c", "BlockType": "WORD", "Text": "Thanks", "Confidence": 70.0,
                 "Geometry": {"BoundingBox": {"Top": 0.95, "Left": 0.1}}}
            ]
        });
        let lines = parse_textract(&doc, 0.01);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Total 944.00");
        assert_eq!(lines[0].confidence, Some(85.0));
    }

    #[test]
    fn azure_pages_fold_into_one_document() {
        let doc = json!({
            "analyzeResult": {
                "pages": [
                    {"pageNumber": 1, "height": 11.0, "width": 8.5,
                     "lines": [{"content": "Invoice No: A-1", "polygon": [1.0, 1.1, 3.0, 1.1, 3.0, 1.3, 1.0, 1.3]}]},
                    {"pageNumber": 2, "height": 11.0, "width": 8.5,
                     "lines": [{"content": "Grand Total 944.00", "polygon": [1.0, 5.5, 3.0, 5.5, 3.0, 5.7, 1.0, 5.7]}]}
                ]
            }
        });
        let lines = parse_document("a.json", &doc, 0.01).unwrap();
        assert_eq!(lines.len(), 2);
        assert!((lines[0].vertical_position.unwrap() - 0.05).abs() < 1e-9);
        assert!((lines[1].vertical_position.unwrap() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn raw_line_arrays_accept_short_aliases() {
        let doc = json!([{"text": "Invoice No: 42", "top": 0.1, "confidence": 88.0, "provenance": "form_key_value"}]);
        let lines = parse_document("r.json", &doc, 0.01).unwrap();
        assert_eq!(lines[0].vertical_position, Some(0.1));
        assert_eq!(lines[0].provenance, Provenance::FormKeyValue);
    }

    #[test]
    fn unknown_documents_are_rejected() {
        let err = parse_document("x.json", &json!({"foo": 1}), 0.01).unwrap_err();
        assert!(matches!(err, ScanError::UnsupportedOcrFormat { .. }));
    }
}

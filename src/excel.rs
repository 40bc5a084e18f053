use crate::error::Result;
use crate::export::{ensure_parent, with_extension, RecordWriter};
use crate::types::{BatchSummary, InvoiceRecord, ResolvedField, Status};
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet};
use std::path::{Path, PathBuf};

const SUMMARY_HEADERS: &[&str] = &[
    "Document",
    "Invoice No",
    "Invoice Date",
    "Supplier",
    "Supplier GSTIN",
    "Supplier GSTIN Status",
    "Buyer",
    "Buyer GSTIN",
    "Buyer GSTIN Status",
    "Total Amount",
    "Line Items",
    "Needs Review",
    "Status",
];

const ITEM_HEADERS: &[&str] = &[
    "Document",
    "Invoice No",
    "Sr",
    "Description",
    "Qty",
    "Rate",
    "Tax %",
    "Amount",
];

const TALLY_HEADERS: &[&str] = &["Date", "Particulars", "Vch Type", "Vch No", "Debit", "Credit"];

const CORRECTION_HEADERS: &[&str] = &["Document", "Field", "Observation"];

const AMOUNT_WIDTH: f64 = 14.0;

/// Drop characters that are not allowed in sheet XML (control chars other than tab/newline/CR).
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            matches!(c, '\t' | '\n' | '\r') || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

/// Column width from text length (char count × 1.2, clamped 10–50).
fn estimate_text_width(text: &str) -> f64 {
    let w = text.chars().count() as f64 * 1.2;
    w.clamp(10.0, 50.0)
}

/// Running per-column widths, seeded from the header row.
struct ColumnWidths(Vec<f64>);

impl ColumnWidths {
    fn new(headers: &[&str]) -> Self {
        Self(headers.iter().map(|h| estimate_text_width(h)).collect())
    }

    fn fit(&mut self, col: usize, text: &str) {
        if let Some(w) = self.0.get_mut(col) {
            *w = w.max(estimate_text_width(text));
        }
    }

    fn fix(&mut self, col: usize, width: f64) {
        if let Some(w) = self.0.get_mut(col) {
            *w = width;
        }
    }

    fn apply(&self, worksheet: &mut Worksheet) -> Result<()> {
        for (col, &w) in self.0.iter().enumerate() {
            worksheet.set_column_width(col as u16, w)?;
        }
        Ok(())
    }
}

struct Styles {
    header: Format,
    text: Format,
    amount: Format,
    auto: Format,
    review: Format,
    except: Format,
}

impl Styles {
    fn new() -> Self {
        let status = |bg: u32| Format::new().set_bold().set_background_color(Color::RGB(bg));
        Self {
            header: Format::new()
                .set_bold()
                .set_background_color(Color::RGB(0x2563EB))
                .set_font_color(Color::RGB(0xFFFFFF)),
            text: Format::new().set_text_wrap(),
            amount: Format::new().set_num_format("#,##0.00").set_align(FormatAlign::Right),
            auto: status(0xC6EFCE),
            review: status(0xFFEB9C),
            except: status(0xFFC7CE),
        }
    }

    fn status(&self, status: Status) -> &Format {
        match status {
            Status::Auto => &self.auto,
            Status::Review => &self.review,
            Status::Except => &self.except,
        }
    }
}

fn write_headers(worksheet: &mut Worksheet, headers: &[&str], styles: &Styles) -> Result<()> {
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &styles.header)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_text(worksheet: &mut Worksheet, row: u32, col: u16, text: &str, format: &Format) -> Result<()> {
    worksheet.write_string_with_format(row, col, sanitize_cell(text), format)?;
    Ok(())
}

/// Numbers go in as numbers; a missing value leaves the cell empty.
fn write_amount(worksheet: &mut Worksheet, row: u32, col: u16, value: Option<f64>, styles: &Styles) -> Result<()> {
    if let Some(v) = value {
        worksheet.write_number_with_format(row, col, v, &styles.amount)?;
    }
    Ok(())
}

fn field_text(field: &ResolvedField) -> String {
    field.value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// Labels of the scalar fields that did not reach `Auto`.
fn needs_review(record: &InvoiceRecord) -> String {
    record
        .scalar_fields()
        .iter()
        .filter(|f| f.status != Status::Auto)
        .map(|f| format!("{} ({})", f.field.label(), f.status))
        .collect::<Vec<_>>()
        .join(", ")
}

fn summary_sheet(records: &[InvoiceRecord], styles: &Styles) -> Result<Worksheet> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Invoice Summary")?;
    write_headers(&mut worksheet, SUMMARY_HEADERS, styles)?;
    let mut widths = ColumnWidths::new(SUMMARY_HEADERS);

    for (idx, record) in records.iter().enumerate() {
        let row = (idx + 1) as u32;
        let texts = [
            record.document_id.clone(),
            field_text(&record.invoice_number),
            field_text(&record.invoice_date),
            record.parties.supplier.clone().unwrap_or_default(),
            field_text(&record.supplier_tax_id),
            record.supplier_gstin_status().as_str().to_string(),
            record.parties.buyer.clone().unwrap_or_default(),
            field_text(&record.buyer_tax_id),
            record.buyer_gstin_status().as_str().to_string(),
        ];
        for (col, text) in texts.iter().enumerate() {
            write_text(&mut worksheet, row, col as u16, text, &styles.text)?;
            widths.fit(col, text);
        }
        write_amount(&mut worksheet, row, 9, record.total_amount.amount(), styles)?;
        worksheet.write_number(row, 10, record.line_items.len() as f64)?;
        let review = needs_review(record);
        write_text(&mut worksheet, row, 11, &review, &styles.text)?;
        widths.fit(11, &review);
        worksheet.write_string_with_format(row, 12, record.status.as_str(), styles.status(record.status))?;
    }

    widths.fix(9, AMOUNT_WIDTH);
    widths.apply(&mut worksheet)?;
    Ok(worksheet)
}

fn items_sheet(records: &[InvoiceRecord], styles: &Styles) -> Result<Worksheet> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Item Details")?;
    write_headers(&mut worksheet, ITEM_HEADERS, styles)?;
    let mut widths = ColumnWidths::new(ITEM_HEADERS);

    let mut row = 1u32;
    for record in records {
        let invoice_no = field_text(&record.invoice_number);
        for (sr, item) in record.line_items.iter().enumerate() {
            write_text(&mut worksheet, row, 0, &record.document_id, &styles.text)?;
            write_text(&mut worksheet, row, 1, &invoice_no, &styles.text)?;
            worksheet.write_number(row, 2, (sr + 1) as f64)?;
            write_text(&mut worksheet, row, 3, &item.description, &styles.text)?;
            write_amount(&mut worksheet, row, 4, item.quantity, styles)?;
            write_amount(&mut worksheet, row, 5, item.unit_rate, styles)?;
            write_amount(&mut worksheet, row, 6, item.tax_rate, styles)?;
            write_amount(&mut worksheet, row, 7, Some(item.amount), styles)?;
            widths.fit(0, &record.document_id);
            widths.fit(1, &invoice_no);
            widths.fit(3, &item.description);
            row += 1;
        }
    }

    for col in 4..=7 {
        widths.fix(col, AMOUNT_WIDTH);
    }
    widths.apply(&mut worksheet)?;
    Ok(worksheet)
}

/// Date, party, voucher type and voucher number of a sales voucher, plus its credit.
/// Debit stays blank; the invoice total is booked as credit only.
fn tally_voucher(record: &InvoiceRecord) -> ([String; 4], Option<f64>) {
    let texts = [
        field_text(&record.invoice_date),
        record.parties.buyer.clone().unwrap_or_default(),
        "Sales".to_string(),
        field_text(&record.invoice_number),
    ];
    (texts, record.total_amount.amount())
}

fn tally_sheet(records: &[InvoiceRecord], styles: &Styles) -> Result<Worksheet> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Tally Sales")?;
    write_headers(&mut worksheet, TALLY_HEADERS, styles)?;
    let mut widths = ColumnWidths::new(TALLY_HEADERS);

    for (idx, record) in records.iter().enumerate() {
        let row = (idx + 1) as u32;
        let (texts, credit) = tally_voucher(record);
        for (col, text) in texts.iter().enumerate() {
            write_text(&mut worksheet, row, col as u16, text, &styles.text)?;
            widths.fit(col, text);
        }
        write_amount(&mut worksheet, row, 5, credit, styles)?;
    }

    widths.fix(4, AMOUNT_WIDTH);
    widths.fix(5, AMOUNT_WIDTH);
    widths.apply(&mut worksheet)?;
    Ok(worksheet)
}

fn corrections_sheet(records: &[InvoiceRecord], styles: &Styles) -> Result<Worksheet> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Missing Correction")?;
    write_headers(&mut worksheet, CORRECTION_HEADERS, styles)?;
    let mut widths = ColumnWidths::new(CORRECTION_HEADERS);

    let corrections = records.iter().flat_map(|r| r.corrections());
    for (idx, correction) in corrections.enumerate() {
        let row = (idx + 1) as u32;
        let texts = [
            correction.document_id.as_str(),
            correction.field.label(),
            correction.observation.as_str(),
        ];
        for (col, text) in texts.iter().enumerate() {
            write_text(&mut worksheet, row, col as u16, text, &styles.text)?;
            widths.fit(col, text);
        }
    }

    widths.apply(&mut worksheet)?;
    Ok(worksheet)
}

fn dashboard_sheet(records: &[InvoiceRecord], styles: &Styles) -> Result<Worksheet> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Dashboard")?;
    write_headers(&mut worksheet, &["Metric", "Count"], styles)?;

    let summary = BatchSummary::from_records(records);
    let rows = [
        ("Invoices processed", summary.total, &styles.text),
        ("AUTO", summary.auto, &styles.auto),
        ("REVIEW", summary.review, &styles.review),
        ("EXCEPT", summary.except, &styles.except),
    ];
    for (idx, (label, count, format)) in rows.iter().enumerate() {
        let row = (idx + 1) as u32;
        worksheet.write_string_with_format(row, 0, *label, *format)?;
        worksheet.write_number(row, 1, *count as f64)?;
    }
    worksheet.set_column_width(0, 22.0)?;
    worksheet.set_column_width(1, 10.0)?;
    Ok(worksheet)
}

/// Workbook sheets, in order: Invoice Summary, Item Details, Tally Sales, Missing Correction, Dashboard.
#[derive(Debug, Clone, Default)]
pub struct XlsxReportWriter;

impl RecordWriter for XlsxReportWriter {
    fn write(&self, records: &[InvoiceRecord], path: &Path) -> Result<PathBuf> {
        let path = with_extension(path, "xlsx");
        ensure_parent(&path)?;

        let styles = Styles::new();
        let mut workbook = Workbook::new();
        workbook.push_worksheet(summary_sheet(records, &styles)?);
        workbook.push_worksheet(items_sheet(records, &styles)?);
        workbook.push_worksheet(tally_sheet(records, &styles)?);
        workbook.push_worksheet(corrections_sheet(records, &styles)?);
        workbook.push_worksheet(dashboard_sheet(records, &styles)?);
        workbook.save(&path)?;

        log::info!("wrote workbook with {} record(s) to {}", records.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateValue, Field, LineItem, PartyNames};

    fn record() -> InvoiceRecord {
        let resolved = |field, value: CandidateValue, status| ResolvedField {
            field,
            value: Some(value),
            status,
            score: 70.0,
        };
        InvoiceRecord {
            document_id: "inv-001.json".into(),
            invoice_number: resolved(Field::InvoiceNumber, CandidateValue::Text("INV-7".into()), Status::Auto),
            invoice_date: resolved(Field::InvoiceDate, CandidateValue::Text("2024-03-31".into()), Status::Auto),
            supplier_tax_id: resolved(
                Field::SupplierTaxId,
                CandidateValue::Text("27AAPFU0939F1ZV".into()),
                Status::Review,
            ),
            buyer_tax_id: ResolvedField::missing(Field::BuyerTaxId),
            total_amount: resolved(Field::TotalAmount, CandidateValue::Amount(590.0), Status::Auto),
            line_items: vec![LineItem {
                description: "Widget".into(),
                quantity: Some(2.0),
                unit_rate: Some(250.0),
                tax_rate: Some(18.0),
                amount: 500.0,
            }],
            parties: PartyNames {
                supplier: Some("Acme".into()),
                buyer: None,
            },
            status: Status::Except,
            trail: vec![],
        }
    }

    #[test]
    fn sanitize_drops_control_characters_only() {
        assert_eq!(sanitize_cell("A\u{0}B\tC & <D>"), "AB\tC & <D>");
    }

    #[test]
    fn widths_are_clamped() {
        assert_eq!(estimate_text_width("ab"), 10.0);
        assert_eq!(estimate_text_width(&"x".repeat(100)), 50.0);
    }

    #[test]
    fn needs_review_lists_non_auto_fields() {
        assert_eq!(
            needs_review(&record()),
            "Supplier GSTIN (REVIEW), Buyer GSTIN (EXCEPT)"
        );
    }

    #[test]
    fn tally_voucher_books_the_total_as_credit() {
        let mut record = record();
        record.parties.buyer = Some("Om Hardware".into());
        let (texts, credit) = tally_voucher(&record);
        assert_eq!(texts, ["2024-03-31", "Om Hardware", "Sales", "INV-7"].map(String::from));
        assert_eq!(credit, Some(590.0));
        assert_eq!(TALLY_HEADERS[4], "Debit");
    }

    #[test]
    fn tally_voucher_without_total_has_no_credit() {
        let mut record = record();
        record.total_amount = ResolvedField::missing(Field::TotalAmount);
        let (texts, credit) = tally_voucher(&record);
        assert_eq!(texts[1], "");
        assert_eq!(credit, None);
    }

    #[test]
    fn every_sheet_builds() {
        let styles = Styles::new();
        let records = [record()];
        let names: Vec<String> = [
            summary_sheet(&records, &styles),
            items_sheet(&records, &styles),
            tally_sheet(&records, &styles),
            corrections_sheet(&records, &styles),
            dashboard_sheet(&records, &styles),
        ]
        .into_iter()
        .map(|sheet| sheet.unwrap().name())
        .collect();
        assert_eq!(
            names,
            ["Invoice Summary", "Item Details", "Tally Sales", "Missing Correction", "Dashboard"]
        );
    }

    #[test]
    fn workbook_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let written = XlsxReportWriter.write(&[record()], &dir.path().join("report")).unwrap();
        assert!(written.ends_with("report.xlsx"));
        assert!(std::fs::metadata(&written).unwrap().len() > 0);
    }
}

//! Scan OCR JSON output for GST invoice fields.
//!
//! Usage:
//!   scan_invoices <file or dir>... [--json PATH] [--xlsx PATH] [--config PATH] [--vendor-cache PATH]
//!
//! Without `--config`, `GST_SCAN_CONFIG` / `GST_SCAN_VENDOR_CACHE` (or a `.env` file) are used.

use gst_invoice_lib::commands::{batch_scan, collect_input_files, open_vendor_cache};
use gst_invoice_lib::{
    BatchSummary, ExtractionConfig, JsonReportWriter, Pipeline, RecordWriter, ScanError, XlsxReportWriter,
};
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str =
    "usage: scan_invoices <file or dir>... [--json PATH] [--xlsx PATH] [--config PATH] [--vendor-cache PATH]";

#[derive(Debug, Default)]
struct CliArgs {
    inputs: Vec<PathBuf>,
    json: Option<PathBuf>,
    xlsx: Option<PathBuf>,
    config: Option<PathBuf>,
    vendor_cache: Option<PathBuf>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut out = CliArgs::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let slot = match arg.as_str() {
                "--json" => &mut out.json,
                "--xlsx" => &mut out.xlsx,
                "--config" => &mut out.config,
                "--vendor-cache" => &mut out.vendor_cache,
                "-h" | "--help" => return Err(USAGE.to_string()),
                flag if flag.starts_with("--") => return Err(format!("unknown option {}\n{}", flag, USAGE)),
                _ => {
                    out.inputs.push(PathBuf::from(&arg));
                    continue;
                }
            };
            let value = args.next().ok_or_else(|| format!("{} needs a value\n{}", arg, USAGE))?;
            *slot = Some(PathBuf::from(value));
        }
        if out.inputs.is_empty() {
            return Err(USAGE.to_string());
        }
        Ok(out)
    }
}

fn run(args: CliArgs) -> Result<(), ScanError> {
    let mut config = match &args.config {
        Some(path) => ExtractionConfig::load(path)?,
        None => ExtractionConfig::from_env()?,
    };
    if args.vendor_cache.is_some() {
        config.vendor_cache_path = args.vendor_cache.clone();
    }

    let roles = open_vendor_cache(&config)?;
    let pipeline = Pipeline::new(config, roles);
    let files = collect_input_files(&args.inputs)?;
    log::info!("scanning {} file(s)", files.len());

    let result = batch_scan(&pipeline, &files);
    for record in &result.successes {
        println!(
            "{:<32} {:<7} no={} date={} total={}",
            record.document_id,
            record.status,
            record.invoice_number.text().unwrap_or("-"),
            record.invoice_date.text().unwrap_or("-"),
            record
                .total_amount
                .amount()
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".into()),
        );
    }
    for failure in &result.failures {
        eprintln!("failed: {} ({})", failure.file_path, failure.error);
    }

    let summary = BatchSummary::from_records(&result.successes);
    println!(
        "{} scanned: {} AUTO, {} REVIEW, {} EXCEPT, {} failed",
        summary.total,
        summary.auto,
        summary.review,
        summary.except,
        result.failures.len()
    );

    if let Some(path) = &args.json {
        let written = JsonReportWriter::default().write(&result.successes, path)?;
        println!("JSON report: {}", written.display());
    }
    if let Some(path) = &args.xlsx {
        let written = XlsxReportWriter.write(&result.successes, path)?;
        println!("Excel report: {}", written.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{}", msg);
            return ExitCode::from(2);
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs, String> {
        CliArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn flags_and_inputs_mix() {
        let args = parse(&["a.json", "--xlsx", "out.xlsx", "dir", "--vendor-cache", "v.db"]).unwrap();
        assert_eq!(args.inputs, vec![PathBuf::from("a.json"), PathBuf::from("dir")]);
        assert_eq!(args.xlsx, Some(PathBuf::from("out.xlsx")));
        assert_eq!(args.vendor_cache, Some(PathBuf::from("v.db")));
        assert!(args.json.is_none());
    }

    #[test]
    fn missing_value_and_no_inputs_are_errors() {
        assert!(parse(&["a.json", "--json"]).is_err());
        assert!(parse(&["--json", "out.json"]).is_err());
        assert!(parse(&["a.json", "--bogus"]).is_err());
    }
}

//! File-level entry points used by the binary: load OCR output, scan one file, scan a batch.

use crate::assembler::Pipeline;
use crate::cache::{InMemoryVendorRoles, VendorRoleCache};
use crate::config::ExtractionConfig;
use crate::db::VendorDb;
use crate::error::Result;
use crate::ocr::{self, LineIndex};
use crate::types::{BatchScanResult, FailedScan, InvoiceRecord};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Documents processed side by side per batch chunk.
pub const CONCURRENCY: usize = 5;

/// Read a Textract/Azure/raw-lines JSON file into a line index.
pub fn load_ocr_file(path: &Path, word_tolerance: f64) -> Result<LineIndex> {
    let content = fs::read_to_string(path)?;
    let doc: Value = serde_json::from_str(&content)?;
    let raw = ocr::parse_document(&file_name(path), &doc, word_tolerance)?;
    Ok(LineIndex::build(raw))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|o| o.to_str())
        .unwrap_or("")
        .to_string()
}

pub fn scan_file(pipeline: &Pipeline, path: &Path) -> Result<InvoiceRecord> {
    let index = load_ocr_file(path, pipeline.config().line_items.row_tolerance)?;
    Ok(pipeline.process(&file_name(path), &index))
}

/// Scan files `CONCURRENCY` at a time. A file that cannot be read or parsed becomes a
/// [`FailedScan`]; the rest of the batch carries on. Output order follows input order.
pub fn batch_scan(pipeline: &Pipeline, paths: &[PathBuf]) -> BatchScanResult {
    let mut successes = Vec::new();
    let mut failures = Vec::new();

    for chunk in paths.chunks(CONCURRENCY) {
        let results: Vec<std::thread::Result<Result<InvoiceRecord>>> = std::thread::scope(|s| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|path| s.spawn(move || scan_file(pipeline, path)))
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        for (path, result) in chunk.iter().zip(results) {
            let error = match result {
                Ok(Ok(record)) => {
                    successes.push(record);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "worker thread panicked".to_string(),
            };
            log::warn!("skipping {}: {}", path.display(), error);
            failures.push(FailedScan {
                file_path: path.display().to_string(),
                file_name: file_name(path),
                error,
            });
        }
    }

    BatchScanResult { successes, failures }
}

/// Expand inputs into `.json` files: files are taken as given, directories are walked
/// recursively. Each directory's files come back sorted.
pub fn collect_input_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            collect_dir(input, &mut out)?;
        } else {
            out.push(input.clone());
        }
    }
    Ok(out)
}

fn collect_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_dir(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("json"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// SQLite store when a path is configured, otherwise a cache that lives for this run only.
pub fn open_vendor_cache(config: &ExtractionConfig) -> Result<Arc<dyn VendorRoleCache>> {
    match &config.vendor_cache_path {
        Some(path) => {
            log::info!("vendor cache: {}", path.display());
            Ok(Arc::new(VendorDb::open(path)?))
        }
        None => Ok(Arc::new(InMemoryVendorRoles::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;
    use serde_json::json;

    fn write_json(path: &Path, value: &Value) {
        fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    fn raw_lines(lines: &[&str]) -> Value {
        let lines: Vec<Value> = lines
            .iter()
            .enumerate()
            .map(|(i, t)| json!({ "text": t, "vertical_position": i as f64 / 10.0, "confidence": 95.0 }))
            .collect();
        json!({ "lines": lines })
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(ExtractionConfig::default(), Arc::new(InMemoryVendorRoles::default()))
    }

    #[test]
    fn collects_json_files_recursively_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        for name in ["b.json", "a.json", "notes.txt", "sub/c.JSON"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        let files = collect_input_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.json", "b.json", "c.JSON"]);
    }

    #[test]
    fn batch_keeps_going_past_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        write_json(&good, &raw_lines(&["Invoice No: INV-2024-77", "Grand Total: 1,180.00"]));
        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        let unknown = dir.path().join("unknown.json");
        write_json(&unknown, &json!({ "foo": 1 }));

        let result = batch_scan(&pipeline(), &[good, garbage, unknown, dir.path().join("missing.json")]);
        assert_eq!(result.successes.len(), 1);
        assert_eq!(result.successes[0].document_id, "good.json");
        assert_eq!(result.successes[0].invoice_number.text(), Some("INV-2024-77"));
        let failed: Vec<&str> = result.failures.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(failed, vec!["garbage.json", "unknown.json", "missing.json"]);
    }

    #[test]
    fn batch_larger_than_one_chunk_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..12)
            .map(|i| {
                let p = dir.path().join(format!("doc{:02}.json", i));
                write_json(&p, &raw_lines(&[]));
                p
            })
            .collect();
        let result = batch_scan(&pipeline(), &paths);
        assert!(result.failures.is_empty());
        let ids: Vec<&str> = result.successes.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(ids[0], "doc00.json");
        assert_eq!(ids[11], "doc11.json");
        assert!(result.successes.iter().all(|r| r.status == Status::Except));
    }
}

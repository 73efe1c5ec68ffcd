//! CLI output formatting.
//!
//! # Report
//!
//! After a run, records are split into two boxed tables, each in task order:
//!
//! ```text
//! Successfully cached:
//! +--------+--------+-----------------------------+------------+
//! | Url    | Status | File                        | Method     |
//! +--------+--------+-----------------------------+------------+
//! | /      | 200    | static-site/_.html          | in-process |
//! | /about | 200    | static-site/about.html      | in-process |
//! +--------+--------+-----------------------------+------------+
//!
//! Not cached:
//! +----------+--------+-----------------------+------------+
//! | Url      | Status | Message               | Method     |
//! +----------+--------+-----------------------+------------+
//! | /contact | 200    | Skipped by CSRF Input | in-process |
//! +----------+--------+-----------------------+------------+
//!
//! Cached 2 of 3 URLs
//! ```
//!
//! A missing status code (no response at all) renders as an empty cell.
//!
//! `lookup` prints the file the runtime shim would serve, or why the
//! request would reach the application instead.
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::fallback::Fallback;
use crate::types::CacheRecord;

// ============================================================================
// Table rendering
// ============================================================================

fn border(widths: &[usize]) -> String {
    let mut line = String::from("+");
    for w in widths {
        line.push_str(&"-".repeat(w + 2));
        line.push('+');
    }
    line
}

fn row(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (cell, w) in cells.iter().zip(widths) {
        let pad = w - cell.chars().count();
        line.push(' ');
        line.push_str(cell);
        line.push_str(&" ".repeat(pad + 1));
        line.push('|');
    }
    line
}

/// Render a boxed table. Columns are as wide as their widest cell.
fn table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for r in rows {
        for (w, cell) in widths.iter_mut().zip(r) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let mut lines = vec![border(&widths), row(&header, &widths), border(&widths)];
    lines.extend(rows.iter().map(|r| row(r, &widths)));
    lines.push(border(&widths));
    lines
}

fn status_cell(record: &CacheRecord) -> String {
    record
        .status_code
        .map(|code| code.to_string())
        .unwrap_or_default()
}

// ============================================================================
// Run report
// ============================================================================

/// Format the two-section report for a run.
pub fn format_report(records: &[CacheRecord]) -> Vec<String> {
    let cached: Vec<Vec<String>> = records
        .iter()
        .filter(|r| r.is_cached)
        .map(|r| {
            vec![
                r.url.clone(),
                status_cell(r),
                r.file_path.display().to_string(),
                r.fetch_method.to_string(),
            ]
        })
        .collect();
    let not_cached: Vec<Vec<String>> = records
        .iter()
        .filter(|r| !r.is_cached)
        .map(|r| {
            vec![
                r.url.clone(),
                status_cell(r),
                r.message.clone(),
                r.fetch_method.to_string(),
            ]
        })
        .collect();

    let mut lines = vec!["Successfully cached:".to_string()];
    lines.extend(table(&["Url", "Status", "File", "Method"], &cached));
    lines.push(String::new());
    lines.push("Not cached:".to_string());
    lines.extend(table(&["Url", "Status", "Message", "Method"], &not_cached));
    lines.push(String::new());
    lines.push(format_summary(records));
    lines
}

/// One-line run summary.
pub fn format_summary(records: &[CacheRecord]) -> String {
    let cached = records.iter().filter(|r| r.is_cached).count();
    let noun = if records.len() == 1 { "URL" } else { "URLs" };
    format!("Cached {} of {} {}", cached, records.len(), noun)
}

pub fn print_report(records: &[CacheRecord]) {
    for line in format_report(records) {
        println!("{}", line);
    }
}

// ============================================================================
// Shim lookup
// ============================================================================

/// Describe what the runtime shim would do for `uri`.
pub fn format_lookup(shim: &Fallback, uri: &str) -> Vec<String> {
    match shim.lookup(uri) {
        Some(path) => vec![format!("{} → {}", uri, path.display())],
        None => {
            let table = shim.table();
            let reason = match table.get(uri) {
                Some(file_name) => format!("listed as {file_name}, file not present or bypassed"),
                None if table.is_empty() => "fallback table is empty or missing".to_string(),
                None => format!("not listed among {} entries", table.len()),
            };
            vec![
                format!("{} → application", uri),
                format!("    {}", reason),
            ]
        }
    }
}

pub fn print_lookup(shim: &Fallback, uri: &str) {
    for line in format_lookup(shim, uri) {
        println!("{}", line);
    }
}

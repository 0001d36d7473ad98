//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Every catalog is shown as a header line (positional index, name, kind)
//! followed by indented context lines: the files it reads or writes, and for
//! writes the record count and whether the content changed. Paths line up in
//! one column per catalog.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! 001 bearbricks (single)
//!     src/app/products/bearbricks/content.json  1 record   unchanged
//! 002 amina (bucketed)
//!     src/app/products/amina/content/edge.json  4 records  written
//!     src/app/products/amina/content/alf.json   0 records  written
//!
//! Wrote 3 files (2 changed)
//! ```
//!
//! ## Check
//!
//! ```text
//! error    trinnov  src/app/products/trinnov/data.ts  no stub for 'buildTrinnovUrl'
//! warning  k-array  src/app/products/k-array/data     stub 'buildKArrayUrl' is never referenced
//!
//! Checked 14 sources: 1 error, 1 warning
//! ```
//!
//! ## List
//!
//! ```text
//! 001 bearbricks (single, products)
//!     Source: src/app/products/bearbricks/data.ts
//!     Output: src/app/products/bearbricks/content.json
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::config::Catalog;
use crate::emit::WrittenFile;
use crate::guard;
use crate::orchestrate::{CheckReport, RunReport};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// `text` padded with spaces to `width` characters.
///
/// Text already wider than the column is left as is.
fn pad(text: &str, width: usize) -> String {
    let fill = width as i64 - text.chars().count() as i64;
    match guard::repeat(" ", fill) {
        Ok(spaces) => format!("{text}{spaces}"),
        Err(_) => text.to_string(),
    }
}

fn column_width<'a>(items: impl IntoIterator<Item = &'a str>) -> usize {
    items.into_iter().map(|s| s.chars().count()).max().unwrap_or(0)
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

fn file_line(file: &WrittenFile, path_width: usize) -> String {
    let path = file.path.display().to_string();
    let status = if file.changed { "written" } else { "unchanged" };
    format!(
        "    {}  {}  {}",
        pad(&path, path_width),
        pad(&plural(file.records, "record"), 11),
        status
    )
}

// ============================================================================
// Build
// ============================================================================

/// Format the result of a run: one block per catalog, then a summary line.
pub fn format_run_output(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, catalog) in report.catalogs.iter().enumerate() {
        lines.push(format!("{} {} ({})", format_index(i + 1), catalog.name, catalog.kind));
        let paths: Vec<String> = catalog.files.iter().map(|f| f.path.display().to_string()).collect();
        let width = column_width(paths.iter().map(String::as_str));
        for file in &catalog.files {
            lines.push(file_line(file, width));
        }
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Wrote {} ({} changed)",
        plural(report.file_count(), "file"),
        report.changed_count()
    ));
    lines
}

pub fn print_run_output(report: &RunReport) {
    for line in format_run_output(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format check findings as aligned columns plus a summary line.
pub fn format_check_output(report: &CheckReport) -> Vec<String> {
    let mut lines = Vec::new();
    let severity_width = column_width(["warning"]);
    let catalog_width = column_width(report.findings.iter().map(|f| f.catalog.as_str()));
    let path_width = column_width(report.findings.iter().map(|f| f.path.as_str()));
    for finding in &report.findings {
        lines.push(format!(
            "{}  {}  {}  {}",
            pad(&finding.severity.to_string(), severity_width),
            pad(&finding.catalog, catalog_width),
            pad(&finding.path, path_width),
            finding.message
        ));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Checked {}: {}, {}",
        plural(report.sources, "source"),
        plural(report.errors(), "error"),
        plural(report.warnings(), "warning")
    ));
    lines
}

pub fn print_check_output(report: &CheckReport) {
    for line in format_check_output(report) {
        println!("{}", line);
    }
}

// ============================================================================
// List
// ============================================================================

/// Files a catalog reads, relative to the site root.
fn catalog_sources(catalog: &Catalog) -> Vec<String> {
    match catalog {
        Catalog::Bundle(c) => c.files(),
        other => other.sources().iter().map(|s| s.path.to_string()).collect(),
    }
}

/// Format the catalog plan: what each selected catalog reads and writes.
pub fn format_plan(catalogs: &[(&str, &Catalog)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, (name, catalog)) in catalogs.iter().enumerate() {
        lines.push(format!(
            "{} {} ({}, {})",
            format_index(i + 1),
            name,
            catalog.kind(),
            catalog.group()
        ));
        for source in catalog_sources(catalog) {
            lines.push(format!("    Source: {source}"));
        }
        if let Catalog::Bucketed(c) = catalog {
            lines.push(format!("    Split by: {}", c.field));
        }
        for output in catalog.outputs() {
            lines.push(format!("    Output: {output}"));
        }
    }
    lines
}

pub fn print_plan(catalogs: &[(&str, &Catalog)]) {
    for line in format_plan(catalogs) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve_config, stock_defaults_value};
    use crate::orchestrate::{CatalogRun, Finding, Severity};
    use std::path::PathBuf;

    fn written(path: &str, records: usize, changed: bool) -> WrittenFile {
        WrittenFile {
            path: PathBuf::from(path),
            digest: "0".repeat(64),
            changed,
            records,
        }
    }

    #[test]
    fn format_index_pads_to_three_digits() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn pad_fills_and_never_truncates() {
        assert_eq!(pad("ab", 4), "ab  ");
        assert_eq!(pad("abcdef", 4), "abcdef");
        assert_eq!(pad("", 0), "");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "record"), "1 record");
        assert_eq!(plural(0, "record"), "0 records");
        assert_eq!(plural(2, "file"), "2 files");
    }

    #[test]
    fn run_output_aligns_paths_per_catalog() {
        let report = RunReport {
            catalogs: vec![CatalogRun {
                name: "amina".into(),
                kind: "bucketed",
                files: vec![written("c/edge.json", 4, true), written("c/sapphire.json", 1, false)],
            }],
        };
        assert_eq!(
            format_run_output(&report),
            vec![
                "001 amina (bucketed)",
                "    c/edge.json      4 records    written",
                "    c/sapphire.json  1 record     unchanged",
                "",
                "Wrote 2 files (1 changed)",
            ]
        );
    }

    #[test]
    fn empty_run_prints_only_the_summary() {
        assert_eq!(format_run_output(&RunReport::default()), vec!["Wrote 0 files (0 changed)"]);
    }

    #[test]
    fn check_output_columns_and_summary() {
        let report = CheckReport {
            sources: 3,
            findings: vec![
                Finding {
                    catalog: "trinnov".into(),
                    path: "t/data.ts".into(),
                    severity: Severity::Error,
                    message: "no stub for 'buildTrinnovUrl'".into(),
                },
                Finding {
                    catalog: "k".into(),
                    path: "k/data".into(),
                    severity: Severity::Warning,
                    message: "stub 'x' is never referenced".into(),
                },
            ],
        };
        assert_eq!(
            format_check_output(&report),
            vec![
                "error    trinnov  t/data.ts  no stub for 'buildTrinnovUrl'",
                "warning  k        k/data     stub 'x' is never referenced",
                "",
                "Checked 3 sources: 1 error, 1 warning",
            ]
        );
    }

    #[test]
    fn plan_lists_sources_and_outputs() {
        let config = resolve_config(stock_defaults_value().unwrap(), None).unwrap();
        let amina = &config.catalogs["amina"];
        let lines = format_plan(&[("amina", amina)]);
        assert_eq!(lines[0], "001 amina (bucketed, products)");
        assert_eq!(lines[1], "    Source: src/app/products/amina/data.ts");
        assert_eq!(lines[2], "    Split by: series");
        assert_eq!(lines[3], "    Output: src/app/products/amina/content/edge.json");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn plan_shows_bundle_prelude_first() {
        let config = resolve_config(stock_defaults_value().unwrap(), None).unwrap();
        let lines = format_plan(&[("k-array", &config.catalogs["k-array"])]);
        assert_eq!(lines[1], "    Source: src/app/products/k-array/data/types.ts");
        assert_eq!(lines[2], "    Source: src/app/products/k-array/data/speakers.ts");
    }
}

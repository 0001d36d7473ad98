//! Running the configured catalogs, and checking them without writing.
//!
//! [`run`] extracts catalogs in configured order. Each catalog computes every
//! output before any is written; the first failing catalog stops the run and
//! catalogs after it are not attempted. Files written by earlier catalogs
//! stay on disk.
//!
//! [`check`] parses every source and reports, per catalog:
//!
//! - external calls with no stub (error)
//! - leftover imports the module reads and no stub covers (error)
//! - parse failures (error)
//! - stubs nothing references (warning)
//! - source files in a bundle directory that no part names (warning)

use crate::config::{BundleCatalog, Catalog, ExtractConfig, Group, SourceRef, join};
use crate::emit::{WrittenFile, write_all};
use crate::extract::{Context, ExtractError, SourceFormat, extract_catalog};
use crate::neutralize::{
    StubTable, external_calls, missing_stubs, module_declarations, unavailable_imports, unused_stubs,
};
use crate::resolve::called_helpers;
use crate::source::Module;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("unknown catalog '{0}'")]
    UnknownCatalog(String),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Which catalogs a command applies to. Empty means all of them.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub group: Option<Group>,
    pub only: Vec<String>,
}

/// Catalogs matching `selection`, in configured order.
pub fn selected<'a>(
    config: &'a ExtractConfig,
    selection: &Selection,
) -> Result<Vec<(&'a str, &'a Catalog)>, RunError> {
    if let Some(name) = selection
        .only
        .iter()
        .find(|name| !config.catalogs.contains_key(name.as_str()))
    {
        return Err(RunError::UnknownCatalog(name.clone()));
    }
    Ok(config
        .catalogs
        .iter()
        .filter(|(_, c)| selection.group.is_none_or(|g| c.group() == g))
        .filter(|(name, _)| selection.only.is_empty() || selection.only.contains(*name))
        .map(|(name, c)| (name.as_str(), c))
        .collect())
}

// =============================================================================
// Run
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRun {
    pub name: String,
    pub kind: &'static str,
    pub files: Vec<WrittenFile>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub catalogs: Vec<CatalogRun>,
}

impl RunReport {
    pub fn file_count(&self) -> usize {
        self.catalogs.iter().map(|c| c.files.len()).sum()
    }

    pub fn changed_count(&self) -> usize {
        self.catalogs
            .iter()
            .flat_map(|c| &c.files)
            .filter(|f| f.changed)
            .count()
    }
}

/// Extract and write the selected catalogs under `root`.
pub fn run(root: &Path, config: &ExtractConfig, selection: &Selection) -> Result<RunReport, RunError> {
    let mut report = RunReport::default();
    for (name, catalog) in selected(config, selection)? {
        let planned = extract_catalog(root, name, catalog, config)?;
        let files = write_all(root, &planned).map_err(|source| ExtractError::Emit {
            catalog: name.to_string(),
            source,
        })?;
        tracing::debug!(catalog = name, files = files.len(), "catalog done");
        report.catalogs.push(CatalogRun {
            name: name.to_string(),
            kind: catalog.kind(),
            files,
        });
    }
    Ok(report)
}

// =============================================================================
// Check
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub catalog: String,
    /// File the finding is about, relative to the site root.
    pub path: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckReport {
    /// Source files examined.
    pub sources: usize,
    pub findings: Vec<Finding>,
}

impl CheckReport {
    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

struct Checker<'a> {
    root: &'a Path,
    catalog: &'a str,
    report: &'a mut CheckReport,
}

impl Checker<'_> {
    fn push(&mut self, path: &str, severity: Severity, message: String) {
        self.report.findings.push(Finding {
            catalog: self.catalog.to_string(),
            path: path.to_string(),
            severity,
            message,
        });
    }

    fn missing(&mut self, path: &str, names: impl IntoIterator<Item = String>) {
        for name in names {
            self.push(path, Severity::Error, format!("no stub for '{name}'"));
        }
    }

    fn unused(&mut self, path: &str, names: impl IntoIterator<Item = String>) {
        for name in names {
            self.push(path, Severity::Warning, format!("stub '{name}' is never referenced"));
        }
    }

    /// Parse a script source, recording a failure as a finding.
    fn script(&mut self, source: &SourceRef<'_>) -> Option<(Module, Vec<(String, String)>)> {
        self.report.sources += 1;
        let cx = Context::new(self.root, self.catalog);
        match cx.script(source.path, source.imports) {
            Ok(neutralized) => {
                if let Err(err) = cx.json_imports(source.path, &neutralized) {
                    let message = match &err {
                        ExtractError::Read { path, source, .. } => {
                            format!("cannot read imported {path}: {source}")
                        }
                        ExtractError::Data { path, source, .. } => format!("{path}: {source}"),
                        other => error_message(other),
                    };
                    self.push(source.path, Severity::Error, message);
                }
                let unavailable = unavailable_imports(&neutralized, source.stubs);
                Some((neutralized.module, unavailable))
            }
            Err(err) => {
                self.push(source.path, Severity::Error, error_message(&err));
                None
            }
        }
    }

    fn unavailable(&mut self, path: &str, imports: Vec<(String, String)>) {
        for (name, specifier) in imports {
            self.push(
                path,
                Severity::Error,
                format!("'{name}' is imported from '{specifier}', which is not stripped or stubbed"),
            );
        }
    }

    fn data(&mut self, source: &SourceRef<'_>, format: SourceFormat) {
        self.report.sources += 1;
        let raw = match Context::new(self.root, self.catalog).raw_data(source.path, format) {
            Ok(raw) => raw,
            Err(err) => {
                self.push(source.path, Severity::Error, error_message(&err));
                return;
            }
        };
        let called = called_helpers(&raw);
        self.missing(
            source.path,
            called.iter().filter(|n| !source.stubs.contains(n)).cloned(),
        );
        self.unused(
            source.path,
            source
                .stubs
                .iter()
                .map(|(name, _)| name)
                .filter(|name| !called.contains(*name))
                .cloned(),
        );
    }

    fn source(&mut self, source: SourceRef<'_>) {
        match SourceFormat::of(Path::new(source.path)) {
            Some(SourceFormat::Script) => {
                if let Some((module, unavailable)) = self.script(&source) {
                    self.missing(source.path, missing_stubs(&module, source.stubs));
                    self.unavailable(source.path, unavailable);
                    self.unused(source.path, unused_stubs(&module, source.stubs));
                }
            }
            Some(format) => self.data(&source, format),
            // rejected by config validation
            None => self.push(source.path, Severity::Error, "unsupported source format".into()),
        }
    }

    fn bundle(&mut self, c: &BundleCatalog) {
        let mut prelude_names = HashSet::new();
        // stubs unused by every file of the bundle
        let mut unused: Option<BTreeSet<String>> = None;
        let mut note_unused = |module: &Module, stubs: &StubTable| {
            let here: BTreeSet<String> = unused_stubs(module, stubs).into_iter().collect();
            unused = Some(match unused.take() {
                Some(before) => before.intersection(&here).cloned().collect(),
                None => here,
            });
        };

        if let Some(prelude) = &c.prelude {
            let path = join(&c.dir, prelude);
            let source = SourceRef {
                path: &path,
                imports: &c.imports,
                stubs: &c.stubs,
            };
            if let Some((module, unavailable)) = self.script(&source) {
                self.missing(&path, missing_stubs(&module, &c.stubs));
                self.unavailable(&path, unavailable);
                note_unused(&module, &c.stubs);
                prelude_names = module_declarations(&module);
            }
        }

        for part in &c.parts {
            let path = join(&c.dir, &part.file);
            let source = SourceRef {
                path: &path,
                imports: &c.imports,
                stubs: &c.stubs,
            };
            match SourceFormat::of(Path::new(&path)) {
                Some(SourceFormat::Script) => {
                    if let Some((module, unavailable)) = self.script(&source) {
                        // the prelude's helpers are in scope for every part
                        let missing = external_calls(&module)
                            .into_iter()
                            .filter(|n| !c.stubs.contains(n) && !prelude_names.contains(n));
                        self.missing(&path, missing);
                        self.unavailable(&path, unavailable);
                        note_unused(&module, &c.stubs);
                    }
                }
                Some(format) => self.data(&source, format),
                None => self.push(&path, Severity::Error, "unsupported source format".into()),
            }
        }

        if let Some(names) = unused {
            let dir = c.dir.clone();
            self.unused(&dir, names);
        }
        self.orphans(c);
    }

    /// Source files in the bundle directory that no part or prelude names.
    fn orphans(&mut self, c: &BundleCatalog) {
        let dir = self.root.join(&c.dir);
        if !dir.is_dir() {
            return;
        }
        let known: HashSet<String> = c.files().into_iter().collect();
        let mut orphans: Vec<String> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && SourceFormat::of(e.path()).is_some())
            .filter_map(|e| e.file_name().to_str().map(|name| join(&c.dir, name)))
            .filter(|path| !known.contains(path))
            .collect();
        orphans.sort();
        for path in orphans {
            self.push(
                &path,
                Severity::Warning,
                "not referenced by any part of the bundle".into(),
            );
        }
    }
}

fn error_message(err: &ExtractError) -> String {
    // the finding already names catalog and file
    match err {
        ExtractError::Parse { source, .. } => source.to_string(),
        ExtractError::Read { source, .. } => format!("cannot read: {source}"),
        ExtractError::Data { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// Statically check the selected catalogs. Nothing is evaluated or written.
pub fn check(root: &Path, config: &ExtractConfig, selection: &Selection) -> Result<CheckReport, RunError> {
    let mut report = CheckReport::default();
    for (name, catalog) in selected(config, selection)? {
        let mut checker = Checker {
            root,
            catalog: name,
            report: &mut report,
        };
        match catalog {
            Catalog::Bundle(c) => checker.bundle(c),
            other => {
                for source in other.sources() {
                    checker.source(source);
                }
            }
        }
    }
    tracing::debug!(
        sources = report.sources,
        errors = report.errors(),
        warnings = report.warnings(),
        "check finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BundlePart, SingleCatalog, resolve_config, stock_defaults_value};
    use crate::neutralize::ImportMode;
    use crate::test_helpers::{read_json, write_file};
    use serde_json::json;
    use tempfile::TempDir;

    fn single(source: &str, stubs: &[&str], export: &str, output: &str) -> Catalog {
        Catalog::Single(SingleCatalog {
            group: Group::Products,
            source: source.into(),
            imports: ImportMode::default(),
            stubs: StubTable::pass_through(stubs.iter().copied()),
            exports: vec![export.into()],
            output: output.into(),
        })
    }

    fn config(catalogs: Vec<(&str, Catalog)>) -> ExtractConfig {
        ExtractConfig {
            catalogs: catalogs.into_iter().map(|(n, c)| (n.to_string(), c)).collect(),
            ..ExtractConfig::default()
        }
    }

    #[test]
    fn selection_filters_by_group_and_name() {
        let stock = resolve_config(stock_defaults_value().unwrap(), None).unwrap();
        let pages = selected(
            &stock,
            &Selection {
                group: Some(Group::Pages),
                only: vec![],
            },
        )
        .unwrap();
        assert_eq!(pages.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec!["events", "projects"]);

        let only = selected(
            &stock,
            &Selection {
                group: None,
                only: vec!["k-gear".into(), "amina".into()],
            },
        )
        .unwrap();
        // configured order, not argument order
        assert_eq!(only.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec!["amina", "k-gear"]);

        let err = selected(
            &stock,
            &Selection {
                group: None,
                only: vec!["nope".into()],
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "unknown catalog 'nope'");
    }

    #[test]
    fn run_writes_outputs_and_reports_changes() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "a/data.ts",
            "import { buildUrl } from \"@/lib/assets\";\nexport const items = [{ image: buildUrl(\"x.webp\") }];\n",
        );
        let config = config(vec![("a", single("a/data.ts", &["buildUrl"], "items", "a/content.json"))]);

        let first = run(tmp.path(), &config, &Selection::default()).unwrap();
        assert_eq!(first.file_count(), 1);
        assert_eq!(first.changed_count(), 1);
        assert_eq!(read_json(tmp.path(), "a/content.json"), json!({"items": [{"image": "x.webp"}]}));

        let second = run(tmp.path(), &config, &Selection::default()).unwrap();
        assert_eq!(second.changed_count(), 0);
        assert_eq!(first.catalogs[0].files[0].digest, second.catalogs[0].files[0].digest);
    }

    #[test]
    fn first_failure_stops_the_run() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a/data.ts", "export const items = [1];");
        write_file(tmp.path(), "b/data.ts", "export const items = [missing(1)];");
        write_file(tmp.path(), "c/data.ts", "export const items = [3];");
        let config = config(vec![
            ("a", single("a/data.ts", &[], "items", "a/out.json")),
            ("b", single("b/data.ts", &[], "items", "b/out.json")),
            ("c", single("c/data.ts", &[], "items", "c/out.json")),
        ]);
        let err = run(tmp.path(), &config, &Selection::default()).unwrap_err();
        assert!(err.to_string().starts_with("catalog 'b': b/data.ts:1:"), "{err}");
        assert!(tmp.path().join("a/out.json").exists());
        assert!(!tmp.path().join("b/out.json").exists());
        assert!(!tmp.path().join("c/out.json").exists());
    }

    #[test]
    fn check_reports_missing_unused_and_unavailable() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "a/data.ts",
            r#"import content from "./content";
export const items = [{ image: buildA("x"), other: buildB("y"), map: content.map }];
"#,
        );
        let config = config(vec![("a", single("a/data.ts", &["buildA", "buildUnused"], "items", "a/out.json"))]);
        let report = check(tmp.path(), &config, &Selection::default()).unwrap();
        let messages: Vec<(Severity, &str)> = report
            .findings
            .iter()
            .map(|f| (f.severity, f.message.as_str()))
            .collect();
        assert_eq!(
            messages,
            vec![
                (Severity::Error, "no stub for 'buildB'"),
                (
                    Severity::Error,
                    "'content' is imported from './content', which is not stripped or stubbed"
                ),
                (Severity::Warning, "stub 'buildUnused' is never referenced"),
            ]
        );
        assert_eq!(report.sources, 1);
        assert!(!tmp.path().join("a/out.json").exists());
    }

    #[test]
    fn check_reports_unreadable_json_imports() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "a/data.ts",
            "import content from \"./content.json\";\nexport const items = content.products;\n",
        );
        let config = config(vec![("a", single("a/data.ts", &[], "items", "a/out.json"))]);
        let report = check(tmp.path(), &config, &Selection::default()).unwrap();
        assert_eq!(report.findings.len(), 1);
        assert!(
            report.findings[0].message.starts_with("cannot read imported a/content.json"),
            "{}",
            report.findings[0].message
        );

        write_file(tmp.path(), "a/content.json", r#"{"products": []}"#);
        let report = check(tmp.path(), &config, &Selection::default()).unwrap();
        assert!(report.findings.is_empty(), "{:?}", report.findings);
    }

    #[test]
    fn check_reports_parse_errors_and_keeps_going() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a/data.ts", "export const items = [;");
        write_file(tmp.path(), "b/data.json", r#"{"items": [{"$call": ["buildB", "x"]}]}"#);
        let config = config(vec![
            ("a", single("a/data.ts", &[], "items", "a/out.json")),
            ("b", single("b/data.json", &[], "items", "b/out.json")),
        ]);
        let report = check(tmp.path(), &config, &Selection::default()).unwrap();
        assert_eq!(report.errors(), 2);
        assert_eq!(report.findings[0].path, "a/data.ts");
        assert!(report.findings[0].message.starts_with("1:"), "{}", report.findings[0].message);
        assert_eq!(report.findings[1].message, "no stub for 'buildB'");
    }

    #[test]
    fn check_bundle_sees_prelude_helpers_and_orphans() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "d/types.ts", "const img = (f: string) => buildUrl(f);\n");
        write_file(tmp.path(), "d/one.ts", "export const oneProducts = [{ image: img(\"1\") }];\n");
        write_file(tmp.path(), "d/draft.ts", "export const draft = [];\n");
        write_file(tmp.path(), "d/notes.md", "not a source");
        let bundle = Catalog::Bundle(BundleCatalog {
            group: Group::Products,
            dir: "d".into(),
            prelude: Some("types.ts".into()),
            imports: ImportMode::All,
            stubs: StubTable::pass_through(["buildUrl", "buildOther"]),
            parts: vec![BundlePart {
                file: "one.ts".into(),
                export: "oneProducts".into(),
                output: None,
            }],
            output_dir: "out".into(),
        });
        let report = check(tmp.path(), &config(vec![("d", bundle)]), &Selection::default()).unwrap();
        assert_eq!(report.errors(), 0, "{:?}", report.findings);
        let warnings: Vec<(&str, &str)> = report
            .findings
            .iter()
            .map(|f| (f.path.as_str(), f.message.as_str()))
            .collect();
        assert_eq!(
            warnings,
            vec![
                ("d", "stub 'buildOther' is never referenced"),
                ("d/draft.ts", "not referenced by any part of the bundle"),
            ]
        );
        assert_eq!(report.sources, 2);
    }
}

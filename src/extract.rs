//! Running one catalog: load its sources, evaluate them, shape the outputs.
//!
//! Nothing here writes files. [`extract_catalog`] returns every output of a
//! catalog as a [`PlannedFile`]; the orchestrator writes them only once the
//! whole catalog succeeded, so a failing catalog leaves no partial output.
//!
//! ## Source formats
//!
//! | Extension | Loaded by |
//! |-----------|-----------|
//! | `.ts` `.tsx` `.mts` `.js` `.mjs` | parse → neutralize imports → evaluate with stubs |
//! | `.json` | parse → resolve `$call` objects with stubs |
//! | `.toml` | parse → resolve `$call` tables with stubs |
//!
//! A data file's top-level keys play the role of a module's exports.

use crate::bucket::{BucketError, partition};
use crate::config::{
    BucketedCatalog, BundleCatalog, Catalog, CompositeCatalog, ExtractConfig, SingleCatalog, join,
};
use crate::emit::{EmitError, PlannedFile};
use crate::engine::{EvalError, ModuleRun, Session};
use crate::neutralize::{ImportMode, Neutralized, StubTable, neutralize};
use crate::resolve::{ResolveError, resolve};
use crate::source::{SourceError, parse_module};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How a source file is loaded, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Script,
    Json,
    Toml,
}

impl SourceFormat {
    pub fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "ts" | "tsx" | "mts" | "js" | "mjs" => Some(SourceFormat::Script),
            "json" => Some(SourceFormat::Json),
            "toml" => Some(SourceFormat::Toml),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("top level must be a table of named values")]
    NotATable,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("catalog '{catalog}': cannot read {path}: {source}")]
    Read {
        catalog: String,
        path: String,
        source: std::io::Error,
    },
    #[error("catalog '{catalog}': {path}: unsupported source format")]
    Format { catalog: String, path: String },
    #[error("catalog '{catalog}': {path}:{source}")]
    Parse {
        catalog: String,
        path: String,
        source: SourceError,
    },
    #[error("catalog '{catalog}': {path}:{source}")]
    Eval {
        catalog: String,
        path: String,
        source: EvalError,
    },
    #[error("catalog '{catalog}': {path}: {source}")]
    Data {
        catalog: String,
        path: String,
        source: DataError,
    },
    #[error("catalog '{catalog}': {source}")]
    Bucket {
        catalog: String,
        source: BucketError,
    },
    #[error("catalog '{catalog}': {source}")]
    Emit {
        catalog: String,
        source: EmitError,
    },
}

impl ExtractError {
    pub fn catalog(&self) -> &str {
        match self {
            ExtractError::Read { catalog, .. }
            | ExtractError::Format { catalog, .. }
            | ExtractError::Parse { catalog, .. }
            | ExtractError::Eval { catalog, .. }
            | ExtractError::Data { catalog, .. }
            | ExtractError::Bucket { catalog, .. }
            | ExtractError::Emit { catalog, .. } => catalog,
        }
    }
}

/// A loaded source: an evaluated module or a resolved data table.
pub(crate) enum Loaded {
    Script(ModuleRun),
    Data(Map<String, Json>),
}

/// File access and error wrapping for one catalog.
/// Resolve a relative import `specifier` against the directory of the
/// `/`-separated source path `rel`.
fn beside(rel: &str, specifier: &str) -> String {
    let mut parts: Vec<&str> = rel.split('/').collect();
    parts.pop();
    for segment in specifier.split('/') {
        match segment {
            "." | "" => {}
            ".." if parts.last().is_some_and(|p| *p != "..") => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

pub(crate) struct Context<'a> {
    root: &'a Path,
    catalog: &'a str,
}

impl<'a> Context<'a> {
    pub(crate) fn new(root: &'a Path, catalog: &'a str) -> Self {
        Self { root, catalog }
    }

    pub(crate) fn format(&self, rel: &str) -> Result<SourceFormat, ExtractError> {
        SourceFormat::of(Path::new(rel)).ok_or_else(|| ExtractError::Format {
            catalog: self.catalog.to_string(),
            path: rel.to_string(),
        })
    }

    pub(crate) fn read(&self, rel: &str) -> Result<String, ExtractError> {
        fs::read_to_string(self.root.join(rel)).map_err(|source| ExtractError::Read {
            catalog: self.catalog.to_string(),
            path: rel.to_string(),
            source,
        })
    }

    /// Parse a script source and strip the imports `imports` selects.
    pub(crate) fn script(&self, rel: &str, imports: &ImportMode) -> Result<Neutralized, ExtractError> {
        let text = self.read(rel)?;
        let module = parse_module(&text).map_err(|source| ExtractError::Parse {
            catalog: self.catalog.to_string(),
            path: rel.to_string(),
            source,
        })?;
        let neutralized = neutralize(module, imports);
        tracing::debug!(
            catalog = self.catalog,
            source = rel,
            stripped = neutralized.stripped.len(),
            leftover = neutralized.leftover.len(),
            json = neutralized.json.len(),
            "neutralized {imports}"
        );
        Ok(neutralized)
    }

    /// Bindings for the JSON documents a script imports. A default or
    /// namespace import binds the whole document, a named import its
    /// top-level key (null when absent).
    pub(crate) fn json_imports(&self, rel: &str, neutralized: &Neutralized) -> Result<Vec<(String, Json)>, ExtractError> {
        let mut data = Vec::new();
        for decl in &neutralized.json {
            let path = beside(rel, &decl.specifier);
            let text = self.read(&path)?;
            let doc: Json = serde_json::from_str(&text).map_err(|e| self.data_err(&path, e.into()))?;
            for name in &decl.bindings {
                let value = match decl.named.iter().find(|(_, local)| local == name) {
                    Some((imported, _)) => doc.get(imported).cloned().unwrap_or(Json::Null),
                    None => doc.clone(),
                };
                data.push((name.clone(), value));
            }
            tracing::debug!(catalog = self.catalog, source = rel, document = path, "bound JSON import");
        }
        Ok(data)
    }

    /// Parse a data source without resolving helper calls.
    pub(crate) fn raw_data(&self, rel: &str, format: SourceFormat) -> Result<Json, ExtractError> {
        let text = self.read(rel)?;
        let parsed: Result<Json, DataError> = match format {
            SourceFormat::Json => serde_json::from_str(&text).map_err(DataError::from),
            SourceFormat::Toml => toml::from_str(&text).map_err(DataError::from),
            SourceFormat::Script => {
                return Err(ExtractError::Format {
                    catalog: self.catalog.to_string(),
                    path: rel.to_string(),
                });
            }
        };
        parsed.map_err(|source| self.data_err(rel, source))
    }

    fn data(&self, rel: &str, format: SourceFormat, stubs: &StubTable) -> Result<Map<String, Json>, ExtractError> {
        let raw = self.raw_data(rel, format)?;
        match resolve(raw, stubs).map_err(|e| self.data_err(rel, e.into()))? {
            Json::Object(map) => Ok(map),
            _ => Err(self.data_err(rel, DataError::NotATable)),
        }
    }

    fn data_err(&self, rel: &str, source: DataError) -> ExtractError {
        ExtractError::Data {
            catalog: self.catalog.to_string(),
            path: rel.to_string(),
            source,
        }
    }

    fn eval_err(&self, rel: &str, source: EvalError) -> ExtractError {
        ExtractError::Eval {
            catalog: self.catalog.to_string(),
            path: rel.to_string(),
            source,
        }
    }

    /// Load and evaluate one source, optionally inside a bundle prelude.
    fn load(
        &self,
        session: &mut Session,
        prelude: Option<&ModuleRun>,
        rel: &str,
        imports: &ImportMode,
        stubs: &StubTable,
    ) -> Result<Loaded, ExtractError> {
        match self.format(rel)? {
            SourceFormat::Script => {
                let neutralized = self.script(rel, imports)?;
                let data = self.json_imports(rel, &neutralized)?;
                let run = match prelude {
                    Some(parent) => session.run_within(parent, rel, &neutralized.module, &data),
                    None => session.run(rel, &neutralized.module, &data),
                };
                run.map(Loaded::Script).map_err(|e| self.eval_err(rel, e))
            }
            format => self.data(rel, format, stubs).map(Loaded::Data),
        }
    }

    /// Requested values of a loaded source; every export when `requested`
    /// is empty. Missing names are absent from the result.
    fn exports(&self, rel: &str, loaded: &Loaded, requested: &[String]) -> Result<Map<String, Json>, ExtractError> {
        match loaded {
            Loaded::Script(run) => {
                let pairs = run.collect(requested).map_err(|e| self.eval_err(rel, e))?;
                Ok(pairs
                    .into_iter()
                    .filter_map(|(name, value)| value.map(|v| (name, v)))
                    .collect())
            }
            Loaded::Data(map) if requested.is_empty() => Ok(map.clone()),
            Loaded::Data(map) => Ok(requested
                .iter()
                .filter_map(|name| map.get(name).map(|v| (name.clone(), v.clone())))
                .collect()),
        }
    }

    /// Evaluate a standalone source and read `requested` from it.
    fn source_exports(
        &self,
        rel: &str,
        imports: &ImportMode,
        stubs: &StubTable,
        requested: &[String],
        earlier: &Map<String, Json>,
    ) -> Result<Map<String, Json>, ExtractError> {
        let mut session = Session::new(stubs, earlier);
        let loaded = self.load(&mut session, None, rel, imports, stubs)?;
        self.exports(rel, &loaded, requested)
    }

    fn missing(&self, rel: &str, export: &str, default: &Json) -> Json {
        tracing::warn!(
            catalog = self.catalog,
            source = rel,
            export,
            "export not found, writing {default}"
        );
        default.clone()
    }
}

fn empty_list() -> Json {
    Json::Array(Vec::new())
}

/// Compute every output file of `catalog` without writing anything.
pub fn extract_catalog(
    root: &Path,
    name: &str,
    catalog: &Catalog,
    config: &ExtractConfig,
) -> Result<Vec<PlannedFile>, ExtractError> {
    let cx = Context::new(root, name);
    tracing::debug!(catalog = name, kind = catalog.kind(), "extracting");
    match catalog {
        Catalog::Single(c) => single(&cx, c),
        Catalog::Bundle(c) => bundle(&cx, c),
        Catalog::Bucketed(c) => bucketed(&cx, c, config),
        Catalog::Composite(c) => composite(&cx, c),
    }
}

fn single(cx: &Context<'_>, c: &SingleCatalog) -> Result<Vec<PlannedFile>, ExtractError> {
    let mut found = cx.source_exports(&c.source, &c.imports, &c.stubs, &c.exports, &Map::new())?;
    let mut out = Map::new();
    for export in &c.exports {
        let value = match found.remove(export) {
            Some(value) => value,
            None => cx.missing(&c.source, export, &empty_list()),
        };
        out.insert(export.clone(), value);
    }
    Ok(vec![PlannedFile {
        path: PathBuf::from(&c.output),
        value: Json::Object(out),
    }])
}

fn bundle(cx: &Context<'_>, c: &BundleCatalog) -> Result<Vec<PlannedFile>, ExtractError> {
    let mut session = Session::new(&c.stubs, &Map::new());
    let prelude = match &c.prelude {
        Some(file) => {
            let rel = join(&c.dir, file);
            match cx.load(&mut session, None, &rel, &c.imports, &c.stubs)? {
                Loaded::Script(run) => Some(run),
                // validation only admits script preludes
                Loaded::Data(_) => None,
            }
        }
        None => None,
    };
    let mut files = Vec::with_capacity(c.parts.len());
    for part in &c.parts {
        let rel = join(&c.dir, &part.file);
        let loaded = cx.load(&mut session, prelude.as_ref(), &rel, &c.imports, &c.stubs)?;
        let mut found = cx.exports(&rel, &loaded, std::slice::from_ref(&part.export))?;
        let value = match found.remove(&part.export) {
            Some(value) => value,
            None => cx.missing(&rel, &part.export, &empty_list()),
        };
        files.push(PlannedFile {
            path: PathBuf::from(join(&c.output_dir, &part.output_name())),
            value,
        });
    }
    Ok(files)
}

fn bucketed(
    cx: &Context<'_>,
    c: &BucketedCatalog,
    config: &ExtractConfig,
) -> Result<Vec<PlannedFile>, ExtractError> {
    let requested = std::slice::from_ref(&c.export);
    let mut found = cx.source_exports(&c.source, &c.imports, &c.stubs, requested, &Map::new())?;
    let records = match found.remove(&c.export) {
        Some(Json::Array(items)) => items,
        Some(other) => {
            tracing::warn!(
                catalog = cx.catalog,
                source = %c.source,
                export = %c.export,
                "export is not a list ({}), writing empty buckets",
                json_type(&other)
            );
            Vec::new()
        }
        None => {
            cx.missing(&c.source, &c.export, &empty_list());
            Vec::new()
        }
    };
    let total = records.len();
    let bucketed = partition(records, &c.field, &c.buckets, config.policy_for(c)).map_err(|source| {
        ExtractError::Bucket {
            catalog: cx.catalog.to_string(),
            source,
        }
    })?;
    tracing::debug!(
        catalog = cx.catalog,
        total,
        unmatched = bucketed.unmatched.len(),
        "bucketed by {}",
        c.field
    );
    Ok(bucketed
        .buckets
        .into_iter()
        .map(|(rule, records)| PlannedFile {
            path: PathBuf::from(join(&c.output_dir, &rule.output)),
            value: Json::Array(records),
        })
        .collect())
}

fn composite(cx: &Context<'_>, c: &CompositeCatalog) -> Result<Vec<PlannedFile>, ExtractError> {
    // exports of every step so far, by name; later steps shadow earlier ones
    let mut produced = Map::new();
    let mut origin: HashMap<&str, &str> = HashMap::new();
    for step in &c.steps {
        let found = cx.source_exports(&step.source, &step.imports, &step.stubs, &step.exports, &produced)?;
        for export in &step.exports {
            origin.insert(export, &step.source);
        }
        produced.extend(found);
    }
    let mut out = Map::new();
    for field in &c.fields {
        let value = match produced.get(&field.export) {
            Some(value) => value.clone(),
            None => {
                let source = origin.get(field.export.as_str()).copied().unwrap_or("<no step>");
                cx.missing(source, &field.export, &field.default)
            }
        };
        insert_dotted(&mut out, &field.key, value);
    }
    Ok(vec![PlannedFile {
        path: PathBuf::from(&c.output),
        value: Json::Object(out),
    }])
}

/// `insert_dotted(map, "a.b", v)` sets `map.a.b = v`, creating `a`.
fn insert_dotted(map: &mut Map<String, Json>, key: &str, value: Json) {
    match key.split_once('.') {
        None => {
            map.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = map
                .entry(head.to_string())
                .or_insert_with(|| Json::Object(Map::new()));
            if !slot.is_object() {
                *slot = Json::Object(Map::new());
            }
            if let Json::Object(inner) = slot {
                insert_dotted(inner, rest, value);
            }
        }
    }
}

fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{BucketRule, UnknownPolicy};
    use crate::config::{BundlePart, Group, OutputField, SourceStep};
    use crate::neutralize::Stub;
    use crate::test_helpers::write_file;
    use serde_json::json;
    use tempfile::TempDir;

    fn config() -> ExtractConfig {
        ExtractConfig::default()
    }

    fn single_catalog(source: &str, stubs: StubTable, exports: &[&str]) -> Catalog {
        Catalog::Single(SingleCatalog {
            group: Group::Products,
            source: source.into(),
            imports: ImportMode::default(),
            stubs,
            exports: exports.iter().map(|s| s.to_string()).collect(),
            output: "out/content.json".into(),
        })
    }

    #[test]
    fn source_format_by_extension() {
        assert_eq!(SourceFormat::of(Path::new("a/data.ts")), Some(SourceFormat::Script));
        assert_eq!(SourceFormat::of(Path::new("data.json")), Some(SourceFormat::Json));
        assert_eq!(SourceFormat::of(Path::new("data.toml")), Some(SourceFormat::Toml));
        assert_eq!(SourceFormat::of(Path::new("data.yaml")), None);
        assert_eq!(SourceFormat::of(Path::new("README")), None);
    }

    #[test]
    fn single_source_with_stubbed_asset_calls() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "data.ts",
            r#"import { buildTrinnovUrl } from "@/lib/assets";
import type { Product } from "./types";

export const trinnovProducts: Product[] = [
  { name: "Altitude16", image: buildTrinnovUrl("altitude16.webp") },
];
"#,
        );
        let catalog = single_catalog("data.ts", StubTable::pass_through(["buildTrinnovUrl"]), &["trinnovProducts"]);
        let files = extract_catalog(tmp.path(), "trinnov", &catalog, &config()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("out/content.json"));
        assert_eq!(
            files[0].value,
            json!({"trinnovProducts": [{"name": "Altitude16", "image": "altitude16.webp"}]})
        );
    }

    #[test]
    fn missing_stub_fails_with_file_and_position() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "data.ts",
            "export const items = [\n  { image: buildOtherUrl(\"a.webp\") },\n];\n",
        );
        let catalog = single_catalog("data.ts", StubTable::new(), &["items"]);
        let err = extract_catalog(tmp.path(), "demo", &catalog, &config()).unwrap_err();
        let message = err.to_string();
        assert_eq!(err.catalog(), "demo");
        assert!(message.starts_with("catalog 'demo': data.ts:2:"), "{message}");
        assert!(message.contains("buildOtherUrl is not defined"), "{message}");
    }

    #[test]
    fn missing_export_uses_empty_list() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "data.ts", "export const other = 1;");
        let catalog = single_catalog("data.ts", StubTable::new(), &["items"]);
        let files = extract_catalog(tmp.path(), "demo", &catalog, &config()).unwrap();
        assert_eq!(files[0].value, json!({"items": []}));
    }

    #[test]
    fn json_and_toml_sources_resolve_helper_calls() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "data.json",
            r#"{"items": [{"image": {"$call": ["buildUrl", "a.webp"]}}], "ignored": true}"#,
        );
        write_file(
            tmp.path(),
            "data.toml",
            "[[items]]\nname = \"B\"\nimage = { \"$call\" = [\"buildUrl\", \"b.webp\"] }\n",
        );
        let stubs = StubTable::new().with("buildUrl", Stub::Prefix { prefix: "/img/".into() });
        for (file, expected) in [
            ("data.json", json!({"items": [{"image": "/img/a.webp"}]})),
            ("data.toml", json!({"items": [{"name": "B", "image": "/img/b.webp"}]})),
        ] {
            let catalog = single_catalog(file, stubs.clone(), &["items"]);
            let files = extract_catalog(tmp.path(), "demo", &catalog, &config()).unwrap();
            assert_eq!(files[0].value, expected, "{file}");
        }
    }

    #[test]
    fn relative_json_imports_are_read_beside_the_source() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "site/bearbricks/data.ts",
            r#"import content from "./content.json";
import { labels } from "../shared/labels.json";

const slugify = (value: string) =>
  value.toLowerCase().replace(/[^a-z0-9]+/g, "-").replace(/(^-|-$)/g, "");

export const items = (content as any).products.map((p) => ({ slug: slugify(p.name), label: labels[p.kind] }));
"#,
        );
        write_file(
            tmp.path(),
            "site/bearbricks/content.json",
            r#"{"products": [{"name": "Clear / Smoke 1000%", "kind": "figure"}]}"#,
        );
        write_file(tmp.path(), "site/shared/labels.json", r#"{"labels": {"figure": "Figure"}}"#);
        let catalog = single_catalog("site/bearbricks/data.ts", StubTable::new(), &["items"]);
        let files = extract_catalog(tmp.path(), "bearbricks", &catalog, &config()).unwrap();
        assert_eq!(
            files[0].value,
            json!({"items": [{"slug": "clear-smoke-1000", "label": "Figure"}]})
        );
    }

    #[test]
    fn missing_or_malformed_json_import_fails_the_source() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a/data.ts", "import content from \"./content.json\";\nexport const items = content;");
        let catalog = single_catalog("a/data.ts", StubTable::new(), &["items"]);
        let err = extract_catalog(tmp.path(), "demo", &catalog, &config()).unwrap_err();
        assert!(matches!(&err, ExtractError::Read { path, .. } if path == "a/content.json"), "{err}");

        write_file(tmp.path(), "a/content.json", "{ not json");
        let err = extract_catalog(tmp.path(), "demo", &catalog, &config()).unwrap_err();
        assert!(matches!(&err, ExtractError::Data { path, .. } if path == "a/content.json"), "{err}");
    }

    #[test]
    fn import_paths_resolve_against_the_source_directory() {
        assert_eq!(beside("a/b/data.ts", "./content.json"), "a/b/content.json");
        assert_eq!(beside("a/b/data.ts", "../c.json"), "a/c.json");
        assert_eq!(beside("data.ts", "./c.json"), "c.json");
        assert_eq!(beside("data.ts", "../c.json"), "../c.json");
    }

    #[test]
    fn unreadable_source_is_a_read_error() {
        let tmp = TempDir::new().unwrap();
        let catalog = single_catalog("missing.ts", StubTable::new(), &["items"]);
        let err = extract_catalog(tmp.path(), "demo", &catalog, &config()).unwrap_err();
        assert!(matches!(err, ExtractError::Read { .. }), "{err}");
    }

    #[test]
    fn bundle_parts_share_the_prelude_and_default_to_empty() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "data/types.ts",
            "export type Item = { name: string };\nconst IMG = \"k/\";\nconst img = (f: string) => IMG + buildUrl(f);\n",
        );
        write_file(
            tmp.path(),
            "data/speakers.ts",
            "import { Item } from \"./types\";\nexport const speakersProducts: Item[] = [{ name: \"S\", image: img(\"s.webp\") }];\n",
        );
        write_file(tmp.path(), "data/light.ts", "export const somethingElse = [];\n");
        let catalog = Catalog::Bundle(BundleCatalog {
            group: Group::Products,
            dir: "data".into(),
            prelude: Some("types.ts".into()),
            imports: ImportMode::All,
            stubs: StubTable::pass_through(["buildUrl"]),
            parts: vec![
                BundlePart {
                    file: "speakers.ts".into(),
                    export: "speakersProducts".into(),
                    output: None,
                },
                BundlePart {
                    file: "light.ts".into(),
                    export: "lightProducts".into(),
                    output: Some("lights.json".into()),
                },
            ],
            output_dir: "content".into(),
        });
        let files = extract_catalog(tmp.path(), "k-array", &catalog, &config()).unwrap();
        assert_eq!(files[0].path, PathBuf::from("content/speakers.json"));
        assert_eq!(files[0].value, json!([{"name": "S", "image": "k/s.webp"}]));
        assert_eq!(files[1].path, PathBuf::from("content/lights.json"));
        assert_eq!(files[1].value, json!([]));
    }

    fn bucketed_catalog(policy: Option<UnknownPolicy>) -> Catalog {
        Catalog::Bucketed(BucketedCatalog {
            group: Group::Products,
            source: "data.ts".into(),
            imports: ImportMode::default(),
            stubs: StubTable::new(),
            export: "aminaProducts".into(),
            field: "series".into(),
            buckets: vec![
                BucketRule {
                    value: "Edge".into(),
                    output: "edge.json".into(),
                },
                BucketRule {
                    value: "ALF".into(),
                    output: "alf.json".into(),
                },
            ],
            output_dir: "content".into(),
            on_unknown: policy,
        })
    }

    #[test]
    fn bucketed_catalog_writes_every_bucket() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "data.ts",
            r#"export const aminaProducts = [
  { name: "E1", series: "Edge" },
  { name: "R1", series: "Retro" },
  { name: "E2", series: "Edge" },
];"#,
        );
        let files = extract_catalog(tmp.path(), "amina", &bucketed_catalog(None), &config()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(
            files[0].value,
            json!([{"name": "E1", "series": "Edge"}, {"name": "E2", "series": "Edge"}])
        );
        assert_eq!(files[1].path, PathBuf::from("content/alf.json"));
        assert_eq!(files[1].value, json!([]));
    }

    #[test]
    fn bucketed_reject_policy_fails_the_catalog() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "data.ts", "export const aminaProducts = [{ series: \"Retro\" }];");
        let err = extract_catalog(
            tmp.path(),
            "amina",
            &bucketed_catalog(Some(UnknownPolicy::Reject)),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::Bucket { .. }));
        assert!(err.to_string().contains("\"Retro\""), "{err}");
    }

    #[test]
    fn bucketed_non_list_export_writes_empty_buckets() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "data.ts", "export const aminaProducts = { series: \"Edge\" };");
        let files = extract_catalog(tmp.path(), "amina", &bucketed_catalog(None), &config()).unwrap();
        assert!(files.iter().all(|f| f.value == json!([])));
    }

    #[test]
    fn composite_steps_feed_later_steps_and_nest_keys() {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "project-data.ts",
            "export const PROJECT_LIST = [{ title: \"Hall\", slug: \"hall\" }];\nexport const PROJECT_DETAIL_DEFAULT_ROLE = \"Design\";\n",
        );
        write_file(
            tmp.path(),
            "hero.ts",
            r#"import { PROJECT_LIST } from "./project-data";
export const TITLE_TO_SITE_IMAGE = Object.fromEntries(
  PROJECT_LIST.map((p) => [p.title, buildSiteUrl(`${p.slug}/hero.webp`)]),
);"#,
        );
        let catalog = Catalog::Composite(CompositeCatalog {
            group: Group::Pages,
            steps: vec![
                SourceStep {
                    source: "project-data.ts".into(),
                    imports: ImportMode::default(),
                    stubs: StubTable::new(),
                    exports: vec!["PROJECT_LIST".into(), "PROJECT_DETAIL_DEFAULT_ROLE".into()],
                },
                SourceStep {
                    source: "hero.ts".into(),
                    imports: ImportMode::All,
                    stubs: StubTable::pass_through(["buildSiteUrl"]).with(
                        "PROJECT_LIST",
                        Stub::FromExport {
                            export: "PROJECT_LIST".into(),
                            default: json!([]),
                        },
                    ),
                    exports: vec!["TITLE_TO_SITE_IMAGE".into()],
                },
            ],
            fields: vec![
                OutputField {
                    key: "experience".into(),
                    export: "PROJECT_EXPERIENCE".into(),
                    default: json!("10+ years"),
                },
                OutputField {
                    key: "detailDefaults.role".into(),
                    export: "PROJECT_DETAIL_DEFAULT_ROLE".into(),
                    default: json!(""),
                },
                OutputField {
                    key: "detailDefaults.keyProducts".into(),
                    export: "PROJECT_DETAIL_DEFAULT_KEY_PRODUCTS".into(),
                    default: json!([]),
                },
                OutputField {
                    key: "titleToSiteImage".into(),
                    export: "TITLE_TO_SITE_IMAGE".into(),
                    default: json!({}),
                },
            ],
            output: "content.json".into(),
        });
        let files = extract_catalog(tmp.path(), "projects", &catalog, &config()).unwrap();
        assert_eq!(
            files[0].value,
            json!({
                "experience": "10+ years",
                "detailDefaults": {"role": "Design", "keyProducts": []},
                "titleToSiteImage": {"Hall": "hall/hero.webp"}
            })
        );
    }

    #[test]
    fn insert_dotted_creates_and_reuses_objects() {
        let mut map = Map::new();
        insert_dotted(&mut map, "a.b", json!(1));
        insert_dotted(&mut map, "a.c.d", json!(2));
        insert_dotted(&mut map, "e", json!(3));
        assert_eq!(Json::Object(map), json!({"a": {"b": 1, "c": {"d": 2}}, "e": 3}));
    }
}

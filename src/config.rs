//! Catalog configuration.
//!
//! Loads, merges and validates `catalogs.toml`. The stock configuration
//! (every catalog the site ships, in run order) is embedded in the binary;
//! a `catalogs.toml` at the site root is merged on top of it, so a site only
//! writes the keys it wants to change.
//!
//! ## Config File Location
//!
//! ```text
//! site/
//! ├── catalogs.toml            # Optional overrides (or a full replacement)
//! ├── src/app/products/...     # Catalog sources
//! └── src/app/events/...
//! ```
//!
//! ## Merging
//!
//! - Tables merge key by key, so `[catalogs.amina] on_unknown = "reject"`
//!   changes one field of one stock catalog.
//! - Arrays and scalars replace the stock value entirely.
//! - New `[catalogs.<name>]` tables are appended after the stock catalogs.
//! - `stock = false` at the top level starts from an empty catalog list
//!   instead of the stock one.
//!
//! ## Catalog kinds
//!
//! ```toml
//! [catalogs.trinnov]                  # one source, one object of exports
//! group = "products"
//! kind = "single"
//! source = "src/app/products/trinnov/data.ts"
//! stubs = { buildTrinnovUrl = "pass-through" }
//! exports = ["trinnovProducts"]
//! output = "src/app/products/trinnov/content.json"
//! ```
//!
//! `bundle` (prelude + one file per part), `bucketed` (one list split by a
//! field) and `composite` (several source steps assembled into one object)
//! are documented in [`stock_config_toml`].
//!
//! Unknown keys are rejected everywhere.

use crate::bucket::{BucketRule, UnknownPolicy};
use crate::extract::SourceFormat;
use crate::neutralize::{ImportMode, Stub, StubTable};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path};
use thiserror::Error;

/// Name of the optional override file at the site root.
pub const CONFIG_FILE: &str = "catalogs.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// The half of the site a catalog belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Products,
    Pages,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Group::Products => "products",
            Group::Pages => "pages",
        })
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Start from the stock catalogs. Only meaningful in an override file.
    pub stock: bool,
    /// Unknown-bucket policy for bucketed catalogs that do not set their own.
    pub on_unknown: UnknownPolicy,
    /// Catalogs in run order.
    pub catalogs: IndexMap<String, Catalog>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            stock: true,
            on_unknown: UnknownPolicy::default(),
            catalogs: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Catalog {
    Single(SingleCatalog),
    Bundle(BundleCatalog),
    Bucketed(BucketedCatalog),
    Composite(CompositeCatalog),
}

/// One source; the output is an object of the requested exports.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SingleCatalog {
    pub group: Group,
    pub source: String,
    #[serde(default)]
    pub imports: ImportMode,
    #[serde(default)]
    pub stubs: StubTable,
    pub exports: Vec<String>,
    pub output: String,
}

/// A prelude plus part files; one output per part.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleCatalog {
    pub group: Group,
    /// Directory holding the prelude and the parts.
    pub dir: String,
    /// Shared declarations every part can see (e.g. `types.ts`).
    pub prelude: Option<String>,
    #[serde(default)]
    pub imports: ImportMode,
    #[serde(default)]
    pub stubs: StubTable,
    pub parts: Vec<BundlePart>,
    pub output_dir: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundlePart {
    pub file: String,
    pub export: String,
    /// Output file name; defaults to the part's file stem with `.json`.
    pub output: Option<String>,
}

impl BundlePart {
    pub fn output_name(&self) -> String {
        match &self.output {
            Some(name) => name.clone(),
            None => {
                let stem = Path::new(&self.file)
                    .file_stem()
                    .map_or_else(|| self.file.clone(), |s| s.to_string_lossy().into_owned());
                format!("{stem}.json")
            }
        }
    }
}

/// One source exporting a list that is split into buckets by `field`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketedCatalog {
    pub group: Group,
    pub source: String,
    #[serde(default)]
    pub imports: ImportMode,
    #[serde(default)]
    pub stubs: StubTable,
    pub export: String,
    pub field: String,
    pub buckets: Vec<BucketRule>,
    pub output_dir: String,
    /// Overrides the top-level `on_unknown`.
    pub on_unknown: Option<UnknownPolicy>,
}

/// Source steps whose exports are assembled into one output object.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositeCatalog {
    pub group: Group,
    pub steps: Vec<SourceStep>,
    pub fields: Vec<OutputField>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceStep {
    pub source: String,
    #[serde(default)]
    pub imports: ImportMode,
    #[serde(default)]
    pub stubs: StubTable,
    pub exports: Vec<String>,
}

/// `key` in the output object takes the value of `export`, or `default`
/// when the export is missing. Dotted keys nest: `detailDefaults.role`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputField {
    pub key: String,
    pub export: String,
    #[serde(default)]
    pub default: serde_json::Value,
}

/// A source file as seen by `check`: path, import mode and stubs.
#[derive(Debug, Clone, Copy)]
pub struct SourceRef<'a> {
    pub path: &'a str,
    pub imports: &'a ImportMode,
    pub stubs: &'a StubTable,
}

impl Catalog {
    pub fn group(&self) -> Group {
        match self {
            Catalog::Single(c) => c.group,
            Catalog::Bundle(c) => c.group,
            Catalog::Bucketed(c) => c.group,
            Catalog::Composite(c) => c.group,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Catalog::Single(_) => "single",
            Catalog::Bundle(_) => "bundle",
            Catalog::Bucketed(_) => "bucketed",
            Catalog::Composite(_) => "composite",
        }
    }

    /// Every source file the catalog reads, in evaluation order.
    pub fn sources(&self) -> Vec<SourceRef<'_>> {
        match self {
            Catalog::Single(c) => vec![SourceRef {
                path: &c.source,
                imports: &c.imports,
                stubs: &c.stubs,
            }],
            Catalog::Bucketed(c) => vec![SourceRef {
                path: &c.source,
                imports: &c.imports,
                stubs: &c.stubs,
            }],
            Catalog::Composite(c) => c
                .steps
                .iter()
                .map(|step| SourceRef {
                    path: &step.source,
                    imports: &step.imports,
                    stubs: &step.stubs,
                })
                .collect(),
            // Bundle paths are relative to `dir`; see `bundle_files`.
            Catalog::Bundle(_) => Vec::new(),
        }
    }

    /// Output paths relative to the site root, in write order.
    pub fn outputs(&self) -> Vec<String> {
        match self {
            Catalog::Single(c) => vec![c.output.clone()],
            Catalog::Composite(c) => vec![c.output.clone()],
            Catalog::Bundle(c) => c
                .parts
                .iter()
                .map(|part| join(&c.output_dir, &part.output_name()))
                .collect(),
            Catalog::Bucketed(c) => c
                .buckets
                .iter()
                .map(|rule| join(&c.output_dir, &rule.output))
                .collect(),
        }
    }
}

impl BundleCatalog {
    /// Prelude (if any) followed by the parts, as paths relative to the root.
    pub fn files(&self) -> Vec<String> {
        self.prelude
            .iter()
            .chain(self.parts.iter().map(|p| &p.file))
            .map(|file| join(&self.dir, file))
            .collect()
    }
}

/// Join two relative, `/`-separated paths.
pub fn join(dir: &str, file: &str) -> String {
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{}/{file}", dir.trim_end_matches('/'))
    }
}

// =============================================================================
// Validation
// =============================================================================

fn invalid(catalog: &str, message: impl fmt::Display) -> ConfigError {
    ConfigError::Validation(format!("catalog '{catalog}': {message}"))
}

/// Relative and inside the site root.
fn check_path(catalog: &str, what: &str, path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Err(invalid(catalog, format!("{what} must not be empty")));
    }
    let escapes = Path::new(path).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(invalid(
            catalog,
            format!("{what} '{path}' must be relative to the site root without '..'"),
        ));
    }
    Ok(())
}

fn check_source(catalog: &str, what: &str, path: &str) -> Result<(), ConfigError> {
    check_path(catalog, what, path)?;
    if SourceFormat::of(Path::new(path)).is_none() {
        return Err(invalid(
            catalog,
            format!("{what} '{path}' is not a .ts, .json or .toml file"),
        ));
    }
    Ok(())
}

fn check_unique<'a>(
    catalog: &str,
    what: &str,
    items: impl IntoIterator<Item = &'a str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item) {
            return Err(invalid(catalog, format!("duplicate {what} '{item}'")));
        }
    }
    Ok(())
}

fn check_non_empty<T>(catalog: &str, what: &str, items: &[T]) -> Result<(), ConfigError> {
    if items.is_empty() {
        return Err(invalid(catalog, format!("{what} must not be empty")));
    }
    Ok(())
}

impl ExtractConfig {
    /// Validate every catalog, then outputs across catalogs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut outputs: IndexMap<String, &str> = IndexMap::new();
        for (name, catalog) in &self.catalogs {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation("catalog names must not be empty".into()));
            }
            validate_catalog(name, catalog)?;
            for output in catalog.outputs() {
                check_path(name, "output", &output)?;
                if let Some(owner) = outputs.insert(output.clone(), name) {
                    return Err(invalid(
                        name,
                        format!("output '{output}' is also written by catalog '{owner}'"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Effective unknown-bucket policy for `catalog`.
    pub fn policy_for(&self, catalog: &BucketedCatalog) -> UnknownPolicy {
        catalog.on_unknown.unwrap_or(self.on_unknown)
    }
}

fn validate_catalog(name: &str, catalog: &Catalog) -> Result<(), ConfigError> {
    match catalog {
        Catalog::Single(c) => {
            check_source(name, "source", &c.source)?;
            check_non_empty(name, "exports", &c.exports)?;
            check_unique(name, "export", c.exports.iter().map(String::as_str))?;
        }
        Catalog::Bundle(c) => {
            check_path(name, "dir", &c.dir)?;
            check_path(name, "output_dir", &c.output_dir)?;
            if let Some(prelude) = &c.prelude {
                check_source(name, "prelude", prelude)?;
                if SourceFormat::of(Path::new(prelude)) != Some(SourceFormat::Script) {
                    return Err(invalid(name, format!("prelude '{prelude}' must be a .ts source")));
                }
            }
            check_non_empty(name, "parts", &c.parts)?;
            for part in &c.parts {
                check_source(name, "part", &part.file)?;
            }
            check_unique(name, "part file", c.parts.iter().map(|p| p.file.as_str()))?;
            let names: Vec<String> = c.parts.iter().map(BundlePart::output_name).collect();
            check_unique(name, "part output", names.iter().map(String::as_str))?;
        }
        Catalog::Bucketed(c) => {
            check_source(name, "source", &c.source)?;
            check_path(name, "output_dir", &c.output_dir)?;
            if c.field.is_empty() {
                return Err(invalid(name, "field must not be empty"));
            }
            check_non_empty(name, "buckets", &c.buckets)?;
            check_unique(name, "bucket value", c.buckets.iter().map(|b| b.value.as_str()))?;
            check_unique(name, "bucket output", c.buckets.iter().map(|b| b.output.as_str()))?;
        }
        Catalog::Composite(c) => {
            check_non_empty(name, "steps", &c.steps)?;
            check_non_empty(name, "fields", &c.fields)?;
            let mut produced: HashSet<&str> = HashSet::new();
            for step in &c.steps {
                check_source(name, "source", &step.source)?;
                for (stub_name, stub) in step.stubs.iter() {
                    if let Stub::FromExport { export, .. } = stub
                        && !produced.contains(export.as_str())
                    {
                        return Err(invalid(
                            name,
                            format!(
                                "stub '{stub_name}' in '{}' reads export '{export}', \
                                 which no earlier step produces",
                                step.source
                            ),
                        ));
                    }
                }
                produced.extend(step.exports.iter().map(String::as_str));
            }
            for field in &c.fields {
                if field.key.split('.').any(str::is_empty) {
                    return Err(invalid(name, format!("invalid output key '{}'", field.key)));
                }
                if !produced.contains(field.export.as_str()) {
                    return Err(invalid(
                        name,
                        format!(
                            "field '{}' reads export '{}', which no step produces",
                            field.key, field.export
                        ),
                    ));
                }
            }
            check_unique(name, "output key", c.fields.iter().map(|f| f.key.as_str()))?;
        }
    }
    Ok(())
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock configuration as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::from_str(stock_config_toml())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved, in their order.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                // merged in place so catalogs keep their run order
                match base_table.get_mut(&key) {
                    Some(base_val) => {
                        let taken = std::mem::replace(base_val, toml::Value::Boolean(false));
                        *base_val = merge_toml(taken, overlay_val);
                    }
                    None => {
                        base_table.insert(key, overlay_val);
                    }
                }
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
///
/// An overlay with `stock = false` replaces the base instead.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ExtractConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) if ov.get("stock").and_then(toml::Value::as_bool) == Some(false) => ov,
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ExtractConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the catalog configuration for the site at `root`.
///
/// Reads `explicit` when given (it must exist), otherwise
/// `<root>/catalogs.toml` if present, and merges it over the stock
/// configuration.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<ExtractConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = match explicit {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Some(toml::from_str(&content)?)
        }
        None => load_raw_config(&root.join(CONFIG_FILE))?,
    };
    resolve_config(base, overlay)
}

/// Returns the fully-commented stock `catalogs.toml`.
///
/// Used as the base configuration and by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Catalog Extraction Configuration
# =================================
# Every catalog the site ships, in run order. Place a catalogs.toml at the
# site root to override any key; tables merge key by key, arrays replace.
# Set `stock = false` in the override file to start from an empty list.
# Unknown keys will cause an error.

# Use the stock catalogs below as the base layer.
stock = true

# What bucketed catalogs do with records that match no bucket:
#   "drop"   - discard silently (debug log only)
#   "warn"   - discard with a warning naming the values
#   "reject" - fail the catalog; nothing is written
on_unknown = "warn"

# ---------------------------------------------------------------------------
# Single-source catalogs
# ---------------------------------------------------------------------------
# source  - data module, relative to the site root (.ts, .json or .toml)
# imports - which imports to strip before evaluation:
#             { module = "@/lib/assets" } (default) or "all"
# stubs   - stand-ins for external helpers, by name:
#             "pass-through"                      (file) => file
#             { kind = "prefix", prefix = "x/" }  (file) => "x/" + file
#             { kind = "constant", value = ... }  a fixed value
# exports - bindings to capture; the output is an object of them
[catalogs.bearbricks]
group = "products"
kind = "single"
source = "src/app/products/bearbricks/data.ts"
stubs = { buildBearbricksLifestyleUrl = "pass-through", buildBearbricksProductUrl = "pass-through" }
exports = ["bearbrickProducts"]
output = "src/app/products/bearbricks/content.json"

[catalogs.brionvega]
group = "products"
kind = "single"
source = "src/app/products/brionvega/data.ts"
stubs = { buildBrionvegaUrl = "pass-through" }
exports = ["brionvegaProducts"]
output = "src/app/products/brionvega/content.json"

[catalogs.trinnov]
group = "products"
kind = "single"
source = "src/app/products/trinnov/data.ts"
stubs = { buildTrinnovUrl = "pass-through" }
exports = ["trinnovProducts"]
output = "src/app/products/trinnov/content.json"

# ---------------------------------------------------------------------------
# Bundles: a prelude evaluated once, then each part in its own scope that
# can see the prelude's declarations. One output file per part; a part
# whose export is missing writes [].
# ---------------------------------------------------------------------------
[catalogs.k-array]
group = "products"
kind = "bundle"
dir = "src/app/products/k-array/data"
prelude = "types.ts"
imports = "all"
stubs = { buildKArraySpeakerUrl = "pass-through", buildKArraySubwooferUrl = "pass-through", buildKArrayMonitorUrl = "pass-through", buildKArraySystemUrl = "pass-through", buildKArrayUrl = "pass-through" }
output_dir = "src/app/products/k-array/content"
parts = [
  { file = "speakers.ts", export = "speakersProducts" },
  { file = "subwoofers.ts", export = "subwoofersProducts" },
  { file = "monitors.ts", export = "monitorsProducts" },
  { file = "systems.ts", export = "systemsProducts" },
  { file = "audio_light.ts", export = "audioLightProducts" },
  { file = "light.ts", export = "lightProducts" },
]

[catalogs.frogis]
group = "products"
kind = "bundle"
dir = "src/app/products/frogis/data"
prelude = "types.ts"
imports = "all"
stubs = { buildFrogisUrl = "pass-through" }
output_dir = "src/app/products/frogis/content"
parts = [
  { file = "point_source.ts", export = "pointSourceSpeakersProducts" },
  { file = "ceiling_speakers.ts", export = "ceilingSpeakersProducts" },
  { file = "subwoofers.ts", export = "subwoofersProducts" },
  { file = "microphones_headphones.ts", export = "microphonesHeadphonesProducts" },
  { file = "slimline_arrays.ts", export = "slimlineArraysProducts" },
  { file = "high_performance_arrays.ts", export = "highPerformanceArraysProducts" },
]

# ---------------------------------------------------------------------------
# Bucketed catalogs: one exported list split by a discriminant field.
# Buckets are written even when empty. on_unknown may be set per catalog.
# ---------------------------------------------------------------------------
[catalogs.amina]
group = "products"
kind = "bucketed"
source = "src/app/products/amina/data.ts"
stubs = { buildAminaUrl = "pass-through" }
export = "aminaProducts"
field = "series"
output_dir = "src/app/products/amina/content"
buckets = [
  { value = "Edge", output = "edge.json" },
  { value = "Mobius", output = "mobius.json" },
  { value = "Sapphire", output = "sapphire.json" },
  { value = "ALF", output = "alf.json" },
]

[catalogs.k-gear]
group = "products"
kind = "bucketed"
source = "src/app/products/k-gear/data.ts"
stubs = { buildKGearUrl = "pass-through" }
export = "kgearProducts"
field = "category"
output_dir = "src/app/products/k-gear/content"
buckets = [
  { value = "Systems", output = "systems.json" },
  { value = "Speakers", output = "speakers.json" },
  { value = "Subwoofers", output = "subwoofers.json" },
]

# ---------------------------------------------------------------------------
# Composite catalogs: source steps run in order, then `fields` assemble the
# output object. A later step can read an earlier step's export through a
#   { kind = "from-export", export = "NAME", default = ... }
# stub. Dotted keys nest; `default` is used when the export is missing.
# ---------------------------------------------------------------------------
[catalogs.events]
group = "pages"
kind = "composite"
output = "src/app/events/content.json"
steps = [
  { source = "src/app/events/data.ts", stubs = { buildEventsUrl = "pass-through" }, exports = ["EVENT_SUMMARIES", "EVENT_DETAILS"] },
]
fields = [
  { key = "summaries", export = "EVENT_SUMMARIES", default = [] },
  { key = "details", export = "EVENT_DETAILS", default = {} },
]

[catalogs.projects]
group = "pages"
kind = "composite"
output = "src/app/projects/content.json"
steps = [
  { source = "src/app/projects/project-data.ts", stubs = { buildGeneralImageUrl = "pass-through", buildProjectSiteUrl = "pass-through" }, exports = ["PROJECT_SECTIONS", "PROJECT_EXPERIENCE", "PROJECT_DETAIL_DEFAULT_ROLE", "PROJECT_DETAIL_DEFAULT_KEY_PRODUCTS", "PROJECT_DETAIL_OVERRIDES", "PROJECT_LIST"] },
  { source = "src/app/projects/project-hero-images.ts", imports = "all", stubs = { buildGeneralImageUrl = "pass-through", buildProjectSiteUrl = "pass-through", PROJECT_LIST = { kind = "from-export", export = "PROJECT_LIST", default = [] } }, exports = ["TITLE_TO_SITE_IMAGE"] },
]
fields = [
  { key = "sections", export = "PROJECT_SECTIONS", default = {} },
  { key = "experience", export = "PROJECT_EXPERIENCE", default = "10+ years" },
  { key = "detailDefaults.role", export = "PROJECT_DETAIL_DEFAULT_ROLE", default = "" },
  { key = "detailDefaults.keyProducts", export = "PROJECT_DETAIL_DEFAULT_KEY_PRODUCTS", default = [] },
  { key = "detailOverrides", export = "PROJECT_DETAIL_OVERRIDES", default = {} },
  { key = "titleToSiteImage", export = "TITLE_TO_SITE_IMAGE", default = {} },
]
"##
}

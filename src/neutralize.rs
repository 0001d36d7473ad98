//! Import stripping, stub tables and static reference analysis.
//!
//! A catalog source imports asset-URL helpers (and sometimes types, JSON or
//! sibling modules) that do not exist outside the web build. Neutralizing a
//! parsed module removes those import declarations from the tree and records
//! them; the catalog's [`StubTable`] then supplies stand-in bindings when the
//! module is evaluated.
//!
//! ## Import modes
//!
//! | Mode | Removes |
//! |------|---------|
//! | `{ module = "@/lib/assets" }` | imports whose specifier equals the alias (default) |
//! | `"all"` | every import declaration |
//!
//! `import type` declarations are always removed: they have no runtime
//! meaning. Imports that stay are bound as "unavailable import" markers
//! during evaluation unless a stub of the same name covers them.
//!
//! ## Stub kinds
//!
//! ```toml
//! [catalogs.stubs]
//! buildTrinnovUrl = "pass-through"                        # (file) => file
//! buildCdnUrl = { kind = "prefix", prefix = "cdn/" }      # (file) => "cdn/" + file
//! SITE_NAME = { kind = "constant", value = "Example" }    # plain value binding
//! PROJECT_LIST = { kind = "from-export", export = "PROJECT_LIST", default = [] }
//! ```

use crate::engine::BUILTIN_GLOBALS;
use crate::source::ast::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Alias under which the site's asset-URL helpers live.
pub const DEFAULT_ASSET_MODULE: &str = "@/lib/assets";

/// Which import declarations to strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Strip only imports from this specifier.
    Module(String),
    /// Strip every import.
    All,
}

impl Default for ImportMode {
    fn default() -> Self {
        ImportMode::Module(DEFAULT_ASSET_MODULE.to_string())
    }
}

impl ImportMode {
    fn strips(&self, decl: &ImportDecl) -> bool {
        match self {
            ImportMode::All => true,
            ImportMode::Module(specifier) => decl.type_only || decl.specifier == *specifier,
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::All => write!(f, "all imports"),
            ImportMode::Module(specifier) => write!(f, "imports from {specifier}"),
        }
    }
}

/// Stand-in for one external binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Stub {
    /// A function returning its first argument.
    PassThrough,
    /// A function returning `prefix` joined with its first argument.
    Prefix { prefix: String },
    /// A fixed value.
    Constant { value: serde_json::Value },
    /// A value exported by an earlier source step of the same catalog.
    FromExport {
        export: String,
        #[serde(default)]
        default: serde_json::Value,
    },
}

impl Stub {
    pub fn kind(&self) -> &'static str {
        match self {
            Stub::PassThrough => "pass-through",
            Stub::Prefix { .. } => "prefix",
            Stub::Constant { .. } => "constant",
            Stub::FromExport { .. } => "from-export",
        }
    }
}

/// Stub as written in configuration: either a bare kind name or a table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StubRepr {
    Short(String),
    Full(Stub),
}

/// Helper name → stub, for one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, StubRepr>",
    into = "BTreeMap<String, Stub>"
)]
pub struct StubTable(BTreeMap<String, Stub>);

impl TryFrom<BTreeMap<String, StubRepr>> for StubTable {
    type Error = String;

    fn try_from(raw: BTreeMap<String, StubRepr>) -> Result<Self, Self::Error> {
        let mut table = BTreeMap::new();
        for (name, repr) in raw {
            let stub = match repr {
                StubRepr::Full(stub) => stub,
                StubRepr::Short(kind) if kind == "pass-through" => Stub::PassThrough,
                StubRepr::Short(kind) => {
                    return Err(format!(
                        "stub `{name}`: `{kind}` needs a table; only \"pass-through\" may be written as a string"
                    ));
                }
            };
            table.insert(name, stub);
        }
        Ok(StubTable(table))
    }
}

impl From<StubTable> for BTreeMap<String, Stub> {
    fn from(table: StubTable) -> Self {
        table.0
    }
}

impl StubTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of pass-through stubs for the given helper names.
    pub fn pass_through<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StubTable(
            names
                .into_iter()
                .map(|n| (n.into(), Stub::PassThrough))
                .collect(),
        )
    }

    pub fn with(mut self, name: impl Into<String>, stub: Stub) -> Self {
        self.0.insert(name.into(), stub);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Stub> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Stub)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A module with its imports removed, plus the record of what was removed.
#[derive(Debug, Clone)]
pub struct Neutralized {
    pub module: Module,
    pub stripped: Vec<ImportDecl>,
    /// Imports that stay in the tree; their bindings evaluate to
    /// "unavailable import" markers.
    pub leftover: Vec<ImportDecl>,
    /// Relative `.json` imports, whatever the mode. The loader reads the
    /// documents and binds them in place of the import.
    pub json: Vec<ImportDecl>,
}

/// `./x.json` or `../x.json`: a data document next to the module.
pub fn is_json_import(decl: &ImportDecl) -> bool {
    !decl.type_only
        && (decl.specifier.starts_with("./") || decl.specifier.starts_with("../"))
        && decl.specifier.ends_with(".json")
}

/// Remove the import declarations selected by `mode` from `module`.
pub fn neutralize(module: Module, mode: &ImportMode) -> Neutralized {
    let mut stripped = Vec::new();
    let mut leftover = Vec::new();
    let mut json = Vec::new();
    let mut items = Vec::with_capacity(module.items.len());
    for item in module.items {
        match item {
            Item::Import(decl) if is_json_import(&decl) => json.push(decl),
            Item::Import(decl) if mode.strips(&decl) => stripped.push(decl),
            Item::Import(decl) => {
                leftover.push(decl.clone());
                items.push(Item::Import(decl));
            }
            other => items.push(other),
        }
    }
    Neutralized {
        module: Module { items },
        stripped,
        leftover,
        json,
    }
}

// =============================================================================
// Static reference analysis
// =============================================================================

/// An identifier read that no declaration in scope accounts for.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeReference {
    pub name: String,
    pub span: Span,
    /// Used directly as a callee: `name(...)`.
    pub called: bool,
}

/// Every free identifier reference in `module`, in source order.
///
/// Import bindings do not count as declarations: they are exactly the
/// names that must be stubbed (or that fail as unavailable imports).
pub fn free_references(module: &Module) -> Vec<FreeReference> {
    let mut walker = Walker::default();
    walker.scopes.push(module_declarations(module));
    for item in &module.items {
        match item {
            Item::Import(_) | Item::ExportList(_) => {}
            Item::Declare(decl) => walker.bindings(&decl.bindings),
            Item::Function(decl) => walker.function(&decl.func),
            Item::ExportDefault(expr) | Item::Expr(expr) => walker.expr(expr),
            Item::Stmt(stmt) => walker.stmts(std::slice::from_ref(stmt)),
        }
    }
    // `export { a }` reads `a` too.
    for item in &module.items {
        if let Item::ExportList(specs) = item {
            for spec in specs {
                if !walker.declared(&spec.local) {
                    walker.found.push(FreeReference {
                        name: spec.local.clone(),
                        span: Span::default(),
                        called: false,
                    });
                }
            }
        }
    }
    walker.found
}

/// Callee names the module calls without declaring them, sorted and unique.
/// Language builtins such as `Boolean` or `String` are not external.
pub fn external_calls(module: &Module) -> Vec<String> {
    free_references(module)
        .into_iter()
        .filter(|r| r.called && !BUILTIN_GLOBALS.contains(&r.name.as_str()))
        .map(|r| r.name)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// External calls with no stub in `stubs`.
pub fn missing_stubs(module: &Module, stubs: &StubTable) -> Vec<String> {
    external_calls(module)
        .into_iter()
        .filter(|name| !stubs.contains(name))
        .collect()
}

/// Stubs the module never references.
pub fn unused_stubs(module: &Module, stubs: &StubTable) -> Vec<String> {
    let referenced: HashSet<String> = free_references(module)
        .into_iter()
        .map(|r| r.name)
        .collect();
    stubs
        .iter()
        .map(|(name, _)| name)
        .filter(|name| !referenced.contains(*name))
        .cloned()
        .collect()
}

/// Bindings of leftover imports that the module reads and no stub covers.
/// Evaluating a module with any of these fails.
pub fn unavailable_imports(neutralized: &Neutralized, stubs: &StubTable) -> Vec<(String, String)> {
    let referenced: HashSet<String> = free_references(&neutralized.module)
        .into_iter()
        .map(|r| r.name)
        .collect();
    let mut out = Vec::new();
    for decl in &neutralized.leftover {
        if decl.type_only {
            continue;
        }
        for name in &decl.bindings {
            if referenced.contains(name) && !stubs.contains(name) {
                out.push((name.clone(), decl.specifier.clone()));
            }
        }
    }
    out
}

/// Names a module declares at top level (not counting imports).
pub fn module_declarations(module: &Module) -> HashSet<String> {
    let mut names = HashSet::new();
    for item in &module.items {
        match item {
            Item::Declare(decl) => {
                for binding in &decl.bindings {
                    names.extend(binding.target.names().into_iter().map(String::from));
                }
            }
            Item::Function(decl) => {
                if let Some(name) = &decl.func.name {
                    names.insert(name.clone());
                }
            }
            Item::Stmt(stmt) => block_declarations(std::slice::from_ref(stmt), &mut names),
            _ => {}
        }
    }
    names
}

fn block_declarations(stmts: &[Stmt], names: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Declare(_, bindings) => {
                for binding in bindings {
                    names.extend(binding.target.names().into_iter().map(String::from));
                }
            }
            Stmt::If {
                consequent,
                alternate,
                ..
            } => {
                block_declarations(consequent, names);
                block_declarations(alternate, names);
            }
            Stmt::ForOf { target, body, .. } => {
                names.extend(target.names().into_iter().map(String::from));
                block_declarations(body, names);
            }
            Stmt::Return(_) | Stmt::Expr(_) | Stmt::Break | Stmt::Continue => {}
        }
    }
}

#[derive(Default)]
struct Walker {
    scopes: Vec<HashSet<String>>,
    found: Vec<FreeReference>,
}

impl Walker {
    fn declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|s| s.contains(name))
    }

    fn reference(&mut self, name: &str, span: Span, called: bool) {
        if !self.declared(name) {
            self.found.push(FreeReference {
                name: name.to_string(),
                span,
                called,
            });
        }
    }

    fn bindings(&mut self, bindings: &[Binding]) {
        for binding in bindings {
            self.pattern_defaults(&binding.target);
            if let Some(init) = &binding.init {
                self.expr(init);
            }
        }
    }

    fn pattern_defaults(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::Ident(_) => {}
            Pattern::Array(elems) => {
                for elem in elems.iter().flatten() {
                    self.pattern_defaults(&elem.target);
                    if let Some(default) = &elem.default {
                        self.expr(default);
                    }
                }
            }
            Pattern::Object(props) => {
                for prop in props {
                    self.pattern_defaults(&prop.target);
                    if let Some(default) = &prop.default {
                        self.expr(default);
                    }
                }
            }
        }
    }

    fn function(&mut self, func: &Function) {
        let mut names = HashSet::new();
        if let Some(name) = &func.name {
            names.insert(name.clone());
        }
        for param in &func.params {
            names.extend(param.target.names().into_iter().map(String::from));
        }
        if let FunctionBody::Block(stmts) = &func.body {
            block_declarations(stmts, &mut names);
        }
        self.scopes.push(names);
        for param in &func.params {
            self.pattern_defaults(&param.target);
            if let Some(default) = &param.default {
                self.expr(default);
            }
        }
        match &func.body {
            FunctionBody::Expr(expr) => self.expr(expr),
            FunctionBody::Block(stmts) => self.stmts(stmts),
        }
        self.scopes.pop();
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::Declare(_, bindings) => self.bindings(bindings),
                Stmt::Return(Some(expr)) | Stmt::Expr(expr) => self.expr(expr),
                Stmt::Return(None) | Stmt::Break | Stmt::Continue => {}
                Stmt::ForOf {
                    target,
                    iterable,
                    body,
                    ..
                } => {
                    self.expr(iterable);
                    self.pattern_defaults(target);
                    self.stmts(body);
                }
                Stmt::If {
                    test,
                    consequent,
                    alternate,
                } => {
                    self.expr(test);
                    self.stmts(consequent);
                    self.stmts(alternate);
                }
            }
        }
    }

    fn elements(&mut self, elements: &[Element]) {
        for element in elements {
            match element {
                Element::Item(e) | Element::Spread(e) => self.expr(e),
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Undefined
            | ExprKind::Null
            | ExprKind::Bool(_)
            | ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::Regex(_) => {}
            ExprKind::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Expr(e) = part {
                        self.expr(e);
                    }
                }
            }
            ExprKind::Array(elements) => self.elements(elements),
            ExprKind::Object(props) => {
                for prop in props {
                    match prop {
                        Property::KeyValue(_, e) | Property::Spread(e) => self.expr(e),
                    }
                }
            }
            ExprKind::Ident(name) => self.reference(name, expr.span, false),
            ExprKind::Member { object, .. } => self.expr(object),
            ExprKind::Index { object, index, .. } => {
                self.expr(object);
                self.expr(index);
            }
            ExprKind::Call { callee, args } => {
                match &callee.kind {
                    ExprKind::Ident(name) => self.reference(name, callee.span, true),
                    _ => self.expr(callee),
                }
                self.elements(args);
            }
            ExprKind::Function(func) => self.function(func),
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test);
                self.expr(consequent);
                self.expr(alternate);
            }
            ExprKind::Assign { target, value } => {
                self.expr(target);
                self.expr(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::parse_module;

    const SOURCE: &str = r#"
import { buildAminaUrl } from "@/lib/assets";
import type { Product } from "./types";
import content from "./content.json";

const IMG = (file: string) => buildAminaUrl(`amina/${file}`);

export const aminaProducts: Product[] = [
  { name: "Edge", image: IMG("edge.jpg"), hero: buildHeroUrl("x") },
];
"#;

    #[test]
    fn module_mode_strips_only_the_alias_and_type_imports() {
        let source = format!("{SOURCE}import {{ other }} from \"./other\";\n");
        let n = neutralize(parse_module(&source).unwrap(), &ImportMode::default());
        assert_eq!(n.stripped.len(), 2);
        assert_eq!(n.leftover.len(), 1);
        assert_eq!(n.leftover[0].specifier, "./other");
        assert_eq!(
            n.module
                .items
                .iter()
                .filter(|i| matches!(i, Item::Import(_)))
                .count(),
            1
        );
    }

    #[test]
    fn all_mode_strips_everything_but_json_documents() {
        let n = neutralize(parse_module(SOURCE).unwrap(), &ImportMode::All);
        assert_eq!(n.stripped.len(), 2);
        assert!(n.leftover.is_empty());
        assert_eq!(n.json.len(), 1);
        assert!(!n.module.items.iter().any(|i| matches!(i, Item::Import(_))));
    }

    #[test]
    fn relative_json_imports_are_set_aside_in_any_mode() {
        let source = r#"
import content from "./content.json";
import { products as list } from "../shared/catalog.json";
import type { Shape } from "./shape.json";
import remote from "@/data/remote.json";
"#;
        let n = neutralize(parse_module(source).unwrap(), &ImportMode::default());
        let specifiers: Vec<&str> = n.json.iter().map(|d| d.specifier.as_str()).collect();
        assert_eq!(specifiers, ["./content.json", "../shared/catalog.json"]);
        assert_eq!(n.json[1].named, vec![("products".to_string(), "list".to_string())]);
        assert_eq!(n.leftover.len(), 1);
        assert_eq!(n.leftover[0].specifier, "@/data/remote.json");
    }

    #[test]
    fn external_calls_ignore_locals_and_params() {
        let module = parse_module(SOURCE).unwrap();
        assert_eq!(external_calls(&module), vec!["buildAminaUrl", "buildHeroUrl"]);
    }

    #[test]
    fn missing_and_unused_stubs() {
        let module = parse_module(SOURCE).unwrap();
        let stubs = StubTable::pass_through(["buildAminaUrl", "buildUnused"]);
        assert_eq!(missing_stubs(&module, &stubs), vec!["buildHeroUrl"]);
        assert_eq!(unused_stubs(&module, &stubs), vec!["buildUnused"]);
    }

    #[test]
    fn builtins_are_not_external() {
        let module =
            parse_module("export const xs = [1, 0].filter(Boolean).map((n) => String(n));")
                .unwrap();
        assert!(external_calls(&module).is_empty());
    }

    #[test]
    fn destructured_parameters_shadow_outer_names() {
        let module = parse_module(
            "export const m = Object.entries(raw).map(([title, build]) => build(title));",
        )
        .unwrap();
        assert!(external_calls(&module).is_empty());
        let names: Vec<String> = free_references(&module).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Object", "raw"]);
    }

    #[test]
    fn loop_variables_are_not_external() {
        let module = parse_module(
            r#"
const out = [];
for (const [name, build] of helpers) {
  out.push(build(name.replace(/\s+/g, "-")));
}
const total = (xs) => { let n = 0; for (const x of xs) { n += size(x); } return n; };
"#,
        )
        .unwrap();
        assert_eq!(external_calls(&module), vec!["size"]);
        let names: Vec<String> = free_references(&module).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["helpers", "size"]);
    }

    #[test]
    fn unavailable_imports_are_reported_when_read() {
        let source = r#"
import content from "./content";
import { unused } from "./other";
export const map = content.titleToSiteImage;
"#;
        let n = neutralize(parse_module(source).unwrap(), &ImportMode::default());
        assert_eq!(
            unavailable_imports(&n, &StubTable::new()),
            vec![("content".to_string(), "./content".to_string())]
        );
        let covered = StubTable::new().with(
            "content",
            Stub::Constant {
                value: serde_json::json!({}),
            },
        );
        assert!(unavailable_imports(&n, &covered).is_empty());
    }

    #[test]
    fn stub_table_accepts_short_and_full_forms() {
        let table: StubTable = toml::from_str(
            r#"
buildA = "pass-through"
buildB = { kind = "prefix", prefix = "cdn/" }
LIST = { kind = "from-export", export = "PROJECT_LIST", default = [] }
"#,
        )
        .unwrap();
        assert_eq!(table.get("buildA"), Some(&Stub::PassThrough));
        assert_eq!(
            table.get("buildB"),
            Some(&Stub::Prefix {
                prefix: "cdn/".into()
            })
        );
        assert_eq!(table.get("LIST").map(Stub::kind), Some("from-export"));
    }

    #[test]
    fn stub_table_rejects_unknown_short_form() {
        let result: Result<StubTable, _> = toml::from_str(r#"buildA = "prefix""#);
        assert!(result.is_err());
    }

    #[test]
    fn import_mode_serde_forms() {
        #[derive(Deserialize)]
        struct Holder {
            imports: ImportMode,
        }
        let all: Holder = toml::from_str(r#"imports = "all""#).unwrap();
        assert_eq!(all.imports, ImportMode::All);
        let module: Holder = toml::from_str(r#"imports = { module = "@/lib/cdn" }"#).unwrap();
        assert_eq!(module.imports, ImportMode::Module("@/lib/cdn".into()));
    }
}

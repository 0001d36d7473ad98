//! # Catalog Extract
//!
//! Build-time extraction of a website's product and content catalogs into
//! static JSON. Catalog sources are hand-authored declarative TypeScript
//! modules: typed array literals of records whose image fields are built by
//! asset-URL helper calls. They are read outside the web build, so their
//! imports are stripped, the helpers are replaced by stubs, and the module
//! is evaluated in an isolated scope by a small tree-walking evaluator.
//!
//! # Pipeline
//!
//! ```text
//! data.ts ──parse──▶ syntax tree ──neutralize──▶ tree without imports
//!                                                    │
//!                     stubs ─────────────────────────┤ evaluate
//!                                                    ▼
//!                                            exported records
//!                                                    │ (bucket)
//!                                                    ▼
//!                                          content/*.json on disk
//! ```
//!
//! Plain `.json` and `.toml` sources skip parsing and evaluation; their
//! `{"$call": [helper, args...]}` objects are resolved against the same stubs.
//! A script may itself import a relative `.json` document; that import
//! survives stripping and is read beside the script.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`source`] | Lexer, syntax tree and parser for the declarative TypeScript subset |
//! | [`neutralize`] | Import stripping, stub tables, static stub-coverage analysis |
//! | [`engine`] | Isolated evaluation: scopes, values, builtins, export capture |
//! | [`resolve`] | `$call` resolution for JSON/TOML sources |
//! | [`bucket`] | Splitting one record list into fixed buckets by a field |
//! | [`emit`] | Deterministic JSON output with digests and change detection |
//! | [`extract`] | One catalog: load sources, evaluate, shape output files |
//! | [`orchestrate`] | Running and checking catalogs in configured order |
//! | [`config`] | Stock catalogs, `catalogs.toml` merging and validation |
//! | [`guard`] | Checked string repetition |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Structural Import Stripping
//!
//! Imports are removed from the parsed tree, not with text patterns, so
//! multi-line, default, namespace and type-only imports are all handled the
//! same way. An import that is kept but never stubbed fails only when it is
//! read, with an error naming the specifier.
//!
//! ## No Ambient Authority
//!
//! The evaluator knows literals, constants, small helper functions and a
//! handful of array/object/string builtins. There is no file system, no
//! network and no timer in the language, so evaluating a catalog cannot
//! touch anything but its own values.
//!
//! ## All Or Nothing Per Catalog
//!
//! A catalog computes every output before writing any. The first failing
//! catalog stops the run and names the file, line and column. Re-running an
//! unchanged catalog reproduces its files byte for byte.

pub mod bucket;
pub mod config;
pub mod emit;
pub mod engine;
pub mod extract;
pub mod guard;
pub mod neutralize;
pub mod orchestrate;
pub mod output;
pub mod resolve;
pub mod source;

#[cfg(test)]
pub(crate) mod test_helpers;

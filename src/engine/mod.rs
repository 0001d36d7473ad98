//! Evaluation of neutralized data modules.
//!
//! A [`Session`] owns a global scope holding the builtins and, in a child
//! scope above every module, the stubs standing in for external helpers.
//! Running a module yields a [`ModuleRun`]: its scope plus the export map,
//! from which requested names are read and converted to JSON.
//!
//! ```text
//! builtins ─▶ stubs ─▶ module scope            (single source)
//! builtins ─▶ stubs ─▶ prelude ─▶ part scope   (bundle part)
//! ```
//!
//! Bundle parts see everything the prelude declares, exported or not.
//! Closures keep their defining scope alive, so a module's scopes live as
//! long as any function value created in them.
//!
//! JSON documents a module imports (`import content from "./content.json"`)
//! are read by the caller and handed to [`Session::run`] as data bindings;
//! they are bound as constants in the module scope before its code runs.

pub mod builtins;
pub mod eval;
pub mod scope;
pub mod value;

pub use builtins::BUILTIN_GLOBALS;
pub use value::{CircularJson, Value};

use crate::neutralize::{Stub, StubTable};
use crate::source::ast::{Module, Span};
use eval::Evaluator;
use indexmap::IndexMap;
use scope::{Scope, Slot};
use serde_json::{Map, Value as Json};
use std::rc::Rc;
use thiserror::Error;
use value::Callable;

/// Nesting limit for user function calls.
pub const MAX_CALL_DEPTH: usize = 64;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("{span}: ReferenceError: {name} is not defined")]
    NotDefined { name: String, span: Span },
    #[error("{span}: ReferenceError: cannot access '{name}' before initialization")]
    Uninitialized { name: String, span: Span },
    #[error(
        "{span}: '{name}' is imported from '{specifier}', which is not available; \
         add a stub for it or strip the import"
    )]
    UnavailableImport {
        name: String,
        specifier: String,
        span: Span,
    },
    #[error("{span}: SyntaxError: identifier '{name}' has already been declared")]
    Redeclared { name: String, span: Span },
    #[error("{span}: TypeError: {message}")]
    Type { span: Span, message: String },
    #[error("{span}: RangeError: {message}")]
    Range { span: Span, message: String },
    #[error("TypeError: {source} (reading '{name}')")]
    Circular { name: String, source: CircularJson },
}

/// Evaluation context shared by the sources of one catalog.
pub struct Session {
    evaluator: Evaluator,
    globals: Rc<Scope>,
}

impl Session {
    /// Builtins plus `stubs`. `from-export` stubs read `earlier`, the
    /// exports of sources evaluated before this one.
    pub fn new(stubs: &StubTable, earlier: &Map<String, Json>) -> Self {
        let builtins_scope = Scope::root();
        builtins::install(&builtins_scope);
        let globals = Scope::child(&builtins_scope);
        for (name, stub) in stubs.iter() {
            let value = match stub {
                Stub::PassThrough | Stub::Prefix { .. } => Value::Function(Rc::new(Callable::Stub {
                    name: name.clone(),
                    stub: stub.clone(),
                })),
                Stub::Constant { value } => Value::from_json(value),
                Stub::FromExport { export, default } => {
                    Value::from_json(earlier.get(export).unwrap_or(default))
                }
            };
            globals.initialize(name, value, false);
        }
        Self {
            evaluator: Evaluator::new(""),
            globals,
        }
    }

    /// Evaluate a standalone module. `data` binds imported JSON documents.
    pub fn run(
        &mut self,
        source_name: &str,
        module: &Module,
        data: &[(String, Json)],
    ) -> Result<ModuleRun, EvalError> {
        let scope = Scope::child(&self.globals);
        self.run_in(scope, source_name, module, data)
    }

    /// Evaluate `module` nested inside `parent`'s scope (a bundle part
    /// inside its prelude).
    pub fn run_within(
        &mut self,
        parent: &ModuleRun,
        source_name: &str,
        module: &Module,
        data: &[(String, Json)],
    ) -> Result<ModuleRun, EvalError> {
        let scope = Scope::child(&parent.scope);
        self.run_in(scope, source_name, module, data)
    }

    fn run_in(
        &mut self,
        scope: Rc<Scope>,
        source_name: &str,
        module: &Module,
        data: &[(String, Json)],
    ) -> Result<ModuleRun, EvalError> {
        self.evaluator.set_source(source_name);
        for (name, json) in data {
            // a stub of the same name wins, as for any other import
            if !scope.inherited(name) {
                scope.initialize(name, Value::from_json(json), false);
            }
        }
        let exports = self.evaluator.run_module(module, &scope)?;
        tracing::debug!(source = source_name, exports = exports.len(), "evaluated module");
        Ok(ModuleRun { scope, exports })
    }
}

/// A module after its top-level code ran.
pub struct ModuleRun {
    scope: Rc<Scope>,
    exports: IndexMap<String, String>,
}

impl ModuleRun {
    /// Exported names in declaration order.
    pub fn export_names(&self) -> Vec<String> {
        self.exports
            .keys()
            .filter(|name| *name != "default")
            .cloned()
            .collect()
    }

    /// Value of `name`: an export, or failing that a top-level binding of
    /// the module itself.
    pub fn value(&self, name: &str) -> Result<Option<Value>, EvalError> {
        let local = self.exports.get(name).map_or(name, String::as_str);
        match self.scope.own(local) {
            Some(Slot::Value { value, .. }) => Ok(Some(value)),
            Some(Slot::Import { specifier }) => Err(EvalError::UnavailableImport {
                name: name.to_string(),
                specifier,
                span: Span::default(),
            }),
            Some(Slot::Uninitialized { .. }) => Err(EvalError::Uninitialized {
                name: local.to_string(),
                span: Span::default(),
            }),
            None => Ok(None),
        }
    }

    /// JSON form of `name`. `None` when it is missing or has no JSON form
    /// (`undefined`, a function).
    pub fn json(&self, name: &str) -> Result<Option<Json>, EvalError> {
        match self.value(name)? {
            Some(value) => value.to_json().map_err(|source| EvalError::Circular {
                name: name.to_string(),
                source,
            }),
            None => Ok(None),
        }
    }

    /// JSON for each requested name; every export when `requested` is empty.
    pub fn collect(&self, requested: &[String]) -> Result<Vec<(String, Option<Json>)>, EvalError> {
        let names = if requested.is_empty() {
            self.export_names()
        } else {
            requested.to_vec()
        };
        names
            .into_iter()
            .map(|name| {
                let json = self.json(&name)?;
                Ok((name, json))
            })
            .collect()
    }
}

/// Evaluate one module with `stubs` and read `requested` exports.
pub fn evaluate(
    module: &Module,
    stubs: &StubTable,
    requested: &[String],
) -> Result<Vec<(String, Option<Json>)>, EvalError> {
    let mut session = Session::new(stubs, &Map::new());
    session.run("<module>", module, &[])?.collect(requested)
}

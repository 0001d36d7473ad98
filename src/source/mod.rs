//! Source reading for catalog data files.
//!
//! Catalog data is authored as TypeScript modules that declare plain data:
//! exported `const` arrays and objects built from literals, template strings,
//! small helper functions and calls to asset-URL helpers. This module turns
//! such a file into a syntax tree ([`ast::Module`]) without any JavaScript
//! runtime.
//!
//! ```text
//! data.ts ──▶ lexer::tokenize ──▶ parser::parse_module ──▶ ast::Module
//! ```
//!
//! The accepted language is a subset: declarations with destructuring,
//! function declarations, arrow functions (expression or block bodies with
//! `const`, `if`, `for...of`, `break`, `continue` and `return`), top-level
//! `if` and `for...of`, object/array literals with spread, call spread,
//! optional chaining, `??`, `||`, `&&`, equality, `< > <= >=`,
//! `+ - * / %`, `+=`/`-=`, `typeof`, ternaries, template literals, regular
//! expression literals (compiled by [`regexp`] when parsed) and assignment
//! to names or members. All TypeScript type syntax is skipped. Anything else
//! (classes, C-style `for`, `while`, `switch`, `new`) is reported as a
//! positioned [`SourceError`] rather than evaluated approximately.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod regexp;

use ast::Span;
use thiserror::Error;

pub use ast::Module;
pub use parser::{parse_expression, parse_module};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{span}: {message}")]
    Lex { span: Span, message: String },
    #[error("{span}: {message}")]
    Parse { span: Span, message: String },
}

impl SourceError {
    pub fn span(&self) -> Span {
        match self {
            SourceError::Lex { span, .. } | SourceError::Parse { span, .. } => *span,
        }
    }
}

//! Syntax tree for the declarative TypeScript subset.
//!
//! Type-level syntax (annotations, `type` aliases, `interface` blocks, `as`
//! casts) is consumed by the parser and never reaches the tree: it has no
//! runtime meaning for extraction.

use regex::Regex;
use std::fmt;
use std::rc::Rc;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A parsed source file.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Import(ImportDecl),
    Declare(Declaration),
    Function(FunctionDecl),
    /// `export { a, b as c };`
    ExportList(Vec<ExportSpec>),
    /// `export default <expr>;`
    ExportDefault(Expr),
    Expr(Expr),
    /// `if` or `for` at module level.
    Stmt(Stmt),
}

/// One import declaration, in any of its syntactic forms.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    /// Module specifier, e.g. `@/lib/assets` or `./content.json`.
    pub specifier: String,
    /// Local names the declaration introduces.
    pub bindings: Vec<String>,
    /// `(imported, local)` for each name inside `{ .. }`; the other
    /// bindings (default and namespace) stand for the whole module.
    pub named: Vec<(String, String)>,
    /// `import type { .. }`: erased entirely at compile time.
    pub type_only: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Const,
    Let,
    Var,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub exported: bool,
    pub kind: DeclKind,
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub target: Pattern,
    pub init: Option<Expr>,
    pub span: Span,
}

/// Binding target of a declaration or parameter.
#[derive(Debug, Clone)]
pub enum Pattern {
    Ident(String),
    /// `[a, , b = 1]`; `None` is a hole.
    Array(Vec<Option<PatternElem>>),
    /// `{ a, b: renamed, c = 1 }`
    Object(Vec<PatternProp>),
}

#[derive(Debug, Clone)]
pub struct PatternElem {
    pub target: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct PatternProp {
    pub key: String,
    pub target: Pattern,
    pub default: Option<Expr>,
}

impl Pattern {
    /// Every name the pattern binds, in source order.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Pattern::Ident(name) => out.push(name),
            Pattern::Array(elems) => {
                for elem in elems.iter().flatten() {
                    elem.target.collect_names(out);
                }
            }
            Pattern::Object(props) => {
                for prop in props {
                    prop.target.collect_names(out);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub exported: bool,
    pub func: Rc<Function>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSpec {
    pub local: String,
    pub exported: String,
}

/// Arrow function or `function` declaration.
#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub span: Span,
}

#[derive(Debug)]
pub struct Param {
    pub target: Pattern,
    pub default: Option<Expr>,
}

#[derive(Debug)]
pub enum FunctionBody {
    Expr(Expr),
    Block(Vec<Stmt>),
}

/// Statement inside a block body, or an `if`/`for` at module level.
#[derive(Debug, Clone)]
pub enum Stmt {
    Declare(DeclKind, Vec<Binding>),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Vec<Stmt>,
        alternate: Vec<Stmt>,
    },
    /// `for (const x of items) body`
    ForOf {
        kind: DeclKind,
        target: Pattern,
        iterable: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Break,
    Continue,
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Regex(Rc<RegexLiteral>),
    Template(Vec<TemplatePart>),
    Array(Vec<Element>),
    Object(Vec<Property>),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Element>,
    },
    Function(Rc<Function>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    /// `name = value` or `obj.key = value`; the target is an identifier,
    /// member or index expression.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

/// A `/pattern/flags` literal, compiled once at parse time.
#[derive(Debug)]
pub struct RegexLiteral {
    pub source: String,
    pub flags: String,
    pub regex: Regex,
}

impl RegexLiteral {
    /// `g`: replace and match act on every occurrence.
    pub fn global(&self) -> bool {
        self.flags.contains('g')
    }
}

impl fmt::Display for RegexLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

#[derive(Debug, Clone)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

/// Array element or call argument.
#[derive(Debug, Clone)]
pub enum Element {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum Property {
    KeyValue(String, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Nullish,
    Or,
    And,
}

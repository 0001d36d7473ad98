//! Recursive-descent parser for the declarative TypeScript subset.
//!
//! Type syntax is skipped structurally rather than parsed: [`Parser::skip_type`]
//! walks a type expression (unions, generics, tuples, object and function
//! types) far enough to find where it ends, so `const x: Foo[] = ...`,
//! `value as [number, number] | undefined` and multi-line `type`/`interface`
//! declarations all disappear without a trace in the tree.
//!
//! Arrow functions are recognised by speculative parsing: at a `(` the parser
//! tries a parameter list followed by `=>` and rewinds if that fails.

use super::SourceError;
use super::ast::*;
use super::lexer::{Punct, TemplateChunk, Tok, Token, tokenize};
use super::regexp;
use std::rc::Rc;

/// Parse a complete source file.
pub fn parse_module(source: &str) -> Result<Module, SourceError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).module()
}

/// Parse a single expression (used for template interpolations and tests).
pub fn parse_expression(source: &str) -> Result<Expr, SourceError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.expression()?;
    parser.expect_eof()?;
    Ok(expr)
}

const UNSUPPORTED_STATEMENTS: &[&str] = &[
    "class",
    "enum",
    "namespace",
    "module",
    "declare",
    "abstract",
    "async",
    "while",
    "do",
    "switch",
    "try",
    "throw",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Enclosing function bodies; `return` needs at least one.
    functions: usize,
    /// Enclosing loops; `break`/`continue` need at least one.
    loops: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            functions: 0,
            loops: 0,
        }
    }

    // ------------------------------------------------------------------
    // Cursor helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().tok == Tok::Eof
    }

    fn at(&self, p: Punct) -> bool {
        self.peek().is_punct(p)
    }

    fn at_ident(&self, name: &str) -> bool {
        self.peek().is_ident(name)
    }

    fn eat(&mut self, p: Punct) -> bool {
        if self.at(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.at_ident(name) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: Punct, what: &str) -> Result<Span, SourceError> {
        if self.at(p) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_name(&mut self) -> Result<(String, Span), SourceError> {
        match &self.peek().tok {
            Tok::Ident(name) => {
                let name = name.clone();
                Ok((name, self.advance().span))
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn expect_string(&mut self) -> Result<String, SourceError> {
        match &self.peek().tok {
            Tok::Str(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("a string literal")),
        }
    }

    fn expect_eof(&self) -> Result<(), SourceError> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> SourceError {
        SourceError::Parse {
            span,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> SourceError {
        let token = self.peek();
        let found = match &token.tok {
            Tok::Ident(n) => format!("`{n}`"),
            Tok::Str(s) => format!("string {s:?}"),
            Tok::Num(n) => format!("number {n}"),
            Tok::Template(_) => "template literal".to_string(),
            Tok::Regex { pattern, flags } => format!("regular expression /{pattern}/{flags}"),
            Tok::Punct(p) => format!("{p:?}"),
            Tok::Eof => "end of input".to_string(),
        };
        self.error_at(token.span, format!("expected {expected}, found {found}"))
    }

    // ------------------------------------------------------------------
    // Module level
    // ------------------------------------------------------------------

    fn module(&mut self) -> Result<Module, SourceError> {
        let mut items = Vec::new();
        while !self.at_eof() {
            if self.eat(Punct::Semi) {
                continue;
            }
            self.item(&mut items)?;
        }
        Ok(Module { items })
    }

    fn item(&mut self, items: &mut Vec<Item>) -> Result<(), SourceError> {
        let span = self.peek().span;
        if self.at(Punct::At) {
            return Err(self.error_at(span, "decorators are not supported"));
        }
        if self.at_ident("import") && !self.peek_at(1).is_punct(Punct::LParen) {
            self.advance();
            items.push(Item::Import(self.import_decl(span)?));
            return Ok(());
        }
        if self.eat_ident("export") {
            return self.export(span, items);
        }
        if self.at_type_declaration() {
            return self.skip_type_declaration();
        }
        if self.at_ident("const") || self.at_ident("let") || self.at_ident("var") {
            items.push(Item::Declare(self.declaration(false)?));
            return Ok(());
        }
        if self.at_ident("function") {
            let func = self.function_decl()?;
            items.push(Item::Function(FunctionDecl {
                exported: false,
                func,
            }));
            return Ok(());
        }
        if self.at_ident("if") || self.at_ident("for") {
            let mut stmts = Vec::new();
            self.statement(&mut stmts)?;
            items.extend(stmts.into_iter().map(Item::Stmt));
            return Ok(());
        }
        if let Tok::Ident(name) = &self.peek().tok
            && UNSUPPORTED_STATEMENTS.contains(&name.as_str())
        {
            return Err(self.error_at(span, format!("`{name}` is not supported in catalog sources")));
        }
        let expr = self.expression()?;
        self.eat(Punct::Semi);
        items.push(Item::Expr(expr));
        Ok(())
    }

    fn export(&mut self, span: Span, items: &mut Vec<Item>) -> Result<(), SourceError> {
        if self.at_type_declaration() {
            return self.skip_type_declaration();
        }
        if self.at_ident("type") && self.peek_at(1).is_punct(Punct::LBrace) {
            // export type { A, B } [from "..."];
            self.advance();
            self.skip_balanced()?;
            if self.eat_ident("from") {
                self.expect_string()?;
            }
            self.eat(Punct::Semi);
            return Ok(());
        }
        if self.eat_ident("default") {
            let expr = self.expression()?;
            self.eat(Punct::Semi);
            items.push(Item::ExportDefault(expr));
            return Ok(());
        }
        if self.at_ident("const") || self.at_ident("let") || self.at_ident("var") {
            items.push(Item::Declare(self.declaration(true)?));
            return Ok(());
        }
        if self.at_ident("function") {
            let func = self.function_decl()?;
            items.push(Item::Function(FunctionDecl {
                exported: true,
                func,
            }));
            return Ok(());
        }
        if self.eat(Punct::Star) {
            // export * [as ns] from "...": a re-export with nothing to bind locally
            if self.eat_ident("as") {
                self.expect_name()?;
            }
            if !self.eat_ident("from") {
                return Err(self.unexpected("`from`"));
            }
            let specifier = self.expect_string()?;
            self.eat(Punct::Semi);
            items.push(Item::Import(ImportDecl {
                specifier,
                bindings: Vec::new(),
                named: Vec::new(),
                type_only: false,
                span,
            }));
            return Ok(());
        }
        if self.eat(Punct::LBrace) {
            let mut specs = Vec::new();
            while !self.eat(Punct::RBrace) {
                if self.at_ident("type") && matches!(self.peek_at(1).tok, Tok::Ident(_)) {
                    self.advance();
                    self.expect_name()?;
                } else {
                    let (local, _) = self.expect_name()?;
                    let exported = if self.eat_ident("as") {
                        self.expect_name()?.0
                    } else {
                        local.clone()
                    };
                    specs.push(ExportSpec { local, exported });
                }
                if !self.eat(Punct::Comma) {
                    self.expect(Punct::RBrace, "`,` or `}`")?;
                    break;
                }
            }
            if self.eat_ident("from") {
                // export { a } from "...": import the names, then export them
                let specifier = self.expect_string()?;
                items.push(Item::Import(ImportDecl {
                    specifier,
                    bindings: specs.iter().map(|s| s.local.clone()).collect(),
                    named: specs.iter().map(|s| (s.local.clone(), s.local.clone())).collect(),
                    type_only: false,
                    span,
                }));
            }
            self.eat(Punct::Semi);
            items.push(Item::ExportList(specs));
            return Ok(());
        }
        Err(self.unexpected("a declaration after `export`"))
    }

    fn import_decl(&mut self, span: Span) -> Result<ImportDecl, SourceError> {
        if let Tok::Str(specifier) = &self.peek().tok {
            // import "./side-effect";
            let specifier = specifier.clone();
            self.advance();
            self.skip_import_attributes()?;
            self.eat(Punct::Semi);
            return Ok(ImportDecl {
                specifier,
                bindings: Vec::new(),
                named: Vec::new(),
                type_only: false,
                span,
            });
        }

        let mut type_only = false;
        if self.at_ident("type")
            && (self.peek_at(1).is_punct(Punct::LBrace)
                || self.peek_at(1).is_punct(Punct::Star)
                || matches!(&self.peek_at(1).tok, Tok::Ident(n) if n != "from"))
        {
            self.advance();
            type_only = true;
        }

        let mut bindings = Vec::new();
        let mut named = Vec::new();
        if let Tok::Ident(name) = &self.peek().tok
            && name != "from"
        {
            bindings.push(name.clone());
            self.advance();
            self.eat(Punct::Comma);
        }
        if self.eat(Punct::Star) {
            if !self.eat_ident("as") {
                return Err(self.unexpected("`as`"));
            }
            bindings.push(self.expect_name()?.0);
        } else if self.eat(Punct::LBrace) {
            while !self.eat(Punct::RBrace) {
                let inline_type =
                    self.at_ident("type") && matches!(self.peek_at(1).tok, Tok::Ident(_));
                if inline_type {
                    self.advance();
                }
                let (imported, _) = match &self.peek().tok {
                    Tok::Str(s) => {
                        let s = s.clone();
                        (s, self.advance().span)
                    }
                    _ => self.expect_name()?,
                };
                let local = if self.eat_ident("as") {
                    self.expect_name()?.0
                } else {
                    imported.clone()
                };
                if !inline_type {
                    bindings.push(local.clone());
                    named.push((imported, local));
                }
                if !self.eat(Punct::Comma) {
                    self.expect(Punct::RBrace, "`,` or `}`")?;
                    break;
                }
            }
        }
        if !self.eat_ident("from") {
            return Err(self.unexpected("`from`"));
        }
        let specifier = self.expect_string()?;
        self.skip_import_attributes()?;
        self.eat(Punct::Semi);
        Ok(ImportDecl {
            specifier,
            bindings,
            named,
            type_only,
            span,
        })
    }

    /// `with { type: "json" }` / `assert { ... }`
    fn skip_import_attributes(&mut self) -> Result<(), SourceError> {
        if (self.at_ident("with") || self.at_ident("assert"))
            && self.peek_at(1).is_punct(Punct::LBrace)
        {
            self.advance();
            self.skip_balanced()?;
        }
        Ok(())
    }

    fn declaration(&mut self, exported: bool) -> Result<Declaration, SourceError> {
        let kind = match self.advance().tok {
            Tok::Ident(k) if k == "let" => DeclKind::Let,
            Tok::Ident(k) if k == "var" => DeclKind::Var,
            _ => DeclKind::Const,
        };
        let bindings = self.bindings()?;
        self.eat(Punct::Semi);
        Ok(Declaration {
            exported,
            kind,
            bindings,
        })
    }

    fn bindings(&mut self) -> Result<Vec<Binding>, SourceError> {
        let mut bindings = Vec::new();
        loop {
            let span = self.peek().span;
            let target = self.pattern()?;
            self.eat(Punct::Bang);
            if self.eat(Punct::Colon) {
                self.skip_type()?;
            }
            let init = if self.eat(Punct::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            bindings.push(Binding { target, init, span });
            if !self.eat(Punct::Comma) {
                return Ok(bindings);
            }
        }
    }

    /// Identifier, array pattern or object pattern.
    fn pattern(&mut self) -> Result<Pattern, SourceError> {
        if self.eat(Punct::LBracket) {
            let mut elems = Vec::new();
            loop {
                if self.eat(Punct::RBracket) {
                    return Ok(Pattern::Array(elems));
                }
                if self.eat(Punct::Comma) {
                    elems.push(None);
                    continue;
                }
                self.reject_rest()?;
                let target = self.pattern()?;
                let default = self.pattern_default()?;
                elems.push(Some(PatternElem { target, default }));
                if !self.eat(Punct::Comma) {
                    self.expect(Punct::RBracket, "`,` or `]`")?;
                    return Ok(Pattern::Array(elems));
                }
            }
        }
        if self.eat(Punct::LBrace) {
            let mut props = Vec::new();
            while !self.eat(Punct::RBrace) {
                self.reject_rest()?;
                let (key, shorthand) = match &self.peek().tok {
                    Tok::Str(s) => {
                        let s = s.clone();
                        self.advance();
                        (s, false)
                    }
                    _ => (self.expect_name()?.0, true),
                };
                let target = if self.eat(Punct::Colon) {
                    self.pattern()?
                } else if shorthand {
                    Pattern::Ident(key.clone())
                } else {
                    return Err(self.unexpected("`:`"));
                };
                let default = self.pattern_default()?;
                props.push(PatternProp {
                    key,
                    target,
                    default,
                });
                if !self.eat(Punct::Comma) {
                    self.expect(Punct::RBrace, "`,` or `}`")?;
                    break;
                }
            }
            return Ok(Pattern::Object(props));
        }
        Ok(Pattern::Ident(self.expect_name()?.0))
    }

    fn pattern_default(&mut self) -> Result<Option<Expr>, SourceError> {
        if self.eat(Punct::Assign) {
            Ok(Some(self.assignment()?))
        } else {
            Ok(None)
        }
    }

    fn reject_rest(&self) -> Result<(), SourceError> {
        if self.at(Punct::Ellipsis) {
            return Err(self.error_at(self.peek().span, "rest elements are not supported"));
        }
        Ok(())
    }

    fn function_decl(&mut self) -> Result<Rc<Function>, SourceError> {
        let span = self.advance().span;
        let name = match &self.peek().tok {
            Tok::Ident(_) => Some(self.expect_name()?.0),
            _ => None,
        };
        if self.at(Punct::Lt) {
            self.skip_angles()?;
        }
        let params = self.params()?;
        if self.eat(Punct::Colon) {
            self.skip_type()?;
        }
        if !self.at(Punct::LBrace) {
            return Err(self.unexpected("a function body"));
        }
        let body = FunctionBody::Block(self.function_block()?);
        Ok(Rc::new(Function {
            name,
            params,
            body,
            span,
        }))
    }

    // ------------------------------------------------------------------
    // Type skipping
    // ------------------------------------------------------------------

    fn at_type_declaration(&self) -> bool {
        (self.at_ident("type") || self.at_ident("interface"))
            && matches!(self.peek_at(1).tok, Tok::Ident(_))
    }

    fn skip_type_declaration(&mut self) -> Result<(), SourceError> {
        let is_interface = self.at_ident("interface");
        self.advance();
        self.expect_name()?;
        if self.at(Punct::Lt) {
            self.skip_angles()?;
        }
        if is_interface {
            if self.eat_ident("extends") {
                loop {
                    self.skip_type_atom()?;
                    if !self.eat(Punct::Comma) {
                        break;
                    }
                }
            }
            if !self.at(Punct::LBrace) {
                return Err(self.unexpected("an interface body"));
            }
            self.skip_balanced()?;
        } else {
            self.expect(Punct::Assign, "`=`")?;
            self.skip_type()?;
        }
        self.eat(Punct::Semi);
        Ok(())
    }

    fn skip_type(&mut self) -> Result<(), SourceError> {
        if !self.eat(Punct::Pipe) {
            self.eat(Punct::Amp);
        }
        loop {
            self.skip_type_atom()?;
            while self.at(Punct::LBracket) {
                self.skip_balanced()?;
            }
            if self.eat(Punct::Pipe) || self.eat(Punct::Amp) {
                continue;
            }
            if self.eat_ident("extends") {
                // conditional type: A extends B ? C : D
                self.skip_type_atom()?;
                self.expect(Punct::Question, "`?`")?;
                self.skip_type()?;
                self.expect(Punct::Colon, "`:`")?;
                continue;
            }
            return Ok(());
        }
    }

    fn skip_type_atom(&mut self) -> Result<(), SourceError> {
        let token = self.peek().clone();
        match &token.tok {
            Tok::Ident(name)
                if matches!(
                    name.as_str(),
                    "keyof" | "typeof" | "readonly" | "unique" | "infer" | "new" | "asserts"
                ) && !matches!(self.peek_at(1).tok, Tok::Punct(Punct::Comma | Punct::RParen)) =>
            {
                self.advance();
                self.skip_type_atom()
            }
            Tok::Ident(_) => {
                self.advance();
                while self.at(Punct::Dot) {
                    self.advance();
                    self.expect_name()?;
                }
                if self.at_ident("is") {
                    // type predicate: `value is string`
                    self.advance();
                    self.skip_type_atom()?;
                }
                if self.at(Punct::Lt) {
                    self.skip_angles()?;
                }
                Ok(())
            }
            Tok::Str(_) | Tok::Num(_) | Tok::Template(_) => {
                self.advance();
                Ok(())
            }
            Tok::Punct(Punct::Minus) => {
                self.advance();
                self.skip_type_atom()
            }
            Tok::Punct(Punct::LParen) => {
                self.skip_balanced()?;
                if self.eat(Punct::Arrow) {
                    self.skip_type()?;
                }
                Ok(())
            }
            Tok::Punct(Punct::Lt) => {
                self.skip_angles()?;
                if !self.at(Punct::LParen) {
                    return Err(self.unexpected("a parameter list"));
                }
                self.skip_balanced()?;
                self.expect(Punct::Arrow, "`=>`")?;
                self.skip_type()
            }
            Tok::Punct(Punct::LBracket | Punct::LBrace) => self.skip_balanced(),
            _ => Err(self.unexpected("a type")),
        }
    }

    /// Skip a `(...)`, `[...]` or `{...}` group, including nested groups.
    fn skip_balanced(&mut self) -> Result<(), SourceError> {
        let open = self.peek().clone();
        let mut depth = 0usize;
        loop {
            match &self.peek().tok {
                Tok::Punct(Punct::LParen | Punct::LBracket | Punct::LBrace) => depth += 1,
                Tok::Punct(Punct::RParen | Punct::RBracket | Punct::RBrace) => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return Ok(());
                    }
                }
                Tok::Eof => return Err(self.error_at(open.span, "unbalanced brackets")),
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip a `<...>` generic argument or parameter list.
    fn skip_angles(&mut self) -> Result<(), SourceError> {
        let open = self.peek().span;
        let mut depth = 0usize;
        loop {
            match &self.peek().tok {
                Tok::Punct(Punct::Lt) => depth += 1,
                Tok::Punct(Punct::Gt) => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return Ok(());
                    }
                }
                // object and tuple types may hold `;` and `>`
                Tok::Punct(Punct::LParen | Punct::LBracket | Punct::LBrace) => {
                    self.skip_balanced()?;
                    continue;
                }
                Tok::Punct(Punct::Semi) | Tok::Eof => {
                    return Err(self.error_at(open, "unbalanced `<` in type"));
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Function bodies
    // ------------------------------------------------------------------

    fn params(&mut self) -> Result<Vec<Param>, SourceError> {
        self.expect(Punct::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.eat(Punct::RParen) {
            self.reject_rest()?;
            let target = self.pattern()?;
            self.eat(Punct::Question);
            if self.eat(Punct::Colon) {
                self.skip_type()?;
            }
            let default = self.pattern_default()?;
            if !matches!(&target, Pattern::Ident(name) if name == "this") {
                params.push(Param { target, default });
            }
            if !self.eat(Punct::Comma) {
                self.expect(Punct::RParen, "`,` or `)`")?;
                break;
            }
        }
        Ok(params)
    }

    /// A block that is a function body: `return` is allowed and enclosing
    /// loops are out of reach.
    fn function_block(&mut self) -> Result<Vec<Stmt>, SourceError> {
        let loops = std::mem::take(&mut self.loops);
        self.functions += 1;
        let body = self.block();
        self.functions -= 1;
        self.loops = loops;
        body
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SourceError> {
        self.expect(Punct::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.eat(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.unexpected("`}`"));
            }
            self.statement(&mut stmts)?;
        }
        Ok(stmts)
    }

    fn statement(&mut self, stmts: &mut Vec<Stmt>) -> Result<(), SourceError> {
        if self.eat(Punct::Semi) {
            return Ok(());
        }
        if self.at(Punct::LBrace) {
            stmts.extend(self.block()?);
            return Ok(());
        }
        if self.at_type_declaration() {
            return self.skip_type_declaration();
        }
        if self.at_ident("const") || self.at_ident("let") || self.at_ident("var") {
            let decl = self.declaration(false)?;
            stmts.push(Stmt::Declare(decl.kind, decl.bindings));
            return Ok(());
        }
        if self.at_ident("function") {
            let func = self.function_decl()?;
            let Some(name) = func.name.clone() else {
                return Err(self.error_at(func.span, "function statement requires a name"));
            };
            let span = func.span;
            stmts.push(Stmt::Declare(
                DeclKind::Let,
                vec![Binding {
                    target: Pattern::Ident(name),
                    init: Some(Expr::new(ExprKind::Function(func), span)),
                    span,
                }],
            ));
            return Ok(());
        }
        if self.at_ident("return") {
            if self.functions == 0 {
                return Err(self.error_at(self.peek().span, "`return` outside of a function"));
            }
            self.advance();
            let value = if self.at(Punct::Semi) || self.at(Punct::RBrace) {
                None
            } else {
                Some(self.expression()?)
            };
            self.eat(Punct::Semi);
            stmts.push(Stmt::Return(value));
            return Ok(());
        }
        if self.eat_ident("if") {
            self.expect(Punct::LParen, "`(`")?;
            let test = self.expression()?;
            self.expect(Punct::RParen, "`)`")?;
            let consequent = self.branch()?;
            let alternate = if self.eat_ident("else") {
                self.branch()?
            } else {
                Vec::new()
            };
            stmts.push(Stmt::If {
                test,
                consequent,
                alternate,
            });
            return Ok(());
        }
        if self.at_ident("for") {
            return self.for_of(stmts);
        }
        if self.at_ident("break") || self.at_ident("continue") {
            let token = self.advance();
            if self.loops == 0 {
                return Err(self.error_at(token.span, "`break`/`continue` outside of a loop"));
            }
            self.eat(Punct::Semi);
            stmts.push(if token.is_ident("break") {
                Stmt::Break
            } else {
                Stmt::Continue
            });
            return Ok(());
        }
        if let Tok::Ident(name) = &self.peek().tok
            && UNSUPPORTED_STATEMENTS.contains(&name.as_str())
        {
            return Err(self.error_at(
                self.peek().span,
                format!("`{name}` is not supported in catalog sources"),
            ));
        }
        let expr = self.expression()?;
        self.eat(Punct::Semi);
        stmts.push(Stmt::Expr(expr));
        Ok(())
    }

    /// `for (const x of items) body`. Counted and `for..in` loops are
    /// rejected.
    fn for_of(&mut self, stmts: &mut Vec<Stmt>) -> Result<(), SourceError> {
        let span = self.advance().span;
        self.expect(Punct::LParen, "`(`")?;
        let kind = match &self.peek().tok {
            Tok::Ident(k) if k == "const" => DeclKind::Const,
            Tok::Ident(k) if k == "let" => DeclKind::Let,
            Tok::Ident(k) if k == "var" => DeclKind::Var,
            _ => return Err(self.error_at(span, "only `for (const x of ...)` loops are supported")),
        };
        self.advance();
        let target = self.pattern()?;
        if self.eat(Punct::Colon) {
            self.skip_type()?;
        }
        if !self.eat_ident("of") {
            return Err(self.error_at(span, "only `for (const x of ...)` loops are supported"));
        }
        let iterable = self.expression()?;
        self.expect(Punct::RParen, "`)`")?;
        self.loops += 1;
        let body = self.branch();
        self.loops -= 1;
        stmts.push(Stmt::ForOf {
            kind,
            target,
            iterable,
            body: body?,
            span,
        });
        Ok(())
    }

    fn branch(&mut self) -> Result<Vec<Stmt>, SourceError> {
        if self.at(Punct::LBrace) {
            self.block()
        } else {
            let mut stmts = Vec::new();
            self.statement(&mut stmts)?;
            Ok(stmts)
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, SourceError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, SourceError> {
        if let Some(func) = self.try_arrow()? {
            return Ok(func);
        }
        let target = self.conditional()?;
        let compound = if self.at(Punct::PlusAssign) {
            Some(BinaryOp::Add)
        } else if self.at(Punct::MinusAssign) {
            Some(BinaryOp::Sub)
        } else {
            None
        };
        if !self.at(Punct::Assign) && compound.is_none() {
            return Ok(target);
        }
        let span = self.peek().span;
        if !matches!(
            target.kind,
            ExprKind::Ident(_)
                | ExprKind::Member {
                    optional: false,
                    ..
                }
                | ExprKind::Index {
                    optional: false,
                    ..
                }
        ) {
            return Err(self.error_at(span, "invalid assignment target"));
        }
        self.advance();
        let mut value = self.assignment()?;
        if let Some(op) = compound {
            // `a += b` is `a = a + b`
            value = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(target.clone()),
                    right: Box::new(value),
                },
                span,
            );
        }
        Ok(Expr::new(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            span,
        ))
    }

    fn try_arrow(&mut self) -> Result<Option<Expr>, SourceError> {
        let span = self.peek().span;
        if let Tok::Ident(name) = &self.peek().tok
            && self.peek_at(1).is_punct(Punct::Arrow)
        {
            let params = vec![Param {
                target: Pattern::Ident(name.clone()),
                default: None,
            }];
            self.advance();
            self.advance();
            return self.arrow_body(params, span).map(Some);
        }
        if !self.at(Punct::LParen) && !self.at(Punct::Lt) {
            return Ok(None);
        }
        let start = self.pos;
        let attempt = (|| -> Result<Vec<Param>, SourceError> {
            if self.at(Punct::Lt) {
                self.skip_angles()?;
            }
            let params = self.params()?;
            if self.eat(Punct::Colon) {
                self.skip_type()?;
            }
            self.expect(Punct::Arrow, "`=>`")?;
            Ok(params)
        })();
        match attempt {
            Ok(params) => self.arrow_body(params, span).map(Some),
            Err(_) => {
                self.pos = start;
                Ok(None)
            }
        }
    }

    fn arrow_body(&mut self, params: Vec<Param>, span: Span) -> Result<Expr, SourceError> {
        let body = if self.at(Punct::LBrace) {
            FunctionBody::Block(self.function_block()?)
        } else {
            let loops = std::mem::take(&mut self.loops);
            let body = self.assignment();
            self.loops = loops;
            FunctionBody::Expr(body?)
        };
        Ok(Expr::new(
            ExprKind::Function(Rc::new(Function {
                name: None,
                params,
                body,
                span,
            })),
            span,
        ))
    }

    fn conditional(&mut self) -> Result<Expr, SourceError> {
        let test = self.binary(0)?;
        if !self.at(Punct::Question) {
            return Ok(test);
        }
        let span = self.advance().span;
        let consequent = self.assignment()?;
        self.expect(Punct::Colon, "`:` in conditional expression")?;
        let alternate = self.assignment()?;
        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span,
        ))
    }

    /// Precedence climbing over the supported binary operators.
    fn binary(&mut self, min_prec: u8) -> Result<Expr, SourceError> {
        let mut left = self.unary()?;
        loop {
            let Some((op, prec)) = self.binary_op() else {
                return Ok(left);
            };
            if prec < min_prec {
                return Ok(left);
            }
            let span = self.advance().span;
            let right = self.binary(prec + 1)?;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
    }

    fn binary_op(&self) -> Option<(BinaryOp, u8)> {
        let Tok::Punct(p) = self.peek().tok else {
            return None;
        };
        Some(match p {
            Punct::Nullish => (BinaryOp::Nullish, 1),
            Punct::OrOr => (BinaryOp::Or, 2),
            Punct::AndAnd => (BinaryOp::And, 3),
            Punct::EqEqEq => (BinaryOp::StrictEq, 4),
            Punct::NotEqEq => (BinaryOp::StrictNe, 4),
            Punct::EqEq => (BinaryOp::LooseEq, 4),
            Punct::NotEq => (BinaryOp::LooseNe, 4),
            Punct::Lt => (BinaryOp::Lt, 5),
            Punct::Gt => (BinaryOp::Gt, 5),
            Punct::LtEq => (BinaryOp::LtEq, 5),
            Punct::GtEq => (BinaryOp::GtEq, 5),
            Punct::Plus => (BinaryOp::Add, 6),
            Punct::Minus => (BinaryOp::Sub, 6),
            Punct::Star => (BinaryOp::Mul, 7),
            Punct::Slash => (BinaryOp::Div, 7),
            Punct::Percent => (BinaryOp::Rem, 7),
            _ => return None,
        })
    }

    fn unary(&mut self) -> Result<Expr, SourceError> {
        let span = self.peek().span;
        let op = if self.at(Punct::Bang) {
            Some(UnaryOp::Not)
        } else if self.at(Punct::Minus) {
            Some(UnaryOp::Neg)
        } else if self.at_ident("typeof") {
            Some(UnaryOp::TypeOf)
        } else {
            None
        };
        match op {
            Some(op) => {
                self.advance();
                let operand = self.unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            None => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, SourceError> {
        let mut expr = self.primary()?;
        loop {
            let span = self.peek().span;
            if self.eat(Punct::Dot) {
                let (property, _) = self.expect_name()?;
                expr = Expr::new(
                    ExprKind::Member {
                        object: Box::new(expr),
                        property,
                        optional: false,
                    },
                    span,
                );
            } else if self.eat(Punct::QuestionDot) {
                if self.eat(Punct::LBracket) {
                    let index = self.expression()?;
                    self.expect(Punct::RBracket, "`]`")?;
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                            optional: true,
                        },
                        span,
                    );
                } else if self.at(Punct::LParen) {
                    let args = self.arguments()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                } else {
                    let (property, _) = self.expect_name()?;
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property,
                            optional: true,
                        },
                        span,
                    );
                }
            } else if self.eat(Punct::LBracket) {
                let index = self.expression()?;
                self.expect(Punct::RBracket, "`]`")?;
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: false,
                    },
                    span,
                );
            } else if self.at(Punct::LParen) {
                let args = self.arguments()?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    span,
                );
            } else if self.at(Punct::Bang) && !self.is_statement_start_after_bang() {
                // non-null assertion
                self.advance();
            } else if self.at_ident("as") || self.at_ident("satisfies") {
                self.advance();
                self.skip_type()?;
            } else if matches!(self.peek().tok, Tok::Template(_)) {
                return Err(self.error_at(span, "tagged templates are not supported"));
            } else {
                return Ok(expr);
            }
        }
    }

    /// A `!` directly after an expression is a non-null assertion unless it
    /// begins the next statement on a new line.
    fn is_statement_start_after_bang(&self) -> bool {
        let prev = self.tokens[self.pos.saturating_sub(1)].span;
        self.peek().span.line > prev.line
    }

    fn arguments(&mut self) -> Result<Vec<Element>, SourceError> {
        self.expect(Punct::LParen, "`(`")?;
        self.elements(Punct::RParen, false)
    }

    /// Comma-separated list up to `close`, with spread and optional holes.
    fn elements(&mut self, close: Punct, holes: bool) -> Result<Vec<Element>, SourceError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            if holes && self.at(Punct::Comma) {
                let span = self.advance().span;
                items.push(Element::Item(Expr::new(ExprKind::Undefined, span)));
                continue;
            }
            if self.eat(Punct::Ellipsis) {
                items.push(Element::Spread(self.assignment()?));
            } else {
                items.push(Element::Item(self.assignment()?));
            }
            if !self.eat(Punct::Comma) {
                self.expect(close, "`,` or a closing bracket")?;
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, SourceError> {
        let token = self.peek().clone();
        let span = token.span;
        let kind = match token.tok {
            Tok::Num(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            Tok::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            Tok::Regex { pattern, flags } => {
                self.advance();
                let literal = regexp::compile(&pattern, &flags)
                    .map_err(|message| self.error_at(span, message))?;
                ExprKind::Regex(Rc::new(literal))
            }
            Tok::Template(chunks) => {
                self.advance();
                ExprKind::Template(template_parts(chunks)?)
            }
            Tok::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.expression()?;
                self.expect(Punct::RParen, "`)`")?;
                return Ok(inner);
            }
            Tok::Punct(Punct::LBracket) => {
                self.advance();
                ExprKind::Array(self.elements(Punct::RBracket, true)?)
            }
            Tok::Punct(Punct::LBrace) => {
                self.advance();
                ExprKind::Object(self.object_body()?)
            }
            Tok::Punct(Punct::Lt) => {
                // `<T>value` old-style cast
                self.skip_angles()?;
                return self.unary();
            }
            Tok::Ident(name) => match name.as_str() {
                "true" => {
                    self.advance();
                    ExprKind::Bool(true)
                }
                "false" => {
                    self.advance();
                    ExprKind::Bool(false)
                }
                "null" => {
                    self.advance();
                    ExprKind::Null
                }
                "undefined" => {
                    self.advance();
                    ExprKind::Undefined
                }
                "function" => ExprKind::Function(self.function_decl()?),
                "new" | "this" | "class" | "await" | "yield" | "super" => {
                    return Err(self.error_at(
                        span,
                        format!("`{name}` is not supported in catalog sources"),
                    ));
                }
                _ => {
                    self.advance();
                    ExprKind::Ident(name)
                }
            },
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(Expr::new(kind, span))
    }

    fn object_body(&mut self) -> Result<Vec<Property>, SourceError> {
        let mut props = Vec::new();
        while !self.eat(Punct::RBrace) {
            if self.eat(Punct::Ellipsis) {
                props.push(Property::Spread(self.assignment()?));
            } else {
                let token = self.advance();
                let (key, shorthand_ok) = match token.tok {
                    Tok::Ident(name) => (name, true),
                    Tok::Str(s) => (s, false),
                    Tok::Num(n) => (number_key(n), false),
                    Tok::Punct(Punct::LBracket) => {
                        return Err(self.error_at(
                            token.span,
                            "computed property keys are not supported",
                        ));
                    }
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected("a property name"));
                    }
                };
                if self.eat(Punct::Colon) {
                    props.push(Property::KeyValue(key, self.assignment()?));
                } else if self.at(Punct::LParen) {
                    let params = self.params()?;
                    if self.eat(Punct::Colon) {
                        self.skip_type()?;
                    }
                    let body = FunctionBody::Block(self.function_block()?);
                    let func = Function {
                        name: Some(key.clone()),
                        params,
                        body,
                        span: token.span,
                    };
                    props.push(Property::KeyValue(
                        key,
                        Expr::new(ExprKind::Function(Rc::new(func)), token.span),
                    ));
                } else if shorthand_ok {
                    props.push(Property::KeyValue(
                        key.clone(),
                        Expr::new(ExprKind::Ident(key), token.span),
                    ));
                } else {
                    return Err(self.unexpected("`:`"));
                }
            }
            if !self.eat(Punct::Comma) {
                self.expect(Punct::RBrace, "`,` or `}`")?;
                break;
            }
        }
        Ok(props)
    }
}

fn template_parts(chunks: Vec<TemplateChunk>) -> Result<Vec<TemplatePart>, SourceError> {
    chunks
        .into_iter()
        .map(|chunk| match chunk {
            TemplateChunk::Text(text) => Ok(TemplatePart::Text(text)),
            TemplateChunk::Expr(tokens) => {
                let mut inner = Parser::new(tokens);
                let expr = inner.expression()?;
                inner.expect_eof()?;
                Ok(TemplatePart::Expr(expr))
            }
        })
        .collect()
}

/// Render a numeric object key the way JavaScript stringifies it.
fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

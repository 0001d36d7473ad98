//! Tokenizer for catalog source files.
//!
//! Produces a flat token list. Template literals are tokenized eagerly: each
//! `${ ... }` interpolation becomes its own nested token list, which the
//! parser later turns into an expression with a sub-parser.
//!
//! A `/` starts a regular expression literal wherever an expression may
//! begin (after an operator, an opening bracket, a comma or a keyword such
//! as `return`) and is division everywhere else.

use super::SourceError;
use super::ast::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Str(String),
    Num(f64),
    Template(Vec<TemplateChunk>),
    /// `/pattern/flags`, raw pattern text as written.
    Regex { pattern: String, flags: String },
    Punct(Punct),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Text(String),
    Expr(Vec<Token>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,
    Dot,
    Ellipsis,
    Question,
    QuestionDot,
    Nullish,
    OrOr,
    AndAnd,
    Pipe,
    Amp,
    Assign,
    PlusAssign,
    MinusAssign,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Gt,
    LtEq,
    GtEq,
    At,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub span: Span,
}

impl Token {
    pub fn is_punct(&self, p: Punct) -> bool {
        self.tok == Tok::Punct(p)
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.tok, Tok::Ident(n) if n == name)
    }
}

/// Tokenize a whole source file. The returned list always ends with [`Tok::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, SourceError> {
    Lexer::new(source, Span { line: 1, col: 1 }).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    fn new(source: &str, start: Span) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: start.line,
            col: start.col,
        }
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, span: Span, message: impl Into<String>) -> SourceError {
        SourceError::Lex {
            span,
            message: message.into(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SourceError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let span = self.span();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    span,
                });
                return Ok(tokens);
            };
            let tok = if c == '"' || c == '\'' {
                Tok::Str(self.string(c)?)
            } else if c == '`' {
                Tok::Template(self.template()?)
            } else if c.is_ascii_digit()
                || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
            {
                Tok::Num(self.number()?)
            } else if c == '/' && regex_allowed(tokens.last()) {
                self.regex()?
            } else if is_ident_start(c) {
                let mut name = String::new();
                while let Some(c) = self.peek().filter(|&c| is_ident_continue(c)) {
                    name.push(c);
                    self.bump();
                }
                Tok::Ident(name)
            } else {
                Tok::Punct(self.punct()?)
            };
            tokens.push(Token { tok, span });
        }
    }

    fn skip_trivia(&mut self) -> Result<(), SourceError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.span();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error(start, "unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, SourceError> {
        let start = self.span();
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.escape(&mut out)?,
                Some('\n') | None => return Err(self.error(start, "unterminated string literal")),
                Some(c) => out.push(c),
            }
        }
    }

    /// Decode one escape sequence; the backslash is already consumed.
    fn escape(&mut self, out: &mut String) -> Result<(), SourceError> {
        let span = self.span();
        let Some(c) = self.bump() else {
            return Err(self.error(span, "unterminated escape sequence"));
        };
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            '\n' => {}
            'x' => {
                let code = self.hex_digits(2, span)?;
                out.push(char::from_u32(code).ok_or_else(|| self.error(span, "bad \\x escape"))?);
            }
            'u' => {
                let code = if self.peek() == Some('{') {
                    self.bump();
                    let mut digits = String::new();
                    while let Some(c) = self.bump() {
                        if c == '}' {
                            break;
                        }
                        digits.push(c);
                    }
                    u32::from_str_radix(&digits, 16)
                        .map_err(|_| self.error(span, "bad \\u{..} escape"))?
                } else {
                    self.hex_digits(4, span)?
                };
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize, span: Span) -> Result<u32, SourceError> {
        let mut digits = String::with_capacity(count);
        for _ in 0..count {
            match self.bump() {
                Some(c) if c.is_ascii_hexdigit() => digits.push(c),
                _ => return Err(self.error(span, "bad hexadecimal escape")),
            }
        }
        u32::from_str_radix(&digits, 16).map_err(|_| self.error(span, "bad hexadecimal escape"))
    }

    fn template(&mut self) -> Result<Vec<TemplateChunk>, SourceError> {
        let start = self.span();
        self.bump();
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error(start, "unterminated template literal")),
                Some('`') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    self.escape(&mut text)?;
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    if !text.is_empty() {
                        chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
                    }
                    let inner_start = self.span();
                    let inner = self.interpolation(inner_start)?;
                    let tokens = Lexer::new(&inner, inner_start).run()?;
                    chunks.push(TemplateChunk::Expr(tokens));
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        if !text.is_empty() {
            chunks.push(TemplateChunk::Text(text));
        }
        Ok(chunks)
    }

    /// Collect the raw text of a `${ ... }` body, consuming the closing brace.
    fn interpolation(&mut self, start: Span) -> Result<String, SourceError> {
        let mut depth = 1usize;
        let mut raw = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(raw);
                    }
                }
                '"' | '\'' | '`' => {
                    raw.push(c);
                    while let Some(inner) = self.bump() {
                        raw.push(inner);
                        if inner == '\\' {
                            if let Some(escaped) = self.bump() {
                                raw.push(escaped);
                            }
                        } else if inner == c {
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            raw.push(c);
        }
        Err(self.error(start, "unterminated template interpolation"))
    }

    /// Scan `/pattern/flags`. A `/` inside a character class does not end
    /// the pattern.
    fn regex(&mut self) -> Result<Tok, SourceError> {
        let start = self.span();
        self.bump();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.error(start, "unterminated regular expression literal"));
                }
                Some('\\') => {
                    pattern.push('\\');
                    match self.bump() {
                        Some('\n') | None => {
                            return Err(self.error(start, "unterminated regular expression literal"));
                        }
                        Some(c) => pattern.push(c),
                    }
                }
                Some('/') if !in_class => break,
                Some(c) => {
                    match c {
                        '[' => in_class = true,
                        ']' => in_class = false,
                        _ => {}
                    }
                    pattern.push(c);
                }
            }
        }
        let mut flags = String::new();
        while let Some(c) = self.peek().filter(|&c| is_ident_continue(c)) {
            flags.push(c);
            self.bump();
        }
        Ok(Tok::Regex { pattern, flags })
    }

    fn number(&mut self) -> Result<f64, SourceError> {
        let span = self.span();
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let mut digits = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit() || *c == '_') {
                if c != '_' {
                    digits.push(c);
                }
                self.bump();
            }
            return i64::from_str_radix(&digits, 16)
                .map(|n| n as f64)
                .map_err(|_| self.error(span, "bad hexadecimal literal"));
        }

        let mut text = String::new();
        let digits = |lexer: &mut Self, text: &mut String| {
            while let Some(c) = lexer.peek().filter(|c| c.is_ascii_digit() || *c == '_') {
                if c != '_' {
                    text.push(c);
                }
                lexer.bump();
            }
        };
        digits(self, &mut text);
        if self.peek() == Some('.') && self.peek_at(1).is_none_or(|c| c.is_ascii_digit()) {
            text.push('.');
            self.bump();
            digits(self, &mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            digits(self, &mut text);
        }
        if self.peek() == Some('n') {
            return Err(self.error(span, "BigInt literals are not supported"));
        }
        text.parse::<f64>()
            .map_err(|_| self.error(span, format!("bad number literal `{text}`")))
    }

    fn punct(&mut self) -> Result<Punct, SourceError> {
        let span = self.span();
        let c = self.peek().unwrap_or('\0');
        let next = self.peek_at(1);
        let third = self.peek_at(2);
        let (punct, len) = match (c, next, third) {
            ('.', Some('.'), Some('.')) => (Punct::Ellipsis, 3),
            ('=', Some('='), Some('=')) => (Punct::EqEqEq, 3),
            ('!', Some('='), Some('=')) => (Punct::NotEqEq, 3),
            ('=', Some('>'), _) => (Punct::Arrow, 2),
            ('<', Some('='), _) => (Punct::LtEq, 2),
            ('>', Some('='), _) => (Punct::GtEq, 2),
            ('+', Some('='), _) => (Punct::PlusAssign, 2),
            ('-', Some('='), _) => (Punct::MinusAssign, 2),
            ('=', Some('='), _) => (Punct::EqEq, 2),
            ('!', Some('='), _) => (Punct::NotEq, 2),
            ('?', Some('?'), _) => (Punct::Nullish, 2),
            ('?', Some('.'), d) if !d.is_some_and(|d| d.is_ascii_digit()) => (Punct::QuestionDot, 2),
            ('|', Some('|'), _) => (Punct::OrOr, 2),
            ('&', Some('&'), _) => (Punct::AndAnd, 2),
            ('(', _, _) => (Punct::LParen, 1),
            (')', _, _) => (Punct::RParen, 1),
            ('[', _, _) => (Punct::LBracket, 1),
            (']', _, _) => (Punct::RBracket, 1),
            ('{', _, _) => (Punct::LBrace, 1),
            ('}', _, _) => (Punct::RBrace, 1),
            (',', _, _) => (Punct::Comma, 1),
            (';', _, _) => (Punct::Semi, 1),
            (':', _, _) => (Punct::Colon, 1),
            ('.', _, _) => (Punct::Dot, 1),
            ('?', _, _) => (Punct::Question, 1),
            ('|', _, _) => (Punct::Pipe, 1),
            ('&', _, _) => (Punct::Amp, 1),
            ('=', _, _) => (Punct::Assign, 1),
            ('+', _, _) => (Punct::Plus, 1),
            ('-', _, _) => (Punct::Minus, 1),
            ('*', _, _) => (Punct::Star, 1),
            ('/', _, _) => (Punct::Slash, 1),
            ('%', _, _) => (Punct::Percent, 1),
            ('!', _, _) => (Punct::Bang, 1),
            ('<', _, _) => (Punct::Lt, 1),
            ('>', _, _) => (Punct::Gt, 1),
            ('@', _, _) => (Punct::At, 1),
            _ => return Err(self.error(span, format!("unexpected character `{c}`"))),
        };
        for _ in 0..len {
            self.bump();
        }
        Ok(punct)
    }
}

/// Keywords after which an expression, and so a regex literal, may follow.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "in", "of", "void", "delete", "throw", "else", "do", "yield",
    "await",
];

/// Whether a `/` following `prev` begins a regex literal rather than a
/// division.
fn regex_allowed(prev: Option<&Token>) -> bool {
    match prev.map(|t| &t.tok) {
        None => true,
        Some(Tok::Punct(p)) => !matches!(p, Punct::RParen | Punct::RBracket | Punct::RBrace),
        Some(Tok::Ident(name)) => EXPRESSION_KEYWORDS.contains(&name.as_str()),
        Some(_) => false,
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

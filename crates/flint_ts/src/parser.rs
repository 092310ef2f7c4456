//! Recursive-descent parser.
//!
//! Besides the tree, the parser records every type-only span it consumes.
//! Those spans are blanked by the emitter, so the emitted JavaScript keeps
//! the exact line and column layout of the source.

use crate::ast::*;
use crate::diagnostics::{codes, Issue};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::span::Span;

/// Type-only source range to blank out on emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Erasure {
    /// Range
    pub span: Span,
    /// Whole statement; the blanked text starts with `;`
    pub statement: bool,
}

/// Parser output
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    /// Syntax tree
    pub program: Program,
    /// Type-only spans
    pub erasures: Vec<Erasure>,
    /// Lexical and syntax errors
    pub issues: Vec<Issue>,
}

impl Parsed {
    /// Whether any syntax error was reported
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Parse a program
#[must_use]
pub fn parse_program(source: &str) -> Parsed {
    let (tokens, lex_issues) = tokenize(source);
    let mut parser = Parser::new(tokens, false);
    parser.issues = lex_issues;
    let body = parser.statements_until_eof();
    Parsed {
        program: Program { body },
        erasures: parser.erasures,
        issues: parser.issues,
    }
}

/// Parse an ambient declaration file
#[must_use]
pub fn parse_declarations(source: &str) -> Parsed {
    let (tokens, lex_issues) = tokenize(source);
    let mut parser = Parser::new(tokens, true);
    parser.issues = lex_issues;
    let body = parser.statements_until_eof();
    Parsed {
        program: Program { body },
        erasures: Vec::new(),
        issues: parser.issues,
    }
}

/// Parse a standalone type expression such as `string | null`
///
/// # Errors
///
/// Returns the syntax errors when the text is not exactly one type.
pub fn parse_type_text(text: &str) -> Result<TypeNode, Vec<Issue>> {
    let (tokens, lex_issues) = tokenize(text);
    if !lex_issues.is_empty() {
        return Err(lex_issues);
    }
    let mut parser = Parser::new(tokens, true);
    match parser.parse_type() {
        Ok(ty) if matches!(parser.peek().kind, TokenKind::Eof) => Ok(ty),
        Ok(_) => {
            let span = parser.peek().span;
            Err(vec![Issue::error(
                codes::UNEXPECTED_TOKEN,
                span,
                "Unexpected token after type.",
            )])
        }
        Err(Fail) => Err(parser.issues),
    }
}

const RESERVED_WORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "enum", "export", "extends", "false", "finally", "for", "function", "if",
    "import", "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield", "await",
];

/// Whether a word can never be used as an identifier
#[must_use]
pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.contains(&word)
}

/// Deepest syntax tree accepted; bounds every recursive walk over it
pub const MAX_NESTING_DEPTH: u32 = 128;

#[derive(Debug, Clone, Copy)]
struct Fail;

type PResult<T> = Result<T, Fail>;

struct Checkpoint {
    pos: usize,
    issues: usize,
    erasures: usize,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    issues: Vec<Issue>,
    erasures: Vec<Erasure>,
    ambient: bool,
    no_in: bool,
    depth: u32,
    height: u32,
}

impl Parser {
    fn new(tokens: Vec<Token>, ambient: bool) -> Self {
        Self {
            tokens,
            pos: 0,
            issues: Vec::new(),
            erasures: Vec::new(),
            ambient,
            no_in: false,
            depth: 0,
            height: 0,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    fn at(&self, p: &str) -> bool {
        self.peek().is_punct(p)
    }

    fn at_word(&self, w: &str) -> bool {
        self.peek().is_word(w)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.at(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, w: &str) -> bool {
        if self.at_word(w) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> PResult<Span> {
        if self.at(p) {
            Ok(self.bump().span)
        } else {
            let span = self.peek().span;
            Err(self.fail(codes::TOKEN_EXPECTED, span, format!("'{p}' expected.")))
        }
    }

    fn expect_word(&mut self, w: &str) -> PResult<Span> {
        if self.at_word(w) {
            Ok(self.bump().span)
        } else {
            let span = self.peek().span;
            Err(self.fail(codes::TOKEN_EXPECTED, span, format!("'{w}' expected.")))
        }
    }

    fn start(&self) -> u32 {
        self.peek().span.start
    }

    fn prev_end(&self) -> u32 {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.prev_end().max(start))
    }

    fn fail(&mut self, code: u32, span: Span, message: impl Into<String>) -> Fail {
        self.issues.push(Issue::error(code, span, message));
        Fail
    }

    fn error(&mut self, code: u32, span: Span, message: impl Into<String>) {
        self.issues.push(Issue::error(code, span, message));
    }

    fn erase(&mut self, span: Span) {
        if !span.is_empty() {
            self.erasures.push(Erasure {
                span,
                statement: false,
            });
        }
    }

    fn erase_statement(&mut self, span: Span) {
        self.erasures.push(Erasure {
            span,
            statement: true,
        });
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            issues: self.issues.len(),
            erasures: self.erasures.len(),
        }
    }

    fn restore(&mut self, cp: Checkpoint) {
        self.pos = cp.pos;
        self.issues.truncate(cp.issues);
        self.erasures.truncate(cp.erasures);
    }

    /// Run `f` one nesting level deeper
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.too_deep());
        }
        self.depth += 1;
        self.height = self.height.max(self.depth);
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Begin a left-nested chain (`a.b.c`, `a + b + c`); returns the height to restore
    fn chain_start(&mut self) -> u32 {
        std::mem::replace(&mut self.height, self.depth)
    }

    /// One more node wrapping the chain so far
    fn chain_link(&mut self) -> PResult<()> {
        self.height += 1;
        if self.height > MAX_NESTING_DEPTH {
            return Err(self.too_deep());
        }
        Ok(())
    }

    fn chain_end(&mut self, saved: u32) {
        self.height = self.height.max(saved);
    }

    fn too_deep(&mut self) -> Fail {
        let span = self.peek().span;
        self.fail(
            codes::NESTING_TOO_DEEP,
            span,
            format!("Expression or statement nested more than {MAX_NESTING_DEPTH} levels deep."),
        )
    }

    fn allow_in<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.no_in, false);
        let out = f(self);
        self.no_in = saved;
        out
    }

    /// Whether the next two tokens touch
    fn adjacent(&self, n: usize) -> bool {
        self.peek_at(n).span.end == self.peek_at(n + 1).span.start
    }

    /// Recombine `>` tokens into the operator they spell
    fn gt_operator(&self) -> Option<(&'static str, usize)> {
        if !self.at(">") {
            return None;
        }
        let next = |n: usize, p: &str| self.peek_at(n).is_punct(p) && self.adjacent(n - 1);
        if next(1, ">") {
            if next(2, ">") {
                if next(3, "=") {
                    return Some((">>>=", 4));
                }
                return Some((">>>", 3));
            }
            if next(2, "=") {
                return Some((">>=", 3));
            }
            return Some((">>", 2));
        }
        if next(1, "=") {
            return Some((">=", 2));
        }
        if next(1, "==") || next(1, "===") || next(1, "=>") {
            return None;
        }
        Some((">", 1))
    }

    fn semicolon(&mut self) -> PResult<()> {
        if self.eat(";") || self.at("}") || self.at_eof() || self.peek().newline_before {
            Ok(())
        } else {
            let span = self.peek().span;
            Err(self.fail(codes::TOKEN_EXPECTED, span, "';' expected."))
        }
    }

    fn ident(&mut self) -> PResult<Ident> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) if !is_reserved_word(&name) => {
                self.bump();
                Ok(Ident {
                    name,
                    span: token.span,
                })
            }
            _ => Err(self.fail(codes::IDENTIFIER_EXPECTED, token.span, "Identifier expected.")),
        }
    }

    /// Any word, including reserved ones (property names)
    fn name(&mut self) -> PResult<Ident> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Ident {
                    name,
                    span: token.span,
                })
            }
            _ => Err(self.fail(codes::IDENTIFIER_EXPECTED, token.span, "Identifier expected.")),
        }
    }

    fn synchronize(&mut self, start: usize) {
        if self.pos == start {
            self.bump();
        }
        loop {
            if self.at_eof() || self.at("}") {
                return;
            }
            if self.eat(";") {
                return;
            }
            if self.peek().newline_before {
                return;
            }
            self.bump();
        }
    }

    /// Skip a balanced `{ ... }` group
    fn skip_braces(&mut self) {
        if !self.eat("{") {
            return;
        }
        let mut depth = 1;
        while depth > 0 && !self.at_eof() {
            if self.at("{") {
                depth += 1;
            } else if self.at("}") {
                depth -= 1;
            }
            self.bump();
        }
    }

    // ---- statements ----

    fn statements_until_eof(&mut self) -> Vec<Stmt> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.statement_or_recover());
        }
        body
    }

    fn statement_or_recover(&mut self) -> Stmt {
        let start_pos = self.pos;
        let start = self.start();
        match self.statement() {
            Ok(stmt) => stmt,
            Err(Fail) => {
                self.synchronize(start_pos);
                self.height = self.depth;
                Stmt {
                    kind: StmtKind::Empty,
                    span: self.span_from(start),
                }
            }
        }
    }

    fn block_body(&mut self) -> PResult<Vec<Stmt>> {
        self.expect("{")?;
        let mut body = Vec::new();
        while !self.at("}") && !self.at_eof() {
            body.push(self.statement_or_recover());
        }
        self.expect("}")?;
        Ok(body)
    }

    fn statement(&mut self) -> PResult<Stmt> {
        self.nested(Self::statement_level)
    }

    fn statement_level(&mut self) -> PResult<Stmt> {
        let start = self.start();
        let token = self.peek().clone();
        let next = self.peek_at(1).clone();
        let kind = match &token.kind {
            TokenKind::Punct("{") => StmtKind::Block(self.block_body()?),
            TokenKind::Punct(";") => {
                self.bump();
                StmtKind::Empty
            }
            TokenKind::Ident(word) => match word.as_str() {
                "const" if next.is_word("enum") => return self.not_erasable("const enum"),
                "const" | "var" => StmtKind::Var(self.var_statement(false)?),
                "let" if matches!(next.kind, TokenKind::Ident(_))
                    || next.is_punct("[")
                    || next.is_punct("{") =>
                {
                    StmtKind::Var(self.var_statement(false)?)
                }
                "function" => StmtKind::Function(self.function_decl(false)?),
                "async" if next.is_word("function") && !next.newline_before => {
                    StmtKind::Function(self.function_decl(false)?)
                }
                "if" => self.if_statement()?,
                "for" => self.for_statement()?,
                "while" => {
                    self.bump();
                    let test = self.paren_expr()?;
                    let body = Box::new(self.statement_or_recover());
                    StmtKind::While { test, body }
                }
                "do" => {
                    self.bump();
                    let body = Box::new(self.statement_or_recover());
                    self.expect_word("while")?;
                    let test = self.paren_expr()?;
                    self.eat(";");
                    StmtKind::DoWhile { body, test }
                }
                "switch" => self.switch_statement()?,
                "try" => self.try_statement()?,
                "throw" => {
                    self.bump();
                    if self.peek().newline_before {
                        let span = self.peek().span;
                        return Err(self.fail(
                            codes::EXPRESSION_EXPECTED,
                            span,
                            "Line break not permitted here.",
                        ));
                    }
                    let arg = self.expression()?;
                    self.semicolon()?;
                    StmtKind::Throw(arg)
                }
                "return" => {
                    self.bump();
                    let arg = if self.at(";")
                        || self.at("}")
                        || self.at_eof()
                        || self.peek().newline_before
                    {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.semicolon()?;
                    StmtKind::Return(arg)
                }
                "break" | "continue" => {
                    self.bump();
                    let label = match &self.peek().kind {
                        TokenKind::Ident(_) if !self.peek().newline_before => Some(self.ident()?),
                        _ => None,
                    };
                    self.semicolon()?;
                    if word == "break" {
                        StmtKind::Break(label)
                    } else {
                        StmtKind::Continue(label)
                    }
                }
                "interface" if matches!(next.kind, TokenKind::Ident(_)) => {
                    let decl = self.interface_decl()?;
                    let stmt = Stmt {
                        kind: StmtKind::Interface(decl),
                        span: self.span_from(start),
                    };
                    self.erase_statement(stmt.span);
                    return Ok(stmt);
                }
                "type"
                    if matches!(next.kind, TokenKind::Ident(_))
                        && (self.peek_at(2).is_punct("=") || self.peek_at(2).is_punct("<")) =>
                {
                    let decl = self.type_alias_decl()?;
                    let stmt = Stmt {
                        kind: StmtKind::TypeAlias(decl),
                        span: self.span_from(start),
                    };
                    self.erase_statement(stmt.span);
                    return Ok(stmt);
                }
                "declare" if matches!(next.kind, TokenKind::Ident(_)) && !next.newline_before => {
                    let stmt = self.declare_statement()?;
                    self.erase_statement(stmt.span);
                    return Ok(stmt);
                }
                "namespace" | "module"
                    if matches!(next.kind, TokenKind::Ident(_) | TokenKind::Str(_))
                        && !next.newline_before =>
                {
                    return self.not_erasable("namespace");
                }
                "enum" => return self.not_erasable("enum"),
                "class" | "abstract" => {
                    let span = token.span;
                    self.error(
                        codes::UNSUPPORTED_SYNTAX,
                        span,
                        "Classes are not supported; use object literals and functions.",
                    );
                    self.bump();
                    while !self.at("{") && !self.at_eof() {
                        self.bump();
                    }
                    self.skip_braces();
                    StmtKind::Empty
                }
                "import" if !next.is_punct("(") && !next.is_punct(".") => {
                    self.error(
                        codes::UNSUPPORTED_SYNTAX,
                        token.span,
                        "Module syntax is not supported.",
                    );
                    return Err(Fail);
                }
                "export" => return self.export_statement(),
                "with" => {
                    return Err(self.fail(
                        codes::UNSUPPORTED_SYNTAX,
                        token.span,
                        "'with' statements are not allowed in strict mode.",
                    ));
                }
                "debugger" => {
                    self.bump();
                    self.semicolon()?;
                    StmtKind::Empty
                }
                _ if next.is_punct(":") && !is_reserved_word(word) => {
                    let label = self.ident()?;
                    self.bump();
                    let body = Box::new(self.statement_or_recover());
                    StmtKind::Labeled { label, body }
                }
                _ => self.expression_statement()?,
            },
            TokenKind::Punct("}") => {
                return Err(self.fail(
                    codes::STATEMENT_EXPECTED,
                    token.span,
                    "Declaration or statement expected.",
                ));
            }
            _ => self.expression_statement()?,
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn not_erasable(&mut self, what: &str) -> PResult<Stmt> {
        let start = self.start();
        let span = self.peek().span;
        self.error(
            codes::NOT_ERASABLE,
            span,
            format!("'{what}' declarations have runtime semantics and cannot be erased."),
        );
        while !self.at("{") && !self.at_eof() {
            self.bump();
        }
        self.skip_braces();
        Ok(Stmt {
            kind: StmtKind::Empty,
            span: self.span_from(start),
        })
    }

    fn expression_statement(&mut self) -> PResult<StmtKind> {
        let expr = self.expression()?;
        self.semicolon()?;
        Ok(StmtKind::Expr(expr))
    }

    fn export_statement(&mut self) -> PResult<Stmt> {
        let export = self.bump().span;
        let mut erased = export;
        if self.at_word("default") {
            erased = export.to(self.bump().span);
        } else {
            let declares = ["const", "let", "var", "function", "async", "interface", "type", "declare"];
            if !declares.iter().any(|w| self.at_word(w)) {
                return Err(self.fail(
                    codes::UNSUPPORTED_SYNTAX,
                    export,
                    "Module syntax is not supported.",
                ));
            }
        }
        self.erase(erased);
        self.statement()
    }

    fn var_statement(&mut self, declare: bool) -> PResult<VarDecl> {
        let decl = self.var_decl(declare)?;
        self.semicolon()?;
        Ok(decl)
    }

    fn var_kind(&mut self) -> PResult<VarKind> {
        let token = self.bump();
        match token.word() {
            Some("const") => Ok(VarKind::Const),
            Some("let") => Ok(VarKind::Let),
            Some("var") => Ok(VarKind::Var),
            _ => Err(self.fail(codes::TOKEN_EXPECTED, token.span, "'const' expected.")),
        }
    }

    fn var_decl(&mut self, declare: bool) -> PResult<VarDecl> {
        let kind = self.var_kind()?;
        let mut decls = Vec::new();
        loop {
            let start = self.start();
            let pattern = self.binding_pattern()?;
            self.declarator_rest(start, pattern, &mut decls)?;
            if !self.eat(",") {
                break;
            }
        }
        Ok(VarDecl {
            kind,
            decls,
            declare,
        })
    }

    fn declarator_rest(
        &mut self,
        start: u32,
        pattern: Pattern,
        decls: &mut Vec<Declarator>,
    ) -> PResult<()> {
        if self.at("!") && self.peek_at(1).is_punct(":") {
            let bang = self.bump().span;
            self.erase(bang);
        }
        let ty = self.type_annotation()?;
        let init = if self.eat("=") {
            Some(self.assignment_expr()?)
        } else {
            None
        };
        decls.push(Declarator {
            pattern,
            ty,
            init,
            span: self.span_from(start),
        });
        Ok(())
    }

    /// `: T`, erased
    fn type_annotation(&mut self) -> PResult<Option<TypeNode>> {
        if !self.at(":") {
            return Ok(None);
        }
        let colon = self.bump().span;
        let ty = self.parse_type()?;
        self.erase(colon.to(ty.span));
        Ok(Some(ty))
    }

    /// Function return annotation, which may be a type predicate
    fn return_annotation(&mut self) -> PResult<Option<TypeNode>> {
        if !self.at(":") {
            return Ok(None);
        }
        let colon = self.bump().span;
        let ty = self.return_type()?;
        self.erase(colon.to(ty.span));
        Ok(Some(ty))
    }

    fn return_type(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        let next = self.peek_at(1);
        let asserts = self.at_word("asserts") && next.word().is_some() && !next.newline_before;
        if asserts {
            self.bump();
        }
        let is_next = self.peek_at(1);
        if self.peek().word().is_some() && is_next.is_word("is") && !is_next.newline_before {
            let param = self.name()?.name;
            self.bump();
            let ty = self.parse_type()?;
            return Ok(TypeNode {
                kind: TypeKind::Predicate {
                    param,
                    asserts,
                    ty: Some(Box::new(ty)),
                },
                span: self.span_from(start),
            });
        }
        if asserts {
            let param = self.name()?.name;
            return Ok(TypeNode {
                kind: TypeKind::Predicate { param, asserts, ty: None },
                span: self.span_from(start),
            });
        }
        self.parse_type()
    }

    fn binding_pattern(&mut self) -> PResult<Pattern> {
        self.nested(Self::pattern_level)
    }

    fn pattern_level(&mut self) -> PResult<Pattern> {
        let start = self.start();
        if self.eat("[") {
            let mut elems = Vec::new();
            let mut rest = None;
            while !self.at("]") && !self.at_eof() {
                if self.eat(",") {
                    elems.push(None);
                    continue;
                }
                if self.eat("...") {
                    rest = Some(Box::new(self.binding_pattern()?));
                    break;
                }
                let pattern = self.binding_pattern()?;
                let default = if self.eat("=") {
                    Some(self.allow_in(Self::assignment_expr)?)
                } else {
                    None
                };
                elems.push(Some(ArrayPatternElem { pattern, default }));
                if !self.at("]") {
                    self.expect(",")?;
                }
            }
            self.expect("]")?;
            return Ok(Pattern {
                kind: PatternKind::Array { elems, rest },
                span: self.span_from(start),
            });
        }
        if self.eat("{") {
            let mut props = Vec::new();
            let mut rest = None;
            while !self.at("}") && !self.at_eof() {
                if self.eat("...") {
                    rest = Some(Box::new(self.binding_pattern()?));
                    break;
                }
                let key = self.prop_key()?;
                let value = if self.eat(":") {
                    self.binding_pattern()?
                } else {
                    match &key {
                        PropKey::Ident(ident) if !is_reserved_word(&ident.name) => Pattern {
                            kind: PatternKind::Ident(ident.clone()),
                            span: ident.span,
                        },
                        other => {
                            let span = other.span();
                            return Err(self.fail(codes::TOKEN_EXPECTED, span, "':' expected."));
                        }
                    }
                };
                let default = if self.eat("=") {
                    Some(self.allow_in(Self::assignment_expr)?)
                } else {
                    None
                };
                props.push(ObjectPatternProp {
                    key,
                    value,
                    default,
                });
                if !self.at("}") {
                    self.expect(",")?;
                }
            }
            self.expect("}")?;
            return Ok(Pattern {
                kind: PatternKind::Object { props, rest },
                span: self.span_from(start),
            });
        }
        let ident = self.ident()?;
        Ok(Pattern {
            span: ident.span,
            kind: PatternKind::Ident(ident),
        })
    }

    fn function_decl(&mut self, declare: bool) -> PResult<FunctionDecl> {
        let start = self.start();
        let is_async = self.eat_word("async");
        self.expect_word("function")?;
        if self.at("*") {
            let span = self.peek().span;
            return Err(self.fail(codes::UNSUPPORTED_SYNTAX, span, "Generators are not supported."));
        }
        let name = self.ident()?;
        let ambient = declare || self.ambient;
        let func = self.function_rest(start, is_async)?;
        if func.body.is_none() && !self.ambient && !declare {
            // Overload signature in source; only the implementation runs
            let span = self.span_from(start);
            self.erase_statement(span);
        }
        Ok(FunctionDecl {
            name,
            func,
            declare: ambient,
        })
    }

    /// Type parameters, parameters, return type and body
    fn function_rest(&mut self, start: u32, is_async: bool) -> PResult<Function> {
        let type_params = self.type_params(true)?;
        let params = self.params()?;
        let ret = self.return_annotation()?;
        let body = if self.at("{") {
            Some(FnBody::Block(self.allow_in(Self::block_body)?))
        } else {
            self.semicolon()?;
            None
        };
        Ok(Function {
            type_params,
            params,
            ret,
            body,
            is_async,
            is_arrow: false,
            span: self.span_from(start),
        })
    }

    fn type_params(&mut self, erase: bool) -> PResult<Vec<TypeParam>> {
        if !self.at("<") {
            return Ok(Vec::new());
        }
        let open = self.bump().span;
        let mut params = Vec::new();
        while !self.at(">") && !self.at_eof() {
            let name = self.ident()?;
            let constraint = if self.eat_word("extends") {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.eat("=") {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(TypeParam {
                name,
                constraint,
                default,
            });
            if !self.at(">") {
                self.expect(",")?;
            }
        }
        let close = self.expect(">")?;
        if erase {
            self.erase(open.to(close));
        }
        Ok(params)
    }

    fn params(&mut self) -> PResult<Vec<Param>> {
        self.expect("(")?;
        let mut params = Vec::new();
        while !self.at(")") && !self.at_eof() {
            params.push(self.param()?);
            if !self.at(")") {
                self.expect(",")?;
            }
        }
        self.expect(")")?;
        Ok(params)
    }

    fn param(&mut self) -> PResult<Param> {
        let start = self.start();
        let rest = self.eat("...");
        let pattern = self.binding_pattern()?;
        let optional = if self.at("?") {
            let q = self.bump().span;
            self.erase(q);
            true
        } else {
            false
        };
        let ty = self.type_annotation()?;
        let default = if self.eat("=") {
            Some(self.allow_in(Self::assignment_expr)?)
        } else {
            None
        };
        Ok(Param {
            pattern,
            ty,
            optional,
            default,
            rest,
            span: self.span_from(start),
        })
    }

    fn if_statement(&mut self) -> PResult<StmtKind> {
        self.bump();
        let test = self.paren_expr()?;
        let cons = Box::new(self.statement_or_recover());
        let alt = if self.eat_word("else") {
            Some(Box::new(self.statement_or_recover()))
        } else {
            None
        };
        Ok(StmtKind::If { test, cons, alt })
    }

    fn paren_expr(&mut self) -> PResult<Expr> {
        self.expect("(")?;
        let expr = self.allow_in(Self::expression)?;
        self.expect(")")?;
        Ok(expr)
    }

    fn for_statement(&mut self) -> PResult<StmtKind> {
        let for_span = self.bump().span;
        if self.at_word("await") {
            return Err(self.fail(
                codes::UNSUPPORTED_SYNTAX,
                for_span,
                "'for await' loops are not supported.",
            ));
        }
        self.expect("(")?;
        let mut init = None;
        if !self.at(";") {
            let is_decl = self.at_word("const")
                || self.at_word("var")
                || (self.at_word("let")
                    && matches!(
                        self.peek_at(1).kind,
                        TokenKind::Ident(_) | TokenKind::Punct("[") | TokenKind::Punct("{")
                    ));
            if is_decl {
                let kind = self.var_kind()?;
                let start = self.start();
                let pattern = self.binding_pattern()?;
                if self.eat_word("of") {
                    return self.for_of_rest(ForHead::Decl(kind, pattern));
                }
                if self.eat_word("in") {
                    return self.for_in_rest(ForHead::Decl(kind, pattern));
                }
                let mut decls = Vec::new();
                self.no_in = true;
                let result = self.declarator_rest(start, pattern, &mut decls).and_then(|()| {
                    while self.eat(",") {
                        let start = self.start();
                        let pattern = self.binding_pattern()?;
                        self.declarator_rest(start, pattern, &mut decls)?;
                    }
                    Ok(())
                });
                self.no_in = false;
                result?;
                init = Some(ForInit::Var(VarDecl {
                    kind,
                    decls,
                    declare: false,
                }));
            } else {
                self.no_in = true;
                let expr = self.expression();
                self.no_in = false;
                let expr = expr?;
                if self.eat_word("of") {
                    return self.for_of_rest(ForHead::Expr(expr));
                }
                if self.eat_word("in") {
                    return self.for_in_rest(ForHead::Expr(expr));
                }
                init = Some(ForInit::Expr(expr));
            }
        }
        self.expect(";")?;
        let test = if self.at(";") {
            None
        } else {
            Some(self.allow_in(Self::expression)?)
        };
        self.expect(";")?;
        let update = if self.at(")") {
            None
        } else {
            Some(self.allow_in(Self::expression)?)
        };
        self.expect(")")?;
        let body = Box::new(self.statement_or_recover());
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn for_of_rest(&mut self, head: ForHead) -> PResult<StmtKind> {
        let iter = self.allow_in(Self::assignment_expr)?;
        self.expect(")")?;
        let body = Box::new(self.statement_or_recover());
        Ok(StmtKind::ForOf { head, iter, body })
    }

    fn for_in_rest(&mut self, head: ForHead) -> PResult<StmtKind> {
        let object = self.allow_in(Self::expression)?;
        self.expect(")")?;
        let body = Box::new(self.statement_or_recover());
        Ok(StmtKind::ForIn { head, object, body })
    }

    fn switch_statement(&mut self) -> PResult<StmtKind> {
        self.bump();
        let discriminant = self.paren_expr()?;
        self.expect("{")?;
        let mut cases = Vec::new();
        while !self.at("}") && !self.at_eof() {
            let start = self.start();
            let test = if self.eat_word("case") {
                Some(self.allow_in(Self::expression)?)
            } else {
                self.expect_word("default")?;
                None
            };
            self.expect(":")?;
            let mut body = Vec::new();
            while !self.at_word("case") && !self.at_word("default") && !self.at("}") && !self.at_eof() {
                body.push(self.statement_or_recover());
            }
            cases.push(SwitchCase {
                test,
                body,
                span: self.span_from(start),
            });
        }
        self.expect("}")?;
        Ok(StmtKind::Switch {
            discriminant,
            cases,
        })
    }

    fn try_statement(&mut self) -> PResult<StmtKind> {
        self.bump();
        let block = self.block_body()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_word("catch") {
            if self.eat("(") {
                param = Some(self.binding_pattern()?);
                self.type_annotation()?;
                self.expect(")")?;
            }
            handler = Some(self.block_body()?);
        }
        let finalizer = if self.eat_word("finally") {
            Some(self.block_body()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            let span = self.peek().span;
            return Err(self.fail(codes::TOKEN_EXPECTED, span, "'catch' or 'finally' expected."));
        }
        Ok(StmtKind::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    fn interface_decl(&mut self) -> PResult<InterfaceDecl> {
        self.expect_word("interface")?;
        let name = self.ident()?;
        let type_params = self.type_params(false)?;
        let mut extends = Vec::new();
        if self.eat_word("extends") {
            loop {
                extends.push(self.type_reference()?);
                if !self.eat(",") {
                    break;
                }
            }
        }
        let members = self.type_members()?;
        Ok(InterfaceDecl {
            name,
            type_params,
            extends,
            members,
        })
    }

    fn type_alias_decl(&mut self) -> PResult<TypeAliasDecl> {
        self.expect_word("type")?;
        let name = self.ident()?;
        let type_params = self.type_params(false)?;
        self.expect("=")?;
        let ty = self.parse_type()?;
        self.semicolon()?;
        Ok(TypeAliasDecl {
            name,
            type_params,
            ty,
        })
    }

    fn declare_statement(&mut self) -> PResult<Stmt> {
        let start = self.start();
        self.bump();
        let kind = if self.at_word("const") || self.at_word("let") || self.at_word("var") {
            StmtKind::Var(self.var_statement(true)?)
        } else if self.at_word("function") || self.at_word("async") {
            StmtKind::Function(self.function_decl(true)?)
        } else if self.at_word("namespace") || self.at_word("module") {
            self.bump();
            let name = self.ident()?;
            self.expect("{")?;
            let saved = std::mem::replace(&mut self.ambient, true);
            let mut body = Vec::new();
            while !self.at("}") && !self.at_eof() {
                body.push(self.statement_or_recover());
            }
            self.ambient = saved;
            self.expect("}")?;
            StmtKind::Namespace { name, body }
        } else if self.at_word("interface") {
            StmtKind::Interface(self.interface_decl()?)
        } else if self.at_word("type") {
            StmtKind::TypeAlias(self.type_alias_decl()?)
        } else {
            let span = self.peek().span;
            return Err(self.fail(
                codes::STATEMENT_EXPECTED,
                span,
                "Declaration expected after 'declare'.",
            ));
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    // ---- expressions ----

    fn expression(&mut self) -> PResult<Expr> {
        let start = self.start();
        let first = self.assignment_expr()?;
        if !self.at(",") {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(",") {
            exprs.push(self.assignment_expr()?);
        }
        Ok(Expr {
            kind: ExprKind::Sequence(exprs),
            span: self.span_from(start),
        })
    }

    fn assignment_expr(&mut self) -> PResult<Expr> {
        self.nested(Self::assignment_level)
    }

    fn assignment_level(&mut self) -> PResult<Expr> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }
        let start = self.start();
        let target = self.conditional_expr()?;

        let op = if let Some((op, count)) = self.gt_operator() {
            match op {
                ">>=" | ">>>=" => {
                    for _ in 0..count {
                        self.bump();
                    }
                    Some(AssignOp::Compound(if op == ">>=" { BinaryOp::Shr } else { BinaryOp::UShr }))
                }
                _ => None,
            }
        } else {
            let op = match &self.peek().kind {
                TokenKind::Punct(p) => assign_op(p),
                _ => None,
            };
            if op.is_some() {
                self.bump();
            }
            op
        };
        let Some(op) = op else {
            return Ok(target);
        };

        let valid_target = match &target.kind {
            ExprKind::Ident(_) | ExprKind::Member { optional: false, .. } | ExprKind::Index { optional: false, .. } => true,
            ExprKind::NonNull(inner) => matches!(inner.kind, ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. }),
            ExprKind::Array(_) | ExprKind::Object(_) => op == AssignOp::Assign,
            _ => false,
        };
        if !valid_target {
            self.error(
                codes::INVALID_ASSIGNMENT_TARGET,
                target.span,
                "The left-hand side of an assignment expression must be a variable or a property access.",
            );
        }
        let value = self.assignment_expr()?;
        Ok(Expr {
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span: self.span_from(start),
        })
    }

    /// Attempt an arrow function at the current position
    fn try_arrow(&mut self) -> PResult<Option<Expr>> {
        let token = self.peek().clone();
        let next = self.peek_at(1).clone();
        let plausible = match &token.kind {
            TokenKind::Punct("(") | TokenKind::Punct("<") => true,
            TokenKind::Ident(word) if word == "async" => {
                !next.newline_before
                    && (next.is_punct("(")
                        || next.is_punct("<")
                        || (matches!(next.kind, TokenKind::Ident(_)) && self.peek_at(2).is_punct("=>")))
            }
            TokenKind::Ident(word) => !is_reserved_word(word) && next.is_punct("=>"),
            _ => false,
        };
        if !plausible {
            return Ok(None);
        }
        let start = self.start();
        let cp = self.checkpoint();
        let head = match self.arrow_head() {
            Ok(head) => head,
            Err(Fail) => {
                self.restore(cp);
                return Ok(None);
            }
        };
        let (is_async, type_params, params, ret) = head;
        let body = if self.at("{") {
            FnBody::Block(self.allow_in(Self::block_body)?)
        } else {
            FnBody::Expr(Box::new(self.assignment_expr()?))
        };
        let span = self.span_from(start);
        Ok(Some(Expr {
            kind: ExprKind::Function {
                name: None,
                func: Box::new(Function {
                    type_params,
                    params,
                    ret,
                    body: Some(body),
                    is_async,
                    is_arrow: true,
                    span,
                }),
            },
            span,
        }))
    }

    /// Everything up to and including `=>`
    fn arrow_head(&mut self) -> PResult<ArrowHead> {
        let is_async = self.at_word("async") && !self.peek_at(1).is_punct("=>");
        if is_async {
            self.bump();
        }
        let (type_params, params) = if matches!(self.peek().kind, TokenKind::Ident(_)) {
            let ident = self.ident()?;
            let param = Param {
                span: ident.span,
                pattern: Pattern {
                    span: ident.span,
                    kind: PatternKind::Ident(ident),
                },
                ty: None,
                optional: false,
                default: None,
                rest: false,
            };
            (Vec::new(), vec![param])
        } else {
            let type_params = self.type_params(true)?;
            (type_params, self.params()?)
        };
        let ret = self.return_annotation()?;
        if !self.at("=>") || self.peek().newline_before {
            let span = self.peek().span;
            return Err(self.fail(codes::TOKEN_EXPECTED, span, "'=>' expected."));
        }
        self.bump();
        Ok((is_async, type_params, params, ret))
    }

    fn conditional_expr(&mut self) -> PResult<Expr> {
        let start = self.start();
        let test = self.binary_expr(0)?;
        if !self.at("?") {
            return Ok(test);
        }
        self.bump();
        let cons = self.allow_in(Self::assignment_expr)?;
        self.expect(":")?;
        let alt = self.assignment_expr()?;
        Ok(Expr {
            kind: ExprKind::Conditional {
                test: Box::new(test),
                cons: Box::new(cons),
                alt: Box::new(alt),
            },
            span: self.span_from(start),
        })
    }

    fn binary_operator(&self) -> Option<(BinOrLogical, u8, usize)> {
        if let Some((op, count)) = self.gt_operator() {
            return match op {
                ">" => Some((BinOrLogical::Bin(BinaryOp::Gt), 8, count)),
                ">=" => Some((BinOrLogical::Bin(BinaryOp::Ge), 8, count)),
                ">>" => Some((BinOrLogical::Bin(BinaryOp::Shr), 9, count)),
                ">>>" => Some((BinOrLogical::Bin(BinaryOp::UShr), 9, count)),
                _ => None,
            };
        }
        let token = self.peek();
        let (op, prec) = match &token.kind {
            TokenKind::Punct(p) => match *p {
                "??" => (BinOrLogical::Logical(LogicalOp::Nullish), 1),
                "||" => (BinOrLogical::Logical(LogicalOp::Or), 2),
                "&&" => (BinOrLogical::Logical(LogicalOp::And), 3),
                "|" => (BinOrLogical::Bin(BinaryOp::BitOr), 4),
                "^" => (BinOrLogical::Bin(BinaryOp::BitXor), 5),
                "&" => (BinOrLogical::Bin(BinaryOp::BitAnd), 6),
                "==" => (BinOrLogical::Bin(BinaryOp::LooseEq), 7),
                "!=" => (BinOrLogical::Bin(BinaryOp::LooseNe), 7),
                "===" => (BinOrLogical::Bin(BinaryOp::StrictEq), 7),
                "!==" => (BinOrLogical::Bin(BinaryOp::StrictNe), 7),
                "<" => (BinOrLogical::Bin(BinaryOp::Lt), 8),
                "<=" => (BinOrLogical::Bin(BinaryOp::Le), 8),
                "<<" => (BinOrLogical::Bin(BinaryOp::Shl), 9),
                "+" => (BinOrLogical::Bin(BinaryOp::Add), 10),
                "-" => (BinOrLogical::Bin(BinaryOp::Sub), 10),
                "*" => (BinOrLogical::Bin(BinaryOp::Mul), 11),
                "/" => (BinOrLogical::Bin(BinaryOp::Div), 11),
                "%" => (BinOrLogical::Bin(BinaryOp::Rem), 11),
                "**" => (BinOrLogical::Bin(BinaryOp::Exp), 12),
                _ => return None,
            },
            TokenKind::Ident(word) => match word.as_str() {
                "instanceof" => (BinOrLogical::Bin(BinaryOp::Instanceof), 8),
                "in" if !self.no_in => (BinOrLogical::Bin(BinaryOp::In), 8),
                "as" if !token.newline_before => (BinOrLogical::As, 8),
                "satisfies" if !token.newline_before => (BinOrLogical::Satisfies, 8),
                _ => return None,
            },
            _ => return None,
        };
        Some((op, prec, 1))
    }

    fn binary_expr(&mut self, min_prec: u8) -> PResult<Expr> {
        let saved = self.chain_start();
        let result = self.binary_chain(min_prec);
        self.chain_end(saved);
        result
    }

    fn binary_chain(&mut self, min_prec: u8) -> PResult<Expr> {
        let start = self.start();
        let mut left = self.unary_expr()?;
        while let Some((op, prec, count)) = self.binary_operator() {
            if prec < min_prec {
                break;
            }
            let op_span = self.peek().span;
            for _ in 0..count {
                self.bump();
            }
            let kind = match op {
                BinOrLogical::As | BinOrLogical::Satisfies => {
                    let ty = self.parse_type()?;
                    self.erase(op_span.to(ty.span));
                    if matches!(op, BinOrLogical::As) {
                        ExprKind::As {
                            expr: Box::new(left),
                            ty,
                        }
                    } else {
                        ExprKind::Satisfies {
                            expr: Box::new(left),
                            ty,
                        }
                    }
                }
                BinOrLogical::Bin(bin) => {
                    let next_min = if bin == BinaryOp::Exp { prec } else { prec + 1 };
                    let right = self.binary_expr(next_min)?;
                    ExprKind::Binary {
                        op: bin,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
                BinOrLogical::Logical(logical) => {
                    let right = self.binary_expr(prec + 1)?;
                    ExprKind::Logical {
                        op: logical,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
            };
            self.chain_link()?;
            left = Expr {
                kind,
                span: self.span_from(start),
            };
        }
        Ok(left)
    }

    fn unary_expr(&mut self) -> PResult<Expr> {
        self.nested(Self::unary_level)
    }

    fn unary_level(&mut self) -> PResult<Expr> {
        let start = self.start();
        let token = self.peek().clone();
        let op = match &token.kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("~") => Some(UnaryOp::BitNot),
            TokenKind::Ident(word) => match word.as_str() {
                "typeof" => Some(UnaryOp::Typeof),
                "void" => Some(UnaryOp::Void),
                "delete" => Some(UnaryOp::Delete),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let arg = self.unary_expr()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    arg: Box::new(arg),
                },
                span: self.span_from(start),
            });
        }
        if token.is_punct("++") || token.is_punct("--") {
            self.bump();
            let arg = self.unary_expr()?;
            return Ok(Expr {
                kind: ExprKind::Update {
                    increment: token.is_punct("++"),
                    prefix: true,
                    arg: Box::new(arg),
                },
                span: self.span_from(start),
            });
        }
        if token.is_word("await") {
            self.bump();
            let arg = self.unary_expr()?;
            return Ok(Expr {
                kind: ExprKind::Await(Box::new(arg)),
                span: self.span_from(start),
            });
        }
        if token.is_punct("<") {
            return Err(self.fail(
                codes::UNSUPPORTED_SYNTAX,
                token.span,
                "Angle-bracket type assertions are not supported; use 'as'.",
            ));
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> PResult<Expr> {
        let start = self.start();
        let expr = self.lhs_expr()?;
        let token = self.peek().clone();
        if (token.is_punct("++") || token.is_punct("--")) && !token.newline_before {
            self.bump();
            return Ok(Expr {
                kind: ExprKind::Update {
                    increment: token.is_punct("++"),
                    prefix: false,
                    arg: Box::new(expr),
                },
                span: self.span_from(start),
            });
        }
        Ok(expr)
    }

    fn lhs_expr(&mut self) -> PResult<Expr> {
        let saved = self.chain_start();
        let result = self.lhs_chain();
        self.chain_end(saved);
        result
    }

    fn lhs_chain(&mut self) -> PResult<Expr> {
        let start = self.start();
        let mut expr = if self.at_word("new") {
            self.new_expr()?
        } else {
            self.primary_expr()?
        };
        loop {
            if self.eat(".") {
                let prop = self.name()?;
                self.chain_link()?;
                expr = Expr {
                    kind: ExprKind::Member {
                        object: Box::new(expr),
                        prop,
                        optional: false,
                    },
                    span: self.span_from(start),
                };
            } else if self.eat("?.") {
                if self.at("(") {
                    let args = self.arguments()?;
                    self.chain_link()?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            type_args: Vec::new(),
                            args,
                            optional: true,
                        },
                        span: self.span_from(start),
                    };
                } else if self.eat("[") {
                    let index = self.allow_in(Self::expression)?;
                    self.expect("]")?;
                    self.chain_link()?;
                    expr = Expr {
                        kind: ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                            optional: true,
                        },
                        span: self.span_from(start),
                    };
                } else {
                    let prop = self.name()?;
                    self.chain_link()?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            prop,
                            optional: true,
                        },
                        span: self.span_from(start),
                    };
                }
            } else if self.at("[") {
                self.bump();
                let index = self.allow_in(Self::expression)?;
                self.expect("]")?;
                self.chain_link()?;
                expr = Expr {
                    kind: ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: false,
                    },
                    span: self.span_from(start),
                };
            } else if self.at("(") {
                let args = self.arguments()?;
                self.chain_link()?;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        type_args: Vec::new(),
                        args,
                        optional: false,
                    },
                    span: self.span_from(start),
                };
            } else if self.at("<") {
                let Some(type_args) = self.try_call_type_args() else {
                    break;
                };
                let args = self.arguments()?;
                self.chain_link()?;
                expr = Expr {
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        type_args,
                        args,
                        optional: false,
                    },
                    span: self.span_from(start),
                };
            } else if self.at("!") && !self.peek().newline_before {
                let bang = self.bump().span;
                self.erase(bang);
                self.chain_link()?;
                expr = Expr {
                    kind: ExprKind::NonNull(Box::new(expr)),
                    span: self.span_from(start),
                };
            } else if matches!(self.peek().kind, TokenKind::Template { head: true, .. }) {
                let span = self.peek().span;
                return Err(self.fail(
                    codes::UNSUPPORTED_SYNTAX,
                    span,
                    "Tagged templates are not supported.",
                ));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// `<T, U>` immediately followed by `(`
    fn try_call_type_args(&mut self) -> Option<Vec<TypeNode>> {
        let cp = self.checkpoint();
        let result = (|| -> PResult<Vec<TypeNode>> {
            let open = self.expect("<")?;
            let mut args = Vec::new();
            while !self.at(">") {
                args.push(self.parse_type()?);
                if !self.at(">") {
                    self.expect(",")?;
                }
            }
            let close = self.expect(">")?;
            if !self.at("(") {
                return Err(Fail);
            }
            self.erase(open.to(close));
            Ok(args)
        })();
        match result {
            Ok(args) => Some(args),
            Err(Fail) => {
                self.restore(cp);
                None
            }
        }
    }

    fn arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect("(")?;
        let args = self.allow_in(|p| {
            let mut args = Vec::new();
            while !p.at(")") && !p.at_eof() {
                let start = p.start();
                if p.eat("...") {
                    let inner = p.assignment_expr()?;
                    args.push(Expr {
                        kind: ExprKind::Spread(Box::new(inner)),
                        span: p.span_from(start),
                    });
                } else {
                    args.push(p.assignment_expr()?);
                }
                if !p.at(")") {
                    p.expect(",")?;
                }
            }
            Ok(args)
        })?;
        self.expect(")")?;
        Ok(args)
    }

    fn new_expr(&mut self) -> PResult<Expr> {
        self.nested(Self::new_level)
    }

    fn new_level(&mut self) -> PResult<Expr> {
        let saved = self.chain_start();
        let result = self.new_chain();
        self.chain_end(saved);
        result
    }

    fn new_chain(&mut self) -> PResult<Expr> {
        let start = self.start();
        self.expect_word("new")?;
        if self.at(".") {
            let span = self.peek().span;
            return Err(self.fail(codes::UNSUPPORTED_SYNTAX, span, "'new.target' is not supported."));
        }
        let callee_start = self.start();
        let mut callee = self.primary_expr()?;
        loop {
            if self.eat(".") {
                let prop = self.name()?;
                self.chain_link()?;
                callee = Expr {
                    kind: ExprKind::Member {
                        object: Box::new(callee),
                        prop,
                        optional: false,
                    },
                    span: self.span_from(callee_start),
                };
            } else if self.eat("[") {
                let index = self.allow_in(Self::expression)?;
                self.expect("]")?;
                self.chain_link()?;
                callee = Expr {
                    kind: ExprKind::Index {
                        object: Box::new(callee),
                        index: Box::new(index),
                        optional: false,
                    },
                    span: self.span_from(callee_start),
                };
            } else {
                break;
            }
        }
        let type_args = if self.at("<") {
            self.try_call_type_args().unwrap_or_default()
        } else {
            Vec::new()
        };
        let args = if self.at("(") {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr {
            kind: ExprKind::New {
                callee: Box::new(callee),
                type_args,
                args,
            },
            span: self.span_from(start),
        })
    }

    fn primary_expr(&mut self) -> PResult<Expr> {
        let start = self.start();
        let token = self.peek().clone();
        let kind = match token.kind {
            TokenKind::Number(n) => {
                self.bump();
                ExprKind::Number(n)
            }
            TokenKind::Str(s) => {
                self.bump();
                ExprKind::Str(s)
            }
            TokenKind::Regex { pattern, flags } => {
                self.bump();
                ExprKind::Regex { pattern, flags }
            }
            TokenKind::Template { .. } => self.template()?,
            TokenKind::Punct("(") => {
                self.bump();
                let inner = self.allow_in(Self::expression)?;
                self.expect(")")?;
                return Ok(inner);
            }
            TokenKind::Punct("[") => self.array_literal()?,
            TokenKind::Punct("{") => self.object_literal()?,
            TokenKind::Ident(word) => match word.as_str() {
                "true" => {
                    self.bump();
                    ExprKind::Bool(true)
                }
                "false" => {
                    self.bump();
                    ExprKind::Bool(false)
                }
                "null" => {
                    self.bump();
                    ExprKind::Null
                }
                "this" => {
                    self.bump();
                    ExprKind::This
                }
                "function" | "async" if word == "function" || self.peek_at(1).is_word("function") => {
                    let is_async = self.eat_word("async");
                    self.bump();
                    if self.at("*") {
                        let span = self.peek().span;
                        return Err(self.fail(codes::UNSUPPORTED_SYNTAX, span, "Generators are not supported."));
                    }
                    let name = if matches!(self.peek().kind, TokenKind::Ident(_)) {
                        Some(self.ident()?)
                    } else {
                        None
                    };
                    let func = self.function_rest(start, is_async)?;
                    if func.body.is_none() {
                        let span = self.peek().span;
                        return Err(self.fail(codes::TOKEN_EXPECTED, span, "'{' expected."));
                    }
                    ExprKind::Function {
                        name,
                        func: Box::new(func),
                    }
                }
                "class" => {
                    return Err(self.fail(
                        codes::UNSUPPORTED_SYNTAX,
                        token.span,
                        "Classes are not supported; use object literals and functions.",
                    ));
                }
                "import" => {
                    return Err(self.fail(
                        codes::UNSUPPORTED_SYNTAX,
                        token.span,
                        "Module syntax is not supported.",
                    ));
                }
                w if is_reserved_word(w) => {
                    return Err(self.fail(codes::EXPRESSION_EXPECTED, token.span, "Expression expected."));
                }
                _ => {
                    self.bump();
                    ExprKind::Ident(word.clone())
                }
            },
            _ => {
                return Err(self.fail(codes::EXPRESSION_EXPECTED, token.span, "Expression expected."));
            }
        };
        Ok(Expr {
            kind,
            span: self.span_from(start),
        })
    }

    fn template(&mut self) -> PResult<ExprKind> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let first = self.bump();
        let span = first.span;
        let TokenKind::Template { cooked, tail, .. } = first.kind else {
            return Err(self.fail(codes::EXPRESSION_EXPECTED, span, "Template expected."));
        };
        quasis.push(cooked);
        let mut done = tail;
        while !done {
            exprs.push(self.allow_in(Self::expression)?);
            let chunk = self.peek().clone();
            match chunk.kind {
                TokenKind::Template {
                    cooked,
                    head: false,
                    tail,
                } => {
                    self.bump();
                    quasis.push(cooked);
                    done = tail;
                }
                _ => {
                    return Err(self.fail(codes::TOKEN_EXPECTED, chunk.span, "'}' expected."));
                }
            }
        }
        Ok(ExprKind::Template { quasis, exprs })
    }

    fn array_literal(&mut self) -> PResult<ExprKind> {
        self.expect("[")?;
        let elems = self.allow_in(|p| {
            let mut elems = Vec::new();
            while !p.at("]") && !p.at_eof() {
                if p.eat(",") {
                    elems.push(None);
                    continue;
                }
                let start = p.start();
                let elem = if p.eat("...") {
                    let inner = p.assignment_expr()?;
                    Expr {
                        kind: ExprKind::Spread(Box::new(inner)),
                        span: p.span_from(start),
                    }
                } else {
                    p.assignment_expr()?
                };
                elems.push(Some(elem));
                if !p.at("]") {
                    p.expect(",")?;
                }
            }
            Ok(elems)
        })?;
        self.expect("]")?;
        Ok(ExprKind::Array(elems))
    }

    fn prop_key(&mut self) -> PResult<PropKey> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(PropKey::Ident(Ident {
                    name,
                    span: token.span,
                }))
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(PropKey::Str(s, token.span))
            }
            TokenKind::Number(n) => {
                self.bump();
                Ok(PropKey::Num(n, token.span))
            }
            TokenKind::Punct("[") => {
                self.bump();
                let expr = self.allow_in(Self::assignment_expr)?;
                self.expect("]")?;
                Ok(PropKey::Computed(Box::new(expr)))
            }
            _ => Err(self.fail(codes::IDENTIFIER_EXPECTED, token.span, "Property name expected.")),
        }
    }

    fn object_literal(&mut self) -> PResult<ExprKind> {
        self.expect("{")?;
        let props = self.allow_in(|p| {
            let mut props = Vec::new();
            while !p.at("}") && !p.at_eof() {
                props.push(p.object_prop()?);
                if !p.at("}") {
                    p.expect(",")?;
                }
            }
            Ok(props)
        })?;
        self.expect("}")?;
        Ok(ExprKind::Object(props))
    }

    fn object_prop(&mut self) -> PResult<ObjectProp> {
        let start = self.start();
        if self.eat("...") {
            return Ok(ObjectProp::Spread(self.assignment_expr()?));
        }
        let next = self.peek_at(1).clone();
        let member_follows = matches!(next.kind, TokenKind::Ident(_) | TokenKind::Str(_) | TokenKind::Number(_))
            || next.is_punct("[");
        if (self.at_word("get") || self.at_word("set")) && member_follows {
            let span = self.peek().span;
            return Err(self.fail(codes::UNSUPPORTED_SYNTAX, span, "Accessors are not supported."));
        }
        let is_async = self.at_word("async") && member_follows && !next.newline_before;
        if is_async {
            self.bump();
        }
        let key = self.prop_key()?;
        if self.at("(") || self.at("<") {
            let func = self.function_rest(start, is_async)?;
            if func.body.is_none() {
                let span = self.peek().span;
                return Err(self.fail(codes::TOKEN_EXPECTED, span, "'{' expected."));
            }
            return Ok(ObjectProp::Method { key, func });
        }
        if self.eat(":") {
            let value = self.assignment_expr()?;
            return Ok(ObjectProp::KeyValue { key, value });
        }
        match key {
            PropKey::Ident(ident) if !is_reserved_word(&ident.name) => Ok(ObjectProp::Shorthand(ident)),
            other => {
                let span = other.span();
                Err(self.fail(codes::TOKEN_EXPECTED, span, "':' expected."))
            }
        }
    }

    // ---- types ----

    fn parse_type(&mut self) -> PResult<TypeNode> {
        self.nested(Self::type_level)
    }

    fn type_level(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        self.eat("|");
        let first = self.intersection_type()?;
        if !self.at("|") {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat("|") {
            members.push(self.intersection_type()?);
        }
        Ok(TypeNode {
            kind: TypeKind::Union(members),
            span: self.span_from(start),
        })
    }

    fn intersection_type(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        self.eat("&");
        let first = self.postfix_type()?;
        if !self.at("&") {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat("&") {
            members.push(self.postfix_type()?);
        }
        Ok(TypeNode {
            kind: TypeKind::Intersection(members),
            span: self.span_from(start),
        })
    }

    fn postfix_type(&mut self) -> PResult<TypeNode> {
        let saved = self.chain_start();
        let result = self.array_type_chain();
        self.chain_end(saved);
        result
    }

    fn array_type_chain(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        let mut ty = self.primary_type()?;
        while self.at("[") && self.peek_at(1).is_punct("]") && !self.peek().newline_before {
            self.bump();
            self.bump();
            self.chain_link()?;
            ty = TypeNode {
                kind: TypeKind::Array(Box::new(ty)),
                span: self.span_from(start),
            };
        }
        Ok(ty)
    }

    fn primary_type(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        let token = self.peek().clone();
        let kind = match &token.kind {
            TokenKind::Punct("(") => {
                let cp = self.checkpoint();
                match self.function_type() {
                    Ok(kind) => kind,
                    Err(Fail) => {
                        self.restore(cp);
                        self.bump();
                        let inner = self.parse_type()?;
                        self.expect(")")?;
                        return Ok(TypeNode {
                            kind: inner.kind,
                            span: self.span_from(start),
                        });
                    }
                }
            }
            TokenKind::Punct("<") => self.function_type()?,
            TokenKind::Punct("{") => TypeKind::Object(self.type_members()?),
            TokenKind::Punct("[") => self.tuple_type()?,
            TokenKind::Punct("-") => {
                self.bump();
                match self.bump().kind {
                    TokenKind::Number(n) => TypeKind::Literal(LiteralType::Num(-n)),
                    _ => return Err(self.fail(codes::TYPE_EXPECTED, token.span, "Type expected.")),
                }
            }
            TokenKind::Str(s) => {
                self.bump();
                TypeKind::Literal(LiteralType::Str(s.clone()))
            }
            TokenKind::Number(n) => {
                self.bump();
                TypeKind::Literal(LiteralType::Num(*n))
            }
            TokenKind::Template { head: true, tail: true, cooked } => {
                self.bump();
                TypeKind::Literal(LiteralType::Str(cooked.clone()))
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" | "false" => {
                    self.bump();
                    TypeKind::Literal(LiteralType::Bool(word == "true"))
                }
                // `x as const`
                "const" => {
                    self.bump();
                    TypeKind::Ref {
                        name: "const".to_string(),
                        args: Vec::new(),
                    }
                }
                "readonly" if matches!(self.peek_at(1).kind, TokenKind::Ident(_) | TokenKind::Punct("[")) => {
                    self.bump();
                    return self.postfix_type();
                }
                "typeof" | "keyof" | "infer" | "unique" => {
                    return Err(self.fail(
                        codes::UNSUPPORTED_SYNTAX,
                        token.span,
                        format!("'{word}' type operators are not supported."),
                    ));
                }
                "new" => {
                    return Err(self.fail(
                        codes::UNSUPPORTED_SYNTAX,
                        token.span,
                        "Constructor types are not supported.",
                    ));
                }
                _ => {
                    if let Some(keyword) = TypeKeyword::from_word(word) {
                        self.bump();
                        TypeKind::Keyword(keyword)
                    } else {
                        return self.type_reference();
                    }
                }
            },
            _ => return Err(self.fail(codes::TYPE_EXPECTED, token.span, "Type expected.")),
        };
        Ok(TypeNode {
            kind,
            span: self.span_from(start),
        })
    }

    fn type_reference(&mut self) -> PResult<TypeNode> {
        let start = self.start();
        let mut name = self.ident()?.name;
        while self.at(".") && matches!(self.peek_at(1).kind, TokenKind::Ident(_)) {
            self.bump();
            name.push('.');
            name.push_str(&self.name()?.name);
        }
        let mut args = Vec::new();
        if self.at("<") && !self.peek().newline_before {
            self.bump();
            while !self.at(">") && !self.at_eof() {
                args.push(self.parse_type()?);
                if !self.at(">") {
                    self.expect(",")?;
                }
            }
            self.expect(">")?;
        }
        Ok(TypeNode {
            kind: TypeKind::Ref { name, args },
            span: self.span_from(start),
        })
    }

    fn function_type(&mut self) -> PResult<TypeKind> {
        let start = self.start();
        let type_params = self.type_params(false)?;
        let params = self.params()?;
        self.expect("=>")?;
        let ret = self.return_type()?;
        Ok(TypeKind::Function(Box::new(Function {
            type_params,
            params,
            ret: Some(ret),
            body: None,
            is_async: false,
            is_arrow: true,
            span: self.span_from(start),
        })))
    }

    fn tuple_type(&mut self) -> PResult<TypeKind> {
        self.expect("[")?;
        let mut elems = Vec::new();
        while !self.at("]") && !self.at_eof() {
            let rest = self.eat("...");
            // Labeled element `name: T` or `name?: T`
            if matches!(self.peek().kind, TokenKind::Ident(_))
                && (self.peek_at(1).is_punct(":")
                    || (self.peek_at(1).is_punct("?") && self.peek_at(2).is_punct(":")))
            {
                self.bump();
                let optional = self.eat("?");
                self.expect(":")?;
                let ty = self.parse_type()?;
                elems.push(TupleElem { ty, optional, rest });
            } else {
                let ty = self.parse_type()?;
                let optional = self.eat("?");
                elems.push(TupleElem { ty, optional, rest });
            }
            if !self.at("]") {
                self.expect(",")?;
            }
        }
        self.expect("]")?;
        Ok(TypeKind::Tuple(elems))
    }

    fn type_members(&mut self) -> PResult<Vec<TypeMember>> {
        self.expect("{")?;
        let mut members = Vec::new();
        while !self.at("}") && !self.at_eof() {
            members.push(self.type_member()?);
            if !self.eat(";") && !self.eat(",") && !self.at("}") && !self.peek().newline_before {
                let span = self.peek().span;
                return Err(self.fail(codes::TOKEN_EXPECTED, span, "';' expected."));
            }
        }
        self.expect("}")?;
        Ok(members)
    }

    fn type_member(&mut self) -> PResult<TypeMember> {
        let start = self.start();
        let signature_follows = |p: &Self, n: usize| p.peek_at(n).is_punct("(") || p.peek_at(n).is_punct("<");

        if self.at("(") || self.at("<") {
            let func = self.signature(start)?;
            return Ok(TypeMember::Call {
                func,
                span: self.span_from(start),
            });
        }
        if self.at_word("new") && signature_follows(self, 1) {
            self.bump();
            let func = self.signature(start)?;
            return Ok(TypeMember::Construct {
                func,
                span: self.span_from(start),
            });
        }
        let readonly = self.at_word("readonly")
            && matches!(
                self.peek_at(1).kind,
                TokenKind::Ident(_) | TokenKind::Str(_) | TokenKind::Number(_) | TokenKind::Punct("[")
            );
        if readonly {
            self.bump();
        }
        if self.at("[") && matches!(self.peek_at(1).kind, TokenKind::Ident(_)) && self.peek_at(2).is_punct(":") {
            self.bump();
            self.bump();
            self.bump();
            let key = self.parse_type()?;
            self.expect("]")?;
            self.expect(":")?;
            let value = self.parse_type()?;
            return Ok(TypeMember::Index {
                key,
                value,
                readonly,
                span: self.span_from(start),
            });
        }
        let name = match self.prop_key()? {
            PropKey::Computed(expr) => {
                return Err(self.fail(
                    codes::UNSUPPORTED_SYNTAX,
                    expr.span,
                    "Computed member names are not supported in types.",
                ));
            }
            key => key.static_name().unwrap_or_default(),
        };
        let optional = self.eat("?");
        if self.at("(") || self.at("<") {
            let func = self.signature(start)?;
            return Ok(TypeMember::Method {
                name,
                optional,
                func,
                span: self.span_from(start),
            });
        }
        let ty = if self.eat(":") {
            Some(self.parse_type()?)
        } else {
            None
        };
        Ok(TypeMember::Property {
            name,
            optional,
            readonly,
            ty,
            span: self.span_from(start),
        })
    }

    /// `<T>(params): R` inside a type
    fn signature(&mut self, start: u32) -> PResult<Function> {
        let type_params = self.type_params(false)?;
        let params = self.params()?;
        let ret = if self.eat(":") {
            Some(self.return_type()?)
        } else {
            None
        };
        Ok(Function {
            type_params,
            params,
            ret,
            body: None,
            is_async: false,
            is_arrow: false,
            span: self.span_from(start),
        })
    }
}

type ArrowHead = (bool, Vec<TypeParam>, Vec<Param>, Option<TypeNode>);

#[derive(Debug, Clone, Copy)]
enum BinOrLogical {
    Bin(BinaryOp),
    Logical(LogicalOp),
    As,
    Satisfies,
}

fn assign_op(p: &str) -> Option<AssignOp> {
    Some(match p {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Compound(BinaryOp::Add),
        "-=" => AssignOp::Compound(BinaryOp::Sub),
        "*=" => AssignOp::Compound(BinaryOp::Mul),
        "/=" => AssignOp::Compound(BinaryOp::Div),
        "%=" => AssignOp::Compound(BinaryOp::Rem),
        "**=" => AssignOp::Compound(BinaryOp::Exp),
        "<<=" => AssignOp::Compound(BinaryOp::Shl),
        "&=" => AssignOp::Compound(BinaryOp::BitAnd),
        "|=" => AssignOp::Compound(BinaryOp::BitOr),
        "^=" => AssignOp::Compound(BinaryOp::BitXor),
        "&&=" => AssignOp::Logical(LogicalOp::And),
        "||=" => AssignOp::Logical(LogicalOp::Or),
        "??=" => AssignOp::Logical(LogicalOp::Nullish),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Parsed {
        let parsed = parse_program(src);
        assert!(parsed.issues.is_empty(), "unexpected issues: {:?}", parsed.issues);
        parsed
    }

    fn first_expr(src: &str) -> Expr {
        let parsed = parse_ok(src);
        match parsed.program.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn erased_text(src: &str) -> Vec<String> {
        parse_ok(src)
            .erasures
            .iter()
            .map(|e| src[e.span.start as usize..e.span.end as usize].to_string())
            .collect()
    }

    #[test]
    fn test_var_with_annotation_is_erased() {
        assert_eq!(erased_text("const x: number = 1;"), vec![": number"]);
    }

    #[test]
    fn test_async_main_declaration() {
        let parsed = parse_ok("async function main() { const n = await notes.get(\"a\"); return n?.title ?? null; }");
        let StmtKind::Function(decl) = &parsed.program.body[0].kind else {
            panic!("expected function");
        };
        assert_eq!(decl.name.name, "main");
        assert!(decl.func.is_async);
    }

    #[test]
    fn test_precedence() {
        let expr = first_expr("a + b * c;");
        let ExprKind::Binary { op, right, .. } = expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_shift_recombined() {
        let expr = first_expr("a >> 2;");
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Shr, .. }));
        let expr = first_expr("a >= 2;");
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Ge, .. }));
    }

    #[test]
    fn test_nested_generic_type_closes() {
        let erased = erased_text("let m: Map<string, Array<number>> = new Map();");
        assert_eq!(erased, vec![": Map<string, Array<number>>"]);
    }

    #[test]
    fn test_arrow_functions() {
        let expr = first_expr("xs.map((x: number, i) => x * i);");
        let ExprKind::Call { args, .. } = expr.kind else {
            panic!("expected call");
        };
        let ExprKind::Function { func, .. } = &args[0].kind else {
            panic!("expected arrow");
        };
        assert!(func.is_arrow);
        assert_eq!(func.params.len(), 2);
        assert!(func.params[0].ty.is_some());
    }

    #[test]
    fn test_parenthesized_is_not_arrow() {
        let expr = first_expr("(a + b) * 2;");
        assert!(matches!(expr.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_async_arrow() {
        let expr = first_expr("async (id: string) => await notes.get(id);");
        let ExprKind::Function { func, .. } = expr.kind else {
            panic!("expected arrow");
        };
        assert!(func.is_async);
    }

    #[test]
    fn test_optional_chain_and_nullish() {
        let expr = first_expr("n?.title ?? null;");
        let ExprKind::Logical { op, left, .. } = expr.kind else {
            panic!("expected logical");
        };
        assert_eq!(op, LogicalOp::Nullish);
        assert!(matches!(left.kind, ExprKind::Member { optional: true, .. }));
    }

    #[test]
    fn test_generic_call_type_args() {
        let src = "identity<string>(\"a\");";
        let expr = first_expr(src);
        assert!(matches!(expr.kind, ExprKind::Call { ref type_args, .. } if type_args.len() == 1));
        assert_eq!(erased_text(src), vec!["<string>"]);
    }

    #[test]
    fn test_less_than_not_type_args() {
        let expr = first_expr("a < b && c > d;");
        assert!(matches!(expr.kind, ExprKind::Logical { op: LogicalOp::And, .. }));
    }

    #[test]
    fn test_interface_statement_erasure() {
        let parsed = parse_ok("interface A { x?: number; readonly y: string }\nconst a = 1;");
        assert!(parsed.erasures[0].statement);
        assert!(matches!(parsed.program.body[0].kind, StmtKind::Interface(_)));
    }

    #[test]
    fn test_as_and_non_null_erased() {
        assert_eq!(erased_text("const t = (x as string)!.length;"), vec![" as string".trim_start(), "!"]);
    }

    #[test]
    fn test_export_default_erased() {
        let src = "export default async function main() { return 1; }";
        assert_eq!(erased_text(src), vec!["export default"]);
    }

    #[test]
    fn test_enum_not_erasable() {
        let parsed = parse_program("enum Color { Red }\nconst a = 1;");
        assert_eq!(parsed.issues[0].code, codes::NOT_ERASABLE);
        assert!(matches!(parsed.program.body.last().map(|s| &s.kind), Some(StmtKind::Var(_))));
    }

    #[test]
    fn test_import_unsupported() {
        let parsed = parse_program("import fs from \"fs\";");
        assert_eq!(parsed.issues[0].code, codes::UNSUPPORTED_SYNTAX);
    }

    #[test]
    fn test_class_unsupported() {
        let parsed = parse_program("class A { m() {} }");
        assert_eq!(parsed.issues[0].code, codes::UNSUPPORTED_SYNTAX);
    }

    #[test]
    fn test_missing_semicolon_reported() {
        let parsed = parse_program("const a = 1 const b = 2;");
        assert_eq!(parsed.issues[0].code, codes::TOKEN_EXPECTED);
    }

    #[test]
    fn test_asi_on_newline() {
        parse_ok("const a = 1\nconst b = 2\nreturn a + b");
    }

    #[test]
    fn test_for_of_and_in() {
        let parsed = parse_ok("for (const [k, v] of entries) {}\nfor (const key in obj) {}\nfor (let i = 0; i < 3; i++) {}");
        assert!(matches!(parsed.program.body[0].kind, StmtKind::ForOf { .. }));
        assert!(matches!(parsed.program.body[1].kind, StmtKind::ForIn { .. }));
        assert!(matches!(parsed.program.body[2].kind, StmtKind::For { .. }));
    }

    #[test]
    fn test_destructuring_with_defaults() {
        parse_ok("const { a, b: { c = 1 }, ...rest } = obj;\nconst [x, , y = 2, ...zs] = arr;");
    }

    #[test]
    fn test_template_literal() {
        let expr = first_expr("`a${b}c`;");
        let ExprKind::Template { quasis, exprs } = expr.kind else {
            panic!("expected template");
        };
        assert_eq!(quasis, vec!["a", "c"]);
        assert_eq!(exprs.len(), 1);
    }

    #[test]
    fn test_object_literal_forms() {
        let expr = first_expr("({ a, b: 1, [k]: 2, ...rest, m(x: number) { return x; } });");
        let ExprKind::Object(props) = expr.kind else {
            panic!("expected object");
        };
        assert_eq!(props.len(), 5);
        assert!(matches!(props[4], ObjectProp::Method { .. }));
    }

    #[test]
    fn test_declaration_file() {
        let parsed = parse_declarations(
            "interface Note { id: string; title: string }\n\
             declare namespace notes {\n  function get(id: string): Promise<Note | null>;\n}\n\
             declare function parseInt(s: string, radix?: number): number;\n\
             interface PromiseConstructor { new <T>(executor: (resolve: (value: T) => void) => void): Promise<T>; }",
        );
        assert!(parsed.issues.is_empty(), "{:?}", parsed.issues);
        assert_eq!(parsed.program.body.len(), 4);
        let StmtKind::Namespace { body, .. } = &parsed.program.body[1].kind else {
            panic!("expected namespace");
        };
        assert!(matches!(&body[0].kind, StmtKind::Function(f) if f.func.body.is_none()));
    }

    #[test]
    fn test_parse_type_text() {
        let ty = parse_type_text("string | null").unwrap();
        assert!(matches!(ty.kind, TypeKind::Union(ref m) if m.len() == 2));
        assert!(parse_type_text("string |").is_err());
        assert!(parse_type_text("string number").is_err());
    }

    #[test]
    fn test_function_and_tuple_types() {
        let ty = parse_type_text("(value: T, index: number) => [string, number?]").unwrap();
        let TypeKind::Function(func) = ty.kind else {
            panic!("expected function type");
        };
        assert!(matches!(func.ret.as_ref().map(|r| &r.kind), Some(TypeKind::Tuple(elems)) if elems[1].optional));
    }

    #[test]
    fn test_return_on_newline_has_no_argument() {
        let parsed = parse_ok("function f() { return\n1; }");
        let StmtKind::Function(decl) = &parsed.program.body[0].kind else {
            panic!("expected function");
        };
        let Some(FnBody::Block(body)) = &decl.func.body else {
            panic!("expected body");
        };
        assert!(matches!(body[0].kind, StmtKind::Return(None)));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let parsed = parse_program("a + b = 1;");
        assert_eq!(parsed.issues[0].code, codes::INVALID_ASSIGNMENT_TARGET);
    }

    #[test]
    fn test_recovery_continues() {
        let parsed = parse_program("const = 1;\nconst ok = 2;");
        assert!(!parsed.issues.is_empty());
        assert!(parsed
            .program
            .body
            .iter()
            .any(|s| matches!(&s.kind, StmtKind::Var(v) if matches!(&v.decls[0].pattern.kind, PatternKind::Ident(i) if i.name == "ok"))));
    }

    fn parse_with_stack(src: String) -> Parsed {
        std::thread::Builder::new()
            .stack_size(16 * 1024 * 1024)
            .spawn(move || parse_program(&src))
            .unwrap()
            .join()
            .unwrap()
    }

    fn nesting_codes(parsed: &Parsed) -> usize {
        parsed.issues.iter().filter(|i| i.code == codes::NESTING_TOO_DEEP).count()
    }

    #[test]
    fn test_deep_parens_are_reported() {
        let parsed = parse_with_stack(format!("return {}1{};", "(".repeat(5000), ")".repeat(5000)));
        assert!(parsed.has_errors());
        assert!(nesting_codes(&parsed) >= 1);
    }

    #[test]
    fn test_deep_blocks_and_types_are_reported() {
        let blocks = parse_with_stack(format!("{}{}", "{".repeat(5000), "}".repeat(5000)));
        assert!(nesting_codes(&blocks) >= 1);
        let arrays = parse_with_stack(format!("let a: {}number{};", "Array<".repeat(5000), ">".repeat(5000)));
        assert!(nesting_codes(&arrays) >= 1);
    }

    #[test]
    fn test_long_chains_are_bounded() {
        let sum = parse_with_stack(format!("const n = 1{};", " + 1".repeat(5000)));
        assert!(nesting_codes(&sum) >= 1);
        let members = parse_with_stack(format!("const v = a{};", ".b".repeat(5000)));
        assert!(nesting_codes(&members) >= 1);
        let calls = parse_with_stack(format!("f{};", "()".repeat(5000)));
        assert!(nesting_codes(&calls) >= 1);
        let arrays = parse_with_stack(format!("let a: number{};", "[]".repeat(5000)));
        assert!(nesting_codes(&arrays) >= 1);
    }

    #[test]
    fn test_moderate_nesting_parses() {
        parse_ok(&format!("const n = {}1{};", "(".repeat(20), ")".repeat(20)));
        parse_ok(&format!("const n = 1{};", " + 1".repeat(60)));
        parse_ok("const v = a.b.c.d.e.f.g.h(1)(2)[3].i?.j;");
        parse_ok("if (a) { if (b) { for (;;) { while (c) { { const d = [[[[1]]]]; } } } } }");
    }

    #[test]
    fn test_type_predicate_returns() {
        let parsed = parse_ok("function isNote(x: unknown): x is Note { return true; }");
        let StmtKind::Function(decl) = &parsed.program.body[0].kind else {
            panic!("expected function");
        };
        assert!(matches!(
            decl.func.ret.as_ref().map(|r| &r.kind),
            Some(TypeKind::Predicate { param, asserts: false, ty: Some(_) }) if param == "x"
        ));
        assert_eq!(
            erased_text("const f = (x: unknown): x is number => typeof x === \"number\";"),
            vec![": unknown", ": x is number"]
        );
        parse_ok("function ok(v: unknown): asserts v is string {}");
        parse_ok("function ok(v: unknown): asserts v {}");
        parse_ok("type Guard = (v: unknown) => v is string;");
        parse_ok("const is = 1; const asserts = is;");
    }
}

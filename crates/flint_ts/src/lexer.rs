//! Tokenizer for the TypeScript subset.
//!
//! The whole source is tokenized up front so the parser can backtrack freely.
//! `>` is always emitted as a single-character token; the parser recombines
//! adjacent `>` tokens into shift and comparison operators so that nested
//! generic argument lists close correctly.

use crate::diagnostics::{codes, Issue};
use crate::span::Span;

/// Token payload
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword
    Ident(String),
    /// Numeric literal
    Number(f64),
    /// String literal (cooked)
    Str(String),
    /// Template chunk. `head` is true for the first chunk, `tail` for the last.
    Template {
        /// Cooked text
        cooked: String,
        /// First chunk of the template
        head: bool,
        /// Last chunk of the template
        tail: bool,
    },
    /// Regular expression literal
    Regex {
        /// Pattern body
        pattern: String,
        /// Flags
        flags: String,
    },
    /// Punctuator
    Punct(&'static str),
    /// End of input
    Eof,
}

/// One token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Payload
    pub kind: TokenKind,
    /// Source span
    pub span: Span,
    /// A line terminator precedes the token
    pub newline_before: bool,
}

impl Token {
    /// Whether the token is the given punctuator
    #[must_use]
    pub fn is_punct(&self, p: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(q) if *q == p)
    }

    /// Whether the token is the given identifier or keyword
    #[must_use]
    pub fn is_word(&self, w: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(name) if name == w)
    }

    /// Identifier text, if any
    #[must_use]
    pub fn word(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }
}

const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "<<=", "&&=", "||=", "??=", "=>", "==", "!=", "<=", "**", "++",
    "--", "<<", "&&", "||", "??", "?.", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "{", "}",
    "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^", "!", "~",
    "=", ".", ":", "?", "@", "#",
];

/// Keywords after which a `/` starts a regular expression
const REGEX_PRECEDING_WORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "await", "yield", "instanceof",
];

/// Tokenize a source text
///
/// Lexical errors are reported as issues; lexing always completes and ends
/// with an [`TokenKind::Eof`] token.
#[must_use]
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Issue>) {
    let mut lexer = Lexer {
        src: source,
        bytes: source.as_bytes(),
        pos: 0,
        tokens: Vec::new(),
        issues: Vec::new(),
        template_depths: Vec::new(),
        brace_depth: 0,
    };
    lexer.run();
    (lexer.tokens, lexer.issues)
}

struct Lexer<'s> {
    src: &'s str,
    bytes: &'s [u8],
    pos: usize,
    tokens: Vec<Token>,
    issues: Vec<Issue>,
    template_depths: Vec<u32>,
    brace_depth: u32,
}

impl Lexer<'_> {
    fn run(&mut self) {
        loop {
            let newline = self.skip_trivia();
            let start = self.pos;
            let Some(c) = self.peek_char() else {
                self.push(TokenKind::Eof, start, newline);
                return;
            };

            if c == '`' {
                self.pos += 1;
                self.template_chunk(start, newline, true);
            } else if c == '}' && self.template_depths.last() == Some(&self.brace_depth) {
                self.template_depths.pop();
                self.pos += 1;
                self.template_chunk(start, newline, false);
            } else if c == '"' || c == '\'' {
                self.string(c, start, newline);
            } else if c.is_ascii_digit()
                || (c == '.' && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit))
            {
                self.number(start, newline);
            } else if is_ident_start(c) {
                let word = self.ident();
                self.push(TokenKind::Ident(word), start, newline);
            } else if c == '/' && self.regex_allowed() {
                self.regex(start, newline);
            } else if c == '>' {
                self.pos += 1;
                self.push(TokenKind::Punct(">"), start, newline);
            } else if let Some(p) = self.punct() {
                match p {
                    "{" => self.brace_depth += 1,
                    "}" => self.brace_depth = self.brace_depth.saturating_sub(1),
                    _ => {}
                }
                self.push(TokenKind::Punct(p), start, newline);
            } else {
                self.pos += c.len_utf8();
                self.issues.push(Issue::error(
                    codes::INVALID_CHARACTER,
                    Span::new(start as u32, self.pos as u32),
                    "Invalid character.",
                ));
            }
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, newline_before: bool) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start as u32, self.pos as u32),
            newline_before,
        });
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Skip whitespace and comments, reporting whether a newline was crossed
    fn skip_trivia(&mut self) -> bool {
        let mut newline = false;
        while let Some(c) = self.peek_char() {
            match c {
                '\n' | '\u{2028}' | '\u{2029}' => {
                    newline = true;
                    self.pos += c.len_utf8();
                }
                c if c.is_whitespace() || c == '\u{feff}' => self.pos += c.len_utf8(),
                '/' if self.peek_byte(1) == Some(b'/') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += c.len_utf8();
                    }
                }
                '/' if self.peek_byte(1) == Some(b'*') => {
                    let start = self.pos;
                    match self.src[self.pos + 2..].find("*/") {
                        Some(end) => {
                            let body = &self.src[self.pos + 2..self.pos + 2 + end];
                            newline |= body.contains('\n');
                            self.pos += end + 4;
                        }
                        None => {
                            self.pos = self.src.len();
                            self.issues.push(Issue::error(
                                codes::COMMENT_NOT_CLOSED,
                                Span::new(start as u32, self.pos as u32),
                                "'*/' expected.",
                            ));
                        }
                    }
                }
                _ => break,
            }
        }
        newline
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if is_ident_part(c) {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    fn punct(&mut self) -> Option<&'static str> {
        let rest = &self.src[self.pos..];
        for p in PUNCTUATORS {
            if rest.starts_with(p) {
                // `?.` followed by a digit is a conditional with a number
                if *p == "?." && rest.as_bytes().get(2).is_some_and(u8::is_ascii_digit) {
                    continue;
                }
                self.pos += p.len();
                return Some(p);
            }
        }
        None
    }

    fn regex_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(token) => match &token.kind {
                TokenKind::Punct(p) => !matches!(*p, ")" | "]" | "}" | "++" | "--"),
                TokenKind::Ident(word) => REGEX_PRECEDING_WORDS.contains(&word.as_str()),
                TokenKind::Template { tail, .. } => !tail,
                _ => false,
            },
        }
    }

    fn number(&mut self, start: usize, newline: bool) {
        let rest = &self.src[self.pos..];
        let radix = if rest.starts_with("0x") || rest.starts_with("0X") {
            16
        } else if rest.starts_with("0b") || rest.starts_with("0B") {
            2
        } else if rest.starts_with("0o") || rest.starts_with("0O") {
            8
        } else {
            10
        };

        let value = if radix == 10 {
            let mut seen_dot = false;
            let mut seen_exp = false;
            while let Some(b) = self.peek_byte(0) {
                match b {
                    b'0'..=b'9' | b'_' => self.pos += 1,
                    b'.' if !seen_dot && !seen_exp => {
                        seen_dot = true;
                        self.pos += 1;
                    }
                    b'e' | b'E' if !seen_exp => {
                        seen_exp = true;
                        self.pos += 1;
                        if matches!(self.peek_byte(0), Some(b'+' | b'-')) {
                            self.pos += 1;
                        }
                    }
                    _ => break,
                }
            }
            let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
            text.parse::<f64>().unwrap_or(f64::NAN)
        } else {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek_byte(0).is_some_and(|b| b.is_ascii_hexdigit() || b == b'_') {
                self.pos += 1;
            }
            let digits: String = self.src[digits_start..self.pos]
                .chars()
                .filter(|c| *c != '_')
                .collect();
            u64::from_str_radix(&digits, radix).map_or(f64::NAN, |v| v as f64)
        };

        if self.peek_byte(0) == Some(b'n') {
            self.pos += 1;
            self.issues.push(Issue::error(
                codes::UNSUPPORTED_SYNTAX,
                Span::new(start as u32, self.pos as u32),
                "BigInt literals are not supported.",
            ));
        }
        if self.peek_char().is_some_and(is_ident_start) {
            let bad = self.pos;
            self.ident();
            self.issues.push(Issue::error(
                codes::INVALID_CHARACTER,
                Span::new(bad as u32, self.pos as u32),
                "An identifier or keyword cannot immediately follow a numeric literal.",
            ));
        }
        self.push(TokenKind::Number(value), start, newline);
    }

    fn string(&mut self, quote: char, start: usize, newline: bool) {
        self.pos += 1;
        let mut cooked = String::new();
        loop {
            let Some(c) = self.peek_char() else {
                self.unterminated_string(start);
                break;
            };
            match c {
                c if c == quote => {
                    self.pos += 1;
                    break;
                }
                '\n' => {
                    self.unterminated_string(start);
                    break;
                }
                '\\' => {
                    self.pos += 1;
                    self.escape(&mut cooked);
                }
                c => {
                    cooked.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
        self.push(TokenKind::Str(cooked), start, newline);
    }

    fn unterminated_string(&mut self, start: usize) {
        self.issues.push(Issue::error(
            codes::UNTERMINATED_STRING,
            Span::new(start as u32, self.pos as u32),
            "Unterminated string literal.",
        ));
    }

    /// Cook one escape sequence; `pos` is just past the backslash
    fn escape(&mut self, out: &mut String) {
        let Some(c) = self.peek_char() else {
            return;
        };
        self.pos += c.len_utf8();
        match c {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !self.peek_byte(0).is_some_and(|b| b.is_ascii_digit()) => out.push('\0'),
            '\r' => {
                if self.peek_byte(0) == Some(b'\n') {
                    self.pos += 1;
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            'x' => {
                let hex = self.src.get(self.pos..self.pos + 2).unwrap_or("");
                if let Some(ch) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                    self.pos += 2;
                }
            }
            'u' => {
                if self.peek_byte(0) == Some(b'{') {
                    if let Some(close) = self.src[self.pos..].find('}') {
                        let hex = &self.src[self.pos + 1..self.pos + close];
                        if let Some(ch) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                            out.push(ch);
                        }
                        self.pos += close + 1;
                    }
                } else {
                    let hex = self.src.get(self.pos..self.pos + 4).unwrap_or("");
                    if let Ok(unit) = u32::from_str_radix(hex, 16) {
                        self.pos += 4;
                        out.push(char::from_u32(unit).unwrap_or('\u{fffd}'));
                    }
                }
            }
            other => out.push(other),
        }
    }

    /// Lex a template chunk; `pos` is just past the opening backtick or `}`
    fn template_chunk(&mut self, start: usize, newline: bool, head: bool) {
        let mut cooked = String::new();
        loop {
            let Some(c) = self.peek_char() else {
                self.issues.push(Issue::error(
                    codes::UNTERMINATED_TEMPLATE,
                    Span::new(start as u32, self.pos as u32),
                    "Unterminated template literal.",
                ));
                self.push(
                    TokenKind::Template {
                        cooked,
                        head,
                        tail: true,
                    },
                    start,
                    newline,
                );
                return;
            };
            match c {
                '`' => {
                    self.pos += 1;
                    self.push(
                        TokenKind::Template {
                            cooked,
                            head,
                            tail: true,
                        },
                        start,
                        newline,
                    );
                    return;
                }
                '$' if self.peek_byte(1) == Some(b'{') => {
                    self.pos += 2;
                    self.template_depths.push(self.brace_depth);
                    self.push(
                        TokenKind::Template {
                            cooked,
                            head,
                            tail: false,
                        },
                        start,
                        newline,
                    );
                    return;
                }
                '\\' => {
                    self.pos += 1;
                    self.escape(&mut cooked);
                }
                c => {
                    cooked.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn regex(&mut self, start: usize, newline: bool) {
        self.pos += 1;
        let mut in_class = false;
        let body_start = self.pos;
        loop {
            let Some(c) = self.peek_char() else {
                self.unterminated_regex(start);
                return;
            };
            match c {
                '\n' => {
                    self.unterminated_regex(start);
                    return;
                }
                '\\' => {
                    self.pos += 1;
                    if let Some(next) = self.peek_char() {
                        self.pos += next.len_utf8();
                    }
                }
                '[' => {
                    in_class = true;
                    self.pos += 1;
                }
                ']' => {
                    in_class = false;
                    self.pos += 1;
                }
                '/' if !in_class => break,
                c => self.pos += c.len_utf8(),
            }
        }
        let pattern = self.src[body_start..self.pos].to_string();
        self.pos += 1;
        let flags_start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let flags = self.src[flags_start..self.pos].to_string();
        self.push(TokenKind::Regex { pattern, flags }, start, newline);
    }

    fn unterminated_regex(&mut self, start: usize) {
        self.issues.push(Issue::error(
            codes::UNTERMINATED_REGEX,
            Span::new(start as u32, self.pos as u32),
            "Unterminated regular expression literal.",
        ));
        self.push(
            TokenKind::Regex {
                pattern: String::new(),
                flags: String::new(),
            },
            start,
            false,
        );
    }
}

fn is_ident_start(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphanumeric() || c == '\u{200c}' || c == '\u{200d}'
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, issues) = tokenize(src);
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_tokens() {
        let toks = kinds("const x = 1;");
        assert_eq!(toks[0], TokenKind::Ident("const".to_string()));
        assert_eq!(toks[2], TokenKind::Punct("="));
        assert_eq!(toks[3], TokenKind::Number(1.0));
        assert_eq!(toks[5], TokenKind::Eof);
    }

    #[test]
    fn test_greater_than_is_split() {
        let toks = kinds("a >>= b");
        assert_eq!(toks[1], TokenKind::Punct(">"));
        assert_eq!(toks[2], TokenKind::Punct(">"));
        assert_eq!(toks[3], TokenKind::Punct("="));
    }

    #[test]
    fn test_optional_chain_vs_conditional() {
        assert_eq!(kinds("a?.b")[1], TokenKind::Punct("?."));
        assert_eq!(kinds("a?.5:1")[1], TokenKind::Punct("?"));
    }

    #[test]
    fn test_string_escapes() {
        let toks = kinds(r#""a\nbA\x42\u{43}""#);
        assert_eq!(toks[0], TokenKind::Str("a\nbABC".to_string()));
    }

    #[test]
    fn test_template_with_substitution() {
        let toks = kinds("`a${b}c${ {d: 1}.d }e`");
        assert!(matches!(&toks[0], TokenKind::Template { cooked, head: true, tail: false } if cooked == "a"));
        assert_eq!(toks[1], TokenKind::Ident("b".to_string()));
        assert!(matches!(&toks[2], TokenKind::Template { cooked, head: false, tail: false } if cooked == "c"));
        assert!(matches!(toks.iter().rev().nth(1), Some(TokenKind::Template { cooked, tail: true, .. }) if cooked == "e"));
    }

    #[test]
    fn test_regex_vs_division() {
        let toks = kinds("const r = /a[/]b/gi; x = a / b;");
        assert!(matches!(&toks[3], TokenKind::Regex { pattern, flags } if pattern == "a[/]b" && flags == "gi"));
        assert!(toks.contains(&TokenKind::Punct("/")));
    }

    #[test]
    fn test_newline_flag() {
        let (tokens, _) = tokenize("a\n/* x\n */ b");
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("0xff")[0], TokenKind::Number(255.0));
        assert_eq!(kinds("1_000")[0], TokenKind::Number(1000.0));
        assert_eq!(kinds(".5e1")[0], TokenKind::Number(5.0));
    }

    #[test]
    fn test_unterminated_string_reported() {
        let (_, issues) = tokenize("'abc");
        assert_eq!(issues[0].code, codes::UNTERMINATED_STRING);
    }

    #[test]
    fn test_unclosed_comment_reported() {
        let (_, issues) = tokenize("a /* b");
        assert_eq!(issues[0].code, codes::COMMENT_NOT_CLOSED);
    }

    #[test]
    fn test_bigint_rejected() {
        let (_, issues) = tokenize("10n");
        assert_eq!(issues[0].code, codes::UNSUPPORTED_SYNTAX);
    }

    proptest! {
        #[test]
        fn prop_spans_are_in_bounds(src in "[a-z0-9 +*/(){};.=<>\\n\"'`$-]{0,64}") {
            let (tokens, _) = tokenize(&src);
            let mut last_end = 0;
            for token in &tokens {
                prop_assert!(token.span.start >= last_end);
                prop_assert!(token.span.end as usize <= src.len());
                last_end = token.span.end;
            }
            prop_assert!(matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)));
        }
    }
}

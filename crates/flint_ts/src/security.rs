//! Static security scan.
//!
//! Runs on the token stream before type checking, for both ad-hoc programs
//! and custom function bodies. The sandbox removes the same globals at run
//! time; the scan exists so agents get a positioned diagnostic instead of a
//! runtime violation.

use crate::diagnostics::{codes, Issue};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::span::Span;

/// Globals that are never reachable from agent code
pub const FORBIDDEN_GLOBALS: &[&str] = &[
    "eval",
    "Function",
    "globalThis",
    "window",
    "self",
    "global",
    "require",
    "process",
    "Deno",
    "Reflect",
    "Proxy",
    "WebAssembly",
];

/// Properties that lead to constructors or prototypes
pub const FORBIDDEN_PROPERTIES: &[&str] = &["constructor", "__proto__", "prototype"];

/// Prefix reserved for the sandbox bridge
pub const RESERVED_PREFIX: &str = "__flint";

/// Default source size limit
pub const DEFAULT_MAX_CODE_BYTES: usize = 256 * 1024;

/// Token-level scanner for forbidden constructs
#[derive(Debug, Clone, Copy)]
pub struct SecurityScanner {
    max_code_bytes: usize,
}

impl Default for SecurityScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CODE_BYTES)
    }
}

impl SecurityScanner {
    /// Create a scanner with a source size limit
    #[must_use]
    pub const fn new(max_code_bytes: usize) -> Self {
        Self { max_code_bytes }
    }

    /// Configured size limit
    #[must_use]
    pub const fn max_code_bytes(&self) -> usize {
        self.max_code_bytes
    }

    /// Scan a source text
    ///
    /// An oversized source yields a single issue and is not tokenized.
    #[must_use]
    pub fn scan(&self, source: &str) -> Vec<Issue> {
        if source.len() > self.max_code_bytes {
            return vec![Issue::error(
                codes::SOURCE_TOO_LARGE,
                Span::new(0, 0),
                format!(
                    "Source is {} bytes, which exceeds the limit of {} bytes.",
                    source.len(),
                    self.max_code_bytes
                ),
            )];
        }
        let (tokens, _) = tokenize(source);
        scan_tokens(&tokens)
    }
}

/// Scan a token stream; lexical errors are left to the parser
#[must_use]
pub fn scan_tokens(tokens: &[Token]) -> Vec<Issue> {
    let mut issues = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).and_then(|p| tokens.get(p));
        let next = tokens.get(i + 1);
        match &token.kind {
            TokenKind::Ident(name) => {
                let after_dot = prev.is_some_and(|p| p.is_punct(".") || p.is_punct("?."));
                if name.starts_with(RESERVED_PREFIX) {
                    issues.push(Issue::error(
                        codes::RESERVED_IDENTIFIER,
                        token.span,
                        format!("Identifiers starting with '{RESERVED_PREFIX}' are reserved."),
                    ));
                } else if after_dot {
                    if FORBIDDEN_PROPERTIES.contains(&name.as_str()) {
                        issues.push(prototype_issue(name, token.span));
                    }
                } else if name == "import" {
                    issues.push(Issue::error(
                        codes::MODULE_LOADING,
                        token.span,
                        "Module loading is not available; only the provided capability namespaces can be used.",
                    ));
                } else if FORBIDDEN_GLOBALS.contains(&name.as_str()) && !is_object_key(prev, next) {
                    issues.push(Issue::error(
                        codes::FORBIDDEN_GLOBAL,
                        token.span,
                        format!("'{name}' is not available in the sandbox."),
                    ));
                }
            }
            TokenKind::Str(text) if prev.is_some_and(|p| p.is_punct("[")) && next.is_some_and(|n| n.is_punct("]")) => {
                if FORBIDDEN_PROPERTIES.contains(&text.as_str()) {
                    issues.push(prototype_issue(text, token.span));
                }
            }
            TokenKind::Template { cooked, head: true, tail: true }
                if prev.is_some_and(|p| p.is_punct("[")) && FORBIDDEN_PROPERTIES.contains(&cooked.as_str()) =>
            {
                issues.push(prototype_issue(cooked, token.span));
            }
            _ => {}
        }
    }
    issues
}

fn prototype_issue(name: &str, span: Span) -> Issue {
    Issue::error(
        codes::PROTOTYPE_ACCESS,
        span,
        format!("Access to '{name}' is not allowed."),
    )
}

/// `{ eval: 1 }` and `{ a, process: x }` name properties, not globals
fn is_object_key(prev: Option<&Token>, next: Option<&Token>) -> bool {
    prev.is_some_and(|p| p.is_punct("{") || p.is_punct(","))
        && next.is_some_and(|n| n.is_punct(":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_codes(source: &str) -> Vec<u32> {
        SecurityScanner::default().scan(source).iter().map(|i| i.code).collect()
    }

    #[test]
    fn test_clean_source() {
        assert!(scan_codes("const x = await notes.get('a'); console.log(x);").is_empty());
    }

    #[test]
    fn test_forbidden_globals() {
        assert_eq!(scan_codes("eval('1')"), vec![codes::FORBIDDEN_GLOBAL]);
        assert_eq!(scan_codes("const p = process.env;"), vec![codes::FORBIDDEN_GLOBAL]);
        assert_eq!(scan_codes("new Function('return 1')"), vec![codes::FORBIDDEN_GLOBAL]);
        assert_eq!(scan_codes("globalThis.x = 1"), vec![codes::FORBIDDEN_GLOBAL]);
    }

    #[test]
    fn test_property_names_are_allowed() {
        assert!(scan_codes("const o = { eval: 1 }; o.process; o.self;").is_empty());
    }

    #[test]
    fn test_import_is_rejected() {
        assert_eq!(scan_codes("import fs from 'fs';"), vec![codes::MODULE_LOADING]);
        assert_eq!(scan_codes("await import('fs')"), vec![codes::MODULE_LOADING]);
    }

    #[test]
    fn test_prototype_escapes() {
        assert_eq!(scan_codes("x.constructor"), vec![codes::PROTOTYPE_ACCESS]);
        assert_eq!(scan_codes("x?.__proto__"), vec![codes::PROTOTYPE_ACCESS]);
        assert_eq!(scan_codes("x['prototype']"), vec![codes::PROTOTYPE_ACCESS]);
        assert_eq!(scan_codes("x[`constructor`]"), vec![codes::PROTOTYPE_ACCESS]);
    }

    #[test]
    fn test_reserved_prefix() {
        assert_eq!(scan_codes("const __flintCall = 1;"), vec![codes::RESERVED_IDENTIFIER]);
        assert_eq!(scan_codes("x.__flint_bridge()"), vec![codes::RESERVED_IDENTIFIER]);
    }

    #[test]
    fn test_strings_are_not_scanned() {
        assert!(scan_codes("const s = 'eval process constructor';").is_empty());
    }

    #[test]
    fn test_size_limit() {
        let issues = SecurityScanner::new(8).scan("const longer = 1;");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, codes::SOURCE_TOO_LARGE);
    }
}

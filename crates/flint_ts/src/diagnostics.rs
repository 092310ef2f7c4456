//! Diagnostic codes and the internal issue collector.
//!
//! Issues are span-based while checking; they become positioned
//! [`Diagnostic`]s once the owning source text's line index is known.

use crate::span::{LineIndex, Span};
use flint_core::{Diagnostic, RelatedInformation, Severity};

/// Diagnostic codes. TypeScript numbering where a TypeScript equivalent exists.
pub mod codes {
    /// Unterminated string literal.
    pub const UNTERMINATED_STRING: u32 = 1002;
    /// Identifier expected.
    pub const IDENTIFIER_EXPECTED: u32 = 1003;
    /// Token expected.
    pub const TOKEN_EXPECTED: u32 = 1005;
    /// `*/` expected.
    pub const COMMENT_NOT_CLOSED: u32 = 1010;
    /// Unexpected token.
    pub const UNEXPECTED_TOKEN: u32 = 1012;
    /// Invalid character.
    pub const INVALID_CHARACTER: u32 = 1127;
    /// Unterminated template literal.
    pub const UNTERMINATED_TEMPLATE: u32 = 1160;
    /// Unterminated regular expression literal.
    pub const UNTERMINATED_REGEX: u32 = 1161;
    /// Expression expected.
    pub const EXPRESSION_EXPECTED: u32 = 1109;
    /// Declaration or statement expected.
    pub const STATEMENT_EXPECTED: u32 = 1128;
    /// Type expected.
    pub const TYPE_EXPECTED: u32 = 1110;
    /// `await` only allowed in async functions.
    pub const AWAIT_OUTSIDE_ASYNC: u32 = 1308;
    /// Syntax with runtime semantics that cannot be erased.
    pub const NOT_ERASABLE: u32 = 1294;
    /// Cannot find name.
    pub const CANNOT_FIND_NAME: u32 = 2304;
    /// Type is not assignable.
    pub const NOT_ASSIGNABLE: u32 = 2322;
    /// Property does not exist.
    pub const NO_PROPERTY: u32 = 2339;
    /// Argument is not assignable to parameter.
    pub const ARGUMENT_NOT_ASSIGNABLE: u32 = 2345;
    /// Expression is not callable.
    pub const NOT_CALLABLE: u32 = 2349;
    /// Object literal may only specify known properties.
    pub const EXCESS_PROPERTY: u32 = 2353;
    /// Left-hand side of an arithmetic operation must be a number.
    pub const ARITHMETIC_LEFT: u32 = 2362;
    /// Right-hand side of an arithmetic operation must be a number.
    pub const ARITHMETIC_RIGHT: u32 = 2363;
    /// Invalid assignment target.
    pub const INVALID_ASSIGNMENT_TARGET: u32 = 2364;
    /// Operator cannot be applied.
    pub const BAD_OPERANDS: u32 = 2365;
    /// Comparison between types with no overlap.
    pub const NO_OVERLAP: u32 = 2367;
    /// Tuple index out of range.
    pub const TUPLE_OUT_OF_RANGE: u32 = 2493;
    /// `this` implicitly has type `any`.
    pub const IMPLICIT_THIS: u32 = 2683;
    /// Expected type arguments.
    pub const TYPE_ARGUMENT_COUNT: u32 = 2558;
    /// Generic type requires type arguments.
    pub const GENERIC_REQUIRES_ARGS: u32 = 2314;
    /// Cannot find name, with a spelling suggestion.
    pub const CANNOT_FIND_NAME_SUGGEST: u32 = 2552;
    /// Expected at least N arguments.
    pub const ARGUMENT_COUNT_AT_LEAST: u32 = 2555;
    /// Arithmetic operand must be a number.
    pub const ARITHMETIC_OPERAND: u32 = 2356;
    /// Expression does not satisfy the expected type.
    pub const DOES_NOT_SATISFY: u32 = 1360;
    /// Binding element implicitly has an `any` type.
    pub const IMPLICIT_ANY_BINDING: u32 = 7031;
    /// Function lacks ending return statement.
    pub const LACKS_RETURN: u32 = 2366;
    /// Duplicate identifier.
    pub const DUPLICATE_IDENTIFIER: u32 = 2451;
    /// Block-scoped variable used before its declaration.
    pub const USED_BEFORE_DECLARATION: u32 = 2448;
    /// Type is not iterable.
    pub const NOT_ITERABLE: u32 = 2488;
    /// Cannot assign to a read-only property.
    pub const READONLY_PROPERTY: u32 = 2540;
    /// Expected N arguments.
    pub const ARGUMENT_COUNT: u32 = 2554;
    /// Cannot assign to a constant.
    pub const ASSIGN_TO_CONST: u32 = 2588;
    /// Cannot invoke an object which is possibly null.
    pub const CALL_POSSIBLY_NULL: u32 = 2721;
    /// Cannot invoke an object which is possibly undefined.
    pub const CALL_POSSIBLY_UNDEFINED: u32 = 2722;
    /// Expression is not constructable.
    pub const NOT_CONSTRUCTABLE: u32 = 2351;
    /// Parameter implicitly has an `any` type.
    pub const IMPLICIT_ANY_PARAMETER: u32 = 7006;
    /// Variable implicitly has an `any` type.
    pub const IMPLICIT_ANY_VARIABLE: u32 = 7005;
    /// Not all code paths return a value.
    pub const NOT_ALL_PATHS_RETURN: u32 = 7030;
    /// Element implicitly has an `any` type.
    pub const IMPLICIT_ANY_INDEX: u32 = 7053;
    /// Object is of type `unknown`.
    pub const UNKNOWN_ACCESS: u32 = 18046;
    /// Possibly `null`.
    pub const POSSIBLY_NULL: u32 = 18047;
    /// Possibly `undefined`.
    pub const POSSIBLY_UNDEFINED: u32 = 18048;
    /// Possibly `null` or `undefined`.
    pub const POSSIBLY_NULLISH: u32 = 18049;
    /// The value `null` or `undefined` cannot be used here.
    pub const NULLISH_VALUE: u32 = 18050;
    /// Unreachable code detected.
    pub const UNREACHABLE_CODE: u32 = 7027;

    /// Forbidden identifier (eval, Function, process, ...).
    pub const FORBIDDEN_GLOBAL: u32 = 9001;
    /// Module loading.
    pub const MODULE_LOADING: u32 = 9002;
    /// Prototype or constructor escape.
    pub const PROTOTYPE_ACCESS: u32 = 9003;
    /// Reserved bridge identifier.
    pub const RESERVED_IDENTIFIER: u32 = 9004;
    /// Source exceeds the size limit.
    pub const SOURCE_TOO_LARGE: u32 = 9005;
    /// Unsupported syntax.
    pub const UNSUPPORTED_SYNTAX: u32 = 9100;
    /// Syntax nested past the parser's depth limit.
    pub const NESTING_TOO_DEEP: u32 = 9101;
    /// Invalid initial binding.
    pub const INVALID_BINDING: u32 = 9201;
}

/// Secondary location, already resolved to line/column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclOrigin {
    /// File name
    pub file: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// Span length
    pub length: u32,
    /// Literal line text
    pub line_text: String,
}

impl DeclOrigin {
    /// Resolve a span within a named text
    #[must_use]
    pub fn locate(file: &str, text: &str, index: &LineIndex, span: Span) -> Self {
        let (line, column) = index.position(text, span.start);
        Self {
            file: file.to_string(),
            line,
            column,
            length: span.len(),
            line_text: index.line_text(text, line).to_string(),
        }
    }
}

/// A span-based issue in the main source
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    /// Diagnostic code
    pub code: u32,
    /// Severity
    pub severity: Severity,
    /// Message
    pub message: String,
    /// Offending span
    pub span: Span,
    /// Related locations
    pub related: Vec<(String, DeclOrigin)>,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl Issue {
    /// An error issue
    #[must_use]
    pub fn error(code: u32, span: Span, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            span,
            related: Vec::new(),
            suggestion: None,
        }
    }

    /// A warning issue
    #[must_use]
    pub fn warning(code: u32, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, span, message)
        }
    }

    /// Attach related information
    #[must_use]
    pub fn with_related(mut self, message: impl Into<String>, origin: DeclOrigin) -> Self {
        self.related.push((message.into(), origin));
        self
    }

    /// Attach a suggested fix
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Resolve into a positioned diagnostic
    #[must_use]
    pub fn into_diagnostic(self, text: &str, index: &LineIndex) -> Diagnostic {
        let (line, column) = index.position(text, self.span.start);
        Diagnostic {
            code: self.code,
            severity: self.severity,
            message: self.message,
            line,
            column,
            length: self.span.len(),
            source_line: index.line_text(text, line).to_string(),
            related: self
                .related
                .into_iter()
                .map(|(message, origin)| RelatedInformation {
                    message,
                    file: origin.file,
                    line: origin.line,
                    column: origin.column,
                    length: origin.length,
                    source_line: origin.line_text,
                })
                .collect(),
            suggestion: self.suggestion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_into_diagnostic() {
        let text = "const a = 1;\nfoo(a);";
        let index = LineIndex::new(text);
        let diag = Issue::error(codes::CANNOT_FIND_NAME, Span::new(13, 16), "Cannot find name 'foo'.")
            .with_suggestion("declare it")
            .into_diagnostic(text, &index);
        assert_eq!(diag.line, 2);
        assert_eq!(diag.column, 1);
        assert_eq!(diag.length, 3);
        assert_eq!(diag.source_line, "foo(a);");
        assert_eq!(diag.suggestion.as_deref(), Some("declare it"));
    }

    #[test]
    fn test_related_is_resolved() {
        let decl = "function get(id: string): void;";
        let index = LineIndex::new(decl);
        let origin = DeclOrigin::locate("notes.d.ts", decl, &index, Span::new(13, 23));
        assert_eq!(origin.column, 14);
        let diag = Issue::error(2345, Span::new(0, 1), "m")
            .with_related("declared here", origin)
            .into_diagnostic("x", &LineIndex::new("x"));
        assert_eq!(diag.related.len(), 1);
        assert_eq!(diag.related[0].file, "notes.d.ts");
    }
}

//! Positioned compiler diagnostics and compilation results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// File name used for the evaluated source in diagnostics and source maps
pub const SOURCE_FILE_NAME: &str = "main.ts";

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks execution
    Error,
    /// Reported alongside a successful compile
    Warning,
    /// Informational hint
    Suggestion,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Suggestion => write!(f, "suggestion"),
        }
    }
}

/// A 1-based line/column position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourcePosition {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

/// Secondary location attached to a diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedInformation {
    /// Explanation, e.g. "The expected type comes from this parameter."
    pub message: String,
    /// File the location lives in
    pub file: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// Length of the span
    pub length: u32,
    /// Literal text of the referenced line
    pub source_line: String,
}

/// A positioned compiler diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Numeric code (TypeScript-compatible below 9000, FLINT-specific above)
    pub code: u32,
    /// Severity
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
    /// Length of the offending span
    pub length: u32,
    /// Literal text of the offending line
    pub source_line: String,
    /// Related locations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedInformation>,
    /// Suggested fix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Whether this diagnostic blocks execution
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Start position
    #[must_use]
    pub fn position(&self) -> SourcePosition {
        SourcePosition {
            line: self.line,
            column: self.column,
        }
    }

    /// Code with its family prefix, e.g. `TS2304` or `FL9001`
    #[must_use]
    pub fn code_label(&self) -> String {
        if self.code >= 9000 {
            format!("FL{}", self.code)
        } else {
            format!("TS{}", self.code)
        }
    }

    /// Render the diagnostic with its source line and an underline
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}:{}:{} - {} {}: {}\n",
            SOURCE_FILE_NAME,
            self.line,
            self.column,
            self.severity,
            self.code_label(),
            self.message
        );
        let gutter = self.line.to_string();
        out.push_str(&format!("\n{} {}\n", gutter, self.source_line));
        let pad = " ".repeat(gutter.len() + self.column as usize);
        let marks = "~".repeat(self.length.max(1) as usize);
        out.push_str(&format!("{}{}\n", pad, marks));
        for related in &self.related {
            out.push_str(&format!(
                "\n  {}:{}:{}\n    {}\n    {}\n",
                related.file,
                related.line,
                related.column,
                related.source_line.trim(),
                related.message
            ));
        }
        if let Some(suggestion) = &self.suggestion {
            out.push_str(&format!("\n  hint: {}\n", suggestion));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {} {}: {}",
            self.line,
            self.column,
            self.severity,
            self.code_label(),
            self.message
        )
    }
}

/// Source map (revision 3) for emitted code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    /// Always 3
    pub version: u8,
    /// Generated file name
    pub file: String,
    /// Original sources
    pub sources: Vec<String>,
    /// Embedded original source text
    pub sources_content: Vec<String>,
    /// Symbol names (unused)
    pub names: Vec<String>,
    /// VLQ-encoded mappings
    pub mappings: String,
}

/// Output of the compile front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationResult {
    /// True iff no error-severity diagnostics were produced
    pub success: bool,
    /// Diagnostics ordered by position
    pub diagnostics: Vec<Diagnostic>,
    /// Emitted JavaScript, present iff `success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emitted: Option<String>,
    /// Source map for `emitted`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<SourceMap>,
}

impl CompilationResult {
    /// Build a result, deriving `success` and ordering the diagnostics.
    ///
    /// Emitted code and source map are dropped when any error is present.
    #[must_use]
    pub fn new(
        mut diagnostics: Vec<Diagnostic>,
        emitted: Option<String>,
        source_map: Option<SourceMap>,
    ) -> Self {
        diagnostics.sort_by(|a, b| {
            (a.line, a.column, a.code).cmp(&(b.line, b.column, b.code))
        });
        diagnostics.dedup();
        let success = !diagnostics.iter().any(Diagnostic::is_error);
        Self {
            success,
            diagnostics,
            emitted: if success { emitted } else { None },
            source_map: if success { source_map } else { None },
        }
    }

    /// A failed result with the given diagnostics
    #[must_use]
    pub fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        Self::new(diagnostics, None, None)
    }

    /// Error-severity diagnostics
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Non-error diagnostics
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    /// Check for a diagnostic code
    #[must_use]
    pub fn has_code(&self, code: u32) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag(code: u32, severity: Severity, line: u32, column: u32) -> Diagnostic {
        Diagnostic {
            code,
            severity,
            message: "message".to_string(),
            line,
            column,
            length: 3,
            source_line: "let abc = 1;".to_string(),
            related: Vec::new(),
            suggestion: None,
        }
    }

    #[test]
    fn test_code_label() {
        assert_eq!(diag(2304, Severity::Error, 1, 1).code_label(), "TS2304");
        assert_eq!(diag(9001, Severity::Error, 1, 1).code_label(), "FL9001");
    }

    #[test]
    fn test_result_orders_and_derives_success() {
        let result = CompilationResult::new(
            vec![
                diag(2, Severity::Warning, 3, 1),
                diag(1, Severity::Error, 1, 5),
            ],
            Some("code".to_string()),
            None,
        );
        assert!(!result.success);
        assert!(result.emitted.is_none());
        assert_eq!(result.diagnostics[0].line, 1);
        assert_eq!(result.errors().count(), 1);
        assert_eq!(result.warnings().count(), 1);
    }

    #[test]
    fn test_result_success_keeps_emit() {
        let result = CompilationResult::new(
            vec![diag(7, Severity::Warning, 1, 1)],
            Some("code".to_string()),
            None,
        );
        assert!(result.success);
        assert_eq!(result.emitted.as_deref(), Some("code"));
    }

    #[test]
    fn test_render_underlines() {
        let rendered = diag(2304, Severity::Error, 1, 5).render();
        assert!(rendered.contains("main.ts:1:5 - error TS2304"));
        assert!(rendered.contains("~~~"));
    }

    #[test]
    fn test_serde_camel_case() {
        let json = serde_json::to_value(diag(1, Severity::Error, 1, 1)).unwrap();
        assert!(json.get("sourceLine").is_some());
        assert_eq!(json["severity"], "error");
        assert!(json.get("related").is_none());
    }
}

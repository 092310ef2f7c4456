//! Compile pipeline: scan, parse, check, erase.

use crate::ambient::{ambient_files, binding_declarations, BINDINGS_FILE_NAME};
use crate::checker::{check_program, CheckFile};
use crate::diagnostics::Issue;
use crate::emit::{erase_types, identity_source_map};
use crate::parser::{parse_declarations, parse_program, parse_type_text, Parsed};
use crate::security::{SecurityScanner, DEFAULT_MAX_CODE_BYTES};
use crate::span::LineIndex;
use flint_core::{CompilationResult, Diagnostic};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stack reserved for one compilation
const COMPILE_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Compiler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Largest accepted source, in bytes
    pub max_code_bytes: usize,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            max_code_bytes: DEFAULT_MAX_CODE_BYTES,
        }
    }
}

/// Extra declaration file made available to one compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraDeclarations {
    /// File name used in related information
    pub name: String,
    /// Declaration text
    pub text: String,
}

impl ExtraDeclarations {
    /// Create an extra declaration file
    #[must_use]
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Per-compilation additions to the ambient surface
#[derive(Debug, Clone, Default)]
pub struct CompileExtras<'e> {
    /// Generated declaration files, e.g. the custom function namespace
    pub declarations: Vec<ExtraDeclarations>,
    /// Initial bindings, declared as `const` globals
    pub bindings: Option<&'e BTreeMap<String, Value>>,
}

impl<'e> CompileExtras<'e> {
    /// No additions
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Add a declaration file
    #[must_use]
    pub fn with_declarations(mut self, extra: ExtraDeclarations) -> Self {
        self.declarations.push(extra);
        self
    }

    /// Declare initial bindings
    #[must_use]
    pub fn with_bindings(mut self, bindings: &'e BTreeMap<String, Value>) -> Self {
        self.bindings = Some(bindings);
        self
    }
}

/// In-memory compiler host over the ambient surface
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompileConfig,
}

impl Compiler {
    /// Create a compiler
    #[must_use]
    pub fn new(config: CompileConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &CompileConfig {
        &self.config
    }

    /// Type-check `source` and emit JavaScript
    ///
    /// Emitted code is present only when no error diagnostics were produced.
    /// Runs on a dedicated thread sized for the deepest nesting the parser accepts.
    #[must_use]
    pub fn compile(&self, source: &str, extras: &CompileExtras<'_>) -> CompilationResult {
        let span = tracing::Span::current();
        std::thread::scope(|scope| {
            let worker = std::thread::Builder::new()
                .name("flint-compile".into())
                .stack_size(COMPILE_STACK_BYTES)
                .spawn_scoped(scope, || span.in_scope(|| self.compile_here(source, extras)));
            match worker {
                Ok(handle) => handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
                Err(err) => {
                    tracing::warn!(error = %err, "compile thread unavailable, compiling on the caller's stack");
                    self.compile_here(source, extras)
                }
            }
        })
    }

    fn compile_here(&self, source: &str, extras: &CompileExtras<'_>) -> CompilationResult {
        let index = LineIndex::new(source);
        let to_diagnostics = |issues: Vec<Issue>| -> Vec<Diagnostic> {
            issues.into_iter().map(|i| i.into_diagnostic(source, &index)).collect()
        };

        let scanner = SecurityScanner::new(self.config.max_code_bytes);
        let mut issues = scanner.scan(source);
        if source.len() > self.config.max_code_bytes {
            tracing::debug!(code_len = source.len(), "compile: source too large");
            return CompilationResult::failed(to_diagnostics(issues));
        }

        let parsed = parse_program(source);
        if parsed.has_errors() {
            tracing::debug!(syntax_errors = parsed.issues.len(), "compile: syntax errors");
            issues.extend(parsed.issues);
            return CompilationResult::failed(to_diagnostics(issues));
        }

        let mut generated = Vec::with_capacity(extras.declarations.len() + 1);
        for extra in &extras.declarations {
            generated.push((extra.name.clone(), extra.text.clone()));
        }
        if let Some(bindings) = extras.bindings {
            let (text, binding_issues) = binding_declarations(bindings);
            issues.extend(binding_issues);
            generated.push((BINDINGS_FILE_NAME.to_string(), text));
        }
        let generated_parsed: Vec<Parsed> = generated
            .iter()
            .map(|(name, text)| {
                let parsed = parse_declarations(text);
                if parsed.has_errors() {
                    tracing::warn!(file = %name, errors = parsed.issues.len(), "generated declarations do not parse");
                }
                parsed
            })
            .collect();

        let mut files = Vec::with_capacity(1 + ambient_files().len() + generated.len());
        files.push(CheckFile {
            name: flint_core::SOURCE_FILE_NAME,
            text: source,
            program: &parsed.program,
        });
        for file in ambient_files() {
            files.push(CheckFile {
                name: file.name,
                text: file.text,
                program: &file.parsed.program,
            });
        }
        for ((name, text), parsed) in generated.iter().zip(&generated_parsed) {
            files.push(CheckFile {
                name,
                text,
                program: &parsed.program,
            });
        }
        issues.extend(check_program(&files));

        let diagnostics = to_diagnostics(issues);
        let errors = diagnostics.iter().filter(|d| d.is_error()).count();
        tracing::debug!(code_len = source.len(), diagnostics = diagnostics.len(), errors, "compile: checked");
        if errors > 0 {
            return CompilationResult::failed(diagnostics);
        }
        let emitted = erase_types(source, &parsed.erasures);
        CompilationResult::new(diagnostics, Some(emitted), Some(identity_source_map(source)))
    }

    /// Check that a type text parses and resolves against the ambient surface
    ///
    /// # Errors
    ///
    /// Returns the diagnostics' messages when the text is not a valid type.
    pub fn check_type_text(&self, text: &str, extras: &CompileExtras<'_>) -> Result<(), Vec<String>> {
        if let Err(issues) = parse_type_text(text) {
            return Err(issues.into_iter().map(|i| i.message).collect());
        }
        let alias = format!("type FlintTypeText = {text};\n");
        let result = self.compile(&alias, extras);
        if result.success {
            Ok(())
        } else {
            Err(result.errors().map(|d| d.message.clone()).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(source: &str) -> CompilationResult {
        Compiler::default().compile(source, &CompileExtras::none())
    }

    #[test]
    fn test_clean_compile_emits() {
        let result = compile("const n: number = 1;\nconsole.log(n);");
        assert!(result.success, "{:?}", result.diagnostics);
        assert_eq!(result.emitted.as_deref(), Some("const n         = 1;\nconsole.log(n);"));
        assert!(result.source_map.is_some());
    }

    #[test]
    fn test_null_access_is_rejected() {
        let source = "async function main() { const n = await notes.get(\"missing\"); return n.title; }";
        let result = compile(source);
        assert!(!result.success);
        assert!(result.emitted.is_none());
        assert!(result.has_code(18047));
        let diag = result.errors().next().unwrap();
        assert_eq!(diag.line, 1);
        assert_eq!(diag.source_line, source);
        assert!(diag.suggestion.is_some());
    }

    #[test]
    fn test_optional_chaining_compiles() {
        let source = "async function main() { const n = await notes.get(\"missing\"); return n?.title ?? null; }";
        assert!(compile(source).success);
    }

    #[test]
    fn test_forbidden_global_reported() {
        let result = compile("const p = process.env;");
        assert!(!result.success);
        assert!(result.has_code(9001));
        assert!(result.has_code(2304));
    }

    #[test]
    fn test_fetch_is_undeclared() {
        let result = compile("const r = await fetch(\"https://example.com\");");
        assert!(result.has_code(2304));
    }

    #[test]
    fn test_size_limit() {
        let compiler = Compiler::new(CompileConfig { max_code_bytes: 4 });
        let result = compiler.compile("const a = 1;", &CompileExtras::none());
        assert!(!result.success);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, 9005);
    }

    #[test]
    fn test_syntax_error_skips_checker() {
        let result = compile("const = ;");
        assert!(!result.success);
        assert!(result.diagnostics.iter().all(|d| d.code < 2000));
    }

    #[test]
    fn test_bindings_are_declared() {
        let mut bindings = BTreeMap::new();
        bindings.insert("query".to_string(), json!("rust"));
        let extras = CompileExtras::none().with_bindings(&bindings);
        let result = Compiler::default().compile("const q: string = query.toUpperCase();", &extras);
        assert!(result.success, "{:?}", result.diagnostics);
    }

    #[test]
    fn test_extra_declarations() {
        let extras = CompileExtras::none().with_declarations(ExtraDeclarations::new(
            "custom.d.ts",
            "declare namespace custom {\n    function double(n: number): Promise<number>;\n}\n",
        ));
        let ok = Compiler::default().compile("const d: number = await custom.double(2);", &extras);
        assert!(ok.success, "{:?}", ok.diagnostics);
        let bad = Compiler::default().compile("await custom.double(\"2\");", &extras);
        assert!(bad.has_code(2345));
    }

    #[test]
    fn test_check_type_text() {
        let compiler = Compiler::default();
        assert!(compiler.check_type_text("string[]", &CompileExtras::none()).is_ok());
        assert!(compiler.check_type_text("Note | null", &CompileExtras::none()).is_ok());
        assert!(compiler.check_type_text("Missing", &CompileExtras::none()).is_err());
        assert!(compiler.check_type_text("string[", &CompileExtras::none()).is_err());
    }

    #[test]
    fn test_warnings_do_not_block() {
        let result = compile("throw new Error(\"x\");\nconsole.log(1);");
        assert!(result.success, "{:?}", result.diagnostics);
        assert!(result.has_code(7027));
    }

    #[test]
    fn test_deep_nesting_is_reported() {
        let source = format!("return {}1{};", "(".repeat(5000), ")".repeat(5000));
        let result = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || compile(&source))
            .unwrap()
            .join()
            .unwrap();
        assert!(!result.success);
        assert!(result.has_code(9101));
    }

    #[test]
    fn test_long_chain_is_reported() {
        let result = compile(&format!("const n: number = 1{};", " + 1".repeat(5000)));
        assert!(!result.success);
        assert!(result.has_code(9101));
    }
}

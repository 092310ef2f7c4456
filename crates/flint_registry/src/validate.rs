//! Registration checks: naming, parameter schema, and compile validation.
//!
//! A definition is persisted only after all three pass. Compilation runs the
//! same pipeline as ad-hoc code, security scan included, against the ambient
//! surface plus the declarations of the vault's other functions.

use crate::definition::{CustomFunctionDefinition, ParameterSchema};
use flint_core::{Diagnostic, SOURCE_FILE_NAME};
use flint_ts::ast::StmtKind;
use flint_ts::parser::parse_program;
use flint_ts::{is_reserved_global, is_reserved_word, CompileExtras, Compiler, ExtraDeclarations, CUSTOM_FILE_NAME};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

/// Longest accepted function or parameter name
pub const MAX_NAME_LEN: usize = 64;

/// Strict-mode and TypeScript words the parser still accepts as identifiers
const STRICT_RESERVED: &[&str] = &[
    "arguments", "implements", "interface", "let", "package", "private", "protected", "public", "static",
];

/// Diagnostic codes at or above this come from the security scan
const SECURITY_CODE_FLOOR: u32 = 9000;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid"));

/// Why a definition or test request was rejected; nothing was persisted
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValidationError {
    /// Not identifier-shaped or too long
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// Submitted name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// A reserved word or a built-in global
    #[error("{name:?} is reserved")]
    ReservedName {
        /// Submitted name
        name: String,
    },

    /// Another function in the vault has the same name ignoring case
    #[error("a function named {existing:?} already exists")]
    DuplicateName {
        /// Submitted name
        name: String,
        /// Name already stored
        existing: String,
    },

    /// A parameter is malformed
    #[error("invalid parameter {name:?}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// The return type does not resolve
    #[error("invalid return type {type_text:?}: {reason}")]
    InvalidReturnType {
        /// Submitted type text
        type_text: String,
        /// What is wrong with it
        reason: String,
    },

    /// The body uses a forbidden construct
    #[error("security scan failed: {}", first_message(.diagnostics))]
    Security {
        /// Scan findings, positioned in the body
        diagnostics: Vec<Diagnostic>,
    },

    /// The body does not type-check
    #[error("compilation failed: {}", first_message(.diagnostics))]
    Compilation {
        /// Compiler diagnostics, positioned in the body
        diagnostics: Vec<Diagnostic>,
    },

    /// The body does not stay inside its function
    #[error("invalid body: {reason}")]
    InvalidBody {
        /// What is wrong with it
        reason: String,
    },

    /// A test run omitted a required argument
    #[error("missing required argument {name:?}")]
    MissingArgument {
        /// Parameter name
        name: String,
    },

    /// Test arguments were not an object of known parameter names
    #[error("invalid arguments: {reason}")]
    InvalidArguments {
        /// What is wrong with them
        reason: String,
    },
}

impl ValidationError {
    /// Diagnostics carried by compile and scan failures
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Security { diagnostics } | Self::Compilation { diagnostics } => diagnostics,
            _ => &[],
        }
    }
}

fn first_message(diagnostics: &[Diagnostic]) -> String {
    match diagnostics.first() {
        Some(first) if diagnostics.len() > 1 => {
            format!("{} (and {} more)", first.render(), diagnostics.len() - 1)
        }
        Some(first) => first.render(),
        None => "no diagnostics".to_string(),
    }
}

/// Check a function or parameter name
///
/// # Errors
///
/// Returns [`ValidationError::InvalidName`] or [`ValidationError::ReservedName`].
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(&format!("longer than {MAX_NAME_LEN} characters")));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(invalid("not an identifier"));
    }
    if is_reserved_word(name) || STRICT_RESERVED.contains(&name) || is_reserved_global(name) {
        return Err(ValidationError::ReservedName { name: name.to_string() });
    }
    Ok(())
}

/// Check parameter names, ordering, and every type text
///
/// # Errors
///
/// Returns the first schema problem found.
pub fn validate_schema(
    compiler: &Compiler,
    definition: &CustomFunctionDefinition,
    extras: &CompileExtras<'_>,
) -> Result<(), ValidationError> {
    let mut seen = BTreeSet::new();
    let mut optional_seen = false;
    for parameter in &definition.parameters {
        let invalid = |reason: String| ValidationError::InvalidParameter {
            name: parameter.name.clone(),
            reason,
        };
        if !IDENTIFIER.is_match(&parameter.name) || parameter.name.len() > MAX_NAME_LEN {
            return Err(invalid("not an identifier".to_string()));
        }
        if is_reserved_word(&parameter.name) || STRICT_RESERVED.contains(&parameter.name.as_str()) {
            return Err(invalid("reserved word".to_string()));
        }
        if !seen.insert(parameter.name.as_str()) {
            return Err(invalid("duplicate parameter name".to_string()));
        }
        if parameter.optional {
            optional_seen = true;
        } else if optional_seen {
            return Err(invalid("required parameter follows an optional one".to_string()));
        }
        compiler
            .check_type_text(&parameter.type_text, extras)
            .map_err(|messages| invalid(messages.join("; ")))?;
    }
    compiler
        .check_type_text(&definition.return_type, extras)
        .map_err(|messages| ValidationError::InvalidReturnType {
            type_text: definition.return_type.clone(),
            reason: messages.join("; "),
        })
}

/// Compile the wrapper and return its erased JavaScript
///
/// `others` is the declaration text for the vault's other functions.
///
/// # Errors
///
/// Returns [`ValidationError::Security`] when any scan finding is present,
/// otherwise [`ValidationError::Compilation`] for type errors.
pub fn compile_definition(
    compiler: &Compiler,
    definition: &CustomFunctionDefinition,
    others: &str,
) -> Result<String, ValidationError> {
    let extras = CompileExtras::none().with_declarations(ExtraDeclarations::new(CUSTOM_FILE_NAME, others));
    validate_schema(compiler, definition, &extras)?;

    let wrapper = definition.wrapper_source();
    let result = compiler.compile(&wrapper, &extras);
    if let (true, Some(emitted)) = (result.success, result.emitted) {
        ensure_single_function(&wrapper)?;
        return Ok(emitted);
    }

    let diagnostics: Vec<Diagnostic> = result
        .diagnostics
        .into_iter()
        .filter(Diagnostic::is_error)
        .map(into_body_position)
        .collect();
    if diagnostics.iter().any(|d| d.code >= SECURITY_CODE_FLOOR) {
        let findings = diagnostics.into_iter().filter(|d| d.code >= SECURITY_CODE_FLOOR).collect();
        return Err(ValidationError::Security { diagnostics: findings });
    }
    Err(ValidationError::Compilation { diagnostics })
}

/// Check one test argument against its declared parameter type
///
/// The JSON value is checked as a literal initializer, so the usual
/// assignability rules apply, excess properties included.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidArguments`] when the value does not fit.
pub fn check_argument(compiler: &Compiler, parameter: &ParameterSchema, value: &Value) -> Result<(), ValidationError> {
    let source = format!("const argument: {} = {};\n", parameter.type_text, value);
    let result = compiler.compile(&source, &CompileExtras::none());
    if result.success {
        return Ok(());
    }
    let reason = result
        .errors()
        .next()
        .map_or_else(|| "rejected".to_string(), |d| d.message.clone());
    Err(ValidationError::InvalidArguments {
        reason: format!("argument {:?} is not a {}: {reason}", parameter.name, parameter.type_text),
    })
}

/// The wrapper must parse as exactly one function declaration spanning all of it
fn ensure_single_function(wrapper: &str) -> Result<(), ValidationError> {
    let parsed = parse_program(wrapper);
    let spans_wrapper = match parsed.program.body.as_slice() {
        [only] => {
            matches!(only.kind, StmtKind::Function(_))
                && only.span.start == 0
                && only.span.end as usize == wrapper.trim_end().len()
        }
        _ => false,
    };
    if parsed.has_errors() || !spans_wrapper {
        return Err(ValidationError::InvalidBody {
            reason: "the body closes its function; unbalanced braces".to_string(),
        });
    }
    Ok(())
}

/// Shift a wrapper position to the submitted body; the signature line stays at 1
fn into_body_position(mut diagnostic: Diagnostic) -> Diagnostic {
    diagnostic.line = diagnostic.line.saturating_sub(1).max(1);
    for related in &mut diagnostic.related {
        if related.file == SOURCE_FILE_NAME {
            related.line = related.line.saturating_sub(1).max(1);
        }
    }
    diagnostic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ParameterSchema;
    use flint_core::VaultId;
    use proptest::prelude::*;

    fn def(name: &str, code: &str) -> CustomFunctionDefinition {
        CustomFunctionDefinition::new(VaultId::new("work").unwrap(), name, "number", code)
    }

    const NO_OTHERS: &str = "declare namespace custom {\n}\n";

    #[test]
    fn test_name_shape() {
        assert!(validate_name("countNotes").is_ok());
        assert!(validate_name("_private$").is_ok());
        assert!(matches!(validate_name(""), Err(ValidationError::InvalidName { .. })));
        assert!(matches!(validate_name("1st"), Err(ValidationError::InvalidName { .. })));
        assert!(matches!(validate_name("has-dash"), Err(ValidationError::InvalidName { .. })));
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(validate_name(&long), Err(ValidationError::InvalidName { .. })));
    }

    #[test]
    fn test_reserved_names() {
        for name in ["class", "await", "interface", "notes", "custom", "console", "JSON", "eval", "__flintCall"] {
            assert_eq!(
                validate_name(name),
                Err(ValidationError::ReservedName { name: name.to_string() }),
                "{name}"
            );
        }
    }

    #[test]
    fn test_schema_rejects_duplicate_parameters() {
        let d = def("f", "return 1;")
            .with_parameter(ParameterSchema::required("a", "string"))
            .with_parameter(ParameterSchema::required("a", "number"));
        let err = validate_schema(&Compiler::default(), &d, &CompileExtras::none()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { reason, .. } if reason.contains("duplicate")));
    }

    #[test]
    fn test_schema_rejects_required_after_optional() {
        let d = def("f", "return 1;")
            .with_parameter(ParameterSchema::optional("a", "string"))
            .with_parameter(ParameterSchema::required("b", "number"));
        let err = validate_schema(&Compiler::default(), &d, &CompileExtras::none()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParameter { name, .. } if name == "b"));
    }

    #[test]
    fn test_schema_rejects_unknown_type() {
        let d = def("f", "return 1;").with_parameter(ParameterSchema::required("a", "Widget"));
        assert!(matches!(
            validate_schema(&Compiler::default(), &d, &CompileExtras::none()),
            Err(ValidationError::InvalidParameter { .. })
        ));

        let mut d = def("f", "return 1;");
        d.return_type = "Promise<".into();
        assert!(matches!(
            validate_schema(&Compiler::default(), &d, &CompileExtras::none()),
            Err(ValidationError::InvalidReturnType { .. })
        ));
    }

    #[test]
    fn test_compile_emits_erased_function() {
        let d = def("twice", "return n * 2;").with_parameter(ParameterSchema::required("n", "number"));
        let emitted = compile_definition(&Compiler::default(), &d, NO_OTHERS).unwrap();
        assert!(emitted.starts_with("async function twice(n"));
        assert!(!emitted.contains(": number"));
        assert!(emitted.contains("return n * 2;"));
    }

    #[test]
    fn test_compile_error_positions_are_in_body() {
        let d = def("bad", "const s: string = 1;\nreturn 0;");
        match compile_definition(&Compiler::default(), &d, NO_OTHERS) {
            Err(ValidationError::Compilation { diagnostics }) => {
                assert!(!diagnostics.is_empty());
                assert_eq!(diagnostics[0].line, 1);
                assert_eq!(diagnostics[0].source_line, "const s: string = 1;");
            }
            other => panic!("expected compilation error, got {other:?}"),
        }
    }

    #[test]
    fn test_security_scan_rejects_eval() {
        let d = def("sneaky", "return eval(\"1\");");
        match compile_definition(&Compiler::default(), &d, NO_OTHERS) {
            Err(ValidationError::Security { diagnostics }) => {
                assert!(diagnostics.iter().all(|d| d.code >= SECURITY_CODE_FLOOR));
            }
            other => panic!("expected security error, got {other:?}"),
        }
    }

    #[test]
    fn test_other_functions_are_visible() {
        let others = "declare namespace custom {\n  function base(): Promise<number>;\n}\n";
        let d = def("derived", "return (await custom.base()) + 1;");
        assert!(compile_definition(&Compiler::default(), &d, others).is_ok());
        assert!(matches!(
            compile_definition(&Compiler::default(), &d, NO_OTHERS),
            Err(ValidationError::Compilation { .. })
        ));
    }

    proptest! {
        #[test]
        fn test_identifier_names_accepted(name in "fn_[A-Za-z0-9_$]{0,40}") {
            prop_assert!(validate_name(&name).is_ok());
        }

        #[test]
        fn test_non_identifier_names_rejected(head in "[a-z]{1,10}", bad in "[-. !@#]", tail in "[a-z]{0,10}") {
            let name = format!("{head}{bad}{tail}");
            let rejected = matches!(validate_name(&name), Err(ValidationError::InvalidName { .. }));
            prop_assert!(rejected);
        }
    }
}

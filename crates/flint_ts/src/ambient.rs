//! Ambient declaration surface.
//!
//! The built-in lib subset and one declaration file per capability namespace
//! are compiled into the binary and parsed once per process. Per-evaluation
//! fragments (the custom function namespace and initial bindings) are
//! generated as declaration text and parsed alongside them.

use crate::ast::StmtKind;
use crate::diagnostics::{codes, Issue};
use crate::parser::{is_reserved_word, parse_declarations, Parsed};
use crate::security::{FORBIDDEN_GLOBALS, RESERVED_PREFIX};
use crate::span::Span;
use crate::types::is_identifier_name;
use flint_core::NAMESPACES;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Name of the synthesized custom function namespace
pub const CUSTOM_NAMESPACE: &str = "custom";

/// Name of the generated bindings declaration file
pub const BINDINGS_FILE_NAME: &str = "bindings.d.ts";

/// Name of the generated custom namespace declaration file
pub const CUSTOM_FILE_NAME: &str = "custom.d.ts";

/// One built-in declaration file
#[derive(Debug)]
pub struct AmbientFile {
    /// File name used in related information
    pub name: &'static str,
    /// Declaration text
    pub text: &'static str,
    /// Parsed declarations
    pub parsed: Parsed,
}

const SOURCES: [(&str, &str); 4] = [
    ("lib.d.ts", include_str!("../ambient/lib.d.ts")),
    ("notes.d.ts", include_str!("../ambient/notes.d.ts")),
    ("vaults.d.ts", include_str!("../ambient/vaults.d.ts")),
    ("links.d.ts", include_str!("../ambient/links.d.ts")),
];

static AMBIENT: Lazy<Vec<AmbientFile>> = Lazy::new(|| {
    SOURCES
        .iter()
        .map(|(name, text)| {
            let parsed = parse_declarations(text);
            for issue in &parsed.issues {
                tracing::error!(file = name, code = issue.code, message = %issue.message, "ambient declaration does not parse");
            }
            AmbientFile { name, text, parsed }
        })
        .collect()
});

static LIB_GLOBALS: Lazy<BTreeSet<String>> = Lazy::new(|| {
    let mut names = BTreeSet::new();
    for file in AMBIENT.iter() {
        for stmt in &file.parsed.program.body {
            match &stmt.kind {
                StmtKind::Var(decl) => {
                    for d in &decl.decls {
                        if let crate::ast::PatternKind::Ident(id) = &d.pattern.kind {
                            names.insert(id.name.clone());
                        }
                    }
                }
                StmtKind::Function(decl) => {
                    names.insert(decl.name.name.clone());
                }
                StmtKind::Namespace { name, .. } => {
                    names.insert(name.name.clone());
                }
                _ => {}
            }
        }
    }
    names
});

/// Built-in declaration files, parsed on first use
#[must_use]
pub fn ambient_files() -> &'static [AmbientFile] {
    &AMBIENT
}

/// Value names declared by the built-in files (`Math`, `notes`, `parseInt`, ...)
#[must_use]
pub fn global_names() -> &'static BTreeSet<String> {
    &LIB_GLOBALS
}

/// Whether `name` would shadow or escape a built-in global
///
/// Covers the capability namespaces, `custom`, `console`, every lib global,
/// the globals the sandbox removes, and the bridge prefix.
#[must_use]
pub fn is_reserved_global(name: &str) -> bool {
    NAMESPACES.contains(&name)
        || name == CUSTOM_NAMESPACE
        || name == "console"
        || LIB_GLOBALS.contains(name)
        || FORBIDDEN_GLOBALS.contains(&name)
        || name.starts_with(RESERVED_PREFIX)
}

/// TypeScript type text describing a JSON value
///
/// Object properties are `readonly` since bindings are frozen. Array element
/// types are the union of the distinct element types.
#[must_use]
pub fn json_type_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "boolean".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => {
            let mut members: Vec<String> = Vec::new();
            for item in items {
                let text = json_type_text(item);
                if !members.contains(&text) {
                    members.push(text);
                }
            }
            match members.len() {
                0 => "unknown[]".to_string(),
                1 if !members[0].contains('|') => format!("{}[]", members[0]),
                _ => format!("({})[]", members.join(" | ")),
            }
        }
        Value::Object(map) => {
            if map.is_empty() {
                return "{}".to_string();
            }
            let props: Vec<String> = map
                .iter()
                .map(|(key, value)| {
                    let key = if is_identifier_name(key) {
                        key.clone()
                    } else {
                        Value::String(key.clone()).to_string()
                    };
                    format!("readonly {key}: {}", json_type_text(value))
                })
                .collect();
            format!("{{ {} }}", props.join("; "))
        }
    }
}

/// Validate binding names and render their declarations
///
/// Invalid names produce 9201 issues anchored at the start of the program
/// and are left out of the declaration text.
#[must_use]
pub fn binding_declarations(bindings: &BTreeMap<String, Value>) -> (String, Vec<Issue>) {
    let mut text = String::new();
    let mut issues = Vec::new();
    for (name, value) in bindings {
        if let Some(reason) = invalid_binding_reason(name) {
            issues.push(Issue::error(
                codes::INVALID_BINDING,
                Span::new(0, 0),
                format!("Initial binding '{name}' is invalid: {reason}."),
            ));
            continue;
        }
        text.push_str(&format!("declare const {name}: {};\n", json_type_text(value)));
    }
    (text, issues)
}

fn invalid_binding_reason(name: &str) -> Option<&'static str> {
    if !is_identifier_name(name) {
        Some("not an identifier")
    } else if is_reserved_word(name) {
        Some("reserved word")
    } else if is_reserved_global(name) {
        Some("shadows a built-in global")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ambient_files_parse() {
        let files = ambient_files();
        assert_eq!(files.len(), 4);
        for file in files {
            assert!(file.parsed.issues.is_empty(), "{}: {:?}", file.name, file.parsed.issues);
        }
    }

    #[test]
    fn test_global_names() {
        let names = global_names();
        assert!(names.contains("Math"));
        assert!(names.contains("notes"));
        assert!(names.contains("parseInt"));
        assert!(!names.contains("process"));
    }

    #[test]
    fn test_reserved_globals() {
        assert!(is_reserved_global("custom"));
        assert!(is_reserved_global("console"));
        assert!(is_reserved_global("links"));
        assert!(is_reserved_global("JSON"));
        assert!(is_reserved_global("process"));
        assert!(is_reserved_global("__flintState"));
        assert!(!is_reserved_global("summarize"));
    }

    #[test]
    fn test_json_type_text() {
        assert_eq!(json_type_text(&json!(null)), "null");
        assert_eq!(json_type_text(&json!([1, 2])), "number[]");
        assert_eq!(json_type_text(&json!([1, "a"])), "(number | string)[]");
        assert_eq!(json_type_text(&json!([])), "unknown[]");
        assert_eq!(
            json_type_text(&json!({"limit": 3, "my-key": true})),
            "{ readonly limit: number; readonly \"my-key\": boolean }"
        );
    }

    #[test]
    fn test_binding_declarations() {
        let mut bindings = BTreeMap::new();
        bindings.insert("query".to_string(), json!("rust"));
        bindings.insert("notes".to_string(), json!(1));
        bindings.insert("bad-name".to_string(), json!(1));
        let (text, issues) = binding_declarations(&bindings);
        assert_eq!(text, "declare const query: string;\n");
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.code == codes::INVALID_BINDING));
    }

    #[test]
    fn test_binding_declarations_parse() {
        let mut bindings = BTreeMap::new();
        bindings.insert("config".to_string(), json!({"tags": ["a"], "depth": 2, "extra": null}));
        let (text, issues) = binding_declarations(&bindings);
        assert!(issues.is_empty());
        assert!(parse_declarations(&text).issues.is_empty());
    }
}

//! Namespace synthesis.
//!
//! Turns a vault's stored records into the `custom` prelude and its
//! declaration file. Output depends only on the records: sorted by name,
//! no timestamps, so equal inputs give byte-identical text.

use crate::definition::FunctionRecord;
use flint_core::Fingerprint;
use flint_ts::CUSTOM_NAMESPACE;
use serde::Serialize;

/// The `custom` namespace for one vault at one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizedNamespace {
    /// JavaScript prelude defining `custom`
    pub code: String,
    /// `declare namespace custom { ... }` for the compiler
    pub declarations: String,
    /// Fingerprint over `code` and `declarations`
    pub fingerprint: Fingerprint,
    /// Number of functions included
    pub functions: usize,
}

impl SynthesizedNamespace {
    /// Build from records in any order
    #[must_use]
    pub fn build(records: &[FunctionRecord]) -> Self {
        let mut sorted: Vec<&FunctionRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));

        let code = prelude_code(&sorted);
        let declarations = declarations(sorted.iter().copied());
        let fingerprint = Fingerprint::compute_parts([code.as_bytes(), declarations.as_bytes()]);
        Self {
            code,
            declarations,
            fingerprint,
            functions: sorted.len(),
        }
    }

    /// Whether no functions are defined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions == 0
    }
}

fn prelude_code(sorted: &[&FunctionRecord]) -> String {
    if sorted.is_empty() {
        return format!("const {CUSTOM_NAMESPACE} = Object.freeze({{}});\n");
    }
    let mut code = format!("const {CUSTOM_NAMESPACE} = Object.freeze({{\n");
    for record in sorted {
        code.push_str(&format!("{}: {},\n", record.name(), record.compiled));
    }
    code.push_str("});\n");
    code
}

/// Declaration text for a set of records, sorted by name
#[must_use]
pub fn declarations<'r>(records: impl IntoIterator<Item = &'r FunctionRecord>) -> String {
    let mut sorted: Vec<&FunctionRecord> = records.into_iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    let mut text = format!("declare namespace {CUSTOM_NAMESPACE} {{\n");
    for record in sorted {
        let def = &record.definition;
        if !def.description.trim().is_empty() {
            text.push_str(&format!("  /** {} */\n", doc_text(&def.description)));
        }
        text.push_str(&format!(
            "  function {}({}): Promise<{}>;\n",
            def.name,
            def.parameter_list(),
            def.return_type
        ));
    }
    text.push_str("}\n");
    text
}

/// One-line doc comment text that cannot close the comment early
fn doc_text(description: &str) -> String {
    description.split_whitespace().collect::<Vec<_>>().join(" ").replace("*/", "* /")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CustomFunctionDefinition, ParameterSchema};
    use chrono::Utc;
    use flint_core::VaultId;

    fn record(name: &str, description: &str) -> FunctionRecord {
        let def = CustomFunctionDefinition::new(VaultId::new("work").unwrap(), name, "number", "return 1;")
            .with_parameter(ParameterSchema::optional("n", "number"))
            .with_description(description);
        FunctionRecord::new(def, format!("async function {name}(n        )                  {{\nreturn 1;\n}}"), Utc::now())
    }

    #[test]
    fn test_empty_namespace() {
        let ns = SynthesizedNamespace::build(&[]);
        assert!(ns.is_empty());
        assert_eq!(ns.code, "const custom = Object.freeze({});\n");
        assert_eq!(ns.declarations, "declare namespace custom {\n}\n");
    }

    #[test]
    fn test_sorted_and_deterministic() {
        let a = record("alpha", "");
        let b = record("beta", "Adds one");
        let first = SynthesizedNamespace::build(&[b.clone(), a.clone()]);
        let second = SynthesizedNamespace::build(&[a, b]);
        assert_eq!(first, second);
        assert!(first.code.find("alpha:").unwrap() < first.code.find("beta:").unwrap());
        assert_eq!(
            first.declarations,
            "declare namespace custom {\n  function alpha(n?: number): Promise<number>;\n  /** Adds one */\n  function beta(n?: number): Promise<number>;\n}\n"
        );
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let one = SynthesizedNamespace::build(&[record("alpha", "")]);
        let two = SynthesizedNamespace::build(&[record("alpha", "changed")]);
        assert_ne!(one.fingerprint, two.fingerprint);
    }

    #[test]
    fn test_description_cannot_escape_comment() {
        let ns = SynthesizedNamespace::build(&[record("alpha", "ends */ early\nsecond line")]);
        assert!(ns.declarations.contains("/** ends * / early second line */"));
    }
}

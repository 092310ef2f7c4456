//! Custom function definitions and their stored records.

use chrono::{DateTime, Utc};
use flint_core::{Fingerprint, FunctionId, VaultId};
use serde::{Deserialize, Serialize};

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSchema {
    /// Parameter name; must be an identifier
    pub name: String,
    /// TypeScript type text, e.g. `string` or `{ id: string }[]`
    #[serde(rename = "type")]
    pub type_text: String,
    /// Whether the argument may be omitted
    #[serde(default)]
    pub optional: bool,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterSchema {
    /// Create a required parameter
    #[must_use]
    pub fn required(name: impl Into<String>, type_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_text: type_text.into(),
            optional: false,
            description: None,
        }
    }

    /// Create an optional parameter
    #[must_use]
    pub fn optional(name: impl Into<String>, type_text: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::required(name, type_text)
        }
    }

    /// TypeScript parameter text, e.g. `limit?: number`
    #[must_use]
    pub fn signature(&self) -> String {
        let marker = if self.optional { "?" } else { "" };
        format!("{}{}: {}", self.name, marker, self.type_text)
    }
}

/// A named, vault-scoped function body
///
/// `code` is the TypeScript body of an async function; it may `await`
/// capability calls and must `return` a value of `return_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFunctionDefinition {
    /// Function name, unique per vault ignoring case
    pub name: String,
    /// Free-form description, emitted as a doc comment in declarations
    #[serde(default)]
    pub description: String,
    /// Ordered parameters
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
    /// Resolved type of the returned promise
    pub return_type: String,
    /// Function body
    pub code: String,
    /// Tags for listing
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning vault
    pub vault: VaultId,
}

impl CustomFunctionDefinition {
    /// Create a definition with no parameters, description or tags
    #[must_use]
    pub fn new(
        vault: VaultId,
        name: impl Into<String>,
        return_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            return_type: return_type.into(),
            code: code.into(),
            tags: Vec::new(),
            vault,
        }
    }

    /// Append a parameter
    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterSchema) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Whether the definition carries `tag`
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Parameter list text, e.g. `id: string, limit?: number`
    #[must_use]
    pub fn parameter_list(&self) -> String {
        self.parameters
            .iter()
            .map(ParameterSchema::signature)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// TypeScript source validated and stored for this definition
    ///
    /// The body starts on the second line, so body line `n` is wrapper
    /// line `n + 1`.
    #[must_use]
    pub fn wrapper_source(&self) -> String {
        format!(
            "async function {}({}): Promise<{}> {{\n{}\n}}",
            self.name,
            self.parameter_list(),
            self.return_type,
            self.code
        )
    }
}

/// Usage bookkeeping for a stored function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    /// First registration
    pub created_at: DateTime<Utc>,
    /// Last registration or update
    pub updated_at: DateTime<Utc>,
    /// Successful test runs
    pub usage_count: u64,
    /// Last successful test run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl UsageMetadata {
    /// Fresh metadata stamped `at`
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            updated_at: at,
            usage_count: 0,
            last_used_at: None,
        }
    }

    /// Count one use
    pub fn record_use(&mut self, at: DateTime<Utc>) {
        self.usage_count += 1;
        self.last_used_at = Some(at);
    }
}

/// A validated definition as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRecord {
    /// Stable identifier
    pub id: FunctionId,
    /// The definition as submitted
    pub definition: CustomFunctionDefinition,
    /// Erased JavaScript of [`CustomFunctionDefinition::wrapper_source`]
    pub compiled: String,
    /// BLAKE3 fingerprint of the wrapper source
    pub fingerprint: Fingerprint,
    /// Usage bookkeeping
    pub usage: UsageMetadata,
}

impl FunctionRecord {
    /// Build a new record for a validated definition
    #[must_use]
    pub fn new(definition: CustomFunctionDefinition, compiled: String, at: DateTime<Utc>) -> Self {
        let fingerprint = Fingerprint::compute(definition.wrapper_source().as_bytes());
        Self {
            id: FunctionId::new(),
            definition,
            compiled,
            fingerprint,
            usage: UsageMetadata::new(at),
        }
    }

    /// Replace the definition, keeping identity and usage
    #[must_use]
    pub fn revise(&self, definition: CustomFunctionDefinition, compiled: String, at: DateTime<Utc>) -> Self {
        let mut usage = self.usage.clone();
        usage.updated_at = at;
        Self {
            id: self.id,
            fingerprint: Fingerprint::compute(definition.wrapper_source().as_bytes()),
            definition,
            compiled,
            usage,
        }
    }

    /// Function name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Owning vault
    #[must_use]
    pub fn vault(&self) -> &VaultId {
        &self.definition.vault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vault() -> VaultId {
        VaultId::new("work").unwrap()
    }

    #[test]
    fn test_wrapper_source() {
        let def = CustomFunctionDefinition::new(vault(), "titleOf", "string | null", "const n = await notes.get(id);\nreturn n?.title ?? null;")
            .with_parameter(ParameterSchema::required("id", "string"))
            .with_parameter(ParameterSchema::optional("fallback", "string"));
        assert_eq!(
            def.wrapper_source(),
            "async function titleOf(id: string, fallback?: string): Promise<string | null> {\nconst n = await notes.get(id);\nreturn n?.title ?? null;\n}"
        );
    }

    #[test]
    fn test_definition_json_shape() {
        let def: CustomFunctionDefinition = serde_json::from_value(json!({
            "name": "count",
            "parameters": [{ "name": "tag", "type": "string" }],
            "returnType": "number",
            "code": "return 1;",
            "vault": "work"
        }))
        .unwrap();
        assert_eq!(def.parameters[0], ParameterSchema::required("tag", "string"));
        assert!(def.tags.is_empty());
        assert_eq!(def.description, "");

        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(value["returnType"], "number");
        assert_eq!(value["parameters"][0]["type"], "string");
    }

    #[test]
    fn test_revise_keeps_identity() {
        let at = Utc::now();
        let def = CustomFunctionDefinition::new(vault(), "one", "number", "return 1;");
        let record = FunctionRecord::new(def.clone(), "compiled".into(), at);
        let later = at + chrono::Duration::seconds(5);
        let revised = record.revise(
            CustomFunctionDefinition { code: "return 2;".into(), ..def },
            "compiled2".into(),
            later,
        );
        assert_eq!(revised.id, record.id);
        assert_eq!(revised.usage.created_at, at);
        assert_eq!(revised.usage.updated_at, later);
        assert_ne!(revised.fingerprint, record.fingerprint);
    }

    #[test]
    fn test_record_use() {
        let at = Utc::now();
        let mut usage = UsageMetadata::new(at);
        usage.record_use(at);
        usage.record_use(at);
        assert_eq!(usage.usage_count, 2);
        assert_eq!(usage.last_used_at, Some(at));
    }
}

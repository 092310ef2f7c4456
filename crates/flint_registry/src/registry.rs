//! The custom function registry.
//!
//! Validation happens at register and update time only. Synthesis emits the
//! JavaScript stored then and never re-checks it against the current ambient
//! surface.

use crate::definition::{CustomFunctionDefinition, FunctionRecord};
use crate::store::{folded, FunctionStore, MemoryStore, StoreError};
use crate::synth::{self, SynthesizedNamespace};
use crate::validate::{check_argument, compile_definition, validate_name, ValidationError};
use chrono::Utc;
use flint_core::{ExecutionResult, InternalError, ResourceLimits, VaultId};
use flint_host::HostAdapter;
use flint_sandbox::{ExecutionPlan, Sandbox};
use flint_ts::{Compiler, CUSTOM_NAMESPACE};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Registry operation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The request was rejected; nothing was persisted
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No function with that name in the vault
    #[error("function {name:?} not found in vault {vault}")]
    NotFound {
        /// Vault searched
        vault: VaultId,
        /// Requested name
        name: String,
    },

    /// The store failed
    #[error(transparent)]
    Storage(StoreError),

    /// A test run hit a fatal sandbox fault
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl RegistryError {
    fn from_store(vault: &VaultId, err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { name, existing } => ValidationError::DuplicateName { name, existing }.into(),
            StoreError::NotFound { name } => Self::NotFound {
                vault: vault.clone(),
                name,
            },
            other => Self::Storage(other),
        }
    }

    /// The validation error, if this is one
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

/// Validated, persisted custom functions with per-vault namespace synthesis
pub struct Registry {
    store: Arc<dyn FunctionStore>,
    compiler: Compiler,
    synthesized: Mutex<HashMap<VaultId, (u64, Arc<SynthesizedNamespace>)>>,
}

impl Registry {
    /// Create a registry over `store`
    #[must_use]
    pub fn new(store: Arc<dyn FunctionStore>, compiler: Compiler) -> Self {
        Self {
            store,
            compiler,
            synthesized: Mutex::new(HashMap::new()),
        }
    }

    /// Registry over a fresh [`MemoryStore`]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Compiler::default())
    }

    /// Validate and persist a new function
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] when any check fails, including a
    /// name taken by a concurrent registration.
    pub fn register(&self, definition: CustomFunctionDefinition) -> Result<FunctionRecord, RegistryError> {
        let vault = definition.vault.clone();
        validate_name(&definition.name)?;

        let existing = self.store.list(&vault).map_err(|e| RegistryError::from_store(&vault, e))?;
        let folded_name = folded(&definition.name);
        if let Some(taken) = existing.iter().find(|r| folded(r.name()) == folded_name) {
            return Err(ValidationError::DuplicateName {
                name: definition.name,
                existing: taken.name().to_string(),
            }
            .into());
        }

        let others = synth::declarations(&existing);
        let compiled = compile_definition(&self.compiler, &definition, &others)?;
        let record = FunctionRecord::new(definition, compiled, Utc::now());
        let revision = self
            .store
            .insert(record.clone())
            .map_err(|e| RegistryError::from_store(&vault, e))?;
        tracing::info!(vault = %vault, function = %record.name(), revision, "registry: registered");
        Ok(record)
    }

    /// Re-validate and replace an existing function of the same name
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the name is not registered and
    /// [`RegistryError::Validation`] when the new definition fails a check.
    pub fn update(&self, definition: CustomFunctionDefinition) -> Result<FunctionRecord, RegistryError> {
        let vault = definition.vault.clone();
        validate_name(&definition.name)?;

        let existing = self.store.list(&vault).map_err(|e| RegistryError::from_store(&vault, e))?;
        let current = existing
            .iter()
            .find(|r| r.name() == definition.name)
            .ok_or_else(|| RegistryError::NotFound {
                vault: vault.clone(),
                name: definition.name.clone(),
            })?;

        let others = synth::declarations(existing.iter().filter(|r| r.name() != definition.name));
        let compiled = compile_definition(&self.compiler, &definition, &others)?;
        let record = current.revise(definition, compiled, Utc::now());
        let revision = self
            .store
            .replace(record.clone())
            .map_err(|e| RegistryError::from_store(&vault, e))?;
        tracing::info!(vault = %vault, function = %record.name(), revision, "registry: updated");
        Ok(record)
    }

    /// Delete a function
    ///
    /// Namespaces synthesized earlier keep their copy.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the name is not registered.
    pub fn remove(&self, vault: &VaultId, name: &str) -> Result<FunctionRecord, RegistryError> {
        let record = self
            .store
            .remove(vault, name)
            .map_err(|e| RegistryError::from_store(vault, e))?;
        tracing::info!(vault = %vault, function = %name, "registry: removed");
        Ok(record)
    }

    /// Fetch one function by exact name
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the name is not registered.
    pub fn get(&self, vault: &VaultId, name: &str) -> Result<FunctionRecord, RegistryError> {
        self.store
            .get(vault, name)
            .map_err(|e| RegistryError::from_store(vault, e))?
            .ok_or_else(|| RegistryError::NotFound {
                vault: vault.clone(),
                name: name.to_string(),
            })
    }

    /// Functions in a vault sorted by name, optionally only those tagged `tag`
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the store fails.
    pub fn list(&self, vault: &VaultId, tag: Option<&str>) -> Result<Vec<FunctionRecord>, RegistryError> {
        let records = self.store.list(vault).map_err(|e| RegistryError::from_store(vault, e))?;
        Ok(match tag {
            Some(tag) => records.into_iter().filter(|r| r.definition.has_tag(tag)).collect(),
            None => records,
        })
    }

    /// Delete every function in a vault
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the store fails.
    pub fn remove_vault(&self, vault: &VaultId) -> Result<usize, RegistryError> {
        let removed = self
            .store
            .remove_vault(vault)
            .map_err(|e| RegistryError::from_store(vault, e))?;
        if let Ok(mut cache) = self.synthesized.lock() {
            cache.remove(vault);
        }
        tracing::info!(vault = %vault, removed, "registry: vault removed");
        Ok(removed)
    }

    /// The `custom` namespace for a vault
    ///
    /// Cached per store revision; any mutation of the vault invalidates it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Storage`] if the store fails.
    pub fn synthesize(&self, vault: &VaultId) -> Result<Arc<SynthesizedNamespace>, RegistryError> {
        // Revision first: a mutation racing the list below then bumps past
        // the key this entry is cached under.
        let revision = self.store.revision(vault).map_err(|e| RegistryError::from_store(vault, e))?;
        if let Some(hit) = self.cached(vault, revision) {
            return Ok(hit);
        }

        let records = self.store.list(vault).map_err(|e| RegistryError::from_store(vault, e))?;
        let namespace = Arc::new(SynthesizedNamespace::build(&records));
        tracing::debug!(
            vault = %vault,
            revision,
            functions = namespace.functions,
            fingerprint = %namespace.fingerprint.short(),
            "registry: synthesized"
        );
        if let Ok(mut cache) = self.synthesized.lock() {
            cache.insert(vault.clone(), (revision, Arc::clone(&namespace)));
        }
        Ok(namespace)
    }

    fn cached(&self, vault: &VaultId, revision: u64) -> Option<Arc<SynthesizedNamespace>> {
        let cache = self.synthesized.lock().ok()?;
        cache
            .get(vault)
            .filter(|(at, _)| *at == revision)
            .map(|(_, namespace)| Arc::clone(namespace))
    }

    /// Run one function in isolation
    ///
    /// `params` is an object of named arguments (or `null`). The call runs in
    /// a fresh sandbox with the adapter's vault and allowlist. A successful
    /// run counts as one use.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for an unknown function,
    /// [`RegistryError::Validation`] for bad arguments, and
    /// [`RegistryError::Internal`] when the sandbox faults. Script failures
    /// are reported in the returned result.
    pub async fn test(
        &self,
        sandbox: &Sandbox,
        adapter: HostAdapter,
        limits: ResourceLimits,
        name: &str,
        params: &Value,
    ) -> Result<ExecutionResult, RegistryError> {
        let vault = adapter.vault().clone();
        let record = self.get(&vault, name)?;
        let arguments = call_arguments(&self.compiler, &record.definition, params)?;
        let namespace = self.synthesize(&vault)?;

        let program = format!("return await {CUSTOM_NAMESPACE}.{name}({arguments});");
        let plan = ExecutionPlan::new(program, adapter, limits).with_prelude(namespace.code.clone());
        let result = sandbox.execute(plan).await?;

        if result.success {
            let used = self
                .store
                .record_use(&vault, name, Utc::now())
                .map_err(|e| RegistryError::from_store(&vault, e))?;
            tracing::info!(vault = %vault, function = %name, uses = used.usage.usage_count, "registry: test passed");
        } else {
            tracing::info!(vault = %vault, function = %name, failure = ?result.failure, "registry: test failed");
        }
        Ok(result)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("compiler", &self.compiler).finish_non_exhaustive()
    }
}

/// Positional argument text for a call, from named arguments
///
/// Each supplied value is checked against its parameter type. Omitted
/// optional parameters before a supplied one become `undefined`; trailing
/// ones are left off.
fn call_arguments(
    compiler: &Compiler,
    definition: &CustomFunctionDefinition,
    params: &Value,
) -> Result<String, ValidationError> {
    let empty = Map::new();
    let named = match params {
        Value::Null => &empty,
        Value::Object(map) => map,
        other => {
            return Err(ValidationError::InvalidArguments {
                reason: format!("expected an object of named arguments, got {other}"),
            })
        }
    };
    if let Some(unknown) = named.keys().find(|k| !definition.parameters.iter().any(|p| &p.name == *k)) {
        return Err(ValidationError::InvalidArguments {
            reason: format!("unknown parameter {unknown:?}"),
        });
    }

    let mut arguments = Vec::with_capacity(definition.parameters.len());
    let mut gaps = 0;
    for parameter in &definition.parameters {
        match named.get(&parameter.name) {
            Some(value) => {
                check_argument(compiler, parameter, value)?;
                arguments.extend(std::iter::repeat("undefined".to_string()).take(gaps));
                gaps = 0;
                arguments.push(value.to_string());
            }
            None if parameter.optional => gaps += 1,
            None => {
                return Err(ValidationError::MissingArgument {
                    name: parameter.name.clone(),
                })
            }
        }
    }
    Ok(arguments.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ParameterSchema;
    use crate::redb_store::RedbStore;
    use flint_core::{Capability, CapabilitySet, ExecutionFailure};
    use flint_host::MemoryHost;
    use serde_json::json;
    use std::time::Duration;

    fn vault() -> VaultId {
        VaultId::new("work").unwrap()
    }

    fn double() -> CustomFunctionDefinition {
        CustomFunctionDefinition::new(vault(), "double", "number", "return n * 2;")
            .with_parameter(ParameterSchema::required("n", "number"))
            .with_description("Twice the input")
            .with_tag("math")
    }

    fn adapter(allowlist: CapabilitySet) -> HostAdapter {
        let host = MemoryHost::new().with_vault(&vault(), "Work");
        HostAdapter::new(Arc::new(host), vault(), allowlist)
    }

    fn limits() -> ResourceLimits {
        ResourceLimits::new().with_time_budget(Duration::from_secs(5))
    }

    #[test]
    fn test_register_round_trip() {
        let registry = Registry::in_memory();
        let def = double();
        let record = registry.register(def.clone()).unwrap();
        assert_eq!(record.definition, def);
        assert_eq!(record.usage.usage_count, 0);

        let fetched = registry.get(&vault(), "double").unwrap();
        assert_eq!(fetched.definition, def);
        let listed = registry.list(&vault(), None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].definition, def);
    }

    #[test]
    fn test_duplicate_name_ignores_case() {
        let registry = Registry::in_memory();
        registry.register(double()).unwrap();
        let mut again = double();
        again.name = "Double".into();
        let err = registry.register(again).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Validation(ValidationError::DuplicateName {
                name: "Double".into(),
                existing: "double".into()
            })
        );
    }

    #[test]
    fn test_rejections_persist_nothing() {
        let registry = Registry::in_memory();
        let reserved = CustomFunctionDefinition::new(vault(), "notes", "number", "return 1;");
        assert!(matches!(
            registry.register(reserved),
            Err(RegistryError::Validation(ValidationError::ReservedName { .. }))
        ));

        let broken = CustomFunctionDefinition::new(vault(), "broken", "number", "return \"text\";");
        let err = registry.register(broken).unwrap_err();
        assert!(matches!(err.validation(), Some(ValidationError::Compilation { .. })));

        let escaping = CustomFunctionDefinition::new(vault(), "escape", "number", "return process.pid;");
        assert!(matches!(
            registry.register(escaping),
            Err(RegistryError::Validation(ValidationError::Security { .. }))
        ));

        assert!(registry.list(&vault(), None).unwrap().is_empty());
        assert_eq!(registry.synthesize(&vault()).unwrap().functions, 0);
    }

    #[test]
    fn test_body_cannot_close_its_function() {
        let registry = Registry::in_memory();
        let escaping = CustomFunctionDefinition::new(
            vault(),
            "one",
            "number",
            "return 1;\n}\nasync function other(): Promise<number> {\nreturn 2;",
        );
        assert!(matches!(
            registry.register(escaping),
            Err(RegistryError::Validation(ValidationError::InvalidBody { .. }))
        ));
        assert!(registry.list(&vault(), None).unwrap().is_empty());

        registry.register(double()).unwrap();
        let mut trailing = double();
        trailing.code = "return n * 2;\n}\n{".into();
        assert!(matches!(
            registry.update(trailing),
            Err(RegistryError::Validation(ValidationError::InvalidBody { .. }))
        ));
        let code = registry.synthesize(&vault()).unwrap().code.clone();
        assert!(!code.contains("async function other"));
    }

    #[test]
    fn test_functions_can_call_each_other() {
        let registry = Registry::in_memory();
        registry.register(double()).unwrap();
        let quadruple = CustomFunctionDefinition::new(vault(), "quadruple", "number", "return custom.double(await custom.double(n));")
            .with_parameter(ParameterSchema::required("n", "number"));
        registry.register(quadruple).unwrap();

        let unknown = CustomFunctionDefinition::new(vault(), "missing", "number", "return custom.nothing();");
        assert!(registry.register(unknown).is_err());
    }

    #[test]
    fn test_update_revalidates() {
        let registry = Registry::in_memory();
        let original = registry.register(double()).unwrap();

        let mut changed = double();
        changed.code = "return n + n;".into();
        let updated = registry.update(changed).unwrap();
        assert_eq!(updated.id, original.id);
        assert_ne!(updated.fingerprint, original.fingerprint);

        let mut invalid = double();
        invalid.code = "return \"no\";".into();
        assert!(matches!(registry.update(invalid), Err(RegistryError::Validation(_))));
        assert_eq!(registry.get(&vault(), "double").unwrap().definition.code, "return n + n;");

        let ghost = CustomFunctionDefinition::new(vault(), "ghost", "number", "return 1;");
        assert!(matches!(registry.update(ghost), Err(RegistryError::NotFound { .. })));
    }

    #[test]
    fn test_list_filters_by_tag() {
        let registry = Registry::in_memory();
        registry.register(double()).unwrap();
        registry
            .register(CustomFunctionDefinition::new(vault(), "answer", "number", "return 42;"))
            .unwrap();
        let names: Vec<String> = registry
            .list(&vault(), None)
            .unwrap()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["answer", "double"]);
        let math = registry.list(&vault(), Some("math")).unwrap();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].name(), "double");
    }

    #[test]
    fn test_synthesize_is_idempotent_until_mutation() {
        let registry = Registry::in_memory();
        registry.register(double()).unwrap();

        let first = registry.synthesize(&vault()).unwrap();
        let second = registry.synthesize(&vault()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        registry
            .register(CustomFunctionDefinition::new(vault(), "answer", "number", "return 42;"))
            .unwrap();
        let third = registry.synthesize(&vault()).unwrap();
        assert_ne!(first.fingerprint, third.fingerprint);
        assert_eq!(third.functions, 2);

        registry.remove(&vault(), "answer").unwrap();
        let fourth = registry.synthesize(&vault()).unwrap();
        assert_eq!(fourth.code, first.code);
        assert_eq!(fourth.declarations, first.declarations);
        assert_eq!(third.functions, 2);
    }

    #[test]
    fn test_remove_vault_cascades() {
        let registry = Registry::in_memory();
        registry.register(double()).unwrap();
        let other = VaultId::new("home").unwrap();
        registry
            .register(CustomFunctionDefinition::new(other.clone(), "answer", "number", "return 42;"))
            .unwrap();
        assert_eq!(registry.remove_vault(&vault()).unwrap(), 1);
        assert!(registry.synthesize(&vault()).unwrap().is_empty());
        assert_eq!(registry.list(&other, None).unwrap().len(), 1);
        assert!(matches!(registry.remove(&vault(), "double"), Err(RegistryError::NotFound { .. })));
    }

    #[test]
    fn test_concurrent_registration_one_winner() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(RedbStore::open(dir.path().join("functions.redb")).unwrap());
        let registry = Arc::new(Registry::new(store, Compiler::default()));
        let racers: Vec<_> = (0..2)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.register(CustomFunctionDefinition::new(vault(), "helper", "number", "return 1;"))
                })
            })
            .collect();
        let outcomes: Vec<_> = racers.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|o| matches!(
            o,
            Err(RegistryError::Validation(ValidationError::DuplicateName { .. }))
        )));
        assert_eq!(registry.list(&vault(), None).unwrap().len(), 1);
    }

    #[test]
    fn test_call_arguments() {
        let def = CustomFunctionDefinition::new(vault(), "f", "number", "return 1;")
            .with_parameter(ParameterSchema::required("a", "string"))
            .with_parameter(ParameterSchema::optional("b", "number"))
            .with_parameter(ParameterSchema::optional("c", "boolean"));
        let compiler = Compiler::default();
        assert_eq!(call_arguments(&compiler, &def, &json!({ "a": "x" })).unwrap(), "\"x\"");
        assert_eq!(
            call_arguments(&compiler, &def, &json!({ "a": "x", "c": true })).unwrap(),
            "\"x\", undefined, true"
        );
        assert_eq!(
            call_arguments(&compiler, &def, &json!({})),
            Err(ValidationError::MissingArgument { name: "a".into() })
        );
        assert!(matches!(
            call_arguments(&compiler, &def, &json!({ "a": "x", "z": 1 })),
            Err(ValidationError::InvalidArguments { .. })
        ));
        assert!(matches!(
            call_arguments(&compiler, &def, &json!([1])),
            Err(ValidationError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_call_arguments_check_types() {
        let def = CustomFunctionDefinition::new(vault(), "f", "number", "return 1;")
            .with_parameter(ParameterSchema::required("n", "number"))
            .with_parameter(ParameterSchema::optional("tags", "string[]"))
            .with_parameter(ParameterSchema::optional("filter", "{ tag: string } | null"));
        let compiler = Compiler::default();
        for bad in [
            json!({ "n": "abc" }),
            json!({ "n": 1, "tags": [1, 2] }),
            json!({ "n": 1, "tags": "a" }),
            json!({ "n": 1, "filter": { "tag": true } }),
            json!({ "n": null }),
        ] {
            let err = call_arguments(&compiler, &def, &bad).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidArguments { .. }), "{bad}: {err:?}");
        }
        assert_eq!(
            call_arguments(&compiler, &def, &json!({ "n": 2, "tags": ["a"], "filter": null })).unwrap(),
            "2, [\"a\"], null"
        );
    }

    #[tokio::test]
    async fn test_run_counts_usage() {
        let registry = Registry::in_memory();
        registry.register(double()).unwrap();
        let sandbox = Sandbox::default();

        let result = registry
            .test(&sandbox, adapter(CapabilitySet::new()), limits(), "double", &json!({ "n": 21 }))
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.failure);
        assert_eq!(result.value, Some(json!(42)));
        assert!(result.handles.balanced());

        let record = registry.get(&vault(), "double").unwrap();
        assert_eq!(record.usage.usage_count, 1);
        assert!(record.usage.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_run_uses_capabilities() {
        let registry = Registry::in_memory();
        let title_of = CustomFunctionDefinition::new(
            vault(),
            "titleOf",
            "string | null",
            "const note = await notes.get(id);\nreturn note?.title ?? null;",
        )
        .with_parameter(ParameterSchema::required("id", "string"));
        registry.register(title_of).unwrap();
        let sandbox = Sandbox::default();

        let allowed = CapabilitySet::new().with(Capability::NotesGet);
        let result = registry
            .test(&sandbox, adapter(allowed), limits(), "titleOf", &json!({ "id": "missing" }))
            .await
            .unwrap();
        assert!(result.success, "{:?}", result.failure);
        assert_eq!(result.value, Some(json!(null)));

        let denied = registry
            .test(&sandbox, adapter(CapabilitySet::new()), limits(), "titleOf", &json!({ "id": "missing" }))
            .await
            .unwrap();
        assert!(denied.is_capability_violation());
        assert_eq!(registry.get(&vault(), "titleOf").unwrap().usage.usage_count, 1);
    }

    #[tokio::test]
    async fn test_failed_run_is_not_counted() {
        let registry = Registry::in_memory();
        let picky = CustomFunctionDefinition::new(
            vault(),
            "picky",
            "number",
            "if (n > 0) {\n  throw new Error(\"positive\");\n}\nreturn n;",
        )
        .with_parameter(ParameterSchema::required("n", "number"));
        registry.register(picky).unwrap();
        let sandbox = Sandbox::default();

        let result = registry
            .test(&sandbox, adapter(CapabilitySet::new()), limits(), "picky", &json!({ "n": 1 }))
            .await
            .unwrap();
        match result.failure {
            Some(ExecutionFailure::ScriptError { ref message, .. }) => assert_eq!(message, "Error: positive"),
            ref other => panic!("expected script error, got {other:?}"),
        }
        assert_eq!(registry.get(&vault(), "picky").unwrap().usage.usage_count, 0);
    }

    #[tokio::test]
    async fn test_run_rejects_bad_requests() {
        let registry = Registry::in_memory();
        registry.register(double()).unwrap();
        let sandbox = Sandbox::default();

        let missing = registry
            .test(&sandbox, adapter(CapabilitySet::new()), limits(), "double", &json!({}))
            .await;
        assert!(matches!(
            missing,
            Err(RegistryError::Validation(ValidationError::MissingArgument { .. }))
        ));

        let mistyped = registry
            .test(&sandbox, adapter(CapabilitySet::new()), limits(), "double", &json!({ "n": "abc" }))
            .await;
        assert!(matches!(
            mistyped,
            Err(RegistryError::Validation(ValidationError::InvalidArguments { .. }))
        ));
        assert_eq!(registry.get(&vault(), "double").unwrap().usage.usage_count, 0);

        let unknown = registry
            .test(&sandbox, adapter(CapabilitySet::new()), limits(), "triple", &json!({ "n": 1 }))
            .await;
        assert!(matches!(unknown, Err(RegistryError::NotFound { .. })));
    }
}

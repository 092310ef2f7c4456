//! The evaluation pipeline.
//!
//! One request moves through: synthesize the vault's `custom` namespace,
//! compile against the ambient surface plus that namespace and the request's
//! bindings, then (unless the request is types-only or compilation failed)
//! execute the emitted JavaScript in a fresh sandbox.

use crate::config::{EngineConfig, RegistryBackend};
use flint_core::{
    EvaluationId, EvaluationRequest, EvaluationResponse, ExecutionResult, InternalError, TierProfile, TrustTier,
    VaultId,
};
use flint_host::{HostAdapter, HostApi};
use flint_registry::{RedbStore, Registry, RegistryError};
use flint_sandbox::{ExecutionPlan, Sandbox};
use flint_ts::{CompileExtras, Compiler, ExtraDeclarations, CUSTOM_FILE_NAME};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// Compiles and runs agent code against a host
pub struct Engine {
    config: EngineConfig,
    compiler: Compiler,
    sandbox: Sandbox,
    registry: Arc<Registry>,
    host: Arc<dyn HostApi>,
}

impl Engine {
    /// Create an engine, opening the configured registry backend
    ///
    /// # Errors
    ///
    /// Returns [`InternalError::Storage`] if the registry cannot be opened.
    pub fn new(config: EngineConfig, host: Arc<dyn HostApi>) -> Result<Self, InternalError> {
        let compiler = Compiler::new(config.compiler());
        let registry = match &config.registry {
            RegistryBackend::Memory => Registry::new(Arc::new(flint_registry::MemoryStore::new()), compiler.clone()),
            RegistryBackend::Redb { path } => Registry::new(Arc::new(RedbStore::open(path)?), compiler.clone()),
        };
        Ok(Self::with_registry(config, host, Arc::new(registry)))
    }

    /// Create an engine over an existing registry
    #[must_use]
    pub fn with_registry(config: EngineConfig, host: Arc<dyn HostApi>, registry: Arc<Registry>) -> Self {
        Self {
            compiler: Compiler::new(config.compiler()),
            sandbox: Sandbox::new(config.sandbox()),
            config,
            registry,
            host,
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The custom function registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Profile the caller chose a tier for
    #[must_use]
    pub fn profile(&self, tier: TrustTier) -> TierProfile {
        self.config.profile(tier)
    }

    /// A request carrying `tier`'s allowlist and limits
    #[must_use]
    pub fn request(&self, vault: VaultId, source: impl Into<String>, tier: TrustTier) -> EvaluationRequest {
        EvaluationRequest::new(vault, source).with_profile(&self.profile(tier))
    }

    /// Evaluate one request
    ///
    /// Compilation failures, script errors, timeouts and capability
    /// violations are all `Ok` responses.
    ///
    /// # Errors
    ///
    /// Returns [`InternalError`] only for fatal faults: handle accounting,
    /// context creation, memory exhaustion, or registry storage.
    pub async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationResponse, InternalError> {
        let id = EvaluationId::new();
        let span = tracing::info_span!("evaluate", evaluation = %id, vault = %request.vault);
        self.evaluate_inner(id, request).instrument(span).await
    }

    async fn evaluate_inner(
        &self,
        id: EvaluationId,
        request: EvaluationRequest,
    ) -> Result<EvaluationResponse, InternalError> {
        tracing::info!(
            evaluation = %id,
            code_len = request.source.len(),
            types_only = request.types_only,
            "evaluate: starting"
        );

        let namespace = self.registry.synthesize(&request.vault).map_err(storage_fault)?;
        let extras = CompileExtras::none()
            .with_declarations(ExtraDeclarations::new(CUSTOM_FILE_NAME, namespace.declarations.clone()))
            .with_bindings(&request.bindings);
        let compilation = self.compiler.compile(&request.source, &extras);

        let emitted = match (&compilation.emitted, compilation.success, request.types_only) {
            (Some(emitted), true, false) => emitted.clone(),
            _ => {
                tracing::info!(
                    evaluation = %id,
                    success = compilation.success,
                    diagnostics = compilation.diagnostics.len(),
                    "evaluate: compile only"
                );
                return Ok(EvaluationResponse::Compilation(compilation));
            }
        };

        let EvaluationRequest {
            vault,
            allowlist,
            limits,
            bindings,
            ..
        } = request;
        let adapter = HostAdapter::new(Arc::clone(&self.host), vault, allowlist);
        let plan = ExecutionPlan::new(emitted, adapter, self.config.clamp(limits))
            .with_prelude(namespace.code.clone())
            .with_bindings(bindings);

        let mut result = self.sandbox.execute(plan).await.inspect_err(|err| {
            tracing::error!(evaluation = %id, error = %err, "evaluate: internal fault");
        })?;
        result.warnings = compilation.warnings().cloned().collect();

        tracing::info!(
            evaluation = %id,
            success = result.success,
            failure = result.failure.as_ref().map(|f| f.kind()),
            elapsed_ms = result.elapsed_ms,
            capability_calls = result.capability_calls,
            "evaluate: finished"
        );
        Ok(EvaluationResponse::Execution(result))
    }

    /// Run one custom function in isolation under `tier`'s profile
    ///
    /// # Errors
    ///
    /// See [`Registry::test`].
    pub async fn test_function(
        &self,
        vault: VaultId,
        name: &str,
        params: &Value,
        tier: TrustTier,
    ) -> Result<ExecutionResult, RegistryError> {
        let profile = self.profile(tier);
        let adapter = HostAdapter::new(Arc::clone(&self.host), vault, profile.allowlist);
        self.registry
            .test(&self.sandbox, adapter, self.config.clamp(profile.limits), name, params)
            .await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn storage_fault(err: RegistryError) -> InternalError {
    match err {
        RegistryError::Internal(internal) => internal,
        other => InternalError::Storage {
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_core::{Capability, CapabilitySet, ExecutionFailure, ResourceLimits};
    use flint_host::testing::ScriptedHost;
    use flint_host::MemoryHost;
    use flint_registry::{CustomFunctionDefinition, ParameterSchema};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn vault() -> VaultId {
        VaultId::new("work").unwrap()
    }

    fn engine_with(host: Arc<dyn HostApi>) -> Engine {
        Engine::new(EngineConfig::default(), host).unwrap()
    }

    fn engine() -> Engine {
        engine_with(Arc::new(MemoryHost::new().with_vault(&vault(), "Work")))
    }

    fn notes_get_request(source: &str) -> EvaluationRequest {
        EvaluationRequest::new(vault(), source).with_allowlist(CapabilitySet::new().with(Capability::NotesGet))
    }

    fn execution(response: EvaluationResponse) -> ExecutionResult {
        match response {
            EvaluationResponse::Execution(result) => result,
            EvaluationResponse::Compilation(result) => panic!("expected execution, got {:?}", result.diagnostics),
        }
    }

    #[tokio::test]
    async fn test_null_access_never_executes() {
        let host = Arc::new(ScriptedHost::new().resolve(Capability::NotesGet, None, Value::Null, Duration::ZERO));
        let engine = engine_with(host.clone());
        let source = "async function main(){ const n = await notes.get(\"missing\"); return n.title; }";
        let response = engine.evaluate(notes_get_request(source)).await.unwrap();
        let compilation = response.compilation().expect("compile-only response");
        assert!(!compilation.success);
        assert!(compilation.has_code(18047));
        assert!(compilation.errors().any(|d| d.source_line.contains("n.title")));
        assert!(host.started().is_empty());
    }

    #[tokio::test]
    async fn test_optional_chaining_executes() {
        let host = Arc::new(ScriptedHost::new().resolve(Capability::NotesGet, None, Value::Null, Duration::ZERO));
        let engine = engine_with(host.clone());
        let source = "async function main(){ const n = await notes.get(\"missing\"); return n?.title ?? null; }";
        let result = execution(engine.evaluate(notes_get_request(source)).await.unwrap());
        assert!(result.success, "{:?}", result.failure);
        assert_eq!(result.value, Some(Value::Null));
        assert_eq!(result.capability_calls, 1);
        assert!(result.handles.balanced());
        assert_eq!(host.started().len(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_globals_fail_compilation() {
        let engine = engine();
        for source in ["return process.env;", "return await fetch(\"https://example.com\");"] {
            let request = EvaluationRequest::new(vault(), source).with_allowlist(CapabilitySet::all());
            let response = engine.evaluate(request).await.unwrap();
            let compilation = response.compilation().expect("compile-only response");
            assert!(compilation.has_code(2304), "{source}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_out_of_order_settlement() {
        let note = |id: &str, title: &str| {
            json!({
                "id": id, "title": title, "content": "", "tags": [], "folder": null,
                "createdAt": "2026-01-01T00:00:00Z", "updatedAt": "2026-01-01T00:00:00Z"
            })
        };
        let host = Arc::new(
            ScriptedHost::new()
                .resolve(Capability::NotesGet, Some("a"), note("a", "first"), Duration::from_millis(90))
                .resolve(Capability::NotesGet, Some("b"), note("b", "second"), Duration::from_millis(10))
                .resolve(Capability::NotesGet, Some("c"), note("c", "third"), Duration::from_millis(50)),
        );
        let engine = engine_with(host.clone());
        let source = "const first = notes.get(\"a\");\n\
                      const second = notes.get(\"b\");\n\
                      const third = notes.get(\"c\");\n\
                      const a = await first;\n\
                      const b = await second;\n\
                      const c = await third;\n\
                      return [a?.title ?? null, b?.title ?? null, c?.title ?? null];";
        let result = execution(engine.evaluate(notes_get_request(source)).await.unwrap());
        assert!(result.success, "{:?}", result.failure);
        assert_eq!(result.value, Some(json!(["first", "second", "third"])));
        let finished: Vec<_> = host.finished().into_iter().filter_map(|c| c.key).collect();
        assert_eq!(finished, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out_cleanly() {
        let engine = engine();
        let request = EvaluationRequest::new(vault(), "while (true) {}")
            .with_limits(ResourceLimits::new().with_time_budget(Duration::from_secs(2)));
        let started = Instant::now();
        let result = execution(engine.evaluate(request).await.unwrap());
        let elapsed = started.elapsed();
        assert!(matches!(result.failure, Some(ExecutionFailure::Timeout { .. })), "{:?}", result.failure);
        assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(6), "{elapsed:?}");
        assert!(result.handles.balanced());
        assert_eq!(result.handles.live, 0);
    }

    #[tokio::test]
    async fn test_types_only_skips_execution() {
        let host = Arc::new(ScriptedHost::new());
        let engine = engine_with(host.clone());
        let request = notes_get_request("const n = await notes.get(\"x\");\nreturn n?.title;").types_only();
        let response = engine.evaluate(request).await.unwrap();
        let compilation = response.compilation().expect("compile-only response");
        assert!(compilation.success);
        assert!(compilation.emitted.is_some());
        assert!(host.started().is_empty());
    }

    #[tokio::test]
    async fn test_custom_functions_are_merged() {
        let engine = engine();
        engine
            .registry()
            .register(
                CustomFunctionDefinition::new(vault(), "double", "number", "return n * 2;")
                    .with_parameter(ParameterSchema::required("n", "number")),
            )
            .unwrap();

        let result = execution(
            engine
                .evaluate(EvaluationRequest::new(vault(), "return await custom.double(21);"))
                .await
                .unwrap(),
        );
        assert_eq!(result.value, Some(json!(42)));

        let wrong_type = engine
            .evaluate(EvaluationRequest::new(vault(), "return await custom.double(\"21\");"))
            .await
            .unwrap();
        assert!(wrong_type.compilation().is_some_and(|c| !c.success));

        let other_vault = engine
            .evaluate(EvaluationRequest::new(VaultId::new("home").unwrap(), "return await custom.double(21);"))
            .await
            .unwrap();
        assert!(other_vault.compilation().is_some_and(|c| !c.success));
    }

    #[tokio::test]
    async fn test_bindings_are_typed_and_frozen() {
        let engine = engine();
        let request = EvaluationRequest::new(vault(), "return limit * 2;").with_binding("limit", json!(21));
        let result = execution(engine.evaluate(request).await.unwrap());
        assert_eq!(result.value, Some(json!(42)));

        let request = EvaluationRequest::new(vault(), "return limit.toUpperCase();").with_binding("limit", json!(21));
        let response = engine.evaluate(request).await.unwrap();
        assert!(response.compilation().is_some_and(|c| !c.success));
    }

    #[tokio::test]
    async fn test_tier_profile_applies() {
        let engine = engine();
        let request = engine.request(
            vault(),
            "await notes.create({ title: \"x\" });\nreturn true;",
            TrustTier::ReadOnly,
        );
        let result = execution(engine.evaluate(request).await.unwrap());
        assert!(result.is_capability_violation(), "{:?}", result.failure);
        assert!(result.handles.balanced());
    }

    #[tokio::test]
    async fn test_function_runs_under_tier() {
        let engine = engine();
        engine
            .registry()
            .register(CustomFunctionDefinition::new(vault(), "answer", "number", "return 42;"))
            .unwrap();
        let result = engine
            .test_function(vault(), "answer", &Value::Null, TrustTier::Limited)
            .await
            .unwrap();
        assert_eq!(result.value, Some(json!(42)));
        assert_eq!(engine.registry().get(&vault(), "answer").unwrap().usage.usage_count, 1);
    }

    #[tokio::test]
    async fn test_redb_registry_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig::new().with_redb_registry(dir.path().join("functions.redb"));
        {
            let engine = Engine::new(config.clone(), Arc::new(MemoryHost::new())).unwrap();
            engine
                .registry()
                .register(CustomFunctionDefinition::new(vault(), "answer", "number", "return 42;"))
                .unwrap();
        }
        let engine = Engine::new(config, Arc::new(MemoryHost::new())).unwrap();
        let result = execution(
            engine
                .evaluate(EvaluationRequest::new(vault(), "return await custom.answer();"))
                .await
                .unwrap(),
        );
        assert_eq!(result.value, Some(json!(42)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_evaluations_stay_isolated() {
        let engine = Arc::new(engine());
        let tasks: Vec<_> = (0..6)
            .map(|i| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let source = format!("const x = {i};\nconsole.log(\"run\", x);\nreturn x * 10;");
                    execution(engine.evaluate(EvaluationRequest::new(vault(), source)).await.unwrap())
                })
            })
            .collect();
        for (i, task) in tasks.into_iter().enumerate() {
            let result = task.await.unwrap();
            assert_eq!(result.value, Some(json!(i * 10)));
            assert_eq!(result.logs.len(), 1);
            assert_eq!(result.logs[0].message, format!("run {i}"));
            assert!(result.handles.balanced());
        }
    }
}

//! Sandbox executor.
//!
//! V8 isolates are `!Send`, so every execution runs on a dedicated thread
//! with its own current-thread tokio runtime. The public API is async and
//! `Send`; a semaphore bounds how many isolates exist at once.

use crate::context::Context;
use flint_core::{ExecutionResult, InternalError, ResourceLimits};
use flint_host::HostAdapter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Default number of isolates allowed at once
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxConfig {
    /// Maximum concurrent isolates; further executions queue
    pub max_concurrent: usize,
}

impl SandboxConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    /// Set the concurrency bound
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one execution needs
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Erased JavaScript of the program
    pub program: String,
    /// Custom function namespace, run before the program
    pub prelude: Option<String>,
    /// Initial bindings, installed as frozen globals
    pub bindings: BTreeMap<String, Value>,
    /// Limits for this run
    pub limits: ResourceLimits,
    /// Capability proxy for this run
    pub adapter: HostAdapter,
}

impl ExecutionPlan {
    /// Create a plan with no prelude or bindings
    #[must_use]
    pub fn new(program: impl Into<String>, adapter: HostAdapter, limits: ResourceLimits) -> Self {
        Self {
            program: program.into(),
            prelude: None,
            bindings: BTreeMap::new(),
            limits,
            adapter,
        }
    }

    /// Set the custom function prelude
    #[must_use]
    pub fn with_prelude(mut self, prelude: impl Into<String>) -> Self {
        self.prelude = Some(prelude.into());
        self
    }

    /// Set the initial bindings
    #[must_use]
    pub fn with_bindings(mut self, bindings: BTreeMap<String, Value>) -> Self {
        self.bindings = bindings;
        self
    }
}

/// Runs plans in fresh isolates
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
    permits: Arc<Semaphore>,
}

impl Sandbox {
    /// Create a sandbox
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self { config, permits }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute a plan in a fresh isolate
    ///
    /// Host futures are spawned onto the runtime this is awaited on.
    ///
    /// # Errors
    ///
    /// Returns [`InternalError`] for context creation failures, memory
    /// exhaustion, handle invariant violations and sandbox thread failures.
    /// Script errors, timeouts and capability violations are reported in the
    /// [`ExecutionResult`].
    pub async fn execute(&self, plan: ExecutionPlan) -> Result<ExecutionResult, InternalError> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| InternalError::SandboxThread {
                reason: "sandbox is shut down".to_string(),
            })?;
        let spawner = tokio::runtime::Handle::current();
        tracing::info!(code_len = plan.program.len(), vault = %plan.adapter.vault(), "execute: starting");

        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::Builder::new()
            .name("flint-sandbox".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let failed = Err(InternalError::SandboxThread {
                            reason: format!("failed to build runtime: {err}"),
                        });
                        if tx.send(failed).is_err() {
                            tracing::warn!("sandbox result receiver dropped");
                        }
                        return;
                    }
                };
                let result = runtime.block_on(run_plan(plan, spawner));
                if tx.send(result).is_err() {
                    tracing::warn!("sandbox result receiver dropped before result was sent");
                }
            })
            .map_err(|err| InternalError::SandboxThread {
                reason: format!("failed to spawn sandbox thread: {err}"),
            })?;

        let result = rx.await.map_err(|_| InternalError::SandboxThread {
            reason: "sandbox thread panicked".to_string(),
        })?;
        match &result {
            Ok(outcome) => tracing::info!(
                success = outcome.success,
                elapsed_ms = outcome.elapsed_ms,
                capability_calls = outcome.capability_calls,
                "execute: complete"
            ),
            Err(err) => tracing::error!(error = %err, "execute: internal fault"),
        }
        result
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

/// Create, inject, run and dispose one context on the current thread
async fn run_plan(plan: ExecutionPlan, spawner: tokio::runtime::Handle) -> Result<ExecutionResult, InternalError> {
    let started = Instant::now();
    let ExecutionPlan {
        program,
        prelude,
        bindings,
        limits,
        adapter,
    } = plan;

    let mut context = Context::create(&limits, adapter, spawner)?;
    let outcome = match context.inject(&bindings, prelude.as_deref()) {
        Ok(()) => context.run(&program).await,
        Err(err) => Err(err),
    };
    let memory_used = context.memory_used();
    let (logs, capability_calls) = context.take_report();
    let disposed = context.dispose();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let outcome = outcome?;
    let handles = disposed?;
    let mut result = match outcome {
        Ok(value) => ExecutionResult::succeeded(value),
        Err(failure) => {
            tracing::debug!(kind = failure.kind(), "execution failed");
            ExecutionResult::failed(failure)
        }
    };
    result.elapsed_ms = elapsed_ms;
    result.memory_used = memory_used;
    result.logs = logs;
    result.capability_calls = capability_calls;
    result.handles = handles;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_core::{Capability, CapabilitySet, ExecutionFailure, LogLevel, VaultId};
    use flint_host::{HostApi, MemoryHost, ScriptedHost};
    use serde_json::json;
    use std::time::Duration;

    fn vault() -> VaultId {
        VaultId::new("v1").unwrap()
    }

    fn adapter(host: Arc<dyn HostApi>, allowlist: CapabilitySet) -> HostAdapter {
        HostAdapter::new(host, vault(), allowlist)
    }

    fn plan(program: &str) -> ExecutionPlan {
        ExecutionPlan::new(
            program,
            adapter(Arc::new(MemoryHost::new()), CapabilitySet::all()),
            ResourceLimits::default(),
        )
    }

    async fn run(plan: ExecutionPlan) -> ExecutionResult {
        let result = Sandbox::default().execute(plan).await.unwrap();
        assert!(result.handles.balanced(), "unbalanced handles: {:?}", result.handles);
        result
    }

    #[tokio::test]
    async fn test_top_level_return() {
        let result = run(plan("const a = 1 + 2;\nreturn a;")).await;
        assert!(result.success);
        assert_eq!(result.value, Some(json!(3)));
    }

    #[tokio::test]
    async fn test_main_is_awaited() {
        let result = run(plan("async function main() { return { ok: true }; }")).await;
        assert_eq!(result.value, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_undefined_result_is_null() {
        let result = run(plan("const x = 1;")).await;
        assert!(result.success);
        assert_eq!(result.value, Some(Value::Null));
    }

    #[tokio::test]
    async fn test_null_note_with_optional_chaining() {
        let program = "async function main() { const n = await notes.get(\"missing\"); return n?.title ?? null; }";
        let result = run(plan(program)).await;
        assert!(result.success);
        assert_eq!(result.value, Some(Value::Null));
        assert_eq!(result.capability_calls, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_out_of_order_settlement() {
        let host = Arc::new(
            ScriptedHost::new()
                .resolve(Capability::NotesGet, Some("a"), json!("A"), Duration::from_millis(90))
                .resolve(Capability::NotesGet, Some("b"), json!("B"), Duration::from_millis(10))
                .resolve(Capability::NotesGet, Some("c"), json!("C"), Duration::from_millis(50)),
        );
        let program = "const [x, y, z] = await Promise.all([notes.get(\"a\"), notes.get(\"b\"), notes.get(\"c\")]);\nreturn [x, y, z];";
        let plan = ExecutionPlan::new(
            program,
            adapter(host.clone(), CapabilitySet::all()),
            ResourceLimits::default(),
        );
        let result = run(plan).await;
        assert_eq!(result.value, Some(json!(["A", "B", "C"])));
        let mut started: Vec<_> = host.started().into_iter().filter_map(|c| c.key).collect();
        started.sort();
        let finished: Vec<_> = host.finished().into_iter().filter_map(|c| c.key).collect();
        assert_eq!(started, vec!["a", "b", "c"]);
        assert_eq!(finished, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_infinite_loop_times_out() {
        let limits = ResourceLimits::default().with_time_budget(Duration::from_millis(300));
        let mut plan = plan("while (true) {}");
        plan.limits = limits;
        let started = Instant::now();
        let result = run(plan).await;
        assert!(result.is_timeout(), "{:?}", result.failure);
        assert_eq!(result.value, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_abandons_pending_call() {
        let host = Arc::new(ScriptedHost::new().hang(Capability::NotesGet, None));
        let plan = ExecutionPlan::new(
            "return await notes.get(\"slow\");",
            adapter(host.clone(), CapabilitySet::all()),
            ResourceLimits::default().with_time_budget(Duration::from_millis(200)),
        );
        let result = run(plan).await;
        assert!(result.is_timeout());
        assert_eq!(result.handles.live, 0);
        assert!(host.finished().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rejection_surfaces_message() {
        let host = Arc::new(ScriptedHost::new().reject(Capability::NotesRemove, Some("x"), "locked", Duration::ZERO));
        let caught = ExecutionPlan::new(
            "try { await notes.remove(\"x\"); return \"no\"; } catch (e) { return e.message; }",
            adapter(host.clone(), CapabilitySet::all()),
            ResourceLimits::default(),
        );
        assert_eq!(run(caught).await.value, Some(json!("locked")));

        let uncaught = ExecutionPlan::new(
            "await notes.remove(\"x\");",
            adapter(host, CapabilitySet::all()),
            ResourceLimits::default(),
        );
        let result = run(uncaught).await;
        match result.failure {
            Some(ExecutionFailure::ScriptError { message, .. }) => assert_eq!(message, "Error: locked"),
            other => panic!("expected script error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_outside_allowlist_is_violation() {
        let plan = ExecutionPlan::new(
            "try { await notes.create({ title: \"x\" }); } catch (e) {}\nreturn 1;",
            adapter(Arc::new(MemoryHost::new()), CapabilitySet::new().with(Capability::NotesGet)),
            ResourceLimits::default(),
        );
        let result = run(plan).await;
        assert!(result.is_capability_violation());
        match result.failure {
            Some(ExecutionFailure::CapabilityViolation { capability, .. }) => assert_eq!(capability, "notes.create"),
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_forbidden_global_is_violation() {
        for program in ["return fetch(\"https://example.com\");", "try { process.exit(1); } catch (e) {} return 1;"] {
            let result = run(plan(program)).await;
            assert!(result.is_capability_violation(), "{program}: {:?}", result.failure);
        }
    }

    #[tokio::test]
    async fn test_function_constructor_is_unreachable() {
        let program = "return [(function () {}).constructor === undefined, (async () => {}).constructor === undefined];";
        let result = run(plan(program)).await;
        assert_eq!(result.value, Some(json!([true, true])));
    }

    #[tokio::test]
    async fn test_bad_arguments_reject_with_type_error() {
        let program = "try { await notes.get(42); return false; } catch (e) { return e instanceof TypeError; }";
        let result = run(plan(program)).await;
        assert_eq!(result.value, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_call_limit() {
        let mut plan = plan("await notes.get(\"a\");\ntry { await notes.get(\"b\"); } catch (e) { return e.message; }\nreturn \"no limit\";");
        plan.limits = ResourceLimits::default().with_max_capability_calls(1);
        let result = run(plan).await;
        assert_eq!(result.value, Some(json!("capability call limit of 1 exceeded")));
        assert_eq!(result.capability_calls, 1);
    }

    #[tokio::test]
    async fn test_console_capture() {
        let result = run(plan("console.log(\"a\", { b: 1 });\nconsole.warn(2);\nreturn null;")).await;
        assert_eq!(result.logs.len(), 2);
        assert_eq!(result.logs[0].message, "a {\"b\":1}");
        assert_eq!(result.logs[1].level, LogLevel::Warn);
    }

    #[tokio::test]
    async fn test_bindings_are_frozen_globals() {
        let mut bindings = BTreeMap::new();
        bindings.insert("config".to_string(), json!({"limit": 3}));
        let plan = plan("return [config.limit * 2, Object.isFrozen(config)];").with_bindings(bindings);
        let result = run(plan).await;
        assert_eq!(result.value, Some(json!([6, true])));
    }

    #[tokio::test]
    async fn test_prelude_defines_custom() {
        let plan = plan("return await custom.double(21);")
            .with_prelude("const custom = Object.freeze({ double: async function double(x) { return x * 2; } });");
        let result = run(plan).await;
        assert_eq!(result.value, Some(json!(42)));
    }

    #[tokio::test]
    async fn test_never_settled_promise() {
        let result = run(plan("await new Promise(() => {});")).await;
        match result.failure {
            Some(ExecutionFailure::ScriptError { message, .. }) => assert_eq!(message, "result promise never settled"),
            other => panic!("expected script error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_thrown_error_has_stack() {
        let result = run(plan("throw new RangeError(\"bad\");")).await;
        match result.failure {
            Some(ExecutionFailure::ScriptError { message, stack }) => {
                assert_eq!(message, "RangeError: bad");
                assert!(stack.is_some());
            }
            other => panic!("expected script error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_result_size_limit() {
        let mut plan = plan("return \"x\".repeat(100);");
        plan.limits = ResourceLimits::default().with_max_result_bytes(10);
        let result = run(plan).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("exceeds the limit"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_evaluations_stay_balanced() {
        let sandbox = Sandbox::new(SandboxConfig::new().with_max_concurrent(3));
        let mut tasks = Vec::new();
        for i in 0..6 {
            let sandbox = sandbox.clone();
            let program = format!("const n = await notes.get(\"n{i}\");\nreturn {i};");
            tasks.push(tokio::spawn(async move { sandbox.execute(plan(&program)).await }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            let result = task.await.unwrap().unwrap();
            assert_eq!(result.value, Some(json!(i)));
            assert!(result.handles.balanced());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shrinking_budget_stays_timeout() {
        let host = Arc::new(ScriptedHost::new().hang(Capability::NotesGet, None));
        for budget_ms in [800, 400, 200, 100, 50] {
            let budget = Duration::from_millis(budget_ms);
            let mut spin = plan("while (true) {}");
            spin.limits = ResourceLimits::default().with_time_budget(budget);
            let started = Instant::now();
            let result = run(spin).await;
            assert!(result.is_timeout(), "spin at {budget_ms}ms: {:?}", result.failure);
            assert!(started.elapsed() >= budget);

            let pending = ExecutionPlan::new(
                "return await notes.get(\"slow\");",
                adapter(host.clone(), CapabilitySet::all()),
                ResourceLimits::default().with_time_budget(budget),
            );
            let result = run(pending).await;
            assert!(result.is_timeout(), "pending at {budget_ms}ms: {:?}", result.failure);
            assert_eq!(result.handles.live, 0);
        }
    }

    #[tokio::test]
    async fn test_explicit_main_call_runs_once() {
        let program = "let runs = 0;\nasync function main() { runs += 1; console.log(\"main\"); return runs; }\nreturn await main();";
        let result = run(plan(program)).await;
        assert_eq!(result.value, Some(json!(1)));
        assert_eq!(result.logs.len(), 1);
        let statement = run(plan("async function main() { console.log(\"main\"); }\nawait main();")).await;
        assert_eq!(statement.logs.len(), 1);
        assert_eq!(statement.value, Some(Value::Null));
    }

    mod concurrent {
        use super::*;
        use proptest::prelude::*;

        /// One capability call: settle delay and whether it rejects
        type Call = (u64, bool);

        fn program(keys: &[String]) -> String {
            let list: Vec<String> = keys.iter().map(|k| format!("\"{k}\"")).collect();
            format!(
                "const settled = await Promise.allSettled([{}].map((k) => notes.get(k)));\n\
                 return settled.filter((s) => s.status === \"fulfilled\").length;",
                list.join(", ")
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(8))]

            #[test]
            fn prop_concurrent_evaluations_balance(
                runs in proptest::collection::vec(
                    proptest::collection::vec((0u64..30, any::<bool>()), 0..5),
                    1..5,
                )
            ) {
                let mut host = ScriptedHost::new();
                for (i, calls) in runs.iter().enumerate() {
                    for (j, (delay, rejects)) in calls.iter().enumerate() {
                        let key = format!("e{i}k{j}");
                        let delay = Duration::from_millis(*delay);
                        host = if *rejects {
                            host.reject(Capability::NotesGet, Some(&key), "refused", delay)
                        } else {
                            host.resolve(Capability::NotesGet, Some(&key), Value::Null, delay)
                        };
                    }
                }
                let host: Arc<dyn HostApi> = Arc::new(host);
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(4)
                    .enable_all()
                    .build()
                    .unwrap();
                let sandbox = Sandbox::new(SandboxConfig::new().with_max_concurrent(2));
                let results = runtime.block_on(async {
                    let tasks: Vec<_> = runs
                        .iter()
                        .enumerate()
                        .map(|(i, calls)| {
                            let keys: Vec<String> = (0..calls.len()).map(|j| format!("e{i}k{j}")).collect();
                            let plan = ExecutionPlan::new(
                                &program(&keys),
                                adapter(host.clone(), CapabilitySet::all()),
                                ResourceLimits::default(),
                            );
                            let sandbox = sandbox.clone();
                            tokio::spawn(async move { sandbox.execute(plan).await })
                        })
                        .collect();
                    let mut results = Vec::new();
                    for task in tasks {
                        results.push(task.await.unwrap().unwrap());
                    }
                    results
                });
                for (result, calls) in results.iter().zip(&runs) {
                    let fulfilled = calls.iter().filter(|(_, rejects)| !rejects).count();
                    prop_assert_eq!(result.value.clone(), Some(json!(fulfilled)));
                    prop_assert_eq!(result.capability_calls as usize, calls.len());
                    prop_assert!(result.handles.balanced(), "{:?}", result.handles);
                    prop_assert_eq!(result.handles.live, 0);
                }
            }
        }
    }
}

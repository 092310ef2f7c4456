//! One isolated V8 context per evaluation.
//!
//! A [`Context`] is created, injected once, run once, and disposed. Dispose
//! releases every tracked handle and verifies the counts balance before the
//! isolate is dropped. If the owner never calls [`Context::dispose`], `Drop`
//! performs the same teardown.

use crate::bootstrap::{self, BOOTSTRAP_SCRIPT_NAME, PRELUDE_SCRIPT_NAME, PROGRAM_SCRIPT_NAME, TRAPPED_GLOBALS};
use crate::bridge::{self, BridgeState, Completion, SandboxHandle, SharedState};
use deno_core::{serde_v8, v8, JsRuntime, RuntimeOptions};
use flint_core::{
    ConsoleEntry, ExecutionFailure, HandleId, HandleStats, InternalError, ResourceLimits,
};
use flint_host::HostAdapter;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Extra heap granted after the ceiling is hit, so termination can unwind
const HEAP_GRACE_BYTES: usize = 1024 * 1024;

/// How a run ended, short of an internal fault
pub type RunOutcome = Result<Value, ExecutionFailure>;

/// Shared with the near-heap-limit callback
struct HeapGuard {
    handle: v8::IsolateHandle,
    triggered: AtomicBool,
}

extern "C" fn near_heap_limit(data: *mut std::ffi::c_void, current: usize, _initial: usize) -> usize {
    // SAFETY: `data` is the boxed `HeapGuard` owned by the `Context`, which
    // removes this callback before the isolate or the box is dropped.
    let guard = unsafe { &*(data as *const HeapGuard) };
    if !guard.triggered.swap(true, Ordering::SeqCst) {
        guard.handle.terminate_execution();
    }
    current + HEAP_GRACE_BYTES
}

/// Deadline thread that interrupts running bytecode
struct Watchdog {
    cancel: std::sync::mpsc::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    fn start(handle: v8::IsolateHandle, budget: Duration) -> Result<Self, InternalError> {
        let (cancel, cancelled) = std::sync::mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let thread = std::thread::Builder::new()
            .name("flint-watchdog".to_string())
            .spawn(move || {
                if let Err(std::sync::mpsc::RecvTimeoutError::Timeout) = cancelled.recv_timeout(budget) {
                    flag.store(true, Ordering::SeqCst);
                    handle.terminate_execution();
                }
            })
            .map_err(|err| InternalError::SandboxThread {
                reason: format!("failed to spawn watchdog: {err}"),
            })?;
        Ok(Self {
            cancel,
            thread: Some(thread),
            fired,
        })
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        let _ = self.cancel.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("watchdog thread panicked");
            }
        }
    }
}

/// An isolated execution context
pub struct Context {
    runtime: Option<JsRuntime>,
    state: SharedState,
    completions: mpsc::UnboundedReceiver<Completion>,
    heap: Box<HeapGuard>,
    watchdog: Option<Watchdog>,
    limits: ResourceLimits,
    injected: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("live", &self.runtime.is_some())
            .field("state", &self.state)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a fresh isolate bounded by `limits`
    ///
    /// Host futures started by the script are spawned onto `spawner`.
    ///
    /// # Errors
    ///
    /// Returns [`InternalError::ContextCreation`] if the isolate cannot be
    /// created.
    pub fn create(
        limits: &ResourceLimits,
        adapter: HostAdapter,
        spawner: tokio::runtime::Handle,
    ) -> Result<Self, InternalError> {
        let max_heap = limits.effective_memory_budget();
        let mut runtime = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            JsRuntime::new(RuntimeOptions {
                create_params: Some(v8::CreateParams::default().heap_limits(0, max_heap)),
                ..Default::default()
            })
        }))
        .map_err(|_| InternalError::ContextCreation {
            reason: "V8 isolate creation panicked".to_string(),
        })?;

        let (state, completions) =
            BridgeState::new(adapter, spawner, limits.max_capability_calls, limits.max_log_entries);
        let state: SharedState = Rc::new(RefCell::new(state));

        let isolate = runtime.v8_isolate();
        isolate.set_microtasks_policy(v8::MicrotasksPolicy::Explicit);
        isolate.set_slot(Rc::clone(&state));
        let heap = Box::new(HeapGuard {
            handle: isolate.thread_safe_handle(),
            triggered: AtomicBool::new(false),
        });
        isolate.add_near_heap_limit_callback(
            near_heap_limit,
            &*heap as *const HeapGuard as *mut std::ffi::c_void,
        );

        tracing::debug!(max_heap, "sandbox context created");
        Ok(Self {
            runtime: Some(runtime),
            state,
            completions,
            heap,
            watchdog: None,
            limits: limits.clone(),
            injected: false,
        })
    }

    fn runtime(&mut self) -> Result<&mut JsRuntime, InternalError> {
        self.runtime
            .as_mut()
            .ok_or_else(|| InternalError::bridge("context used after disposal"))
    }

    /// Install capability namespaces, console, bindings and the custom prelude
    ///
    /// Every namespace member dispatches through the bridge; the adapter
    /// decides per call whether it is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`InternalError::ContextCreation`] if the hardening script or
    /// the prelude fails, or if the context was already injected.
    pub fn inject(&mut self, bindings: &BTreeMap<String, Value>, prelude: Option<&str>) -> Result<(), InternalError> {
        if self.injected {
            return Err(InternalError::bridge("context injected twice"));
        }
        self.injected = true;
        let state = Rc::clone(&self.state);
        let runtime = self.runtime()?;
        let setup = runtime
            .execute_script(BOOTSTRAP_SCRIPT_NAME, bootstrap::bootstrap_script())
            .map_err(|err| creation_error("bootstrap script failed", err))?;

        {
            let scope = &mut runtime.handle_scope();
            let setup = v8::Local::new(scope, &setup);
            let setup_id = register(&state, SandboxHandle::Value(v8::Global::new(scope, setup)));
            let setup: v8::Local<v8::Function> = setup
                .try_into()
                .map_err(|_| InternalError::ContextCreation {
                    reason: "bootstrap script did not evaluate to a function".to_string(),
                })?;

            let call = bridge::native_function(scope, bridge::bridge_call)?;
            let log = bridge::native_function(scope, bridge::bridge_log)?;
            let violation = bridge::native_function(scope, bridge::bridge_violation)?;
            for function in [call, log, violation] {
                register(&state, SandboxHandle::Function(v8::Global::new(scope, function)));
            }

            let namespaces = to_v8(scope, &bootstrap::namespace_members())?;
            let traps = to_v8(scope, &TRAPPED_GLOBALS)?;
            let bindings = to_v8(scope, bindings)?;

            let scope = &mut v8::TryCatch::new(scope);
            let receiver: v8::Local<v8::Value> = v8::undefined(scope).into();
            let installed = setup.call(
                scope,
                receiver,
                &[call.into(), log.into(), violation.into(), namespaces, traps, bindings],
            );
            if installed.is_none() {
                let reason = scope
                    .exception()
                    .map(|exception| exception.to_rust_string_lossy(scope))
                    .unwrap_or_else(|| "unknown error".to_string());
                return Err(InternalError::ContextCreation {
                    reason: format!("hardening failed: {reason}"),
                });
            }
            release(&state, setup_id)?;
        }

        if let Some(prelude) = prelude {
            runtime
                .execute_script(PRELUDE_SCRIPT_NAME, prelude.to_string())
                .map_err(|err| creation_error("custom function prelude failed", err))?;
        }
        Ok(())
    }

    /// Run erased program text to completion, failure or deadline
    ///
    /// # Errors
    ///
    /// Returns [`InternalError`] for memory exhaustion and bridge faults;
    /// script-level outcomes are in the [`RunOutcome`].
    pub async fn run(&mut self, program: &str) -> Result<RunOutcome, InternalError> {
        let budget = self.limits.time_budget;
        let deadline = tokio::time::Instant::now() + budget;
        let handle = self.runtime()?.v8_isolate().thread_safe_handle();
        self.watchdog = Some(Watchdog::start(handle, budget)?);

        let state = Rc::clone(&self.state);
        let runtime = self.runtime()?;
        let promise = match runtime.execute_script(PROGRAM_SCRIPT_NAME, bootstrap::wrap_program(program)) {
            Ok(promise) => promise,
            Err(err) => {
                return match self.interruption()? {
                    Some(failure) => Ok(Err(failure)),
                    None => Ok(Err(ExecutionFailure::ScriptError {
                        message: err.to_string(),
                        stack: None,
                    })),
                };
            }
        };
        let promise_id = register(&state, SandboxHandle::Value(promise.clone()));

        let outcome = self.pump(&promise, deadline).await;
        release(&state, promise_id)?;
        outcome
    }

    /// Alternate microtask checkpoints with host completions until the result settles
    async fn pump(
        &mut self,
        promise: &v8::Global<v8::Value>,
        deadline: tokio::time::Instant,
    ) -> Result<RunOutcome, InternalError> {
        let max_result_bytes = self.limits.max_result_bytes;
        loop {
            let settled = {
                let runtime = self.runtime()?;
                let scope = &mut runtime.handle_scope();
                scope.perform_microtask_checkpoint();
                let value = v8::Local::new(scope, promise);
                match v8::Local::<v8::Promise>::try_from(value) {
                    Ok(promise) => match promise.state() {
                        v8::PromiseState::Pending => None,
                        v8::PromiseState::Fulfilled => {
                            let result = promise.result(scope);
                            Some(marshal_result(scope, result, max_result_bytes))
                        }
                        v8::PromiseState::Rejected => {
                            let reason = promise.result(scope);
                            Some(Err(script_error(scope, reason)))
                        }
                    },
                    Err(_) => Some(marshal_result(scope, value, max_result_bytes)),
                }
            };

            if let Some(failure) = self.interruption()? {
                return Ok(Err(failure));
            }
            if let Some(outcome) = settled {
                return Ok(outcome);
            }
            if self.state.borrow().pending() == 0 {
                return Ok(Err(ExecutionFailure::ScriptError {
                    message: "result promise never settled".to_string(),
                    stack: None,
                }));
            }

            let next = tokio::time::timeout_at(deadline, self.completions.recv()).await;
            match next {
                Ok(Some(completion)) => {
                    let state = Rc::clone(&self.state);
                    let runtime = self.runtime()?;
                    let scope = &mut runtime.handle_scope();
                    bridge::settle(scope, &state, completion)?;
                }
                Ok(None) => return Err(InternalError::bridge("completion channel closed")),
                Err(_) => {
                    return Ok(Err(ExecutionFailure::Timeout {
                        budget_ms: self.limits.time_budget.as_millis() as u64,
                    }));
                }
            }
        }
    }

    /// Why execution was cut short, if it was
    ///
    /// Memory exhaustion outranks a violation, which outranks the deadline.
    fn interruption(&self) -> Result<Option<ExecutionFailure>, InternalError> {
        if self.heap.triggered.load(Ordering::SeqCst) {
            return Err(InternalError::MemoryExhausted {
                limit: self.limits.effective_memory_budget(),
            });
        }
        if let Some(violation) = self.state.borrow().violation() {
            return Ok(Some(violation.clone()));
        }
        if self.watchdog.as_ref().is_some_and(Watchdog::fired) {
            return Ok(Some(ExecutionFailure::Timeout {
                budget_ms: self.limits.time_budget.as_millis() as u64,
            }));
        }
        Ok(None)
    }

    /// Heap in use right now
    pub fn memory_used(&mut self) -> u64 {
        let Some(runtime) = self.runtime.as_mut() else {
            return 0;
        };
        let mut stats = v8::HeapStatistics::default();
        runtime.v8_isolate().get_heap_statistics(&mut stats);
        stats.used_heap_size() as u64
    }

    /// Console output and capability call count so far
    pub fn take_report(&mut self) -> (Vec<ConsoleEntry>, u32) {
        let mut state = self.state.borrow_mut();
        (state.take_logs(), state.calls())
    }

    /// Tear the context down
    ///
    /// Stops the watchdog, abandons pending operations, releases every handle,
    /// verifies the handle counts balance and drops the isolate.
    ///
    /// # Errors
    ///
    /// Returns [`InternalError::HandleInvariant`] if the counts do not balance.
    pub fn dispose(mut self) -> Result<HandleStats, InternalError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<HandleStats, InternalError> {
        if let Some(mut watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        let Some(mut runtime) = self.runtime.take() else {
            return Err(InternalError::handle("context disposed twice"));
        };
        let started = Instant::now();
        runtime.v8_isolate().cancel_terminate_execution();
        self.completions.close();

        let result = {
            let mut state = self.state.borrow_mut();
            let abandoned = state.abandon();
            let drained = state.tracker().release_all();
            let leaked = drained.len();
            drop(drained);
            if leaked > 0 {
                tracing::debug!(leaked, "released handles still live at teardown");
            }
            abandoned.and_then(|abandoned| {
                if abandoned > 0 {
                    tracing::debug!(abandoned, "pending operations abandoned");
                }
                state.tracker().verify_balanced()
            })
        };

        let isolate = runtime.v8_isolate();
        isolate.remove_slot::<SharedState>();
        isolate.remove_near_heap_limit_callback(near_heap_limit, 0);
        drop(runtime);
        tracing::debug!(elapsed_us = started.elapsed().as_micros() as u64, "sandbox context disposed");
        result
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.runtime.is_some() {
            if let Err(err) = self.teardown() {
                tracing::error!(error = %err, "context teardown failed");
            }
        }
    }
}

fn register(state: &SharedState, handle: SandboxHandle) -> HandleId {
    state.borrow_mut().tracker().register(handle)
}

fn release(state: &SharedState, id: HandleId) -> Result<(), InternalError> {
    state.borrow_mut().tracker().release(id)?;
    Ok(())
}

fn creation_error(what: &str, err: impl std::fmt::Display) -> InternalError {
    InternalError::ContextCreation {
        reason: format!("{what}: {err}"),
    }
}

fn to_v8<'s, T: serde::Serialize>(
    scope: &mut v8::HandleScope<'s>,
    value: &T,
) -> Result<v8::Local<'s, v8::Value>, InternalError> {
    serde_v8::to_v8(scope, value).map_err(|err| creation_error("failed to marshal bootstrap input", err))
}

fn property(scope: &mut v8::HandleScope, object: v8::Local<v8::Object>, name: &str) -> Option<String> {
    let key = v8::String::new(scope, name)?;
    let value = object.get(scope, key.into())?;
    if value.is_null_or_undefined() {
        return None;
    }
    Some(value.to_rust_string_lossy(scope))
}

/// Message and stack of a thrown or rejected value
fn script_error(scope: &mut v8::HandleScope, reason: v8::Local<v8::Value>) -> ExecutionFailure {
    let scope = &mut v8::TryCatch::new(scope);
    if reason.is_native_error() {
        if let Ok(object) = v8::Local::<v8::Object>::try_from(reason) {
            let name = property(scope, object, "name").unwrap_or_else(|| "Error".to_string());
            let message = property(scope, object, "message").unwrap_or_default();
            let stack = property(scope, object, "stack");
            let message = if message.is_empty() { name } else { format!("{name}: {message}") };
            return ExecutionFailure::ScriptError { message, stack };
        }
    }
    let message = if reason.is_object() {
        v8::json::stringify(scope, reason)
            .map(|text| text.to_rust_string_lossy(scope))
            .unwrap_or_else(|| "non-error value thrown".to_string())
    } else {
        reason.to_rust_string_lossy(scope)
    };
    ExecutionFailure::ScriptError {
        message: format!("Uncaught {message}"),
        stack: None,
    }
}

/// Marshal the settled value to JSON, enforcing the size cap
fn marshal_result(scope: &mut v8::HandleScope, value: v8::Local<v8::Value>, max_bytes: usize) -> RunOutcome {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let scope = &mut v8::TryCatch::new(scope);
    let Some(text) = v8::json::stringify(scope, value) else {
        let reason = scope
            .exception()
            .map(|exception| exception.to_rust_string_lossy(scope))
            .unwrap_or_else(|| "unsupported value".to_string());
        return Err(ExecutionFailure::ScriptError {
            message: format!("result is not JSON-serializable: {reason}"),
            stack: None,
        });
    };
    let text = text.to_rust_string_lossy(scope);
    if text.len() > max_bytes {
        return Err(ExecutionFailure::ScriptError {
            message: format!("result of {} bytes exceeds the limit of {max_bytes} bytes", text.len()),
            stack: None,
        });
    }
    // JSON.stringify yields `undefined` text for functions and symbols.
    if text == "undefined" {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|err| ExecutionFailure::ScriptError {
        message: format!("result is not valid JSON: {err}"),
        stack: None,
    })
}

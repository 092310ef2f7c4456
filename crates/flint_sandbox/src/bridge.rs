//! Async operation bridge between host futures and sandbox promises.
//!
//! A capability call from script lands in [`bridge_call`]. The call is
//! authorized and decoded by the [`HostAdapter`], the host future is spawned
//! onto the caller's runtime, and a fresh sandbox promise is returned at once.
//! Its resolver is parked in the handle tracker under a [`PendingOperation`]
//! keyed by [`OperationId`]. When the host future finishes it posts a
//! [`Completion`]; the pump loop in the sandbox hands it to [`settle`], which
//! looks the operation up by id, so settlement order never matters.

use crate::tracker::HandleTracker;
use deno_core::{serde_v8, v8};
use flint_core::{ConsoleEntry, ExecutionFailure, HandleId, InternalError, LogLevel, OperationId};
use flint_host::{AdapterError, HostAdapter};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tokio::sync::mpsc;

/// A sandbox-native value owned by host-side code
pub enum SandboxHandle {
    /// Any value, e.g. the result promise
    Value(v8::Global<v8::Value>),
    /// A native function installed by the bridge
    Function(v8::Global<v8::Function>),
    /// The resolver of a pending capability promise
    Resolver(v8::Global<v8::PromiseResolver>),
}

impl std::fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value"),
            Self::Function(_) => f.write_str("Function"),
            Self::Resolver(_) => f.write_str("Resolver"),
        }
    }
}

/// Host-side result of one capability call
#[derive(Debug)]
pub struct Completion {
    /// Operation the result belongs to
    pub op: OperationId,
    /// Resolved value, or the rejection message
    pub outcome: Result<Value, String>,
}

/// One outstanding capability call
#[derive(Debug, Clone)]
pub struct PendingOperation {
    /// Capability name as called
    pub capability: String,
    /// Tracker id of the promise resolver
    pub resolver: HandleId,
}

/// Per-evaluation bridge state, stored in an isolate slot
pub struct BridgeState {
    adapter: HostAdapter,
    spawner: tokio::runtime::Handle,
    completions: mpsc::UnboundedSender<Completion>,
    pending: BTreeMap<OperationId, PendingOperation>,
    next_op: OperationId,
    tracker: HandleTracker<SandboxHandle>,
    calls: u32,
    max_calls: u32,
    logs: Vec<ConsoleEntry>,
    max_logs: usize,
    dropped_logs: usize,
    violation: Option<ExecutionFailure>,
}

/// Shared handle to the bridge state
pub type SharedState = Rc<RefCell<BridgeState>>;

impl std::fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeState")
            .field("adapter", &self.adapter)
            .field("pending", &self.pending.len())
            .field("calls", &self.calls)
            .field("handles", &self.tracker.stats())
            .finish_non_exhaustive()
    }
}

/// Why a call was refused before reaching the host
enum Refusal {
    /// Reject the promise with a `TypeError`
    TypeError(String),
    /// Reject the promise with an `Error`
    Error(String),
    /// Record a violation and terminate
    Violation { capability: String, detail: String },
}

impl BridgeState {
    /// Create state for one evaluation; completions arrive on the returned receiver
    #[must_use]
    pub fn new(
        adapter: HostAdapter,
        spawner: tokio::runtime::Handle,
        max_calls: u32,
        max_logs: usize,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completions, receiver) = mpsc::unbounded_channel();
        let state = Self {
            adapter,
            spawner,
            completions,
            pending: BTreeMap::new(),
            next_op: OperationId::new(1),
            tracker: HandleTracker::new(),
            calls: 0,
            max_calls,
            logs: Vec::new(),
            max_logs,
            dropped_logs: 0,
            violation: None,
        };
        (state, receiver)
    }

    /// Handle arena
    pub fn tracker(&mut self) -> &mut HandleTracker<SandboxHandle> {
        &mut self.tracker
    }

    /// Outstanding operations
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Capability calls issued
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// Recorded violation, if any
    #[must_use]
    pub fn violation(&self) -> Option<&ExecutionFailure> {
        self.violation.as_ref()
    }

    /// Take the captured console output
    pub fn take_logs(&mut self) -> Vec<ConsoleEntry> {
        if self.dropped_logs > 0 {
            tracing::debug!(dropped = self.dropped_logs, "console entries over cap discarded");
        }
        std::mem::take(&mut self.logs)
    }

    fn record_violation(&mut self, capability: String, detail: String) {
        if self.violation.is_none() {
            tracing::warn!(vault = %self.adapter.vault(), capability = %capability, "capability violation");
            self.violation = Some(ExecutionFailure::CapabilityViolation { capability, detail });
        }
    }

    fn record_log(&mut self, level: LogLevel, message: String) {
        if self.logs.len() < self.max_logs {
            self.logs.push(ConsoleEntry { level, message });
        } else {
            self.dropped_logs += 1;
        }
    }

    /// Authorize, count and spawn one call; the resolver is only registered on success
    fn issue(
        &mut self,
        name: &str,
        args: Vec<Value>,
        resolver: v8::Global<v8::PromiseResolver>,
    ) -> Result<OperationId, Refusal> {
        let future = self.adapter.dispatch(name, args).map_err(|err| match err {
            AdapterError::CapabilityViolation { capability, detail } => Refusal::Violation { capability, detail },
            AdapterError::InvalidArguments(message) => Refusal::TypeError(message),
        })?;
        if self.calls >= self.max_calls {
            return Err(Refusal::Error(format!(
                "capability call limit of {} exceeded",
                self.max_calls
            )));
        }
        self.calls += 1;

        let op = self.next_op;
        self.next_op = op.next();
        let handle = self.tracker.register(SandboxHandle::Resolver(resolver));
        self.pending.insert(
            op,
            PendingOperation {
                capability: name.to_string(),
                resolver: handle,
            },
        );

        let completions = self.completions.clone();
        self.spawner.spawn(async move {
            let outcome = future.await.map_err(|err| err.to_string());
            // The receiver is gone once the evaluation is torn down.
            let _ = completions.send(Completion { op, outcome });
        });
        tracing::trace!(op = %op, capability = name, "capability call issued");
        Ok(op)
    }

    /// Remove a settled operation, returning its resolver
    ///
    /// `Ok(None)` means the operation was already abandoned.
    fn finish(&mut self, op: OperationId) -> Result<Option<v8::Global<v8::PromiseResolver>>, InternalError> {
        let Some(pending) = self.pending.remove(&op) else {
            return Ok(None);
        };
        match self.tracker.release(pending.resolver)? {
            SandboxHandle::Resolver(resolver) => Ok(Some(resolver)),
            _ => Err(InternalError::bridge(format!("{op} does not hold a promise resolver"))),
        }
    }

    /// Drop every outstanding operation without waiting for the host
    pub fn abandon(&mut self) -> Result<usize, InternalError> {
        let pending = std::mem::take(&mut self.pending);
        for (op, operation) in &pending {
            tracing::debug!(op = %op, capability = %operation.capability, "abandoning pending operation");
            self.tracker.release(operation.resolver)?;
        }
        Ok(pending.len())
    }
}

/// Install a native callback as a function value
///
/// # Errors
///
/// Returns [`InternalError::ContextCreation`] if V8 refuses to create it.
pub fn native_function<'s>(
    scope: &mut v8::HandleScope<'s>,
    callback: impl v8::MapFnTo<v8::FunctionCallback>,
) -> Result<v8::Local<'s, v8::Function>, InternalError> {
    v8::Function::new(scope, callback).ok_or_else(|| InternalError::ContextCreation {
        reason: "failed to create bridge function".to_string(),
    })
}

fn shared_state(scope: &mut v8::HandleScope) -> Option<SharedState> {
    scope.get_slot::<SharedState>().cloned()
}

fn js_string<'s>(scope: &mut v8::HandleScope<'s>, text: &str) -> v8::Local<'s, v8::String> {
    v8::String::new(scope, text).unwrap_or_else(|| v8::String::empty(scope))
}

/// `call(name, args)`: start a capability call and return its promise
pub fn bridge_call(scope: &mut v8::HandleScope, args: v8::FunctionCallbackArguments, mut rv: v8::ReturnValue) {
    let Some(state) = shared_state(scope) else {
        return;
    };
    let Some(resolver) = v8::PromiseResolver::new(scope) else {
        return;
    };
    let promise = resolver.get_promise(scope);
    rv.set(promise.into());

    let name = args.get(0).to_rust_string_lossy(scope);
    let raw_args = args.get(1);
    let call_args = if raw_args.is_null_or_undefined() {
        Ok(Vec::new())
    } else {
        serde_v8::from_v8::<Vec<Value>>(scope, raw_args)
            .map_err(|err| Refusal::TypeError(format!("{name}: arguments must be plain data ({err})")))
    };

    let issued = call_args.and_then(|call_args| {
        let global = v8::Global::new(scope, resolver);
        state.borrow_mut().issue(&name, call_args, global)
    });

    match issued {
        Ok(_) => {}
        Err(Refusal::TypeError(message)) => {
            let message = js_string(scope, &message);
            let exception = v8::Exception::type_error(scope, message);
            resolver.reject(scope, exception);
        }
        Err(Refusal::Error(message)) => {
            let message = js_string(scope, &message);
            let exception = v8::Exception::error(scope, message);
            resolver.reject(scope, exception);
        }
        Err(Refusal::Violation { capability, detail }) => {
            state.borrow_mut().record_violation(capability, detail);
            scope.terminate_execution();
        }
    }
}

/// `log(level, message)`: capture one console line
pub fn bridge_log(scope: &mut v8::HandleScope, args: v8::FunctionCallbackArguments, _rv: v8::ReturnValue) {
    let Some(state) = shared_state(scope) else {
        return;
    };
    let level = LogLevel::from_method(&args.get(0).to_rust_string_lossy(scope));
    let message = args.get(1).to_rust_string_lossy(scope);
    state.borrow_mut().record_log(level, message);
}

/// `violation(name)`: a trapped global was touched
pub fn bridge_violation(scope: &mut v8::HandleScope, args: v8::FunctionCallbackArguments, _rv: v8::ReturnValue) {
    let Some(state) = shared_state(scope) else {
        return;
    };
    let name = args.get(0).to_rust_string_lossy(scope);
    state
        .borrow_mut()
        .record_violation(name, "access to a global outside the sandbox surface".to_string());
    scope.terminate_execution();
}

/// Resolve or reject the promise of a finished operation
///
/// Completions for abandoned operations are dropped.
///
/// # Errors
///
/// Returns [`InternalError`] when the operation's handle bookkeeping is
/// inconsistent.
pub fn settle(scope: &mut v8::HandleScope, state: &SharedState, completion: Completion) -> Result<(), InternalError> {
    let Completion { op, outcome } = completion;
    let Some(resolver) = state.borrow_mut().finish(op)? else {
        tracing::debug!(op = %op, "late completion discarded");
        return Ok(());
    };
    let resolver = v8::Local::new(scope, &resolver);
    let settled = match outcome {
        Ok(value) => match serde_v8::to_v8(scope, &value) {
            Ok(local) => resolver.resolve(scope, local),
            Err(err) => {
                let message = js_string(scope, &format!("host result could not be marshaled: {err}"));
                let exception = v8::Exception::error(scope, message);
                resolver.reject(scope, exception)
            }
        },
        Err(message) => {
            let message = js_string(scope, &message);
            let exception = v8::Exception::error(scope, message);
            resolver.reject(scope, exception)
        }
    };
    if settled.is_none() {
        tracing::debug!(op = %op, "promise settlement interrupted");
    }
    Ok(())
}

//! Evaluation request and response shapes.

use crate::capability::CapabilitySet;
use crate::diagnostic::{CompilationResult, Diagnostic};
use crate::id::VaultId;
use crate::limits::{ResourceLimits, TierProfile};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One agent turn: source plus everything needed to run it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    /// TypeScript source
    pub source: String,
    /// Vault the evaluation runs against
    pub vault: VaultId,
    /// Capabilities the script may call
    pub allowlist: CapabilitySet,
    /// Time and memory limits
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Skip execution and return only the compilation result
    #[serde(default)]
    pub types_only: bool,
    /// Read-only globals injected before the script runs
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, Value>,
}

impl EvaluationRequest {
    /// Create a request with an empty allowlist and default limits
    #[must_use]
    pub fn new(vault: VaultId, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            vault,
            allowlist: CapabilitySet::new(),
            limits: ResourceLimits::default(),
            types_only: false,
            bindings: BTreeMap::new(),
        }
    }

    /// Set the allowlist
    #[must_use]
    pub fn with_allowlist(mut self, allowlist: CapabilitySet) -> Self {
        self.allowlist = allowlist;
        self
    }

    /// Set the limits
    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Apply a tier profile's allowlist and limits
    #[must_use]
    pub fn with_profile(mut self, profile: &TierProfile) -> Self {
        self.allowlist = profile.allowlist.clone();
        self.limits = profile.limits.clone();
        self
    }

    /// Request type checking only
    #[must_use]
    pub fn types_only(mut self) -> Self {
        self.types_only = true;
        self
    }

    /// Add an initial binding
    #[must_use]
    pub fn with_binding(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bindings.insert(name.into(), value);
        self
    }
}

/// Why an execution did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExecutionFailure {
    /// Exception thrown by the script
    ScriptError {
        /// Error message
        message: String,
        /// Stack trace, when available
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    /// Deadline exceeded
    #[serde(rename_all = "camelCase")]
    Timeout {
        /// The budget that was exceeded
        budget_ms: u64,
    },
    /// Script reached for something outside its allowlist
    CapabilityViolation {
        /// Capability or global name
        capability: String,
        /// What was attempted
        detail: String,
    },
}

impl ExecutionFailure {
    /// Human-readable message
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::ScriptError { message, .. } => message.clone(),
            Self::Timeout { budget_ms } => {
                format!("Execution exceeded the time budget of {budget_ms} ms")
            }
            Self::CapabilityViolation { capability, detail } => {
                format!("Capability violation: {capability} ({detail})")
            }
        }
    }

    /// Short kind name
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScriptError { .. } => "ScriptError",
            Self::Timeout { .. } => "Timeout",
            Self::CapabilityViolation { .. } => "CapabilityViolation",
        }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

/// Console method a log entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// `console.log`
    Log,
    /// `console.info`
    Info,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
    /// `console.debug`
    Debug,
}

impl LogLevel {
    /// Parse a console method name, defaulting to `Log`
    #[must_use]
    pub fn from_method(method: &str) -> Self {
        match method {
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            "debug" => Self::Debug,
            _ => Self::Log,
        }
    }
}

/// One captured console line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// Console method
    pub level: LogLevel,
    /// Formatted message
    pub message: String,
}

/// Handle accounting for one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleStats {
    /// Handles registered
    pub created: u64,
    /// Handles released
    pub released: u64,
    /// Handles still live
    pub live: u64,
}

impl HandleStats {
    /// True when every created handle was released
    #[must_use]
    pub fn balanced(&self) -> bool {
        self.created == self.released && self.live == 0
    }
}

/// Outcome of running compiled code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// True iff the script settled with a value
    pub success: bool,
    /// Result value (JSON), present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Error message, present on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured failure, present on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ExecutionFailure>,
    /// Wall-clock time spent executing
    pub elapsed_ms: u64,
    /// Heap in use when execution ended
    pub memory_used: u64,
    /// Captured console output
    #[serde(default)]
    pub logs: Vec<ConsoleEntry>,
    /// Capability calls issued
    pub capability_calls: u32,
    /// Handle accounting at teardown
    pub handles: HandleStats,
    /// Non-error compiler diagnostics
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Diagnostic>,
}

impl ExecutionResult {
    /// A successful result
    #[must_use]
    pub fn succeeded(value: Value) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            failure: None,
            elapsed_ms: 0,
            memory_used: 0,
            logs: Vec::new(),
            capability_calls: 0,
            handles: HandleStats::default(),
            warnings: Vec::new(),
        }
    }

    /// A failed result
    #[must_use]
    pub fn failed(failure: ExecutionFailure) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(failure.message()),
            failure: Some(failure),
            ..Self::succeeded(Value::Null)
        }
    }

    /// Whether execution timed out
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, Some(ExecutionFailure::Timeout { .. }))
    }

    /// Whether execution hit a capability violation
    #[must_use]
    pub fn is_capability_violation(&self) -> bool {
        matches!(self.failure, Some(ExecutionFailure::CapabilityViolation { .. }))
    }
}

/// What an evaluation returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EvaluationResponse {
    /// Compilation failed, or `typesOnly` was requested
    Compilation(CompilationResult),
    /// Code ran
    Execution(ExecutionResult),
}

impl EvaluationResponse {
    /// The compilation result, if this is one
    #[must_use]
    pub fn compilation(&self) -> Option<&CompilationResult> {
        match self {
            Self::Compilation(result) => Some(result),
            Self::Execution(_) => None,
        }
    }

    /// The execution result, if this is one
    #[must_use]
    pub fn execution(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Compilation(_) => None,
            Self::Execution(result) => Some(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::limits::TrustTier;
    use serde_json::json;

    fn vault() -> VaultId {
        VaultId::new("vault").unwrap()
    }

    #[test]
    fn test_request_builder() {
        let request = EvaluationRequest::new(vault(), "return 1;")
            .with_profile(&TierProfile::preset(TrustTier::Limited))
            .with_binding("limit", json!(3))
            .types_only();
        assert!(request.types_only);
        assert!(request.allowlist.allows(Capability::NotesGet));
        assert_eq!(request.bindings["limit"], json!(3));
    }

    #[test]
    fn test_request_json_defaults() {
        let request: EvaluationRequest = serde_json::from_value(json!({
            "source": "return 1;",
            "vault": "v",
            "allowlist": ["notes.get"]
        }))
        .unwrap();
        assert!(!request.types_only);
        assert_eq!(request.limits, ResourceLimits::default());
    }

    #[test]
    fn test_failed_result_carries_message() {
        let result = ExecutionResult::failed(ExecutionFailure::Timeout { budget_ms: 2000 });
        assert!(!result.success);
        assert!(result.is_timeout());
        assert!(result.error.unwrap().contains("2000 ms"));
    }

    #[test]
    fn test_failure_tagged_json() {
        let failure = ExecutionFailure::CapabilityViolation {
            capability: "notes.remove".to_string(),
            detail: "not in allowlist".to_string(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "capabilityViolation");
        assert_eq!(json["capability"], "notes.remove");
    }

    #[test]
    fn test_response_accessors() {
        let response = EvaluationResponse::Execution(ExecutionResult::succeeded(json!(1)));
        assert!(response.execution().is_some());
        assert!(response.compilation().is_none());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "execution");
    }

    #[test]
    fn test_handle_stats_balanced() {
        let stats = HandleStats {
            created: 3,
            released: 3,
            live: 0,
        };
        assert!(stats.balanced());
        assert!(!HandleStats { created: 3, released: 2, live: 1 }.balanced());
    }

    #[test]
    fn test_log_level_from_method() {
        assert_eq!(LogLevel::from_method("warn"), LogLevel::Warn);
        assert_eq!(LogLevel::from_method("trace"), LogLevel::Log);
    }
}

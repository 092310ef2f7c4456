//! FLINT Engine
//!
//! Facade over the FLINT crates. An [`Engine`] takes one
//! [`EvaluationRequest`] per agent turn and returns either the compilation
//! result (failed or types-only) or the execution result. Only fatal faults
//! surface as [`InternalError`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;

// Re-exports
pub use config::{ConfigError, EngineConfig, RegistryBackend, DEFAULT_MAX_LOG_ENTRIES};
pub use engine::Engine;
pub use flint_core::{
    Capability, CapabilitySet, CompilationResult, Diagnostic, EvaluationRequest, EvaluationResponse,
    ExecutionFailure, ExecutionResult, InternalError, ResourceLimits, TierProfile, TrustTier, VaultId,
};
pub use flint_registry::{CustomFunctionDefinition, ParameterSchema, Registry, RegistryError, ValidationError};

//! FLINT Core Types
//!
//! Pure data model shared by every FLINT crate: capabilities, identifiers,
//! resource limits, diagnostics, and evaluation request/response shapes.
//! Nothing in this crate performs I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capability;
pub mod diagnostic;
pub mod error;
pub mod hash;
pub mod id;
pub mod limits;
pub mod result;

// Re-exports
pub use capability::{Capability, CapabilityError, CapabilitySet, NAMESPACES};
pub use diagnostic::{
    CompilationResult, Diagnostic, RelatedInformation, Severity, SourceMap, SourcePosition,
    SOURCE_FILE_NAME,
};
pub use error::InternalError;
pub use hash::Fingerprint;
pub use id::{EvaluationId, FunctionId, HandleId, IdError, OperationId, VaultId};
pub use limits::{ResourceLimits, TierProfile, TrustTier};
pub use result::{
    ConsoleEntry, EvaluationRequest, EvaluationResponse, ExecutionFailure, ExecutionResult,
    HandleStats, LogLevel,
};

//! FLINT Execution Sandbox
//!
//! Runs erased programs in fresh V8 isolates, one per evaluation:
//! - Hardened globals: capability namespaces, captured console, trapped escapes
//! - Async bridge pumping host futures into sandbox promises
//! - Handle tracker that makes teardown balance checkable
//! - Watchdog and heap ceiling interrupts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod bridge;
pub mod context;
pub mod sandbox;
pub mod tracker;

// Re-exports
pub use bootstrap::{namespace_members, wrap_program, TRAPPED_GLOBALS};
pub use bridge::{BridgeState, Completion, PendingOperation, SandboxHandle};
pub use context::{Context, RunOutcome};
pub use sandbox::{ExecutionPlan, Sandbox, SandboxConfig, DEFAULT_MAX_CONCURRENT};
pub use tracker::{HandleTracker, TrackerError};

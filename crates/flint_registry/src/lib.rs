//! FLINT Custom Function Registry
//!
//! Named, vault-scoped functions that agents register once and call from
//! later evaluations as `custom.<name>(...)`. Definitions are validated with
//! the same compiler and security scan as ad-hoc code, persisted behind the
//! [`FunctionStore`] seam (redb or memory), and merged into each evaluation
//! as a synthesized, frozen namespace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod definition;
pub mod redb_store;
pub mod registry;
pub mod store;
pub mod synth;
pub mod validate;

// Re-exports
pub use definition::{CustomFunctionDefinition, FunctionRecord, ParameterSchema, UsageMetadata};
pub use redb_store::RedbStore;
pub use registry::{Registry, RegistryError};
pub use store::{FunctionStore, MemoryStore, StoreError};
pub use synth::SynthesizedNamespace;
pub use validate::{validate_name, ValidationError, MAX_NAME_LEN};

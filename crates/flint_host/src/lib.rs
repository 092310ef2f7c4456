//! FLINT Host API Adapter
//!
//! The only path from sandboxed code to the outside world. Capability names
//! arriving from the sandbox are parsed into [`HostCall`] values, checked
//! against the evaluation's allowlist, and forwarded to a [`HostApi`]
//! implementation as `Send` futures the bridge can spawn.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod api;
pub mod call;
pub mod memory;
pub mod testing;

// Re-exports
pub use adapter::{AdapterError, HostAdapter, HostFuture};
pub use api::{
    Backlink, CreateNoteOptions, HostApi, HostError, ListNotesOptions, Note, NoteSummary, SearchOptions, SearchResult,
    UpdateNoteOptions, VaultInfo,
};
pub use call::HostCall;
pub use memory::{MemoryHost, VaultData};
pub use testing::{RecordedCall, ScriptedHost};

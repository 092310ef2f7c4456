//! FLINT TypeScript Front End
//!
//! Lexer, parser and strict checker for the TypeScript subset agents write,
//! plus the static security scan and the type-erasure emitter. Everything
//! is checked against a fixed, in-memory ambient surface; nothing is ever
//! resolved from disk.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ambient;
pub mod ast;
pub mod checker;
pub mod compile;
pub mod diagnostics;
pub mod emit;
pub mod lexer;
pub mod parser;
pub mod security;
pub mod span;
pub mod types;

// Re-exports
pub use ambient::{global_names, is_reserved_global, json_type_text, CUSTOM_FILE_NAME, CUSTOM_NAMESPACE};
pub use compile::{CompileConfig, CompileExtras, Compiler, ExtraDeclarations};
pub use diagnostics::{codes, Issue};
pub use parser::{is_reserved_word, parse_type_text};
pub use security::{SecurityScanner, DEFAULT_MAX_CODE_BYTES};
pub use span::{LineIndex, Span};

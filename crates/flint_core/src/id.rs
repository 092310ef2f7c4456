//! Identifiers for FLINT entities.
//!
//! Evaluation and function ids are UUIDs. Operation and handle ids are
//! per-evaluation counters minted by the sandbox.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length of a vault id
pub const MAX_VAULT_ID_LEN: usize = 128;

/// Vault identifier - scopes custom functions and host calls
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VaultId(String);

impl VaultId {
    /// Create a vault id, validating its shape
    ///
    /// # Errors
    ///
    /// Returns error if the id is empty, too long, or contains control characters
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if id.len() > MAX_VAULT_ID_LEN {
            return Err(IdError::TooLong {
                len: id.len(),
                max: MAX_VAULT_ID_LEN,
            });
        }
        if id.chars().any(char::is_control) {
            return Err(IdError::InvalidCharacter);
        }
        Ok(Self(id))
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VaultId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VaultId> for String {
    fn from(id: VaultId) -> Self {
        id.0
    }
}

impl std::str::FromStr for VaultId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Id validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Empty id
    Empty,
    /// Id exceeds the maximum length
    TooLong {
        /// Actual length
        len: usize,
        /// Maximum length
        max: usize,
    },
    /// Id contains a control character
    InvalidCharacter,
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Id must not be empty"),
            Self::TooLong { len, max } => write!(f, "Id too long: {} > {}", len, max),
            Self::InvalidCharacter => write!(f, "Id contains a control character"),
        }
    }
}

impl std::error::Error for IdError {}

/// Evaluation identifier - one compile/execute/teardown cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvaluationId(Uuid);

impl EvaluationId {
    /// Create a new random EvaluationId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EvaluationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eval_{}", self.0)
    }
}

/// Custom function identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(Uuid);

impl FunctionId {
    /// Create a new random FunctionId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for FunctionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn_{}", self.0)
    }
}

/// Pending capability call identifier, unique within one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(u64);

impl OperationId {
    /// Create from raw counter value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The id following this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op_{}", self.0)
    }
}

/// Tracked sandbox handle identifier, unique within one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(u64);

impl HandleId {
    /// Create from raw counter value
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

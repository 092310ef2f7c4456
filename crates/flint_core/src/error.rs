//! The fatal error class.
//!
//! Every other failure (compilation errors, script errors, timeouts,
//! capability violations, registry validation) is a structured result value.
//! Only [`InternalError`] crosses the engine boundary as an `Err`.

use thiserror::Error;

/// Fatal engine fault; the affected context is never reused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InternalError {
    /// A handle was leaked, released twice, or never registered
    #[error("handle tracking invariant violated: {detail}")]
    HandleInvariant {
        /// What went wrong
        detail: String,
    },

    /// The VM context could not be created
    #[error("failed to create execution context: {reason}")]
    ContextCreation {
        /// Underlying reason
        reason: String,
    },

    /// The VM heap ceiling was reached
    #[error("memory budget of {limit} bytes exhausted")]
    MemoryExhausted {
        /// Configured ceiling
        limit: usize,
    },

    /// The dedicated sandbox thread failed
    #[error("sandbox thread failed: {reason}")]
    SandboxThread {
        /// Underlying reason
        reason: String,
    },

    /// A defensive bridge assertion failed
    #[error("bridge invariant violated: {detail}")]
    Bridge {
        /// What went wrong
        detail: String,
    },

    /// Persistent storage failed while preparing an evaluation
    #[error("storage failure: {reason}")]
    Storage {
        /// Underlying reason
        reason: String,
    },
}

impl InternalError {
    /// Shorthand for [`InternalError::HandleInvariant`]
    #[must_use]
    pub fn handle(detail: impl Into<String>) -> Self {
        Self::HandleInvariant {
            detail: detail.into(),
        }
    }

    /// Shorthand for [`InternalError::Bridge`]
    #[must_use]
    pub fn bridge(detail: impl Into<String>) -> Self {
        Self::Bridge {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InternalError::handle("2 handles still live");
        assert_eq!(
            format!("{}", err),
            "handle tracking invariant violated: 2 handles still live"
        );

        let err = InternalError::MemoryExhausted { limit: 1024 };
        assert_eq!(format!("{}", err), "memory budget of 1024 bytes exhausted");
    }
}

//! Capability-checked dispatch into a [`HostApi`].

use crate::api::{HostApi, HostError};
use crate::call::HostCall;
use flint_core::{Capability, CapabilitySet, VaultId};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Host promise: a `Send` future resolving to a JSON value or a rejection
pub type HostFuture = BoxFuture<'static, Result<Value, HostError>>;

/// Why a call never reached the host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The capability is unknown or outside the allowlist
    #[error("capability violation: {capability} ({detail})")]
    CapabilityViolation {
        /// Requested name
        capability: String,
        /// What was wrong
        detail: String,
    },

    /// Arguments do not match the declared signature
    #[error("{0}")]
    InvalidArguments(String),
}

/// Proxy between sandboxed code and the domain layer for one evaluation
///
/// Holds the vault and allowlist explicitly; nothing is read from ambient
/// state. The allowlist is checked here on every call, independently of
/// what the sandbox chose to install.
#[derive(Clone)]
pub struct HostAdapter {
    host: Arc<dyn HostApi>,
    vault: VaultId,
    allowlist: CapabilitySet,
}

impl std::fmt::Debug for HostAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostAdapter")
            .field("vault", &self.vault)
            .field("allowlist", &self.allowlist)
            .finish_non_exhaustive()
    }
}

impl HostAdapter {
    /// Create an adapter
    #[must_use]
    pub fn new(host: Arc<dyn HostApi>, vault: VaultId, allowlist: CapabilitySet) -> Self {
        Self { host, vault, allowlist }
    }

    /// Vault calls run against
    #[must_use]
    pub fn vault(&self) -> &VaultId {
        &self.vault
    }

    /// Capabilities granted
    #[must_use]
    pub fn allowlist(&self) -> &CapabilitySet {
        &self.allowlist
    }

    /// Check a dotted capability name against the allowlist
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::CapabilityViolation`] for unknown names and
    /// names outside the allowlist.
    pub fn authorize(&self, name: &str) -> Result<Capability, AdapterError> {
        let capability = Capability::parse(name).map_err(|_| AdapterError::CapabilityViolation {
            capability: name.to_string(),
            detail: "unknown capability".to_string(),
        })?;
        if !self.allowlist.allows(capability) {
            tracing::warn!(vault = %self.vault, capability = %capability, "capability outside allowlist");
            return Err(AdapterError::CapabilityViolation {
                capability: name.to_string(),
                detail: "not in the allowlist for this evaluation".to_string(),
            });
        }
        Ok(capability)
    }

    /// Authorize and decode a call, returning the host promise
    ///
    /// The returned future owns everything it needs and can be spawned onto
    /// any runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the call is not allowed or its arguments
    /// are malformed; the host is not contacted in either case.
    pub fn dispatch(&self, name: &str, args: Vec<Value>) -> Result<HostFuture, AdapterError> {
        let capability = self.authorize(name)?;
        let call = HostCall::parse(capability, args).map_err(AdapterError::InvalidArguments)?;
        tracing::debug!(vault = %self.vault, capability = %capability, "dispatching capability call");
        let host = Arc::clone(&self.host);
        let vault = self.vault.clone();
        Ok(Box::pin(async move { call.execute(host.as_ref(), &vault).await }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHost;
    use serde_json::json;

    fn adapter(allowlist: CapabilitySet) -> HostAdapter {
        let vault = VaultId::new("v1").unwrap();
        let host = MemoryHost::new();
        HostAdapter::new(Arc::new(host), vault, allowlist)
    }

    #[test]
    fn test_unknown_capability_is_violation() {
        let err = adapter(CapabilitySet::all()).authorize("fs.read").unwrap_err();
        assert!(matches!(err, AdapterError::CapabilityViolation { .. }));
    }

    #[test]
    fn test_outside_allowlist_is_violation() {
        let allow = CapabilitySet::new().with(Capability::NotesGet);
        let err = adapter(allow).dispatch("notes.create", vec![json!({"title": "x"})]).err().unwrap();
        assert_eq!(
            err,
            AdapterError::CapabilityViolation {
                capability: "notes.create".into(),
                detail: "not in the allowlist for this evaluation".into(),
            }
        );
    }

    #[test]
    fn test_bad_arguments() {
        let allow = CapabilitySet::new().with(Capability::NotesGet);
        let err = adapter(allow).dispatch("notes.get", vec![json!(42)]).err().unwrap();
        assert!(matches!(err, AdapterError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_dispatch_reaches_host() {
        let result = adapter(CapabilitySet::all())
            .dispatch("notes.get", vec![json!("missing")])
            .unwrap()
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_dispatched_future_is_spawnable() {
        let adapter = adapter(CapabilitySet::all());
        let future = adapter.dispatch("vaults.current", vec![]).unwrap();
        let value = tokio::spawn(future).await.unwrap().unwrap();
        assert_eq!(value["id"], "v1");
    }
}

//! Scripted host for exercising the async bridge.
//!
//! Each reply is keyed by capability and, optionally, the first string
//! argument (a note id or search query), and carries a delay. Tests use it to
//! force out-of-order settlement and calls that outlive the time budget.

use crate::api::{
    CreateNoteOptions, HostApi, HostError, ListNotesOptions, SearchOptions, UpdateNoteOptions,
};
use async_trait::async_trait;
use flint_core::{Capability, VaultId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Delay long enough to outlive any test budget
pub const HANG: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct Reply {
    outcome: Result<Value, String>,
    delay: Duration,
}

/// One observed host call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Capability invoked
    pub capability: Capability,
    /// First string argument, if any
    pub key: Option<String>,
}

/// Host whose answers are set up ahead of time
///
/// Unscripted calls resolve to `null` immediately.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    replies: HashMap<(Capability, Option<String>), Reply>,
    started: Mutex<Vec<RecordedCall>>,
    finished: Mutex<Vec<RecordedCall>>,
}

impl ScriptedHost {
    /// Create a host with no scripted replies
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `capability(key)` with `value` after `delay`
    #[must_use]
    pub fn resolve(mut self, capability: Capability, key: Option<&str>, value: Value, delay: Duration) -> Self {
        self.replies.insert(
            (capability, key.map(str::to_string)),
            Reply {
                outcome: Ok(value),
                delay,
            },
        );
        self
    }

    /// Reject `capability(key)` with `message` after `delay`
    #[must_use]
    pub fn reject(mut self, capability: Capability, key: Option<&str>, message: &str, delay: Duration) -> Self {
        self.replies.insert(
            (capability, key.map(str::to_string)),
            Reply {
                outcome: Err(message.to_string()),
                delay,
            },
        );
        self
    }

    /// Never settle `capability(key)` within a test's lifetime
    #[must_use]
    pub fn hang(self, capability: Capability, key: Option<&str>) -> Self {
        self.resolve(capability, key, Value::Null, HANG)
    }

    /// Calls in the order they reached the host
    #[must_use]
    pub fn started(&self) -> Vec<RecordedCall> {
        self.started.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Calls in the order they settled
    #[must_use]
    pub fn finished(&self) -> Vec<RecordedCall> {
        self.finished.lock().map(|c| c.clone()).unwrap_or_default()
    }

    async fn respond(&self, capability: Capability, key: Option<&str>) -> Result<Value, HostError> {
        let call = RecordedCall {
            capability,
            key: key.map(str::to_string),
        };
        if let Ok(mut started) = self.started.lock() {
            started.push(call.clone());
        }
        let reply = self
            .replies
            .get(&(capability, call.key.clone()))
            .or_else(|| self.replies.get(&(capability, None)))
            .cloned();
        let outcome = match reply {
            Some(reply) => {
                tokio::time::sleep(reply.delay).await;
                reply.outcome.map_err(|message| HostError::Other(anyhow::anyhow!(message)))
            }
            None => Ok(Value::Null),
        };
        if let Ok(mut finished) = self.finished.lock() {
            finished.push(call);
        }
        outcome
    }
}

#[async_trait]
impl HostApi for ScriptedHost {
    async fn get_note(&self, _vault: &VaultId, id: &str) -> Result<Value, HostError> {
        self.respond(Capability::NotesGet, Some(id)).await
    }

    async fn list_notes(&self, _vault: &VaultId, _options: ListNotesOptions) -> Result<Value, HostError> {
        self.respond(Capability::NotesList, None).await
    }

    async fn create_note(&self, _vault: &VaultId, options: CreateNoteOptions) -> Result<Value, HostError> {
        self.respond(Capability::NotesCreate, Some(&options.title)).await
    }

    async fn update_note(&self, _vault: &VaultId, id: &str, _changes: UpdateNoteOptions) -> Result<Value, HostError> {
        self.respond(Capability::NotesUpdate, Some(id)).await
    }

    async fn remove_note(&self, _vault: &VaultId, id: &str) -> Result<Value, HostError> {
        self.respond(Capability::NotesRemove, Some(id)).await
    }

    async fn search_notes(&self, _vault: &VaultId, query: &str, _options: SearchOptions) -> Result<Value, HostError> {
        self.respond(Capability::NotesSearch, Some(query)).await
    }

    async fn current_vault(&self, _vault: &VaultId) -> Result<Value, HostError> {
        self.respond(Capability::VaultsCurrent, None).await
    }

    async fn list_vaults(&self, _vault: &VaultId) -> Result<Value, HostError> {
        self.respond(Capability::VaultsList, None).await
    }

    async fn backlinks(&self, _vault: &VaultId, id: &str) -> Result<Value, HostError> {
        self.respond(Capability::LinksBacklinks, Some(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vault() -> VaultId {
        VaultId::new("v1").unwrap()
    }

    #[tokio::test]
    async fn test_unscripted_is_null() {
        let host = ScriptedHost::new();
        assert_eq!(host.list_vaults(&vault()).await.unwrap(), Value::Null);
        assert_eq!(host.finished().len(), 1);
    }

    #[tokio::test]
    async fn test_keyed_reply_beats_wildcard() {
        let host = ScriptedHost::new()
            .resolve(Capability::NotesGet, None, json!("any"), Duration::ZERO)
            .resolve(Capability::NotesGet, Some("a"), json!("a"), Duration::ZERO);
        assert_eq!(host.get_note(&vault(), "a").await.unwrap(), json!("a"));
        assert_eq!(host.get_note(&vault(), "b").await.unwrap(), json!("any"));
    }

    #[tokio::test]
    async fn test_reject_message() {
        let host = ScriptedHost::new().reject(Capability::NotesRemove, Some("x"), "locked", Duration::ZERO);
        let err = host.remove_note(&vault(), "x").await.unwrap_err();
        assert_eq!(err.to_string(), "locked");
    }

    #[tokio::test]
    async fn test_settlement_follows_delay() {
        let host = std::sync::Arc::new(
            ScriptedHost::new()
                .resolve(Capability::NotesGet, Some("slow"), json!(1), Duration::from_millis(50))
                .resolve(Capability::NotesGet, Some("fast"), json!(2), Duration::from_millis(10)),
        );
        let slow = {
            let host = host.clone();
            tokio::spawn(async move { host.get_note(&vault(), "slow").await })
        };
        tokio::task::yield_now().await;
        let fast = {
            let host = host.clone();
            tokio::spawn(async move { host.get_note(&vault(), "fast").await })
        };
        assert_eq!(fast.await.unwrap().unwrap(), json!(2));
        assert_eq!(slow.await.unwrap().unwrap(), json!(1));
        let keys: Vec<_> = host.finished().into_iter().filter_map(|c| c.key).collect();
        assert_eq!(keys, vec!["fast", "slow"]);
    }
}

//! Persistence seam for custom functions.
//!
//! Implementations enforce name uniqueness themselves: the case-insensitive
//! check and the write happen under one lock or one transaction, so two
//! racing registrations can never both land. Every mutation bumps a
//! per-vault revision that synthesis caches are keyed on.

use crate::definition::FunctionRecord;
use chrono::{DateTime, Utc};
use flint_core::{InternalError, VaultId};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::RwLock;
use thiserror::Error;

/// Store failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The vault already holds this name, ignoring case
    #[error("function {existing:?} already exists")]
    Duplicate {
        /// Name being written
        name: String,
        /// Name already stored
        existing: String,
    },

    /// No function with this exact name
    #[error("function {name:?} not found")]
    NotFound {
        /// Requested name
        name: String,
    },

    /// A record could not be encoded or decoded
    #[error("serialization error: {reason}")]
    Serialization {
        /// Underlying reason
        reason: String,
    },

    /// The backend failed
    #[error("backend error: {reason}")]
    Backend {
        /// Underlying reason
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn backend(err: impl Display) -> Self {
        Self::Backend {
            reason: err.to_string(),
        }
    }

    pub(crate) fn serialization(err: impl Display) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<StoreError> for InternalError {
    fn from(err: StoreError) -> Self {
        InternalError::Storage {
            reason: err.to_string(),
        }
    }
}

/// Key of the uniqueness index
pub(crate) fn folded(name: &str) -> String {
    name.to_lowercase()
}

/// Persistent, vault-scoped function storage
pub trait FunctionStore: Send + Sync {
    /// Insert a new record; fails if the name exists ignoring case
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] on a name collision.
    fn insert(&self, record: FunctionRecord) -> Result<u64, StoreError>;

    /// Replace the record with the same exact name
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored under the name.
    fn replace(&self, record: FunctionRecord) -> Result<u64, StoreError>;

    /// Delete one record
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if nothing is stored under the name.
    fn remove(&self, vault: &VaultId, name: &str) -> Result<FunctionRecord, StoreError>;

    /// Delete every record in a vault, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn remove_vault(&self, vault: &VaultId) -> Result<usize, StoreError>;

    /// Fetch one record by exact name
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn get(&self, vault: &VaultId, name: &str) -> Result<Option<FunctionRecord>, StoreError>;

    /// Every record in a vault, sorted by name
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn list(&self, vault: &VaultId) -> Result<Vec<FunctionRecord>, StoreError>;

    /// Current revision of a vault; zero before any mutation
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn revision(&self, vault: &VaultId) -> Result<u64, StoreError>;

    /// Count one successful use; does not change the revision
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the function was removed meanwhile.
    fn record_use(&self, vault: &VaultId, name: &str, at: DateTime<Utc>) -> Result<FunctionRecord, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryTables {
    functions: BTreeMap<(VaultId, String), FunctionRecord>,
    names: HashMap<(VaultId, String), String>,
    revisions: HashMap<VaultId, u64>,
}

impl MemoryTables {
    fn bump(&mut self, vault: &VaultId) -> u64 {
        let revision = self.revisions.entry(vault.clone()).or_insert(0);
        *revision += 1;
        *revision
    }

    fn vault_keys(&self, vault: &VaultId) -> Vec<(VaultId, String)> {
        self.functions
            .range((vault.clone(), String::new())..)
            .take_while(|((v, _), _)| v == vault)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// In-process store for tests and ephemeral engines
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<MemoryTables>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryTables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::backend("memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryTables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::backend("memory store lock poisoned"))
    }
}

impl FunctionStore for MemoryStore {
    fn insert(&self, record: FunctionRecord) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let vault = record.vault().clone();
        let name = record.name().to_string();
        let name_key = (vault.clone(), folded(&name));
        if let Some(existing) = tables.names.get(&name_key) {
            return Err(StoreError::Duplicate {
                name,
                existing: existing.clone(),
            });
        }
        tables.names.insert(name_key, name.clone());
        tables.functions.insert((vault.clone(), name), record);
        Ok(tables.bump(&vault))
    }

    fn replace(&self, record: FunctionRecord) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let vault = record.vault().clone();
        let key = (vault.clone(), record.name().to_string());
        match tables.functions.get_mut(&key) {
            Some(slot) => *slot = record,
            None => return Err(StoreError::NotFound { name: key.1 }),
        }
        Ok(tables.bump(&vault))
    }

    fn remove(&self, vault: &VaultId, name: &str) -> Result<FunctionRecord, StoreError> {
        let mut tables = self.write()?;
        let record = tables
            .functions
            .remove(&(vault.clone(), name.to_string()))
            .ok_or_else(|| StoreError::NotFound { name: name.to_string() })?;
        tables.names.remove(&(vault.clone(), folded(name)));
        tables.bump(vault);
        Ok(record)
    }

    fn remove_vault(&self, vault: &VaultId) -> Result<usize, StoreError> {
        let mut tables = self.write()?;
        let keys = tables.vault_keys(vault);
        for key in &keys {
            tables.functions.remove(key);
            tables.names.remove(&(vault.clone(), folded(&key.1)));
        }
        tables.bump(vault);
        Ok(keys.len())
    }

    fn get(&self, vault: &VaultId, name: &str) -> Result<Option<FunctionRecord>, StoreError> {
        Ok(self.read()?.functions.get(&(vault.clone(), name.to_string())).cloned())
    }

    fn list(&self, vault: &VaultId) -> Result<Vec<FunctionRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .vault_keys(vault)
            .iter()
            .filter_map(|key| tables.functions.get(key).cloned())
            .collect())
    }

    fn revision(&self, vault: &VaultId) -> Result<u64, StoreError> {
        Ok(self.read()?.revisions.get(vault).copied().unwrap_or(0))
    }

    fn record_use(&self, vault: &VaultId, name: &str, at: DateTime<Utc>) -> Result<FunctionRecord, StoreError> {
        let mut tables = self.write()?;
        let record = tables
            .functions
            .get_mut(&(vault.clone(), name.to_string()))
            .ok_or_else(|| StoreError::NotFound { name: name.to_string() })?;
        record.usage.record_use(at);
        Ok(record.clone())
    }
}

/// Shared behaviour checks run against every backend
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::definition::CustomFunctionDefinition;

    pub(crate) fn vault(id: &str) -> VaultId {
        VaultId::new(id).unwrap()
    }

    pub(crate) fn record(vault_id: &str, name: &str) -> FunctionRecord {
        let def = CustomFunctionDefinition::new(vault(vault_id), name, "number", "return 1;");
        FunctionRecord::new(def, format!("async function {name}() {{ return 1; }}"), Utc::now())
    }

    pub(crate) fn insert_and_get(store: &dyn FunctionStore) {
        store.insert(record("a", "alpha")).unwrap();
        let got = store.get(&vault("a"), "alpha").unwrap().unwrap();
        assert_eq!(got.name(), "alpha");
        assert!(store.get(&vault("a"), "Alpha").unwrap().is_none());
        assert!(store.get(&vault("b"), "alpha").unwrap().is_none());
    }

    pub(crate) fn duplicate_ignores_case(store: &dyn FunctionStore) {
        store.insert(record("a", "helper")).unwrap();
        let err = store.insert(record("a", "HELPER")).unwrap_err();
        assert_eq!(
            err,
            StoreError::Duplicate {
                name: "HELPER".into(),
                existing: "helper".into()
            }
        );
        store.insert(record("b", "helper")).unwrap();
        assert_eq!(store.list(&vault("a")).unwrap().len(), 1);
    }

    pub(crate) fn list_is_sorted_and_scoped(store: &dyn FunctionStore) {
        for name in ["gamma", "alpha", "beta"] {
            store.insert(record("a", name)).unwrap();
        }
        store.insert(record("ab", "zeta")).unwrap();
        let names: Vec<String> = store
            .list(&vault("a"))
            .unwrap()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    pub(crate) fn revisions_track_mutations(store: &dyn FunctionStore) {
        let a = vault("a");
        assert_eq!(store.revision(&a).unwrap(), 0);
        assert_eq!(store.insert(record("a", "one")).unwrap(), 1);
        let mut changed = record("a", "one");
        changed.compiled = "async function one() { return 2; }".into();
        assert_eq!(store.replace(changed).unwrap(), 2);
        store.record_use(&a, "one", Utc::now()).unwrap();
        assert_eq!(store.revision(&a).unwrap(), 2);
        store.remove(&a, "one").unwrap();
        assert_eq!(store.revision(&a).unwrap(), 3);
        assert_eq!(store.revision(&vault("b")).unwrap(), 0);
    }

    pub(crate) fn remove_frees_the_name(store: &dyn FunctionStore) {
        let a = vault("a");
        store.insert(record("a", "temp")).unwrap();
        store.remove(&a, "temp").unwrap();
        assert!(matches!(store.remove(&a, "temp"), Err(StoreError::NotFound { .. })));
        store.insert(record("a", "TEMP")).unwrap();
    }

    pub(crate) fn replace_requires_existing(store: &dyn FunctionStore) {
        assert!(matches!(
            store.replace(record("a", "ghost")),
            Err(StoreError::NotFound { .. })
        ));
    }

    pub(crate) fn remove_vault_cascades(store: &dyn FunctionStore) {
        for name in ["one", "two"] {
            store.insert(record("a", name)).unwrap();
        }
        store.insert(record("b", "one")).unwrap();
        assert_eq!(store.remove_vault(&vault("a")).unwrap(), 2);
        assert!(store.list(&vault("a")).unwrap().is_empty());
        assert_eq!(store.list(&vault("b")).unwrap().len(), 1);
        store.insert(record("a", "one")).unwrap();
    }

    pub(crate) fn record_use_counts(store: &dyn FunctionStore) {
        let a = vault("a");
        store.insert(record("a", "used")).unwrap();
        store.record_use(&a, "used", Utc::now()).unwrap();
        let updated = store.record_use(&a, "used", Utc::now()).unwrap();
        assert_eq!(updated.usage.usage_count, 2);
        assert_eq!(store.get(&a, "used").unwrap().unwrap().usage.usage_count, 2);
        assert!(store.record_use(&a, "missing", Utc::now()).is_err());
    }

    pub(crate) fn run_all(make: impl Fn() -> Box<dyn FunctionStore>) {
        insert_and_get(make().as_ref());
        duplicate_ignores_case(make().as_ref());
        list_is_sorted_and_scoped(make().as_ref());
        revisions_track_mutations(make().as_ref());
        remove_frees_the_name(make().as_ref());
        replace_requires_existing(make().as_ref());
        remove_vault_cascades(make().as_ref());
        record_use_counts(make().as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_memory_store_conformance() {
        conformance::run_all(|| Box::new(MemoryStore::new()));
    }

    #[test]
    fn test_concurrent_inserts_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let name = if i % 2 == 0 { "helper" } else { "Helper" };
                std::thread::spawn(move || store.insert(conformance::record("a", name)).is_ok())
            })
            .collect();
        let wins = handles.into_iter().filter_map(|h| h.join().ok()).filter(|won| *won).count();
        assert_eq!(wins, 1);
        assert_eq!(store.list(&conformance::vault("a")).unwrap().len(), 1);
    }

    #[test]
    fn test_store_error_maps_to_storage() {
        let err: InternalError = StoreError::backend("disk gone").into();
        assert_eq!(err.to_string(), "storage failure: backend error: disk gone");
    }
}

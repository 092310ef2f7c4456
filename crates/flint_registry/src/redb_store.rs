//! redb-backed function store.
//!
//! Three tables:
//!
//! - `functions`: `vault\0name` -> JSON-encoded [`FunctionRecord`]
//! - `names`: `vault\0lowercase(name)` -> stored name (uniqueness index)
//! - `revisions`: `vault` -> mutation counter
//!
//! Each mutation is one write transaction. redb serializes writers, so the
//! uniqueness check and the insert cannot interleave with another writer.

use crate::definition::FunctionRecord;
use crate::store::{folded, FunctionStore, StoreError};
use chrono::{DateTime, Utc};
use flint_core::VaultId;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use std::path::Path;

const FUNCTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("functions");
const NAMES: TableDefinition<&str, &str> = TableDefinition::new("names");
const REVISIONS: TableDefinition<&str, u64> = TableDefinition::new("revisions");

fn key(vault: &VaultId, name: &str) -> String {
    format!("{}\0{}", vault.as_str(), name)
}

/// Key range covering one vault
fn vault_range(vault: &VaultId) -> (String, String) {
    (format!("{}\0", vault.as_str()), format!("{}\u{1}", vault.as_str()))
}

fn encode(record: &FunctionRecord) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record).map_err(StoreError::serialization)
}

fn decode(bytes: &[u8]) -> Result<FunctionRecord, StoreError> {
    serde_json::from_slice(bytes).map_err(StoreError::serialization)
}

fn bump(txn: &WriteTransaction, vault: &VaultId) -> Result<u64, StoreError> {
    let mut revisions = txn.open_table(REVISIONS).map_err(StoreError::backend)?;
    let next = revisions
        .get(vault.as_str())
        .map_err(StoreError::backend)?
        .map_or(0, |guard| guard.value())
        + 1;
    revisions.insert(vault.as_str(), next).map_err(StoreError::backend)?;
    Ok(next)
}

/// Persistent store in a single redb file
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(StoreError::backend)?;
        let store = Self { db };
        store.write(|txn| {
            txn.open_table(FUNCTIONS).map_err(StoreError::backend)?;
            txn.open_table(NAMES).map_err(StoreError::backend)?;
            txn.open_table(REVISIONS).map_err(StoreError::backend)?;
            Ok(())
        })?;
        tracing::debug!(path = %path.as_ref().display(), "redb store: opened");
        Ok(store)
    }

    /// Run `f` in a write transaction, committing only on success
    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let txn = self.db.begin_write().map_err(StoreError::backend)?;
        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(StoreError::backend)?;
                Ok(value)
            }
            Err(err) => {
                txn.abort().map_err(StoreError::backend)?;
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl FunctionStore for RedbStore {
    fn insert(&self, record: FunctionRecord) -> Result<u64, StoreError> {
        let vault = record.vault().clone();
        let name = record.name().to_string();
        let bytes = encode(&record)?;
        self.write(|txn| {
            let name_key = key(&vault, &folded(&name));
            {
                let mut names = txn.open_table(NAMES).map_err(StoreError::backend)?;
                let existing = names
                    .get(name_key.as_str())
                    .map_err(StoreError::backend)?
                    .map(|guard| guard.value().to_string());
                if let Some(existing) = existing {
                    return Err(StoreError::Duplicate {
                        name: name.clone(),
                        existing,
                    });
                }
                names.insert(name_key.as_str(), name.as_str()).map_err(StoreError::backend)?;
            }
            {
                let mut functions = txn.open_table(FUNCTIONS).map_err(StoreError::backend)?;
                functions
                    .insert(key(&vault, &name).as_str(), bytes.as_slice())
                    .map_err(StoreError::backend)?;
            }
            bump(txn, &vault)
        })
    }

    fn replace(&self, record: FunctionRecord) -> Result<u64, StoreError> {
        let vault = record.vault().clone();
        let name = record.name().to_string();
        let bytes = encode(&record)?;
        self.write(|txn| {
            {
                let mut functions = txn.open_table(FUNCTIONS).map_err(StoreError::backend)?;
                let function_key = key(&vault, &name);
                let present = functions
                    .get(function_key.as_str())
                    .map_err(StoreError::backend)?
                    .is_some();
                if !present {
                    return Err(StoreError::NotFound { name: name.clone() });
                }
                functions
                    .insert(function_key.as_str(), bytes.as_slice())
                    .map_err(StoreError::backend)?;
            }
            bump(txn, &vault)
        })
    }

    fn remove(&self, vault: &VaultId, name: &str) -> Result<FunctionRecord, StoreError> {
        self.write(|txn| {
            let record = {
                let mut functions = txn.open_table(FUNCTIONS).map_err(StoreError::backend)?;
                let removed = functions
                    .remove(key(vault, name).as_str())
                    .map_err(StoreError::backend)?
                    .map(|guard| guard.value().to_vec());
                match removed {
                    Some(bytes) => decode(&bytes)?,
                    None => return Err(StoreError::NotFound { name: name.to_string() }),
                }
            };
            {
                let mut names = txn.open_table(NAMES).map_err(StoreError::backend)?;
                names
                    .remove(key(vault, &folded(name)).as_str())
                    .map_err(StoreError::backend)?;
            }
            bump(txn, vault)?;
            Ok(record)
        })
    }

    fn remove_vault(&self, vault: &VaultId) -> Result<usize, StoreError> {
        let (start, end) = vault_range(vault);
        self.write(|txn| {
            let removed = {
                let mut functions = txn.open_table(FUNCTIONS).map_err(StoreError::backend)?;
                let mut keys = Vec::new();
                for entry in functions
                    .range(start.as_str()..end.as_str())
                    .map_err(StoreError::backend)?
                {
                    let (k, _) = entry.map_err(StoreError::backend)?;
                    keys.push(k.value().to_string());
                }
                for k in &keys {
                    functions.remove(k.as_str()).map_err(StoreError::backend)?;
                }
                keys.len()
            };
            {
                let mut names = txn.open_table(NAMES).map_err(StoreError::backend)?;
                let mut keys = Vec::new();
                for entry in names
                    .range(start.as_str()..end.as_str())
                    .map_err(StoreError::backend)?
                {
                    let (k, _) = entry.map_err(StoreError::backend)?;
                    keys.push(k.value().to_string());
                }
                for k in &keys {
                    names.remove(k.as_str()).map_err(StoreError::backend)?;
                }
            }
            bump(txn, vault)?;
            Ok(removed)
        })
    }

    fn get(&self, vault: &VaultId, name: &str) -> Result<Option<FunctionRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(StoreError::backend)?;
        let functions = txn.open_table(FUNCTIONS).map_err(StoreError::backend)?;
        let bytes = functions
            .get(key(vault, name).as_str())
            .map_err(StoreError::backend)?
            .map(|guard| guard.value().to_vec());
        bytes.as_deref().map(decode).transpose()
    }

    fn list(&self, vault: &VaultId) -> Result<Vec<FunctionRecord>, StoreError> {
        let (start, end) = vault_range(vault);
        let txn = self.db.begin_read().map_err(StoreError::backend)?;
        let functions = txn.open_table(FUNCTIONS).map_err(StoreError::backend)?;
        let mut records = Vec::new();
        for entry in functions
            .range(start.as_str()..end.as_str())
            .map_err(StoreError::backend)?
        {
            let (_, value) = entry.map_err(StoreError::backend)?;
            records.push(decode(value.value())?);
        }
        Ok(records)
    }

    fn revision(&self, vault: &VaultId) -> Result<u64, StoreError> {
        let txn = self.db.begin_read().map_err(StoreError::backend)?;
        let revisions = txn.open_table(REVISIONS).map_err(StoreError::backend)?;
        let revision = revisions
            .get(vault.as_str())
            .map_err(StoreError::backend)?
            .map_or(0, |guard| guard.value());
        Ok(revision)
    }

    fn record_use(&self, vault: &VaultId, name: &str, at: DateTime<Utc>) -> Result<FunctionRecord, StoreError> {
        self.write(|txn| {
            let mut functions = txn.open_table(FUNCTIONS).map_err(StoreError::backend)?;
            let function_key = key(vault, name);
            let bytes = functions
                .get(function_key.as_str())
                .map_err(StoreError::backend)?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StoreError::NotFound { name: name.to_string() })?;
            let mut record = decode(&bytes)?;
            record.usage.record_use(at);
            functions
                .insert(function_key.as_str(), encode(&record)?.as_slice())
                .map_err(StoreError::backend)?;
            Ok(record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_redb_store_conformance() {
        let dir = TempDir::new().unwrap();
        let counter = std::sync::atomic::AtomicUsize::new(0);
        conformance::run_all(|| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Box::new(RedbStore::open(dir.path().join(format!("functions-{n}.redb"))).unwrap())
        });
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("functions.redb");
        let original = conformance::record("work", "persisted");
        {
            let store = RedbStore::open(&path).unwrap();
            store.insert(original.clone()).unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        let vault = conformance::vault("work");
        assert_eq!(store.get(&vault, "persisted").unwrap(), Some(original));
        assert_eq!(store.revision(&vault).unwrap(), 1);
        assert!(matches!(
            store.insert(conformance::record("work", "Persisted")),
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_failed_insert_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::open(dir.path().join("functions.redb")).unwrap();
        let vault = conformance::vault("work");
        store.insert(conformance::record("work", "helper")).unwrap();
        store.insert(conformance::record("work", "HELPER")).unwrap_err();
        assert_eq!(store.revision(&vault).unwrap(), 1);
        assert!(store.get(&vault, "HELPER").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_inserts_one_winner() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbStore::open(dir.path().join("functions.redb")).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let name = if i % 2 == 0 { "helper" } else { "Helper" };
                std::thread::spawn(move || store.insert(conformance::record("work", name)).is_ok())
            })
            .collect();
        let wins = handles.into_iter().filter_map(|h| h.join().ok()).filter(|won| *won).count();
        assert_eq!(wins, 1);
        assert_eq!(store.list(&conformance::vault("work")).unwrap().len(), 1);
    }
}

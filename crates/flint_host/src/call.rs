//! Typed capability calls.
//!
//! The sandbox hands over a capability and a JSON argument list. Both are
//! turned into one [`HostCall`] variant here and matched exhaustively from
//! then on.

use crate::api::{CreateNoteOptions, HostApi, HostError, ListNotesOptions, SearchOptions, UpdateNoteOptions};
use flint_core::{Capability, VaultId};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One capability invocation with decoded arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    /// `notes.get(id)`
    NotesGet {
        /// Note id
        id: String,
    },
    /// `notes.list(options?)`
    NotesList {
        /// Filters
        options: ListNotesOptions,
    },
    /// `notes.create(options)`
    NotesCreate {
        /// New note
        options: CreateNoteOptions,
    },
    /// `notes.update(id, changes)`
    NotesUpdate {
        /// Note id
        id: String,
        /// Changes
        changes: UpdateNoteOptions,
    },
    /// `notes.remove(id)`
    NotesRemove {
        /// Note id
        id: String,
    },
    /// `notes.search(query, options?)`
    NotesSearch {
        /// Query text
        query: String,
        /// Options
        options: SearchOptions,
    },
    /// `vaults.current()`
    VaultsCurrent,
    /// `vaults.list()`
    VaultsList,
    /// `links.backlinks(id)`
    LinksBacklinks {
        /// Target note id
        id: String,
    },
}

impl HostCall {
    /// Decode the arguments for a capability
    ///
    /// `null` stands for an omitted optional argument, since `undefined`
    /// marshals to `null`.
    ///
    /// # Errors
    ///
    /// Returns a message suitable for a `TypeError` when the arguments do not
    /// match the declared signature.
    pub fn parse(capability: Capability, args: Vec<Value>) -> Result<Self, String> {
        let mut args = Args::new(capability, args);
        let call = match capability {
            Capability::NotesGet => Self::NotesGet { id: args.string("id")? },
            Capability::NotesList => Self::NotesList {
                options: args.optional("options")?.unwrap_or_default(),
            },
            Capability::NotesCreate => Self::NotesCreate {
                options: args.required("options")?,
            },
            Capability::NotesUpdate => Self::NotesUpdate {
                id: args.string("id")?,
                changes: args.required("changes")?,
            },
            Capability::NotesRemove => Self::NotesRemove { id: args.string("id")? },
            Capability::NotesSearch => Self::NotesSearch {
                query: args.string("query")?,
                options: args.optional("options")?.unwrap_or_default(),
            },
            Capability::VaultsCurrent => Self::VaultsCurrent,
            Capability::VaultsList => Self::VaultsList,
            Capability::LinksBacklinks => Self::LinksBacklinks { id: args.string("id")? },
        };
        args.finish()?;
        Ok(call)
    }

    /// Capability this call exercises
    #[must_use]
    pub fn capability(&self) -> Capability {
        match self {
            Self::NotesGet { .. } => Capability::NotesGet,
            Self::NotesList { .. } => Capability::NotesList,
            Self::NotesCreate { .. } => Capability::NotesCreate,
            Self::NotesUpdate { .. } => Capability::NotesUpdate,
            Self::NotesRemove { .. } => Capability::NotesRemove,
            Self::NotesSearch { .. } => Capability::NotesSearch,
            Self::VaultsCurrent => Capability::VaultsCurrent,
            Self::VaultsList => Capability::VaultsList,
            Self::LinksBacklinks { .. } => Capability::LinksBacklinks,
        }
    }

    /// Run the call against a host
    ///
    /// # Errors
    ///
    /// Propagates the host's rejection.
    pub async fn execute(self, host: &dyn HostApi, vault: &VaultId) -> Result<Value, HostError> {
        match self {
            Self::NotesGet { id } => host.get_note(vault, &id).await,
            Self::NotesList { options } => host.list_notes(vault, options).await,
            Self::NotesCreate { options } => host.create_note(vault, options).await,
            Self::NotesUpdate { id, changes } => host.update_note(vault, &id, changes).await,
            Self::NotesRemove { id } => host.remove_note(vault, &id).await,
            Self::NotesSearch { query, options } => host.search_notes(vault, &query, options).await,
            Self::VaultsCurrent => host.current_vault(vault).await,
            Self::VaultsList => host.list_vaults(vault).await,
            Self::LinksBacklinks { id } => host.backlinks(vault, &id).await,
        }
    }
}

/// Positional argument reader
struct Args {
    capability: Capability,
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Args {
    fn new(capability: Capability, values: Vec<Value>) -> Self {
        Self {
            capability,
            values: values.into_iter(),
            position: 0,
        }
    }

    fn next(&mut self) -> Option<Value> {
        self.position += 1;
        self.values.next().filter(|v| !v.is_null())
    }

    fn error(&self, name: &str, detail: impl std::fmt::Display) -> String {
        format!("{}: argument {} ('{name}') {detail}", self.capability, self.position)
    }

    fn string(&mut self, name: &str) -> Result<String, String> {
        match self.next() {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(self.error(name, format!("must be a string, got {}", kind_of(&other)))),
            None => Err(self.error(name, "is required")),
        }
    }

    fn required<T: DeserializeOwned>(&mut self, name: &str) -> Result<T, String> {
        self.optional(name)?.ok_or_else(|| self.error(name, "is required"))
    }

    fn optional<T: DeserializeOwned>(&mut self, name: &str) -> Result<Option<T>, String> {
        match self.next() {
            Some(value @ Value::Object(_)) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| self.error(name, format!("is invalid: {e}"))),
            Some(other) => Err(self.error(name, format!("must be an object, got {}", kind_of(&other)))),
            None => Ok(None),
        }
    }

    fn finish(mut self) -> Result<(), String> {
        let expected = self.position;
        if self.values.any(|v| !v.is_null()) {
            return Err(format!("{}: expected at most {expected} arguments", self.capability));
        }
        Ok(())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_get() {
        let call = HostCall::parse(Capability::NotesGet, vec![json!("n1")]).unwrap();
        assert_eq!(call, HostCall::NotesGet { id: "n1".into() });
        assert_eq!(call.capability(), Capability::NotesGet);
    }

    #[test]
    fn test_parse_rejects_wrong_type() {
        let err = HostCall::parse(Capability::NotesGet, vec![json!(42)]).unwrap_err();
        assert_eq!(err, "notes.get: argument 1 ('id') must be a string, got number");
    }

    #[test]
    fn test_parse_missing_required() {
        let err = HostCall::parse(Capability::NotesCreate, vec![]).unwrap_err();
        assert!(err.contains("is required"));
    }

    #[test]
    fn test_parse_optional_null() {
        let call = HostCall::parse(Capability::NotesList, vec![Value::Null]).unwrap();
        assert_eq!(
            call,
            HostCall::NotesList {
                options: ListNotesOptions::default()
            }
        );
    }

    #[test]
    fn test_parse_too_many() {
        let err = HostCall::parse(Capability::VaultsList, vec![json!(1)]).unwrap_err();
        assert_eq!(err, "vaults.list: expected at most 0 arguments");
    }

    #[test]
    fn test_parse_search_with_options() {
        let call = HostCall::parse(Capability::NotesSearch, vec![json!("rust"), json!({"limit": 2})]).unwrap();
        let HostCall::NotesSearch { query, options } = call else {
            panic!("expected search");
        };
        assert_eq!(query, "rust");
        assert_eq!(options.limit, Some(2));
    }

    #[test]
    fn test_parse_unknown_option_field() {
        let err = HostCall::parse(Capability::NotesList, vec![json!({"colour": "red"})]).unwrap_err();
        assert!(err.starts_with("notes.list: argument 1 ('options') is invalid"));
    }
}

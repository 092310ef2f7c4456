//! The host promise contract and the shapes that cross it.
//!
//! Field names and optionality mirror the ambient declaration files, so a
//! value the checker accepted deserializes here and a value returned here
//! matches what the checker assumed.

use async_trait::async_trait;
use flint_core::VaultId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Id
    pub id: String,
    /// Title
    pub title: String,
    /// Markdown body
    pub content: String,
    /// Tags
    pub tags: Vec<String>,
    /// Folder, `null` at the vault root
    pub folder: Option<String>,
    /// RFC 3339 creation time
    pub created_at: String,
    /// RFC 3339 modification time
    pub updated_at: String,
}

/// Note without its body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSummary {
    /// Id
    pub id: String,
    /// Title
    pub title: String,
    /// Tags
    pub tags: Vec<String>,
    /// RFC 3339 modification time
    pub updated_at: String,
}

impl From<&Note> for NoteSummary {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            tags: note.tags.clone(),
            updated_at: note.updated_at.clone(),
        }
    }
}

/// `notes.list` filters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListNotesOptions {
    /// Only notes carrying this tag
    #[serde(default)]
    pub tag: Option<String>,
    /// Only notes in this folder
    #[serde(default)]
    pub folder: Option<String>,
    /// Page size
    #[serde(default)]
    pub limit: Option<usize>,
    /// Page offset
    #[serde(default)]
    pub offset: Option<usize>,
}

/// `notes.create` input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateNoteOptions {
    /// Title
    pub title: String,
    /// Body
    #[serde(default)]
    pub content: Option<String>,
    /// Tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Folder
    #[serde(default)]
    pub folder: Option<String>,
}

/// `notes.update` changes; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateNoteOptions {
    /// New title
    #[serde(default)]
    pub title: Option<String>,
    /// New body
    #[serde(default)]
    pub content: Option<String>,
    /// New tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// New folder; `null` moves the note to the root
    #[serde(default, deserialize_with = "double_option")]
    pub folder: Option<Option<String>>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// `notes.search` options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchOptions {
    /// Maximum results
    #[serde(default)]
    pub limit: Option<usize>,
    /// Only notes carrying all of these tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Matching note
    pub note: NoteSummary,
    /// Relevance, higher is better
    pub score: f64,
    /// Text around the first match
    pub snippet: String,
}

/// Vault metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultInfo {
    /// Id
    pub id: String,
    /// Display name
    pub name: String,
    /// Number of notes
    pub note_count: usize,
}

/// A note linking to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backlink {
    /// Linking note
    pub source: NoteSummary,
    /// Line containing the link
    pub context: String,
}

/// Rejection of a host promise; the message is what the script sees
#[derive(Debug, Error)]
pub enum HostError {
    /// Requested entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind
        kind: &'static str,
        /// Requested id
        id: String,
    },

    /// Input rejected by the domain layer
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Any other failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HostError {
    /// Shorthand for [`HostError::NotFound`] on a note
    #[must_use]
    pub fn note_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "note",
            id: id.into(),
        }
    }
}

/// Serialize a domain value for the sandbox
///
/// # Errors
///
/// Returns [`HostError::Other`] if the value cannot be represented as JSON.
pub fn to_value<T: Serialize>(value: &T) -> Result<Value, HostError> {
    serde_json::to_value(value).map_err(|e| HostError::Other(e.into()))
}

/// Domain operations, one method per capability
///
/// The vault is always passed explicitly. Every method resolves to a plain
/// JSON value or rejects with a message.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// `notes.get`; resolves to `null` for an unknown id
    async fn get_note(&self, vault: &VaultId, id: &str) -> Result<Value, HostError>;

    /// `notes.list`
    async fn list_notes(&self, vault: &VaultId, options: ListNotesOptions) -> Result<Value, HostError>;

    /// `notes.create`
    async fn create_note(&self, vault: &VaultId, options: CreateNoteOptions) -> Result<Value, HostError>;

    /// `notes.update`
    async fn update_note(&self, vault: &VaultId, id: &str, changes: UpdateNoteOptions) -> Result<Value, HostError>;

    /// `notes.remove`; resolves to whether a note was removed
    async fn remove_note(&self, vault: &VaultId, id: &str) -> Result<Value, HostError>;

    /// `notes.search`
    async fn search_notes(&self, vault: &VaultId, query: &str, options: SearchOptions) -> Result<Value, HostError>;

    /// `vaults.current`
    async fn current_vault(&self, vault: &VaultId) -> Result<Value, HostError>;

    /// `vaults.list`
    async fn list_vaults(&self, vault: &VaultId) -> Result<Value, HostError>;

    /// `links.backlinks`
    async fn backlinks(&self, vault: &VaultId, id: &str) -> Result<Value, HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_note_serializes_camel_case() {
        let note = Note {
            id: "n1".into(),
            title: "T".into(),
            content: String::new(),
            tags: vec![],
            folder: None,
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: "2024-01-01T00:00:00Z".into(),
        };
        let value = to_value(&note).unwrap();
        assert_eq!(value["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(value["folder"], Value::Null);
    }

    #[test]
    fn test_options_reject_unknown_fields() {
        let err = serde_json::from_value::<CreateNoteOptions>(json!({"title": "a", "colour": "red"}));
        assert!(err.is_err());
    }

    #[test]
    fn test_update_folder_null_vs_absent() {
        let absent: UpdateNoteOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(absent.folder, None);
        let cleared: UpdateNoteOptions = serde_json::from_value(json!({"folder": null})).unwrap();
        assert_eq!(cleared.folder, Some(None));
        let moved: UpdateNoteOptions = serde_json::from_value(json!({"folder": "x"})).unwrap();
        assert_eq!(moved.folder, Some(Some("x".to_string())));
    }

    #[test]
    fn test_host_error_messages() {
        assert_eq!(HostError::note_not_found("n9").to_string(), "note not found: n9");
        let wrapped: HostError = anyhow::anyhow!("disk on fire").into();
        assert_eq!(wrapped.to_string(), "disk on fire");
    }
}

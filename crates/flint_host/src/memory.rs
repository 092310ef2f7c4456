//! In-memory vault host for the CLI and tests.

use crate::api::{
    to_value, Backlink, CreateNoteOptions, HostApi, HostError, ListNotesOptions, Note, NoteSummary, SearchOptions,
    SearchResult, UpdateNoteOptions, VaultInfo,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use flint_core::VaultId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// Default number of search hits
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Longest snippet returned by search
const SNIPPET_CHARS: usize = 120;

/// Contents of one vault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultData {
    /// Display name
    pub name: String,
    /// Notes by id, in creation order
    pub notes: IndexMap<String, Note>,
}

/// Vaults held in process memory
///
/// Unknown vaults are created empty on first use.
#[derive(Debug, Default)]
pub struct MemoryHost {
    vaults: RwLock<IndexMap<VaultId, VaultData>>,
}

impl MemoryHost {
    /// Create an empty host
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named vault
    #[must_use]
    pub fn with_vault(mut self, vault: &VaultId, name: impl Into<String>) -> Self {
        self.vaults.get_mut().entry(vault.clone()).or_default().name = name.into();
        self
    }

    /// Add a note
    #[must_use]
    pub fn with_note(mut self, vault: &VaultId, note: Note) -> Self {
        self.vaults
            .get_mut()
            .entry(vault.clone())
            .or_default()
            .notes
            .insert(note.id.clone(), note);
        self
    }

    /// Load vaults from JSON shaped as `{ "<vault id>": { "name": ..., "notes": { "<id>": Note } } }`
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Invalid`] when the JSON does not have that shape.
    pub fn from_json(value: Value) -> Result<Self, HostError> {
        let vaults: IndexMap<VaultId, VaultData> =
            serde_json::from_value(value).map_err(|e| HostError::Invalid(e.to_string()))?;
        Ok(Self {
            vaults: RwLock::new(vaults),
        })
    }

    /// Snapshot every vault as JSON
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Other`] if serialization fails.
    pub async fn to_json(&self) -> Result<Value, HostError> {
        let vaults = self.vaults.read().await;
        to_value(&*vaults)
    }

    /// Number of notes in a vault
    pub async fn note_count(&self, vault: &VaultId) -> usize {
        self.vaults.read().await.get(vault).map_or(0, |v| v.notes.len())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn new_note_id() -> String {
    format!("note_{}", uuid::Uuid::new_v4().simple())
}

fn require_title(title: &str) -> Result<(), HostError> {
    if title.trim().is_empty() {
        return Err(HostError::Invalid("title must not be empty".to_string()));
    }
    Ok(())
}

/// Case-insensitive occurrence count
fn occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.to_lowercase().matches(needle).count()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Line of `content` holding the first match, or its first line
fn snippet(content: &str, needle: &str) -> String {
    let line = content
        .lines()
        .find(|line| line.to_lowercase().contains(needle))
        .or_else(|| content.lines().next())
        .unwrap_or("");
    truncate_chars(line.trim(), SNIPPET_CHARS)
}

/// Whether `content` holds a `[[target]]` or `[[target|alias]]` link
fn link_line<'c>(content: &'c str, targets: &[&str]) -> Option<&'c str> {
    content.lines().find(|line| {
        targets.iter().any(|target| {
            line.contains(&format!("[[{target}]]")) || line.contains(&format!("[[{target}|"))
        })
    })
}

#[async_trait]
impl HostApi for MemoryHost {
    async fn get_note(&self, vault: &VaultId, id: &str) -> Result<Value, HostError> {
        let vaults = self.vaults.read().await;
        match vaults.get(vault).and_then(|v| v.notes.get(id)) {
            Some(note) => to_value(note),
            None => Ok(Value::Null),
        }
    }

    async fn list_notes(&self, vault: &VaultId, options: ListNotesOptions) -> Result<Value, HostError> {
        let vaults = self.vaults.read().await;
        let Some(data) = vaults.get(vault) else {
            return Ok(Value::Array(Vec::new()));
        };
        let summaries: Vec<NoteSummary> = data
            .notes
            .values()
            .filter(|n| options.tag.as_ref().is_none_or(|t| n.tags.contains(t)))
            .filter(|n| options.folder.as_ref().is_none_or(|f| n.folder.as_ref() == Some(f)))
            .skip(options.offset.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .map(NoteSummary::from)
            .collect();
        to_value(&summaries)
    }

    async fn create_note(&self, vault: &VaultId, options: CreateNoteOptions) -> Result<Value, HostError> {
        require_title(&options.title)?;
        let timestamp = now();
        let note = Note {
            id: new_note_id(),
            title: options.title,
            content: options.content.unwrap_or_default(),
            tags: options.tags.unwrap_or_default(),
            folder: options.folder,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };
        let value = to_value(&note)?;
        let mut vaults = self.vaults.write().await;
        vaults.entry(vault.clone()).or_default().notes.insert(note.id.clone(), note);
        tracing::debug!(vault = %vault, "note created");
        Ok(value)
    }

    async fn update_note(&self, vault: &VaultId, id: &str, changes: UpdateNoteOptions) -> Result<Value, HostError> {
        let mut vaults = self.vaults.write().await;
        let note = vaults
            .get_mut(vault)
            .and_then(|v| v.notes.get_mut(id))
            .ok_or_else(|| HostError::note_not_found(id))?;
        if let Some(title) = changes.title {
            require_title(&title)?;
            note.title = title;
        }
        if let Some(content) = changes.content {
            note.content = content;
        }
        if let Some(tags) = changes.tags {
            note.tags = tags;
        }
        if let Some(folder) = changes.folder {
            note.folder = folder;
        }
        note.updated_at = now();
        to_value(note)
    }

    async fn remove_note(&self, vault: &VaultId, id: &str) -> Result<Value, HostError> {
        let mut vaults = self.vaults.write().await;
        let removed = vaults
            .get_mut(vault)
            .and_then(|v| v.notes.shift_remove(id))
            .is_some();
        Ok(Value::Bool(removed))
    }

    async fn search_notes(&self, vault: &VaultId, query: &str, options: SearchOptions) -> Result<Value, HostError> {
        let needle = query.trim().to_lowercase();
        let vaults = self.vaults.read().await;
        let Some(data) = vaults.get(vault) else {
            return Ok(Value::Array(Vec::new()));
        };
        let required_tags = options.tags.unwrap_or_default();
        let mut hits: Vec<SearchResult> = data
            .notes
            .values()
            .filter(|n| required_tags.iter().all(|t| n.tags.contains(t)))
            .filter_map(|n| {
                let score = occurrences(&n.title, &needle) * 3 + occurrences(&n.content, &needle);
                (score > 0).then(|| SearchResult {
                    note: NoteSummary::from(n),
                    score: score as f64,
                    snippet: snippet(&n.content, &needle),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.note.title.cmp(&b.note.title)));
        hits.truncate(options.limit.unwrap_or(DEFAULT_SEARCH_LIMIT));
        to_value(&hits)
    }

    async fn current_vault(&self, vault: &VaultId) -> Result<Value, HostError> {
        let vaults = self.vaults.read().await;
        let info = match vaults.get(vault) {
            Some(data) => VaultInfo {
                id: vault.to_string(),
                name: if data.name.is_empty() { vault.to_string() } else { data.name.clone() },
                note_count: data.notes.len(),
            },
            None => VaultInfo {
                id: vault.to_string(),
                name: vault.to_string(),
                note_count: 0,
            },
        };
        to_value(&info)
    }

    async fn list_vaults(&self, _vault: &VaultId) -> Result<Value, HostError> {
        let vaults = self.vaults.read().await;
        let infos: Vec<VaultInfo> = vaults
            .iter()
            .map(|(id, data)| VaultInfo {
                id: id.to_string(),
                name: if data.name.is_empty() { id.to_string() } else { data.name.clone() },
                note_count: data.notes.len(),
            })
            .collect();
        to_value(&infos)
    }

    async fn backlinks(&self, vault: &VaultId, id: &str) -> Result<Value, HostError> {
        let vaults = self.vaults.read().await;
        let data = vaults.get(vault).ok_or_else(|| HostError::note_not_found(id))?;
        let target = data.notes.get(id).ok_or_else(|| HostError::note_not_found(id))?;
        let targets = [target.title.as_str(), target.id.as_str()];
        let links: Vec<Backlink> = data
            .notes
            .values()
            .filter(|n| n.id != target.id)
            .filter_map(|n| {
                link_line(&n.content, &targets).map(|line| Backlink {
                    source: NoteSummary::from(n),
                    context: truncate_chars(line.trim(), SNIPPET_CHARS),
                })
            })
            .collect();
        to_value(&links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vault() -> VaultId {
        VaultId::new("v1").unwrap()
    }

    fn note(id: &str, title: &str, content: &str, tags: &[&str]) -> Note {
        Note {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            folder: None,
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    fn host() -> MemoryHost {
        MemoryHost::new()
            .with_vault(&vault(), "Research")
            .with_note(&vault(), note("a", "Rust", "Ownership and borrowing.\nSee [[Tokio]].", &["lang"]))
            .with_note(&vault(), note("b", "Tokio", "Async runtime for Rust.", &["lib"]))
            .with_note(&vault(), note("c", "Cooking", "Pasta and [[Tokio|runtime]] jokes.", &[]))
    }

    #[tokio::test]
    async fn test_get_missing_is_null() {
        assert_eq!(host().get_note(&vault(), "zzz").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let host = host();
        let created = host
            .create_note(
                &vault(),
                CreateNoteOptions {
                    title: "New".into(),
                    ..CreateNoteOptions::default()
                },
            )
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();
        assert!(id.starts_with("note_"));
        let fetched = host.get_note(&vault(), id).await.unwrap();
        assert_eq!(fetched["title"], "New");
        assert_eq!(host.note_count(&vault()).await, 4);
    }

    #[tokio::test]
    async fn test_create_requires_title() {
        let err = host()
            .create_note(&vault(), CreateNoteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_update_missing_rejects() {
        let err = host()
            .update_note(&vault(), "zzz", UpdateNoteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "note not found: zzz");
    }

    #[tokio::test]
    async fn test_update_changes_fields() {
        let host = host();
        let changes = UpdateNoteOptions {
            tags: Some(vec!["x".into()]),
            folder: Some(Some("inbox".into())),
            ..UpdateNoteOptions::default()
        };
        let updated = host.update_note(&vault(), "a", changes).await.unwrap();
        assert_eq!(updated["tags"], json!(["x"]));
        assert_eq!(updated["folder"], "inbox");
        assert_eq!(updated["title"], "Rust");
    }

    #[tokio::test]
    async fn test_remove() {
        let host = host();
        assert_eq!(host.remove_note(&vault(), "a").await.unwrap(), json!(true));
        assert_eq!(host.remove_note(&vault(), "a").await.unwrap(), json!(false));
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let host = host();
        let tagged = host
            .list_notes(
                &vault(),
                ListNotesOptions {
                    tag: Some("lib".into()),
                    ..ListNotesOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(tagged.as_array().unwrap().len(), 1);
        assert_eq!(tagged[0]["title"], "Tokio");
        let page = host
            .list_notes(
                &vault(),
                ListNotesOptions {
                    offset: Some(1),
                    limit: Some(1),
                    ..ListNotesOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page[0]["id"], "b");
    }

    #[tokio::test]
    async fn test_search_ranks_title_matches() {
        let hits = host().search_notes(&vault(), "rust", SearchOptions::default()).await.unwrap();
        let hits = hits.as_array().unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0]["note"]["title"], "Rust");
        assert_eq!(hits[1]["snippet"], "Async runtime for Rust.");
    }

    #[tokio::test]
    async fn test_backlinks() {
        let links = host().backlinks(&vault(), "b").await.unwrap();
        let links = links.as_array().unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0]["source"]["id"], "a");
        assert_eq!(links[0]["context"], "See [[Tokio]].");
    }

    #[tokio::test]
    async fn test_current_vault() {
        let info = host().current_vault(&vault()).await.unwrap();
        assert_eq!(info, json!({"id": "v1", "name": "Research", "noteCount": 3}));
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let snapshot = host().to_json().await.unwrap();
        let restored = MemoryHost::from_json(snapshot).unwrap();
        assert_eq!(restored.note_count(&vault()).await, 3);
    }
}

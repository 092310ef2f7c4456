//! Capability types for allowlist enforcement.
//!
//! A capability is one named host operation (`notes.get`, `vaults.list`, ...).
//! Names are parsed into the closed [`Capability`] enum exactly once, at the
//! boundary; everything past that point matches on the enum.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Capability namespaces exposed as globals inside the sandbox
pub const NAMESPACES: [&str; 3] = ["notes", "vaults", "links"];

/// One host operation reachable from sandboxed code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Capability {
    /// `notes.get(id)`
    NotesGet,
    /// `notes.list(options?)`
    NotesList,
    /// `notes.create(options)`
    NotesCreate,
    /// `notes.update(id, changes)`
    NotesUpdate,
    /// `notes.remove(id)`
    NotesRemove,
    /// `notes.search(query, options?)`
    NotesSearch,
    /// `vaults.current()`
    VaultsCurrent,
    /// `vaults.list()`
    VaultsList,
    /// `links.backlinks(id)`
    LinksBacklinks,
}

impl Capability {
    /// Every capability, in declaration order
    pub const ALL: [Capability; 9] = [
        Self::NotesGet,
        Self::NotesList,
        Self::NotesCreate,
        Self::NotesUpdate,
        Self::NotesRemove,
        Self::NotesSearch,
        Self::VaultsCurrent,
        Self::VaultsList,
        Self::LinksBacklinks,
    ];

    /// Dotted capability name, e.g. `notes.get`
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotesGet => "notes.get",
            Self::NotesList => "notes.list",
            Self::NotesCreate => "notes.create",
            Self::NotesUpdate => "notes.update",
            Self::NotesRemove => "notes.remove",
            Self::NotesSearch => "notes.search",
            Self::VaultsCurrent => "vaults.current",
            Self::VaultsList => "vaults.list",
            Self::LinksBacklinks => "links.backlinks",
        }
    }

    /// Global namespace object the capability is installed on
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::NotesGet
            | Self::NotesList
            | Self::NotesCreate
            | Self::NotesUpdate
            | Self::NotesRemove
            | Self::NotesSearch => "notes",
            Self::VaultsCurrent | Self::VaultsList => "vaults",
            Self::LinksBacklinks => "links",
        }
    }

    /// Member name within the namespace, e.g. `get`
    #[must_use]
    pub fn member(self) -> &'static str {
        let name = self.name();
        &name[self.namespace().len() + 1..]
    }

    /// Whether the operation mutates the vault
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(self, Self::NotesCreate | Self::NotesUpdate | Self::NotesRemove)
    }

    /// Parse a dotted capability name
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Unknown`] if the name is not a known capability
    pub fn parse(name: &str) -> Result<Self, CapabilityError> {
        Self::ALL
            .into_iter()
            .find(|cap| cap.name() == name)
            .ok_or_else(|| CapabilityError::Unknown {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Capability {
    type Error = CapabilityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Capability> for String {
    fn from(cap: Capability) -> Self {
        cap.name().to_string()
    }
}

/// Capability parsing error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// Name does not denote any capability
    Unknown {
        /// The rejected name
        name: String,
    },
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { name } => write!(f, "Unknown capability: {}", name),
        }
    }
}

impl std::error::Error for CapabilityError {}

/// An allowlist of capabilities for one evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Create a new empty capability set
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: BTreeSet::new(),
        }
    }

    /// Every known capability
    #[must_use]
    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    /// Every non-mutating capability
    #[must_use]
    pub fn read_only() -> Self {
        Capability::ALL
            .into_iter()
            .filter(|cap| !cap.is_mutating())
            .collect()
    }

    /// Parse a set from dotted names
    ///
    /// # Errors
    ///
    /// Returns the first name that is not a known capability
    pub fn from_names<I, S>(names: I) -> Result<Self, CapabilityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| Capability::parse(name.as_ref()))
            .collect()
    }

    /// Grant a capability
    pub fn grant(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    /// Grant a capability, builder style
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.grant(capability);
        self
    }

    /// Revoke a capability
    pub fn revoke(&mut self, capability: Capability) {
        self.capabilities.remove(&capability);
    }

    /// Check whether a capability is allowed
    #[must_use]
    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Check whether a dotted name denotes an allowed capability
    ///
    /// Unknown names are never allowed.
    #[must_use]
    pub fn allows_name(&self, name: &str) -> bool {
        Capability::parse(name).is_ok_and(|cap| self.allows(cap))
    }

    /// Whether every capability in this set is non-mutating
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.capabilities.iter().all(|cap| !cap.is_mutating())
    }

    /// Iterate in stable order
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    /// Dotted names in stable order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(Capability::name).collect()
    }

    /// Number of capabilities
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.names().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_roundtrip_names() {
        for cap in Capability::ALL {
            assert_eq!(Capability::parse(cap.name()), Ok(cap));
        }
    }

    #[test]
    fn test_capability_unknown() {
        let err = Capability::parse("fs.read").unwrap_err();
        assert_eq!(format!("{}", err), "Unknown capability: fs.read");
    }

    #[test]
    fn test_capability_namespace_member() {
        assert_eq!(Capability::NotesGet.namespace(), "notes");
        assert_eq!(Capability::NotesGet.member(), "get");
        assert_eq!(Capability::LinksBacklinks.member(), "backlinks");
        assert_eq!(Capability::VaultsCurrent.member(), "current");
    }

    #[test]
    fn test_every_namespace_is_known() {
        for cap in Capability::ALL {
            assert!(NAMESPACES.contains(&cap.namespace()));
        }
    }

    #[test]
    fn test_mutating() {
        assert!(Capability::NotesCreate.is_mutating());
        assert!(!Capability::NotesSearch.is_mutating());
    }

    #[test]
    fn test_capability_set_allows() {
        let set = CapabilitySet::new().with(Capability::NotesGet);
        assert!(set.allows(Capability::NotesGet));
        assert!(!set.allows(Capability::NotesList));
        assert!(set.allows_name("notes.get"));
        assert!(!set.allows_name("process.exit"));
    }

    #[test]
    fn test_capability_set_read_only() {
        let set = CapabilitySet::read_only();
        assert!(set.is_read_only());
        assert!(!set.allows(Capability::NotesRemove));
        assert!(!CapabilitySet::all().is_read_only());
    }

    #[test]
    fn test_capability_set_from_names() {
        let set = CapabilitySet::from_names(["notes.get", "vaults.list"]).unwrap();
        assert_eq!(set.len(), 2);
        assert!(CapabilitySet::from_names(["notes.get", "nope"]).is_err());
    }

    #[test]
    fn test_capability_set_serde() {
        let set = CapabilitySet::from_names(["notes.list", "notes.get"]).unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["notes.get","notes.list"]"#);
        let back: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_capability_set_rejects_unknown_json() {
        let parsed: Result<CapabilitySet, _> = serde_json::from_str(r#"["fs.write"]"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_revoke() {
        let mut set = CapabilitySet::all();
        set.revoke(Capability::NotesRemove);
        assert!(!set.allows(Capability::NotesRemove));
        assert_eq!(set.len(), Capability::ALL.len() - 1);
    }
}

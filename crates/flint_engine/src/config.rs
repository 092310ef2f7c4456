//! Engine configuration.

use flint_core::{ResourceLimits, TierProfile, TrustTier};
use flint_sandbox::{SandboxConfig, DEFAULT_MAX_CONCURRENT};
use flint_ts::{CompileConfig, DEFAULT_MAX_CODE_BYTES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default ceiling on captured console entries per evaluation
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 1000;

/// Configuration load failure
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not a valid configuration
    #[error("invalid config {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
}

/// Where custom functions are persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RegistryBackend {
    /// Process memory; lost on exit
    #[default]
    Memory,
    /// A redb file
    Redb {
        /// Database file
        path: PathBuf,
    },
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Most isolates alive at once; further evaluations queue
    pub max_concurrent: usize,
    /// Largest accepted source, in bytes
    pub max_code_bytes: usize,
    /// Upper bound on any request's console capture
    pub max_log_entries: usize,
    /// Tier overrides; missing tiers use [`TierProfile::preset`]
    pub tiers: BTreeMap<TrustTier, TierProfile>,
    /// Custom function storage
    pub registry: RegistryBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_code_bytes: DEFAULT_MAX_CODE_BYTES,
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            tiers: BTreeMap::new(),
            registry: RegistryBackend::Memory,
        }
    }
}

impl EngineConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; absent fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Set the concurrency bound
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Set the source size ceiling
    #[must_use]
    pub fn with_max_code_bytes(mut self, bytes: usize) -> Self {
        self.max_code_bytes = bytes;
        self
    }

    /// Set the console capture ceiling
    #[must_use]
    pub fn with_max_log_entries(mut self, entries: usize) -> Self {
        self.max_log_entries = entries;
        self
    }

    /// Override one tier's profile
    #[must_use]
    pub fn with_tier(mut self, tier: TrustTier, profile: TierProfile) -> Self {
        self.tiers.insert(tier, profile);
        self
    }

    /// Persist custom functions in a redb file
    #[must_use]
    pub fn with_redb_registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry = RegistryBackend::Redb { path: path.into() };
        self
    }

    /// Profile for a tier, override first
    #[must_use]
    pub fn profile(&self, tier: TrustTier) -> TierProfile {
        self.tiers.get(&tier).cloned().unwrap_or_else(|| TierProfile::preset(tier))
    }

    /// Request limits with engine-wide ceilings applied
    #[must_use]
    pub fn clamp(&self, limits: ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            max_log_entries: limits.max_log_entries.min(self.max_log_entries),
            ..limits
        }
    }

    pub(crate) fn sandbox(&self) -> SandboxConfig {
        SandboxConfig::new().with_max_concurrent(self.max_concurrent)
    }

    pub(crate) fn compiler(&self) -> CompileConfig {
        CompileConfig {
            max_code_bytes: self.max_code_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_core::CapabilitySet;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(config.registry, RegistryBackend::Memory);
        assert_eq!(config.profile(TrustTier::Limited), TierProfile::preset(TrustTier::Limited));
    }

    #[test]
    fn test_partial_json() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "maxConcurrent": 2, "registry": { "kind": "redb", "path": "/tmp/fns.redb" } }"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.max_code_bytes, DEFAULT_MAX_CODE_BYTES);
        assert_eq!(
            config.registry,
            RegistryBackend::Redb {
                path: PathBuf::from("/tmp/fns.redb")
            }
        );
    }

    #[test]
    fn test_tier_override() {
        let custom = TierProfile {
            allowlist: CapabilitySet::new(),
            limits: ResourceLimits::new().with_time_budget(Duration::from_secs(1)),
        };
        let config = EngineConfig::new().with_tier(TrustTier::Full, custom.clone());
        assert_eq!(config.profile(TrustTier::Full), custom);
        assert_eq!(config.profile(TrustTier::ReadOnly), TierProfile::preset(TrustTier::ReadOnly));

        let round_trip: EngineConfig = serde_json::from_value(serde_json::to_value(&config).unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }

    #[test]
    fn test_clamp_log_entries() {
        let config = EngineConfig::new().with_max_log_entries(10);
        let mut limits = ResourceLimits::new();
        limits.max_log_entries = 500;
        assert_eq!(config.clamp(limits).max_log_entries, 10);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("flint.json");
        std::fs::write(&path, r#"{ "maxCodeBytes": 1024 }"#).unwrap();
        assert_eq!(EngineConfig::from_json_file(&path).unwrap().max_code_bytes, 1024);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(EngineConfig::from_json_file(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            EngineConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }
}

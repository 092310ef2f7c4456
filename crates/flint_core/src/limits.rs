//! Resource limits and trust tiers.
//!
//! A trust tier is caller-side configuration: it bundles an allowlist with
//! limits. The engine only ever sees the resulting allowlist and limits.

use crate::capability::{Capability, CapabilitySet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Smallest memory budget the sandbox accepts (8 MiB)
pub const MIN_MEMORY_BUDGET: usize = 8 * 1024 * 1024;

/// Resource limits for one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceLimits {
    /// Wall-clock budget for execution
    #[serde(with = "duration_ms", rename = "timeBudgetMs")]
    pub time_budget: Duration,
    /// Heap ceiling in bytes
    pub memory_budget: usize,
    /// Maximum capability calls per evaluation
    pub max_capability_calls: u32,
    /// Maximum size of the JSON result in bytes
    pub max_result_bytes: usize,
    /// Maximum captured console entries
    pub max_log_entries: usize,
}

impl ResourceLimits {
    /// Create limits with defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            time_budget: Duration::from_secs(5),
            memory_budget: 64 * 1024 * 1024,
            max_capability_calls: 100,
            max_result_bytes: 1024 * 1024,
            max_log_entries: 1000,
        }
    }

    /// Set the time budget
    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    /// Set the memory budget in bytes
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Set the capability call limit
    #[must_use]
    pub fn with_max_capability_calls(mut self, calls: u32) -> Self {
        self.max_capability_calls = calls;
        self
    }

    /// Set the result size limit
    #[must_use]
    pub fn with_max_result_bytes(mut self, bytes: usize) -> Self {
        self.max_result_bytes = bytes;
        self
    }

    /// Memory budget clamped to what the VM can honour
    #[must_use]
    pub fn effective_memory_budget(&self) -> usize {
        self.memory_budget.max(MIN_MEMORY_BUDGET)
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-chosen trust level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustTier {
    /// Broad capabilities, long deadline, high memory ceiling
    Full,
    /// Narrow capability subset, short deadline, low memory
    Limited,
    /// Non-mutating capabilities only
    ReadOnly,
}

impl TrustTier {
    /// All tiers
    pub const ALL: [TrustTier; 3] = [Self::Full, Self::Limited, Self::ReadOnly];

    /// Stable name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Limited => "limited",
            Self::ReadOnly => "read-only",
        }
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TrustTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "limited" => Ok(Self::Limited),
            "read-only" | "readonly" => Ok(Self::ReadOnly),
            other => Err(format!("unknown trust tier: {other}")),
        }
    }
}

/// Allowlist and limits for a trust tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierProfile {
    /// Capabilities granted
    pub allowlist: CapabilitySet,
    /// Limits applied
    pub limits: ResourceLimits,
}

impl TierProfile {
    /// Built-in profile for a tier
    #[must_use]
    pub fn preset(tier: TrustTier) -> Self {
        match tier {
            TrustTier::Full => Self {
                allowlist: CapabilitySet::all(),
                limits: ResourceLimits::new()
                    .with_time_budget(Duration::from_secs(30))
                    .with_memory_budget(256 * 1024 * 1024)
                    .with_max_capability_calls(1000),
            },
            TrustTier::Limited => Self {
                allowlist: CapabilitySet::new()
                    .with(Capability::NotesGet)
                    .with(Capability::NotesList)
                    .with(Capability::NotesSearch),
                limits: ResourceLimits::new()
                    .with_time_budget(Duration::from_secs(5))
                    .with_memory_budget(64 * 1024 * 1024)
                    .with_max_capability_calls(100),
            },
            TrustTier::ReadOnly => Self {
                allowlist: CapabilitySet::read_only(),
                limits: ResourceLimits::new()
                    .with_time_budget(Duration::from_secs(15))
                    .with_memory_budget(128 * 1024 * 1024)
                    .with_max_capability_calls(500),
            },
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_default() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.time_budget, Duration::from_secs(5));
        assert_eq!(limits.max_capability_calls, 100);
    }

    #[test]
    fn test_limits_builder() {
        let limits = ResourceLimits::new()
            .with_time_budget(Duration::from_millis(250))
            .with_memory_budget(1024);
        assert_eq!(limits.time_budget.as_millis(), 250);
        assert_eq!(limits.effective_memory_budget(), MIN_MEMORY_BUDGET);
    }

    #[test]
    fn test_limits_serde_millis() {
        let limits = ResourceLimits::new().with_time_budget(Duration::from_millis(1500));
        let json = serde_json::to_value(&limits).unwrap();
        assert_eq!(json["timeBudgetMs"], 1500);
        let back: ResourceLimits = serde_json::from_value(json).unwrap();
        assert_eq!(back, limits);
    }

    #[test]
    fn test_limits_partial_json_uses_defaults() {
        let limits: ResourceLimits = serde_json::from_str(r#"{"timeBudgetMs": 2000}"#).unwrap();
        assert_eq!(limits.time_budget, Duration::from_secs(2));
        assert_eq!(limits.max_log_entries, 1000);
    }

    #[test]
    fn test_tier_presets() {
        let read_only = TierProfile::preset(TrustTier::ReadOnly);
        assert!(read_only.allowlist.is_read_only());

        let limited = TierProfile::preset(TrustTier::Limited);
        let full = TierProfile::preset(TrustTier::Full);
        assert!(limited.allowlist.len() < full.allowlist.len());
        assert!(limited.limits.time_budget < full.limits.time_budget);
        assert!(limited.limits.memory_budget < full.limits.memory_budget);
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("read-only".parse::<TrustTier>(), Ok(TrustTier::ReadOnly));
        assert_eq!("full".parse::<TrustTier>(), Ok(TrustTier::Full));
        assert!("root".parse::<TrustTier>().is_err());
    }
}

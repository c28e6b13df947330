//! # Engine Configuration
//!
//! Tunables of the introspection engine. A configuration is fixed when an
//! [`Inspector`](crate::inspector::Inspector) is created; nothing in the
//! engine reads process-wide mutable state.
//!
//! ## Environment Variables
//!
//! [`EngineConfig::from_env`] starts from the defaults and applies:
//!
//! - `KINSIGHT_RESOLUTION`: `first-compatible` (default) or `strict`
//! - `KINSIGHT_MAX_LIST_ENTRIES`: upper bound of entries yielded by one list walk
//! - `KINSIGHT_RADIX_MAX_HEIGHT`: largest radix tree height considered valid
//! - `KINSIGHT_RADIX_LEAF_TYPE`: type name of radix tree leaves
//!
//! Values that do not parse are ignored with a warning.

use std::env;
use std::str::FromStr;

use tracing::warn;

/// How members with several candidate types are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resolution
{
    /// Use the first candidate whose rule accepts the member's bytes
    #[default]
    FirstCompatible,
    /// Refuse to pick; the caller selects a candidate explicitly
    Strict,
}

impl FromStr for Resolution
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "first-compatible" | "first_compatible" | "rules" | "auto" => Ok(Resolution::FirstCompatible),
            "strict" | "declared" => Ok(Resolution::Strict),
            _ => Err(format!("Unknown resolution mode: {s}. Use 'first-compatible' or 'strict'")),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig
{
    /// Default resolution of ambiguous members
    pub resolution: Resolution,
    /// Maximum number of entries a single list walk yields before giving up
    pub max_list_entries: usize,
    /// Largest valid radix tree height (leaf nodes have height 1)
    pub radix_max_height: u32,
    /// Bit set in a radix root's node pointer to mark it as an interior node
    pub radix_indirect_flag: u32,
    /// Type name used for radix tree leaves when the caller gives none
    pub radix_leaf_type: String,
    /// Symbol holding the per-CPU offset table
    pub per_cpu_offset_symbol: String,
    /// Symbol holding the number of possible CPUs
    pub cpu_count_symbol: String,
}

impl Default for EngineConfig
{
    fn default() -> Self
    {
        Self {
            resolution: Resolution::FirstCompatible,
            max_list_entries: 1 << 20,
            radix_max_height: 6,
            radix_indirect_flag: 1,
            radix_leaf_type: "page".to_string(),
            per_cpu_offset_symbol: "__per_cpu_offset".to_string(),
            cpu_count_symbol: "nr_cpu_ids".to_string(),
        }
    }
}

impl EngineConfig
{
    /// Defaults overridden by `KINSIGHT_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self
    {
        let mut config = Self::default();
        if let Some(resolution) = env_value("KINSIGHT_RESOLUTION") {
            config.resolution = resolution;
        }
        if let Some(max) = env_value("KINSIGHT_MAX_LIST_ENTRIES") {
            config.max_list_entries = max;
        }
        if let Some(height) = env_value("KINSIGHT_RADIX_MAX_HEIGHT") {
            config.radix_max_height = height;
        }
        if let Ok(leaf) = env::var("KINSIGHT_RADIX_LEAF_TYPE") {
            if !leaf.is_empty() {
                config.radix_leaf_type = leaf;
            }
        }
        config
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: Resolution) -> Self
    {
        self.resolution = resolution;
        self
    }

    #[must_use]
    pub fn with_max_list_entries(mut self, max: usize) -> Self
    {
        self.max_list_entries = max;
        self
    }

    #[must_use]
    pub fn with_radix_max_height(mut self, height: u32) -> Self
    {
        self.radix_max_height = height;
        self
    }

    #[must_use]
    pub fn with_radix_leaf_type(mut self, name: impl Into<String>) -> Self
    {
        self.radix_leaf_type = name.into();
        self
    }

    #[must_use]
    pub fn with_per_cpu_offset_symbol(mut self, name: impl Into<String>) -> Self
    {
        self.per_cpu_offset_symbol = name.into();
        self
    }

    #[must_use]
    pub fn with_cpu_count_symbol(mut self, name: impl Into<String>) -> Self
    {
        self.cpu_count_symbol = name.into();
        self
    }
}

fn env_value<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, value = %raw, error = %err, "Ignoring invalid configuration value");
            None
        }
    }
}

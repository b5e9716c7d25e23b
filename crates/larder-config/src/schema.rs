//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Per-channel overrides, keyed by channel name
    #[serde(default)]
    pub channels: HashMap<String, RawChannelConfig>,

    /// Periodically refreshed resources
    #[serde(default)]
    pub resources: Vec<RawResource>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for stores and downloaded resources
    pub data_dir: Option<PathBuf>,

    /// Upper bound on background fetches running at once
    pub max_concurrent_fetches: Option<usize>,

    /// Whether channels get their own database directory by default
    pub channel_specific: Option<bool>,
}

/// Per-channel settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawChannelConfig {
    pub channel_specific: Option<bool>,
}

/// Raw resource definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawResource {
    /// Local file name under the data directory
    pub name: String,

    /// Source locator (http, https or file URL)
    pub url: String,

    /// Minimum seconds between downloads
    pub refresh_seconds: u64,
}

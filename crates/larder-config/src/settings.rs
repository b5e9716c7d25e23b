//! Validated settings structures

use crate::schema::{RawConfig, RawResource, RawServiceConfig};
use larder_util::{ChannelKey, default_data_dir};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on concurrent background fetches
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// Validated settings ready for use by the stores and the refresher
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceConfig,

    /// Per-channel `channel_specific` overrides
    pub channel_overrides: HashMap<ChannelKey, bool>,

    pub resources: Vec<ResourceSpec>,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let channel_overrides = raw
            .channels
            .into_iter()
            .filter_map(|(name, ch)| ch.channel_specific.map(|v| (ChannelKey::new(name), v)))
            .collect();

        Self {
            service: ServiceConfig::from_raw(raw.service),
            channel_overrides,
            resources: raw.resources.into_iter().map(ResourceSpec::from_raw).collect(),
        }
    }

    /// Whether `channel` keeps its databases in its own directory
    pub fn channel_specific(&self, channel: &ChannelKey) -> bool {
        self.channel_overrides
            .get(channel)
            .copied()
            .unwrap_or(self.service.channel_specific)
    }

    pub fn get_resource(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub max_concurrent_fetches: usize,
    pub channel_specific: bool,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            max_concurrent_fetches: raw
                .max_concurrent_fetches
                .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES),
            channel_specific: raw.channel_specific.unwrap_or(true),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// A resource to keep refreshed under the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub name: String,
    pub url: String,
    pub refresh_interval: Duration,
}

impl ResourceSpec {
    fn from_raw(raw: RawResource) -> Self {
        Self {
            name: raw.name,
            url: raw.url,
            refresh_interval: Duration::from_secs(raw.refresh_seconds),
        }
    }
}

//! Engine tuning knobs.
//!
//! The engine never persists configuration; callers build an [`EngineConfig`]
//! in code or read one from a JSON document they own.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::archive::ParseLimits;

/// Hard ceiling on concurrent archive parses.
pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

/// Completed records between progress notifications.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;

pub const DEFAULT_MANIFEST_SIZE_LIMIT: u64 = 4 * 1024 * 1024;
pub const DEFAULT_TAG_ENTRY_SIZE_LIMIT: u64 = 1024 * 1024;
pub const DEFAULT_THUMBNAIL_SIZE_LIMIT: u64 = 32 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub max_concurrency: usize,
    pub progress_interval: usize,
    pub manifest_size_limit: u64,
    pub tag_entry_size_limit: u64,
    pub thumbnail_size_limit: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            manifest_size_limit: DEFAULT_MANIFEST_SIZE_LIMIT,
            tag_entry_size_limit: DEFAULT_TAG_ENTRY_SIZE_LIMIT,
            thumbnail_size_limit: DEFAULT_THUMBNAIL_SIZE_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).context("Invalid engine configuration")?;
        Ok(config.validated())
    }

    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read configuration: {:?}", path))?;
        Self::from_json_str(&content)
    }

    /// Clamp values that would stall the engine.
    pub fn validated(mut self) -> Self {
        self.max_concurrency = self.max_concurrency.max(1);
        self.progress_interval = self.progress_interval.max(1);
        self
    }

    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            manifest: self.manifest_size_limit,
            tag_entry: self.tag_entry_size_limit,
            thumbnail: self.thumbnail_size_limit,
        }
    }
}

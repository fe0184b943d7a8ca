//! Sync configuration module.
//!
//! Handles loading, validating, and layering `stylesync.toml`. User values
//! are merged on top of the stock defaults, so a config file only needs the
//! keys it wants to change, plus its styles.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All top-level options are optional - defaults shown below
//!
//! naming = "style-folder"     # or "index-suffix"
//! mirror_originals = true     # keep an original/ copy of every source
//! extensions = ["jpg", "jpeg", "png", "webp"]
//!
//! [processing]
//! max_workers = 4             # concurrent provider calls
//! # timeout_secs = 600        # stop starting new work after this long
//!
//! [provider]
//! kind = "command"
//! program = "stylize"
//! args = ["--model", "flux"]
//!
//! [[styles]]
//! name = "anime"
//! index = "01"
//! prompt = "Redraw this photo as a hand-painted anime still"
//! strength = 0.6              # 0.0 - 1.0, default 0.5
//! enabled = true              # default true
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::naming::NamingPolicy;
use crate::provider::ProviderConfig;
use crate::styles::{StyleDefinition, StyleRegistry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Workers used when `processing.max_workers` is not set. Kept low because
/// the bottleneck is the provider's rate limit, not local CPU.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("Output path collision at '{path}': {first} and {second}")]
    Collision {
        path: String,
        first: String,
        second: String,
    },
    #[error("Unknown style: {0}")]
    UnknownStyle(String),
    #[error("Output path '{0}' is reserved")]
    ReservedPath(String),
}

/// Sync configuration loaded from `stylesync.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Where styled artifacts land, see [`crate::naming`].
    pub naming: NamingPolicy,
    /// Keep an unmodified copy of every source under `original/`.
    pub mirror_originals: bool,
    /// Source file extensions (case-insensitive, without the dot).
    pub extensions: Vec<String>,
    /// Worker pool and timeout settings.
    pub processing: ProcessingConfig,
    /// Style-transfer provider. Only `sync` needs one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,
    /// Style definitions, validated into a [`StyleRegistry`].
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<StyleDefinition>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            naming: NamingPolicy::default(),
            mirror_originals: true,
            extensions: ["jpg", "jpeg", "png", "webp"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            processing: ProcessingConfig::default(),
            provider: None,
            styles: Vec::new(),
        }
    }
}

impl SyncConfig {
    /// Validate scalar settings. Styles are validated by [`Self::registry`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::Validation("extensions must not be empty".into()));
        }
        if let Some(bad) = self
            .extensions
            .iter()
            .find(|e| e.is_empty() || e.contains(['.', '/', '\\']))
        {
            return Err(ConfigError::Validation(format!(
                "extension '{}' must be a bare suffix like \"jpg\"",
                bad
            )));
        }
        if self.processing.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_workers must be at least 1".into(),
            ));
        }
        if self.processing.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "processing.timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Build the validated style registry for this config.
    pub fn registry(&self) -> Result<StyleRegistry, ConfigError> {
        StyleRegistry::from_definitions(&self.styles)
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of concurrent items (provider calls, deletes).
    /// When absent, [`DEFAULT_WORKERS`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    /// Stop starting new items after this many seconds. In-flight items
    /// still finish.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Resolve the effective worker count from config.
pub fn effective_workers(config: &ProcessingConfig) -> usize {
    config.max_workers.unwrap_or(DEFAULT_WORKERS).max(1)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SyncConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, so a
///   `[[styles]]` list is never merged element-wise.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<SyncConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SyncConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults if it is absent.
pub fn load_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock `stylesync.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# StyleSync Configuration
# =======================
# Top-level settings are optional; values shown below are the defaults.
# At least one [[styles]] entry is required.
# Unknown keys will cause an error.

# Where styled images land:
#   "style-folder"  -> <output>/<style>/<source path>
#   "index-suffix"  -> <output>/<dir>/<stem>_<index>.<ext>
naming = "style-folder"

# Keep an unmodified copy of every source image under <output>/original/.
mirror_originals = true

# Source file extensions to pick up (case-insensitive).
extensions = ["jpg", "jpeg", "png", "webp"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Concurrent provider calls and deletes. Keep this within your provider's
# rate limit.
max_workers = 4

# Stop starting new work after this many seconds; running items finish.
# timeout_secs = 600

# ---------------------------------------------------------------------------
# Provider
# ---------------------------------------------------------------------------
# The program gets the source image on stdin and writes the styled image to
# stdout. Style settings arrive as STYLESYNC_STYLE, STYLESYNC_INDEX,
# STYLESYNC_PROMPT, STYLESYNC_STRENGTH and STYLESYNC_SOURCE_NAME.
# Exit code 2 marks a permanent failure; other failures are retryable.
[provider]
kind = "command"
program = "stylize"
args = []

# ---------------------------------------------------------------------------
# Styles
# ---------------------------------------------------------------------------
# name:     unique; lower-cased with spaces -> "_" it names the output folder
# index:    digits; orders styles and names outputs under "index-suffix"
# prompt:   text handed to the provider
# strength: 0.0 - 1.0 (default 0.5)
# enabled:  false keeps the definition but removes its outputs (default true)
[[styles]]
name = "anime"
index = "01"
prompt = "Redraw this photo as a hand-painted anime still"
strength = 0.6

[[styles]]
name = "sketch"
index = "02"
prompt = "Turn this photo into a pencil sketch"
strength = 0.5
"##
}

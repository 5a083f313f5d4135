//! Store configuration.
//!
//! [`StoreConfig`] is a plain value struct with explicit defaults. Every
//! store instance owns its own copy; there is no global configuration.
//!
//! # Loading Priority
//!
//! 1. Explicit path passed to [`StoreConfig::load`]
//! 2. `SEMDEX_CONFIG` environment variable
//! 3. XDG default: `~/.config/semdex/config.toml`
//! 4. Built-in defaults
//!
//! `SEMDEX_*` environment variables (`SEMDEX_MIN_SIMILARITY`,
//! `SEMDEX_AUTO_SAVE`, ...) overlay values read from the file. They are
//! parsed into the field's type, so numeric and boolean overrides work.

use confyg::Confygery;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Error, Result};

/// Default snapshot location, relative to the working directory.
pub const DEFAULT_STORE_PATH: &str = ".semantic-store.json";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "SEMDEX_CONFIG";

/// Prefix of the per-field override variables.
pub const ENV_PREFIX: &str = "SEMDEX";

// ============================================================================
// Configuration struct
// ============================================================================

/// Configuration for a semantic store instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Minimum similarity for a search hit.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Result limit when a search does not specify one.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Persist a snapshot after every mutation.
    #[serde(default)]
    pub auto_save: bool,

    /// Snapshot location. Required when `auto_save` is on.
    #[serde(default = "default_store_path")]
    pub store_path: Option<PathBuf>,

    /// Split long documents into overlapping chunks.
    #[serde(default)]
    pub auto_chunk: bool,

    /// Chunk size target in estimated tokens.
    #[serde(default = "default_max_chunk_tokens")]
    pub max_chunk_tokens: usize,

    /// Overlap budget between consecutive chunks, in estimated tokens.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Skip documents whose canonical text is already stored.
    #[serde(default = "default_true")]
    pub deduplicate_exact: bool,

    /// Skip documents this similar to a stored one. `0.0` disables the check.
    #[serde(default)]
    pub deduplicate_similarity: f32,

    /// Re-rank search results by recency.
    #[serde(default)]
    pub temporal_boost: bool,
}

fn default_min_similarity() -> f32 {
    0.7
}

fn default_limit() -> usize {
    10
}

fn default_store_path() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_STORE_PATH))
}

fn default_max_chunk_tokens() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            default_limit: default_limit(),
            auto_save: false,
            store_path: default_store_path(),
            auto_chunk: false,
            max_chunk_tokens: default_max_chunk_tokens(),
            chunk_overlap: default_chunk_overlap(),
            deduplicate_exact: default_true(),
            deduplicate_similarity: 0.0,
            temporal_boost: false,
        }
    }
}

// ============================================================================
// Builder-style setters
// ============================================================================

impl StoreConfig {
    /// Set the minimum similarity threshold.
    pub fn with_min_similarity(mut self, threshold: f32) -> Self {
        self.min_similarity = threshold;
        self
    }

    /// Set the default result limit.
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Enable auto-save to the given path.
    pub fn with_auto_save(mut self, path: impl Into<PathBuf>) -> Self {
        self.auto_save = true;
        self.store_path = Some(path.into());
        self
    }

    /// Set (or clear) the snapshot path.
    pub fn with_store_path(mut self, path: Option<PathBuf>) -> Self {
        self.store_path = path;
        self
    }

    /// Enable chunking with the given size and overlap budget.
    pub fn with_chunking(mut self, max_tokens: usize, overlap: usize) -> Self {
        self.auto_chunk = true;
        self.max_chunk_tokens = max_tokens;
        self.chunk_overlap = overlap;
        self
    }

    /// Toggle exact (canonical text) deduplication.
    pub fn with_exact_dedup(mut self, enabled: bool) -> Self {
        self.deduplicate_exact = enabled;
        self
    }

    /// Set the fuzzy deduplication threshold (`0.0` disables).
    pub fn with_similarity_dedup(mut self, threshold: f32) -> Self {
        self.deduplicate_similarity = threshold;
        self
    }

    /// Toggle recency re-ranking.
    pub fn with_temporal_boost(mut self, enabled: bool) -> Self {
        self.temporal_boost = enabled;
        self
    }

    /// The snapshot path, if one is configured and non-empty.
    pub fn store_path(&self) -> Option<&Path> {
        self.store_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Whether the fuzzy deduplication check runs.
    ///
    /// A threshold of exactly `0.0` means "disabled", so zero itself can never
    /// be used as a real threshold.
    pub fn similarity_dedup_enabled(&self) -> bool {
        self.deduplicate_similarity > 0.0
    }

    /// Check construction-time invariants.
    pub fn validate(&self) -> Result<()> {
        if self.auto_save && self.store_path().is_none() {
            return Err(Error::config("auto_save requires a store_path"));
        }
        if self.auto_chunk && self.max_chunk_tokens == 0 {
            return Err(Error::config("max_chunk_tokens must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl StoreConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;
        builder
            .add_struct(&Self::default())
            .map_err(|e| Error::config(format!("config defaults: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            log::debug!("Reading store config from {path:?}");
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut config: Self = builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))?;

        // confyg hands env values over as strings; typed fields are parsed here.
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `SEMDEX_<FIELD>` values returned by `lookup`.
    ///
    /// An empty `SEMDEX_STORE_PATH` clears the path. Values that do not
    /// parse as the field's type fail with [`Error::Config`].
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |field: &str| {
            let key = format!("{ENV_PREFIX}_{}", field.to_uppercase());
            lookup(&key).map(|value| (key, value))
        };

        if let Some(v) = parse_override(var("min_similarity"))? {
            self.min_similarity = v;
        }
        if let Some(v) = parse_override(var("default_limit"))? {
            self.default_limit = v;
        }
        if let Some(v) = parse_flag(var("auto_save"))? {
            self.auto_save = v;
        }
        if let Some((_, value)) = var("store_path") {
            let value = value.trim();
            self.store_path = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        if let Some(v) = parse_flag(var("auto_chunk"))? {
            self.auto_chunk = v;
        }
        if let Some(v) = parse_override(var("max_chunk_tokens"))? {
            self.max_chunk_tokens = v;
        }
        if let Some(v) = parse_override(var("chunk_overlap"))? {
            self.chunk_overlap = v;
        }
        if let Some(v) = parse_flag(var("deduplicate_exact"))? {
            self.deduplicate_exact = v;
        }
        if let Some(v) = parse_override(var("deduplicate_similarity"))? {
            self.deduplicate_similarity = v;
        }
        if let Some(v) = parse_flag(var("temporal_boost"))? {
            self.temporal_boost = v;
        }
        Ok(())
    }

    /// Resolve the config file path from explicit argument, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }

        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("semdex").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }
}

fn parse_override<T>(entry: Option<(String, String)>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    entry
        .map(|(key, value)| {
            value
                .trim()
                .parse()
                .map_err(|e| Error::config(format!("{key}={value:?}: {e}")))
        })
        .transpose()
}

fn parse_flag(entry: Option<(String, String)>) -> Result<Option<bool>> {
    entry
        .map(|(key, value)| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::config(format!("{key}={value:?}: expected a boolean"))),
        })
        .transpose()
}

// ============================================================================
// Tests
// ============================================================================

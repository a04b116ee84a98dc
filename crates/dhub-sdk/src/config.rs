//! Hub configuration, loadable from TOML.
//!
//! ```toml
//! [storage]
//! backend = "directory"
//! root = "/var/lib/datahub"
//! max_blob_size = 16777216
//!
//! [limits]
//! page_size = 100
//!
//! [gc]
//! enabled = true
//! interval_secs = 600
//! ```
//!
//! Every field is optional and falls back to its default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dhub_element::DEFAULT_PAGE_SIZE;
use dhub_gc::GcConfig;
use dhub_store::DEFAULT_MAX_BLOB_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

/// Longest accepted gap between collection cycles (30 days).
pub const MAX_GC_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Longest accepted pause between scan or delete batches (one minute).
pub const MAX_GC_PAUSE_MS: u64 = 60_000;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub gc: GcSettings,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory of the `directory` backend.
    pub root: Option<PathBuf>,
    pub max_blob_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            root: None,
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest page and largest batch accepted by element operations.
    pub page_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub scan_batch: usize,
    pub scan_pause_ms: u64,
}

impl Default for GcSettings {
    fn default() -> Self {
        let defaults = GcConfig::default();
        Self {
            enabled: true,
            interval_secs: defaults.interval.as_secs(),
            batch_size: defaults.batch_size,
            batch_pause_ms: defaults.batch_pause.as_millis() as u64,
            scan_batch: defaults.scan_batch,
            scan_pause_ms: defaults.scan_pause.as_millis() as u64,
        }
    }
}

impl GcSettings {
    pub fn to_gc_config(&self) -> GcConfig {
        GcConfig {
            interval: Duration::from_secs(self.interval_secs),
            batch_size: self.batch_size,
            batch_pause: Duration::from_millis(self.batch_pause_ms),
            scan_batch: self.scan_batch,
            scan_pause: Duration::from_millis(self.scan_pause_ms),
        }
    }
}

impl HubConfig {
    pub fn from_toml_str(text: &str) -> HubResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| HubError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> HubResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| HubError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// A directory-backed configuration rooted at `root`.
    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Directory,
                root: Some(root.into()),
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.storage.backend == StorageBackend::Directory && self.storage.root.is_none() {
            return Err(HubError::Config(
                "storage.root is required for the directory backend".into(),
            ));
        }
        if self.storage.max_blob_size == 0 {
            return Err(HubError::Config("storage.max_blob_size must be positive".into()));
        }
        if self.limits.page_size == 0 {
            return Err(HubError::Config("limits.page_size must be positive".into()));
        }
        if self.gc.batch_size == 0 || self.gc.scan_batch == 0 {
            return Err(HubError::Config("gc batch sizes must be positive".into()));
        }
        if self.gc.interval_secs > MAX_GC_INTERVAL_SECS {
            return Err(HubError::Config(format!(
                "gc.interval_secs must be at most {MAX_GC_INTERVAL_SECS}"
            )));
        }
        if self.gc.batch_pause_ms > MAX_GC_PAUSE_MS || self.gc.scan_pause_ms > MAX_GC_PAUSE_MS {
            return Err(HubError::Config(format!(
                "gc pauses must be at most {MAX_GC_PAUSE_MS} ms"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = HubConfig::default();
        assert_eq!(c.storage.backend, StorageBackend::Memory);
        assert_eq!(c.storage.max_blob_size, 16 * 1024 * 1024);
        assert_eq!(c.limits.page_size, 100);
        assert!(c.gc.enabled);
        assert_eq!(c.gc.interval_secs, 600);
        assert_eq!(c.gc.batch_pause_ms, 100);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(HubConfig::from_toml_str("").unwrap(), HubConfig::default());
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let c = HubConfig::from_toml_str(
            r#"
            [storage]
            backend = "directory"
            root = "/srv/hub"

            [gc]
            interval_secs = 30
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(c.storage.backend, StorageBackend::Directory);
        assert_eq!(c.storage.root, Some(PathBuf::from("/srv/hub")));
        assert_eq!(c.storage.max_blob_size, DEFAULT_MAX_BLOB_SIZE);
        assert!(!c.gc.enabled);
        assert_eq!(c.gc.batch_size, 50);

        let gc = c.gc.to_gc_config();
        assert_eq!(gc.interval, Duration::from_secs(30));
        assert_eq!(gc.scan_pause, Duration::from_millis(100));
    }

    #[test]
    fn directory_backend_requires_root() {
        let err = HubConfig::from_toml_str("[storage]\nbackend = \"directory\"").unwrap_err();
        assert!(matches!(err, HubError::Config(_)));
    }

    #[test]
    fn zero_limits_rejected() {
        assert!(HubConfig::from_toml_str("[limits]\npage_size = 0").is_err());
        assert!(HubConfig::from_toml_str("[gc]\nbatch_size = 0").is_err());
    }

    #[test]
    fn oversized_gc_timings_rejected() {
        assert!(HubConfig::from_toml_str("[gc]\ninterval_secs = 9223372036854775807").is_err());
        assert!(HubConfig::from_toml_str("[gc]\nbatch_pause_ms = 60001").is_err());
        assert!(HubConfig::from_toml_str("[gc]\nscan_pause_ms = 18446744073709551615").is_err());

        let longest = format!("[gc]\ninterval_secs = {MAX_GC_INTERVAL_SECS}");
        assert!(HubConfig::from_toml_str(&longest).is_ok());
    }

    #[test]
    fn unknown_backend_rejected() {
        assert!(HubConfig::from_toml_str("[storage]\nbackend = \"s3\"").is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        fs::write(&path, "[limits]\npage_size = 25\n").unwrap();
        assert_eq!(HubConfig::load(&path).unwrap().limits.page_size, 25);
        assert!(HubConfig::load(dir.path().join("missing.toml")).is_err());
    }
}

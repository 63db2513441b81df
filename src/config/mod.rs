//! Configuration management.
//!
//! Every path and tunable the archiver uses lives in one [`ArchiveConfig`],
//! resolved once at startup and passed down explicitly.
//!
//! # Resolution
//!
//! For each setting, the first of these that is present wins:
//! 1. Command-line flag (clap also maps the `FAVARC_*` environment variables
//!    onto the flags)
//! 2. `<data_dir>/config.json`
//! 3. Built-in default
//!
//! The data directory itself comes from `--home`/`FAVARC_HOME`, falling back
//! to `~/.favarc`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::DEFAULT_PERMALINK_BASE;
use crate::sync::{PartitionTracker, SyncOptions, MAX_PAGE_SIZE};

/// Settings file name inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Default favorites endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://www.plurk.com/APP/Timeline/getPlurks";

/// Default delay between page requests.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub export_dir: PathBuf,
    pub dirty_file: PathBuf,
    pub page_size: u32,
    pub page_delay: Duration,
    pub permalink_base: String,
    pub endpoint: String,
    pub token: Option<String>,
}

/// Contents of `config.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveSettings {
    pub db_path: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub page_size: Option<u32>,
    pub page_delay_ms: Option<u64>,
    pub permalink_base: Option<String>,
}

/// Values supplied on the command line (or through their env vars).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub page_size: Option<u32>,
    pub page_delay_ms: Option<u64>,
}

impl ArchiveConfig {
    /// Resolve the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory can be determined or the
    /// settings file exists but is unreadable or invalid.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let data_dir = match &overrides.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        let settings = load_settings(&data_dir)?;
        Ok(Self::from_parts(data_dir, &settings, overrides))
    }

    fn from_parts(
        data_dir: PathBuf,
        settings: &ArchiveSettings,
        overrides: &ConfigOverrides,
    ) -> Self {
        let db_path = overrides
            .db_path
            .clone()
            .or_else(|| settings.db_path.clone())
            .unwrap_or_else(|| data_dir.join("archive.db"));
        let export_dir = overrides
            .export_dir
            .clone()
            .or_else(|| settings.export_dir.clone())
            .unwrap_or_else(|| data_dir.join("backup_js"));
        let page_size = overrides
            .page_size
            .or(settings.page_size)
            .unwrap_or(MAX_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page_delay = overrides
            .page_delay_ms
            .or(settings.page_delay_ms)
            .map_or(DEFAULT_PAGE_DELAY, Duration::from_millis);

        Self {
            dirty_file: data_dir.join("dirty_partitions.txt"),
            db_path,
            export_dir,
            page_size,
            page_delay,
            permalink_base: settings
                .permalink_base
                .clone()
                .unwrap_or_else(|| DEFAULT_PERMALINK_BASE.to_string()),
            endpoint: overrides
                .endpoint
                .clone()
                .or_else(|| settings.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            token: overrides
                .token
                .clone()
                .or_else(|| settings.token.clone())
                .filter(|t| !t.trim().is_empty()),
            data_dir,
        }
    }

    /// Engine tunables.
    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.page_size,
            page_delay: self.page_delay,
        }
    }

    /// Tracker over the configured dirty-partition file.
    #[must_use]
    pub fn tracker(&self) -> PartitionTracker {
        PartitionTracker::new(&self.dirty_file)
    }
}

/// The default data directory, `~/.favarc`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_data_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|b| b.home_dir().join(".favarc"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load `<data_dir>/config.json`; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_settings(data_dir: &Path) -> Result<ArchiveSettings> {
    let path = data_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(ArchiveSettings::default());
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))
}

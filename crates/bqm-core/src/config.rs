use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Placeholder in the temp-directory template that expands to the target
/// file's drive. When present, every drive gets its own temp directory and
/// the single-shared-temp disk projection rule does not apply.
pub const TARGET_DRIVE_TOKEN: &str = "%[targetdrive]";

/// Global configuration loaded from `~/.config/bqm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Whether the scheduler may pick bundles for automatic searches.
    pub auto_search: bool,
    /// Minimum interval between priority-queue searches, in minutes.
    pub search_time_mins: u64,
    /// How long a bundle stays in the recent rotation, in hours.
    pub recent_bundle_hours: u64,
    /// Temp download directory template; may contain `%[targetdrive]`.
    pub temp_download_directory: String,
    /// Bundles with at least this many sources stop auto-searching.
    pub auto_search_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            auto_search: true,
            search_time_mins: 5,
            recent_bundle_hours: 24,
            temp_download_directory: format!("{TARGET_DRIVE_TOKEN}Incomplete"),
            auto_search_limit: 5,
        }
    }
}

impl QueueConfig {
    /// Recency window in seconds.
    pub fn recent_window_secs(&self) -> u64 {
        self.recent_bundle_hours * 3600
    }

    /// True when all downloads share one temp directory (no per-drive
    /// placeholder in the template).
    pub fn single_temp_directory(&self) -> bool {
        !self.temp_download_directory.is_empty()
            && !self.temp_download_directory.contains(TARGET_DRIVE_TOKEN)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bqm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<QueueConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = QueueConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: QueueConfig = toml::from_str(&data)?;
    Ok(cfg)
}

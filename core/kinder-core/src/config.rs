//! Engine configuration.
//!
//! Read from `~/.kinder/engine.toml` unless a path is given. A missing file
//! means defaults; a present but broken file is an error so typos surface.
//!
//! ```toml
//! top_count = 3
//! flop_count = 3
//! poll_interval_ms = 3000
//!
//! [reminder]
//! min_ms = 4000
//! max_ms = 12000
//! offset_ms = 2000
//! ```

use std::path::PathBuf;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{KinderError, Result};

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".kinder/engine.toml";

pub const DEFAULT_TOP_COUNT: usize = 3;
pub const DEFAULT_FLOP_COUNT: usize = 3;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_COUNTDOWN_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub top_count: usize,
    pub flop_count: usize,
    pub poll_interval_ms: u64,
    pub countdown_interval_ms: u64,
    pub reminder: ReminderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_count: DEFAULT_TOP_COUNT,
            flop_count: DEFAULT_FLOP_COUNT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            countdown_interval_ms: DEFAULT_COUNTDOWN_INTERVAL_MS,
            reminder: ReminderConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::milliseconds(self.poll_interval_ms.max(1) as i64)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::milliseconds(self.countdown_interval_ms.max(1) as i64)
    }
}

/// Adaptive nudge timing, in milliseconds.
///
/// The delay starts at `min_ms`, grows by `offset_ms` (up to `max_ms`) after
/// every prompt decision and shrinks by `offset_ms` (down to `min_ms`) after
/// every reminder that had to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub min_ms: i64,
    pub max_ms: i64,
    pub offset_ms: i64,
    /// Length of each of the two highlight phases.
    pub flash_ms: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            min_ms: 4_000,
            max_ms: 12_000,
            offset_ms: 2_000,
            flash_ms: 400,
        }
    }
}

impl ReminderConfig {
    pub fn disabled() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
            offset_ms: 0,
            flash_ms: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.min_ms > 0 || self.max_ms > 0
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(KinderError::HomeDirNotFound)?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Directory for kinder's own files (logs, config).
pub fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kinder"))
}

pub fn load_engine_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(EngineConfig::default());
    }

    let content =
        fs_err::read_to_string(&config_path).map_err(|source| KinderError::ConfigRead {
            path: config_path.clone(),
            source,
        })?;
    toml::from_str::<EngineConfig>(&content).map_err(|err| KinderError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::{DisplayQuery, DpiDisplay, FixedDisplay};
use crate::tracking::units::DistanceUnit;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Display description given in configuration, either by physical
/// diagonal or by the DPI the desktop reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayConfig {
    Diagonal {
        width_px: u32,
        height_px: u32,
        diagonal_inches: f64,
    },
    Dpi {
        width_px: u32,
        height_px: u32,
        dpi: f64,
    },
}

impl DisplayConfig {
    pub fn to_query(self) -> Box<dyn DisplayQuery> {
        match self {
            DisplayConfig::Diagonal {
                width_px,
                height_px,
                diagonal_inches,
            } => Box::new(FixedDisplay {
                width_px,
                height_px,
                diagonal_inches,
            }),
            DisplayConfig::Dpi {
                width_px,
                height_px,
                dpi,
            } => Box::new(DpiDisplay {
                width_px,
                height_px,
                dpi,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub data_dir: Option<PathBuf>,
    pub flush_interval_secs: u64,
    pub unit: DistanceUnit,
    pub display: Option<DisplayConfig>,
    pub fallback_ppi: Option<f64>,
    pub max_consecutive_failures: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            unit: DistanceUnit::default(),
            display: None,
            fallback_ppi: None,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl TrackerConfig {
    /// Reads `config.json` from `dir`. A missing file gives the defaults; a
    /// malformed one gives the defaults with a warning.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        match serde_json::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(err) => {
                warn!("Ignoring malformed config {}: {}", path.display(), err);
                Ok(Self::default())
            }
        }
    }

    pub fn flush_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.flush_interval_secs.max(1))
    }
}

//! Optional `config.toml` inside the data directory.

use anyhow::{Context, Result};
use lifeline_goals::ProgressConfig;
use lifeline_habits::AnalyticsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// File name looked up inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// CLI configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Habit analytics windows
    pub analytics: AnalyticsConfig,

    /// Goal progress listings
    pub progress: ProgressConfig,
}

impl CliConfig {
    /// Load `<data_dir>/config.toml`, falling back to defaults when it is absent.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            debug!("No {} found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

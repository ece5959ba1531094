//! Runtime configuration: defaults, an optional JSON file, then CLI overrides.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// Largest supported number of choropleth classes.
pub const MAX_CLASSES: usize = 32;

/// Snapshot of configuration values consumed by the catalog and CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AtlasConfig {
    /// Table parameter feed (`{"acsTableParameters": [...]}`).
    pub table_params_file: PathBuf,
    /// Newline-separated list of data and boundary files.
    pub manifest_file: PathBuf,
    /// Directory manifest paths are resolved against.
    pub data_root: PathBuf,
    /// First year of trend charts.
    pub min_year: u16,
    /// Last year of trend charts.
    pub max_year: u16,
    /// Number of choropleth classes.
    pub classes: usize,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            table_params_file: PathBuf::from("data/tableParameters.json"),
            manifest_file: PathBuf::from("data/acsFiles.txt"),
            data_root: PathBuf::from("."),
            min_year: 2010,
            max_year: 2017,
            classes: 6,
        }
    }
}

impl AtlasConfig {
    /// Read a JSON configuration file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AtlasError::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| AtlasError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CLASSES).contains(&self.classes) {
            return Err(AtlasError::Config(format!(
                "classes must be between 1 and {MAX_CLASSES}, got {}",
                self.classes
            )));
        }
        if self.min_year > self.max_year {
            return Err(AtlasError::Config(format!(
                "minYear {} is after maxYear {}",
                self.min_year, self.max_year
            )));
        }
        Ok(())
    }

    pub fn years(&self) -> RangeInclusive<u16> {
        self.min_year..=self.max_year
    }
}

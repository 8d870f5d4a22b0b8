use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Output (can override CLI)
    pub db_path: Option<String>,
    pub manifest_path: Option<String>,
    pub schema_version: Option<String>,

    // Stability check
    pub baseline_db: Option<String>,
    pub missing_policy: Option<String>,
    pub skip_unchanged: Option<bool>,

    pub source: Option<SourceConfig>,
}

/// `[source]` section. At most one of the two may be set.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory holding `titletbl.js`, `datatbl.js` and `actbl.js`.
    pub textage_dir: Option<String>,
    /// Tab-separated positional rows.
    pub rows_file: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

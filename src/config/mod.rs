mod file_config;

pub use file_config::{FileConfig, SourceConfig};

use crate::master_store::SCHEMA_VERSION;
use crate::validation::MissingPolicy;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "song_master.sqlite";
pub const DEFAULT_MANIFEST_PATH: &str = "latest.json";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the `build` arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
    pub schema_version: Option<String>,
    pub baseline_db: Option<PathBuf>,
    pub missing_policy: Option<MissingPolicy>,
    pub skip_unchanged: bool,
    pub textage_dir: Option<PathBuf>,
    pub rows_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSettings {
    /// Directory with the three catalog scripts.
    Textage { dir: PathBuf },
    /// Tab-separated positional rows.
    Rows { file: PathBuf },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub manifest_path: PathBuf,
    pub schema_version: String,
    pub baseline_db: Option<PathBuf>,
    pub missing_policy: MissingPolicy,
    pub skip_unchanged: bool,
    pub source: SourceSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        let manifest_path = file
            .manifest_path
            .map(PathBuf::from)
            .or_else(|| cli.manifest_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH));
        let schema_version = file
            .schema_version
            .or_else(|| cli.schema_version.clone())
            .unwrap_or_else(|| SCHEMA_VERSION.to_string());

        let baseline_db = file
            .baseline_db
            .map(PathBuf::from)
            .or_else(|| cli.baseline_db.clone());
        let missing_policy = match file.missing_policy {
            Some(s) => parse_missing_policy(&s)
                .ok_or_else(|| anyhow!("Invalid missing_policy '{}', expected error or warn", s))?,
            None => cli.missing_policy.unwrap_or_default(),
        };
        if baseline_db.as_deref() == Some(db_path.as_path()) {
            bail!("baseline_db must differ from db_path: {:?}", db_path);
        }
        let skip_unchanged = file.skip_unchanged.unwrap_or(cli.skip_unchanged);

        let source_file = file.source.unwrap_or_default();
        let textage_dir = source_file
            .textage_dir
            .map(PathBuf::from)
            .or_else(|| cli.textage_dir.clone());
        let rows_file = source_file
            .rows_file
            .map(PathBuf::from)
            .or_else(|| cli.rows_file.clone());

        let source = match (textage_dir, rows_file) {
            (Some(_), Some(_)) => {
                bail!("Only one source may be configured: textage_dir or rows_file")
            }
            (None, None) => bail!(
                "A source must be specified via --textage-dir, --rows-file or the [source] section"
            ),
            (Some(dir), None) => {
                if !dir.is_dir() {
                    bail!("Textage directory does not exist: {:?}", dir);
                }
                SourceSettings::Textage { dir }
            }
            (None, Some(file)) => {
                if !file.is_file() {
                    bail!("Rows file does not exist: {:?}", file);
                }
                SourceSettings::Rows { file }
            }
        };

        Ok(AppConfig {
            db_path,
            manifest_path,
            schema_version,
            baseline_db,
            missing_policy,
            skip_unchanged,
            source,
        })
    }
}

fn parse_missing_policy(s: &str) -> Option<MissingPolicy> {
    MissingPolicy::from_str(s, true).ok()
}

//! End-to-end build and validate runs, shared by the binary and the e2e tests.

use crate::config::{AppConfig, SourceSettings};
use crate::manifest::{
    sha256_hex, source_hashes_unchanged, validate_manifest, BuildManifest, SourceHashes,
};
use crate::master_store::{ReconcileStats, SongMasterStore, SongRecord};
use crate::sources::{parse_rows, songs_from_textage, textage, TextageTables};
use crate::validation::{
    check_chart_id_stability_at, validate_structure_at, MissingPolicy, StabilitySummary,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Raw source texts with the hash of each file, keyed by file name.
pub struct SourceFiles {
    pub texts: Vec<(String, String)>,
    pub hashes: SourceHashes,
}

impl SourceFiles {
    fn text(&self, name: &str) -> Result<&str> {
        self.texts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, text)| text.as_str())
            .with_context(|| format!("Source file {} was not read", name))
    }
}

/// Records produced from a source, with the entries skipped on the way.
#[derive(Debug)]
pub struct SourceBatch {
    pub records: Vec<SongRecord>,
    pub ignored: usize,
}

#[derive(Debug)]
pub struct BuildReport {
    /// True when the sources matched the previous manifest and nothing ran.
    pub skipped: bool,
    pub ignored: usize,
    pub stats: Option<ReconcileStats>,
    pub stability: Option<StabilitySummary>,
    pub manifest: Option<BuildManifest>,
}

fn read_source_file(path: &Path) -> Result<(String, String, String)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read source {:?}", path))?;
    let hash = sha256_hex(&bytes);
    let text =
        String::from_utf8(bytes).with_context(|| format!("Source {:?} is not UTF-8", path))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((name, text, hash))
}

pub fn read_sources(settings: &SourceSettings) -> Result<SourceFiles> {
    let paths: Vec<PathBuf> = match settings {
        SourceSettings::Textage { dir } => textage::SOURCE_FILES
            .iter()
            .map(|name| dir.join(name))
            .collect(),
        SourceSettings::Rows { file } => vec![file.clone()],
    };
    let mut files = SourceFiles {
        texts: Vec::with_capacity(paths.len()),
        hashes: SourceHashes::new(),
    };
    for path in &paths {
        let (name, text, hash) = read_source_file(path)?;
        files.hashes.insert(name.clone(), hash);
        files.texts.push((name, text));
    }
    Ok(files)
}

pub fn parse_sources(settings: &SourceSettings, files: &SourceFiles) -> Result<SourceBatch> {
    match settings {
        SourceSettings::Textage { .. } => {
            let [title_file, data_file, act_file] = textage::SOURCE_FILES;
            let tables = TextageTables::extract(
                files.text(title_file)?,
                files.text(data_file)?,
                files.text(act_file)?,
            )?;
            let batch = songs_from_textage(&tables)?;
            Ok(SourceBatch {
                records: batch.records,
                ignored: batch.ignored,
            })
        }
        SourceSettings::Rows { file } => {
            let (_, text) = files
                .texts
                .first()
                .with_context(|| format!("Rows file {:?} was not read", file))?;
            let records =
                parse_rows(text).with_context(|| format!("Invalid rows in {:?}", file))?;
            Ok(SourceBatch {
                records,
                ignored: 0,
            })
        }
    }
}

fn previous_source_hashes(manifest_path: &Path) -> Option<SourceHashes> {
    if !manifest_path.exists() {
        return None;
    }
    match BuildManifest::load(manifest_path) {
        Ok(manifest) => manifest.source_hashes,
        Err(e) => {
            warn!("Ignoring unreadable manifest {:?}: {}", manifest_path, e);
            None
        }
    }
}

/// Working copy of the output store, created in the output directory so the
/// final move is a rename. It starts from the current store, or from the
/// baseline when there is no store yet, so ids assigned by previous builds
/// carry over. Dropped without being persisted, it is deleted.
fn stage_store(db_path: &Path, baseline: Option<&Path>) -> Result<NamedTempFile> {
    let parent = db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {:?}", parent))?;
    let staged = tempfile::Builder::new()
        .prefix(".song_master-")
        .suffix(".sqlite")
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create a staging file in {:?}", parent))?;

    let seed = if db_path.exists() {
        Some(db_path)
    } else {
        match baseline {
            Some(baseline) if baseline.exists() => {
                info!("Seeding {:?} from baseline {:?}", db_path, baseline);
                Some(baseline)
            }
            Some(baseline) => {
                info!("Baseline {:?} not found, starting a new store", baseline);
                None
            }
            None => {
                info!("No baseline configured, starting a new store");
                None
            }
        }
    };
    if let Some(seed) = seed {
        std::fs::copy(seed, staged.path())
            .with_context(|| format!("Failed to copy {:?} to {:?}", seed, staged.path()))?;
    }
    Ok(staged)
}

fn existing_baseline(baseline: Option<&Path>) -> Option<&Path> {
    baseline.filter(|path| path.exists())
}

pub fn run_build(config: &AppConfig) -> Result<BuildReport> {
    let files = read_sources(&config.source)?;

    if config.skip_unchanged && config.db_path.exists() {
        let previous = previous_source_hashes(&config.manifest_path);
        if source_hashes_unchanged(previous.as_ref(), &files.hashes) {
            info!("Source hashes unchanged since the last build, skipping");
            return Ok(BuildReport {
                skipped: true,
                ignored: 0,
                stats: None,
                stability: None,
                manifest: None,
            });
        }
    }

    let batch = parse_sources(&config.source, &files)?;
    info!(
        "Read {} records from {} source file(s), ignored {}",
        batch.records.len(),
        files.texts.len(),
        batch.ignored
    );

    // Reconcile and check a staged copy; the output is only replaced once
    // every check passed.
    let baseline = config.baseline_db.as_deref();
    let staged = stage_store(&config.db_path, baseline)?;

    let stats = {
        let mut store = SongMasterStore::open(staged.path())?;
        store
            .reconcile(&batch.records)
            .with_context(|| format!("Reconciliation of {:?} failed", config.db_path))?
    };

    let mut stability = None;
    if cfg!(feature = "no_checks") {
        warn!("Post-build checks disabled by the no_checks feature");
    } else {
        validate_structure_at(staged.path(), Some(&config.schema_version))?;
        if let Some(baseline) = existing_baseline(baseline) {
            stability = Some(check_chart_id_stability_at(
                baseline,
                staged.path(),
                config.missing_policy,
            )?);
        }
    }

    staged
        .persist(&config.db_path)
        .with_context(|| format!("Failed to move the new store to {:?}", config.db_path))?;

    let manifest = BuildManifest::for_store(
        &config.db_path,
        &config.schema_version,
        Some(files.hashes),
    )?;
    manifest
        .write(&config.manifest_path)
        .with_context(|| format!("Failed to write manifest {:?}", config.manifest_path))?;

    info!(
        "Build complete: {} active music, {} active charts, {} ignored",
        stats.active_music, stats.active_charts, batch.ignored
    );
    Ok(BuildReport {
        skipped: false,
        ignored: batch.ignored,
        stats: Some(stats),
        stability,
        manifest: Some(manifest),
    })
}

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub db_path: PathBuf,
    pub schema_version: Option<String>,
    pub baseline_db: Option<PathBuf>,
    pub missing_policy: MissingPolicy,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ValidateReport {
    pub stability: Option<StabilitySummary>,
    pub manifest: Option<BuildManifest>,
}

/// Check an existing store without modifying it.
pub fn run_validate(options: &ValidateOptions) -> Result<ValidateReport> {
    if !options.db_path.is_file() {
        anyhow::bail!("Store file does not exist: {:?}", options.db_path);
    }
    validate_structure_at(&options.db_path, options.schema_version.as_deref())?;

    let stability = match options.baseline_db.as_deref() {
        Some(baseline) => Some(check_chart_id_stability_at(
            baseline,
            &options.db_path,
            options.missing_policy,
        )?),
        None => None,
    };

    let manifest = match options.manifest_path.as_deref() {
        Some(manifest_path) => Some(validate_manifest(manifest_path, &options.db_path)?),
        None => None,
    };

    info!("Validation of {:?} passed", options.db_path);
    Ok(ValidateReport {
        stability,
        manifest,
    })
}

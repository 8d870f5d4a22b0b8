use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use song_master::config::{AppConfig, CliConfig, FileConfig};
use song_master::pipeline::{run_build, run_validate, ValidateOptions};
use song_master::validation::MissingPolicy;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a catalog source into the song master store, check it and
    /// write the build manifest.
    Build(BuildArgs),

    /// Check an existing store without modifying it.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing titletbl.js, datatbl.js and actbl.js.
    #[clap(long, value_parser = parse_path)]
    pub textage_dir: Option<PathBuf>,

    /// Tab-separated file with one song per row.
    #[clap(long, value_parser = parse_path)]
    pub rows_file: Option<PathBuf>,

    /// Output store file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Output manifest file.
    #[clap(long, value_parser = parse_path)]
    pub manifest_path: Option<PathBuf>,

    /// Schema version recorded in the manifest and checked in the store.
    #[clap(long)]
    pub schema_version: Option<String>,

    /// Previous store: seeds a missing output and is the reference for chart
    /// id stability.
    #[clap(long, value_parser = parse_path)]
    pub baseline_db: Option<PathBuf>,

    /// What to do with baseline charts absent from the new store.
    #[clap(long, value_enum)]
    pub missing_policy: Option<MissingPolicy>,

    /// Skip the build when source hashes match the previous manifest.
    #[clap(long)]
    pub skip_unchanged: bool,
}

impl BuildArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_path: self.db_path.clone(),
            manifest_path: self.manifest_path.clone(),
            schema_version: self.schema_version.clone(),
            baseline_db: self.baseline_db.clone(),
            missing_policy: self.missing_policy,
            skip_unchanged: self.skip_unchanged,
            textage_dir: self.textage_dir.clone(),
            rows_file: self.rows_file.clone(),
        }
    }
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Store file to check.
    #[clap(value_parser = parse_path)]
    pub db_path: PathBuf,

    /// Expected schema version in the meta table.
    #[clap(long)]
    pub schema_version: Option<String>,

    /// Previous store to compare chart ids against.
    #[clap(long, alias = "baseline", value_parser = parse_path)]
    pub baseline_db: Option<PathBuf>,

    #[clap(long, value_enum, default_value_t = MissingPolicy::Error)]
    pub missing_policy: MissingPolicy,

    /// Manifest to verify against the store file.
    #[clap(long, alias = "manifest", value_parser = parse_path)]
    pub manifest_path: Option<PathBuf>,
}

fn build(args: BuildArgs) -> Result<()> {
    let file_config = match &args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&args.to_cli_config(), file_config)?;
    info!(
        "Building {:?} (schema version {}, missing policy {})",
        config.db_path, config.schema_version, config.missing_policy
    );

    let report = run_build(&config)?;
    if report.skipped {
        return Ok(());
    }
    if let Some(stats) = &report.stats {
        info!(
            "music: {} processed, {} inserted; charts: {} processed, {} inserted",
            stats.music_processed,
            stats.music_inserted,
            stats.chart_processed,
            stats.chart_inserted
        );
    }
    if let Some(stability) = &report.stability {
        if stability.missing_in_new_total > 0 {
            warn!(
                "{} baseline chart(s) no longer present",
                stability.missing_in_new_total
            );
        }
    }
    if let Some(manifest) = &report.manifest {
        info!("sha256 {} ({} bytes)", manifest.sha256, manifest.byte_size);
    }
    Ok(())
}

fn validate(args: ValidateArgs) -> Result<()> {
    let options = ValidateOptions {
        db_path: args.db_path,
        schema_version: args.schema_version,
        baseline_db: args.baseline_db,
        missing_policy: args.missing_policy,
        manifest_path: args.manifest_path,
    };
    run_validate(&options).with_context(|| format!("Validation of {:?} failed", options.db_path))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    match cli_args.command {
        Command::Build(args) => build(args),
        Command::Validate(args) => validate(args),
    }
}

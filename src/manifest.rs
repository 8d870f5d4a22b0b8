//! Build manifest: the record downstream tooling uses to verify a published
//! store file.

use crate::error::IntegrityError;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Source file name to SHA-256 hex of its raw bytes.
pub type SourceHashes = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub file_name: String,
    pub schema_version: String,
    pub generated_at: String,
    pub sha256: String,
    pub byte_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hashes: Option<SourceHashes>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl BuildManifest {
    /// Describe the store file at `store_path` as it is on disk now.
    pub fn for_store(
        store_path: &Path,
        schema_version: &str,
        source_hashes: Option<SourceHashes>,
    ) -> Result<Self, IntegrityError> {
        Ok(BuildManifest {
            file_name: file_name_of(store_path),
            schema_version: schema_version.to_string(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            sha256: file_sha256(store_path)?,
            byte_size: std::fs::metadata(store_path)?.len(),
            source_hashes: source_hashes.filter(|hashes| !hashes.is_empty()),
        })
    }

    pub fn load(path: &Path) -> Result<Self, IntegrityError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write as indented JSON with a trailing newline, creating parent
    /// directories as needed.
    pub fn write(&self, path: &Path) -> Result<(), IntegrityError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(path, content)?;
        info!("Wrote manifest {:?} for {}", path, self.file_name);
        Ok(())
    }
}

/// Check the manifest at `manifest_path` against the store file: name, then
/// SHA-256, then byte size.
pub fn validate_manifest(
    manifest_path: &Path,
    store_path: &Path,
) -> Result<BuildManifest, IntegrityError> {
    let manifest = BuildManifest::load(manifest_path)?;

    let actual_name = file_name_of(store_path);
    if manifest.file_name != actual_name {
        return Err(IntegrityError::ManifestMismatch {
            field: "file_name",
            expected: manifest.file_name,
            actual: actual_name,
        });
    }
    let actual_sha = file_sha256(store_path)?;
    if manifest.sha256 != actual_sha {
        return Err(IntegrityError::ManifestMismatch {
            field: "sha256",
            expected: manifest.sha256,
            actual: actual_sha,
        });
    }
    let actual_size = std::fs::metadata(store_path)?.len();
    if manifest.byte_size != actual_size {
        return Err(IntegrityError::ManifestMismatch {
            field: "byte_size",
            expected: manifest.byte_size.to_string(),
            actual: actual_size.to_string(),
        });
    }
    Ok(manifest)
}

/// True only when a previous map exists and every current source hash is in
/// it with the same value. A source new to this build counts as a change.
pub fn source_hashes_unchanged(previous: Option<&SourceHashes>, current: &SourceHashes) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    !current.is_empty()
        && current
            .iter()
            .all(|(name, hash)| previous.get(name) == Some(hash))
}

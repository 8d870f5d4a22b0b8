//! Cross-build chart id stability.
//!
//! Charts of a baseline store and a new store are joined on
//! (source_id, play_style, difficulty). A shared key whose chart id differs is
//! always a failure. Baseline keys absent from the new store are handled by
//! [`MissingPolicy`]. Inactive rows take part in the join: an id stays
//! reserved for its chart after the song disappears upstream.

use crate::error::IntegrityError;
use clap::ValueEnum;
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Examples reported with a failure.
pub const SAMPLE_LIMIT: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MissingPolicy {
    #[default]
    Error,
    Warn,
}

impl MissingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingPolicy::Error => "error",
            MissingPolicy::Warn => "warn",
        }
    }
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChartKey {
    pub source_id: String,
    pub play_style: String,
    pub difficulty: String,
}

impl fmt::Display for ChartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source_id, self.play_style, self.difficulty)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChartRef {
    pub chart_id: i64,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StabilitySummary {
    pub baseline_total: usize,
    pub new_total: usize,
    pub shared_total: usize,
    pub new_only_total: usize,
    /// Baseline keys with no chart in the new store. Rows are never deleted,
    /// so this is also the baseline-only count.
    pub missing_in_new_total: usize,
    /// Shared keys active in the baseline but inactive in the new store.
    pub deactivated_total: usize,
    pub missing_policy: MissingPolicy,
}

/// Every chart in `conn` by natural key.
pub fn load_chart_key_map(conn: &Connection) -> rusqlite::Result<BTreeMap<ChartKey, ChartRef>> {
    let mut stmt = conn.prepare(
        "SELECT m.source_id, c.play_style, c.difficulty, c.chart_id, c.is_active
         FROM chart c
         INNER JOIN music m ON m.music_id = c.music_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            ChartKey {
                source_id: row.get(0)?,
                play_style: row.get(1)?,
                difficulty: row.get(2)?,
            },
            ChartRef {
                chart_id: row.get(3)?,
                is_active: row.get::<_, i64>(4)? != 0,
            },
        ))
    })?;
    let map = rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
    Ok(map)
}

fn sample<T, F: Fn(&T) -> String>(items: &[T], render: F) -> String {
    items
        .iter()
        .take(SAMPLE_LIMIT)
        .map(render)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Compare chart ids of `baseline` and `current`.
pub fn check_chart_id_stability(
    baseline: &Connection,
    current: &Connection,
    policy: MissingPolicy,
) -> Result<StabilitySummary, IntegrityError> {
    let baseline_map = load_chart_key_map(baseline)?;
    let current_map = load_chart_key_map(current)?;

    let mut mismatches: Vec<(&ChartKey, i64, i64)> = Vec::new();
    let mut missing_in_new: Vec<&ChartKey> = Vec::new();
    let mut deactivated_total = 0;
    for (key, old) in &baseline_map {
        match current_map.get(key) {
            None => missing_in_new.push(key),
            Some(new) if new.chart_id != old.chart_id => {
                mismatches.push((key, old.chart_id, new.chart_id))
            }
            Some(new) => {
                if old.is_active && !new.is_active {
                    deactivated_total += 1;
                }
            }
        }
    }

    if !mismatches.is_empty() {
        return Err(IntegrityError::ChartIdMismatch {
            count: mismatches.len(),
            sample: sample(&mismatches, |(key, old, new)| {
                format!("{} old={} new={}", key, old, new)
            }),
        });
    }

    if !missing_in_new.is_empty() && policy == MissingPolicy::Error {
        return Err(IntegrityError::MissingInNew {
            count: missing_in_new.len(),
            sample: sample(&missing_in_new, |key| key.to_string()),
        });
    }

    let shared_total = baseline_map.len() - missing_in_new.len();
    let summary = StabilitySummary {
        baseline_total: baseline_map.len(),
        new_total: current_map.len(),
        shared_total,
        new_only_total: current_map.len() - shared_total,
        missing_in_new_total: missing_in_new.len(),
        deactivated_total,
        missing_policy: policy,
    };

    if summary.missing_in_new_total > 0 {
        warn!(
            "{} baseline chart(s) missing in the new build (policy: {}): {}",
            summary.missing_in_new_total,
            policy,
            sample(&missing_in_new, |key| key.to_string())
        );
    }
    info!(
        "Chart id stability: {} baseline, {} new, {} shared, {} new only, {} deactivated",
        summary.baseline_total,
        summary.new_total,
        summary.shared_total,
        summary.new_only_total,
        summary.deactivated_total
    );
    Ok(summary)
}

/// [`check_chart_id_stability`] over two store files opened read-only.
pub fn check_chart_id_stability_at(
    baseline_path: &Path,
    current_path: &Path,
    policy: MissingPolicy,
) -> Result<StabilitySummary, IntegrityError> {
    let baseline = Connection::open_with_flags(baseline_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let current = Connection::open_with_flags(current_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    check_chart_id_stability(&baseline, &current, policy)
}
